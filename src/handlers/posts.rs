use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use validator::Validate;

use super::{IdOrSlug, non_empty};
use crate::{
    AppState,
    auth::{AuthUser, MaybeAuthUser},
    content::{check_slug, normalize_tags, reading_minutes, resolve_slug},
    error::{AppError, AppResult},
    models::{CreatePostRequest, NewPost, Page, Post, PostChanges, PostStatus, UpdatePostRequest},
    repository::PostQuery,
    retry::{is_transient_db_error, with_backoff},
};

const DEFAULT_PER_PAGE: i64 = 10;
const MAX_PER_PAGE: i64 = 50;

/// PostFilter
///
/// Query parameters for GET /api/posts.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct PostFilter {
    pub tag: Option<String>,
    /// Case-insensitive match on title, excerpt and body.
    pub search: Option<String>,
    /// `draft | published | archived | all`; only honoured for staff.
    pub status: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Resolves the status filter for the caller. Anonymous visitors always get
/// published posts; staff see everything unless they narrow it.
fn effective_status(filter: Option<&str>, is_staff: bool) -> AppResult<Option<PostStatus>> {
    if !is_staff {
        return Ok(Some(PostStatus::Published));
    }
    match filter.map(str::trim) {
        None | Some("") | Some("all") => Ok(None),
        Some(raw) => PostStatus::parse(raw)
            .map(Some)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown post status '{raw}'"))),
    }
}

/// Returns `(page, per_page, offset)`. A page whose offset does not fit in
/// an `i64` is rejected rather than wrapped.
fn page_bounds(page: Option<i64>, per_page: Option<i64>) -> AppResult<(i64, i64, i64)> {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
    let offset = (page - 1)
        .checked_mul(per_page)
        .ok_or_else(|| AppError::BadRequest(format!("Page {page} is out of range")))?;
    Ok((page, per_page, offset))
}

/// list_posts
///
/// [Public Route] Paginated blog listing, newest first. Staff callers also see
/// drafts and archived posts.
#[utoipa::path(
    get,
    path = "/api/posts",
    params(PostFilter),
    responses(
        (status = 200, description = "One page of posts", body = Page<Post>),
        (status = 400, description = "Unknown status filter")
    ),
    tag = "content"
)]
pub async fn list_posts(
    viewer: MaybeAuthUser,
    State(state): State<AppState>,
    Query(filter): Query<PostFilter>,
) -> AppResult<Json<Page<Post>>> {
    let status = effective_status(filter.status.as_deref(), viewer.is_staff())?;
    let (page, per_page, offset) = page_bounds(filter.page, filter.per_page)?;

    let query = PostQuery {
        status,
        tag: non_empty(filter.tag).map(|t| t.to_lowercase()),
        search: non_empty(filter.search),
        limit: per_page,
        offset,
    };

    let (items, total) = with_backoff(
        &state.retry,
        || state.repo.list_posts(&query),
        is_transient_db_error,
    )
    .await?;

    Ok(Json(Page {
        items,
        total,
        page,
        per_page,
    }))
}

/// get_post
///
/// [Public Route] A single post by UUID or slug. Unpublished posts are 404 for
/// everyone but staff.
#[utoipa::path(
    get,
    path = "/api/posts/{id}",
    params(("id" = String, Path, description = "Post UUID or slug")),
    responses(
        (status = 200, description = "Found", body = Post),
        (status = 404, description = "Not found or not published")
    ),
    tag = "content"
)]
pub async fn get_post(
    viewer: MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Post>> {
    let post = match IdOrSlug::parse(&id) {
        IdOrSlug::Id(id) => state.repo.get_post(id).await?,
        IdOrSlug::Slug(slug) => state.repo.get_post_by_slug(&slug).await?,
    }
    .filter(|post| post.is_published() || viewer.is_staff())
    .ok_or(AppError::NotFound("Post"))?;

    Ok(Json(post))
}

/// create_post
///
/// [Staff Route] Creates a post. The slug is derived from the title when not
/// given; reading time is computed from the content.
#[utoipa::path(
    post,
    path = "/api/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Created", body = Post),
        (status = 409, description = "Slug already in use")
    ),
    tag = "content"
)]
pub async fn create_post(
    AuthUser { id: author_id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<Post>)> {
    payload.validate()?;
    let slug = resolve_slug(payload.slug.as_deref(), &payload.title)?;

    let post = state
        .repo
        .create_post(NewPost {
            slug,
            title: payload.title.trim().to_string(),
            excerpt: payload.excerpt.unwrap_or_default().trim().to_string(),
            reading_minutes: reading_minutes(&payload.content),
            content: payload.content,
            cover_image: non_empty(payload.cover_image),
            tags: normalize_tags(payload.tags),
            status: payload.status.unwrap_or(PostStatus::Draft),
            author_id: Some(author_id),
        })
        .await?;

    state.invalidate_search();
    tracing::info!(post_id = %post.id, slug = %post.slug, status = %post.status, "post created");
    Ok((StatusCode::CREATED, Json(post)))
}

/// update_post
///
/// [Staff Route] Partial update. `published_at` is stamped the first time the
/// post becomes published and kept afterwards.
#[utoipa::path(
    patch,
    path = "/api/posts/{id}",
    params(("id" = uuid::Uuid, Path, description = "Post ID")),
    request_body = UpdatePostRequest,
    responses(
        (status = 200, description = "Updated", body = Post),
        (status = 404, description = "Not found")
    ),
    tag = "content"
)]
pub async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    Json(payload): Json<UpdatePostRequest>,
) -> AppResult<Json<Post>> {
    payload.validate()?;

    let changes = PostChanges {
        slug: payload.slug.as_deref().map(check_slug).transpose()?,
        title: payload.title.map(|t| t.trim().to_string()),
        excerpt: payload.excerpt.map(|e| e.trim().to_string()),
        reading_minutes: payload.content.as_deref().map(reading_minutes),
        content: payload.content,
        // Empty string clears the cover image.
        cover_image: payload.cover_image.map(|c| c.trim().to_string()),
        tags: payload.tags.map(normalize_tags),
        status: payload.status,
    };

    let post = state
        .repo
        .update_post(id, changes)
        .await?
        .ok_or(AppError::NotFound("Post"))?;

    state.invalidate_search();
    Ok(Json(post))
}

/// delete_post
///
/// [Staff Route]
#[utoipa::path(
    delete,
    path = "/api/posts/{id}",
    params(("id" = uuid::Uuid, Path, description = "Post ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found")
    ),
    tag = "content"
)]
pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> AppResult<StatusCode> {
    if !state.repo.delete_post(id).await? {
        return Err(AppError::NotFound("Post"));
    }
    state.invalidate_search();
    Ok(StatusCode::NO_CONTENT)
}
