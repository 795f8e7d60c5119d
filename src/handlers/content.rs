//! Portfolio projects (`/work`) and service pages.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{IdOrSlug, non_empty};
use crate::{
    AppState,
    auth::MaybeAuthUser,
    content::{check_slug, normalize_tags, resolve_slug},
    error::{AppError, AppResult},
    models::{
        CreateProjectRequest, CreateServiceRequest, Project, Service, UpdateProjectRequest,
        UpdateServiceRequest,
    },
};

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct ProjectFilter {
    /// Only featured projects.
    pub featured: Option<bool>,
}

// --- Projects ---

/// list_projects
///
/// [Public Route] Featured projects first. Unpublished projects are only
/// listed for staff.
#[utoipa::path(
    get,
    path = "/api/projects",
    params(ProjectFilter),
    responses((status = 200, description = "Projects", body = [Project])),
    tag = "content"
)]
pub async fn list_projects(
    viewer: MaybeAuthUser,
    State(state): State<AppState>,
    Query(filter): Query<ProjectFilter>,
) -> AppResult<Json<Vec<Project>>> {
    let projects = state
        .repo
        .list_projects(!viewer.is_staff(), filter.featured.unwrap_or(false))
        .await?;
    Ok(Json(projects))
}

/// get_project
///
/// [Public Route] By UUID or slug.
#[utoipa::path(
    get,
    path = "/api/projects/{id}",
    params(("id" = String, Path, description = "Project UUID or slug")),
    responses((status = 200, description = "Found", body = Project), (status = 404, description = "Not found")),
    tag = "content"
)]
pub async fn get_project(
    viewer: MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Project>> {
    let project = match IdOrSlug::parse(&id) {
        IdOrSlug::Id(id) => state.repo.get_project(id).await?,
        IdOrSlug::Slug(slug) => state.repo.get_project_by_slug(&slug).await?,
    }
    .filter(|p| p.published || viewer.is_staff())
    .ok_or(AppError::NotFound("Project"))?;
    Ok(Json(project))
}

/// create_project
///
/// [Staff Route]
#[utoipa::path(
    post,
    path = "/api/projects",
    request_body = CreateProjectRequest,
    responses((status = 201, description = "Created", body = Project), (status = 409, description = "Slug already in use")),
    tag = "content"
)]
pub async fn create_project(
    State(state): State<AppState>,
    Json(mut payload): Json<CreateProjectRequest>,
) -> AppResult<(StatusCode, Json<Project>)> {
    payload.validate()?;
    let slug = resolve_slug(payload.slug.as_deref(), &payload.title)?;
    payload.tags = normalize_tags(payload.tags);
    payload.client = non_empty(payload.client);
    payload.cover_image = non_empty(payload.cover_image);

    let project = state.repo.create_project(slug, payload).await?;
    state.invalidate_search();
    Ok((StatusCode::CREATED, Json(project)))
}

/// update_project
///
/// [Staff Route] Partial update; empty `client`/`cover_image` clear them.
#[utoipa::path(
    patch,
    path = "/api/projects/{id}",
    params(("id" = Uuid, Path, description = "Project ID")),
    request_body = UpdateProjectRequest,
    responses((status = 200, description = "Updated", body = Project), (status = 404, description = "Not found")),
    tag = "content"
)]
pub async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<UpdateProjectRequest>,
) -> AppResult<Json<Project>> {
    payload.validate()?;
    payload.slug = payload.slug.as_deref().map(check_slug).transpose()?;
    payload.tags = payload.tags.map(normalize_tags);

    let project = state
        .repo
        .update_project(id, payload)
        .await?
        .ok_or(AppError::NotFound("Project"))?;
    state.invalidate_search();
    Ok(Json(project))
}

/// delete_project
///
/// [Staff Route]
#[utoipa::path(
    delete,
    path = "/api/projects/{id}",
    params(("id" = Uuid, Path, description = "Project ID")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not found")),
    tag = "content"
)]
pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if !state.repo.delete_project(id).await? {
        return Err(AppError::NotFound("Project"));
    }
    state.invalidate_search();
    Ok(StatusCode::NO_CONTENT)
}

// --- Services ---

/// list_services
///
/// [Public Route] Ordered by `sort_order`, then title.
#[utoipa::path(
    get,
    path = "/api/services",
    responses((status = 200, description = "Services", body = [Service])),
    tag = "content"
)]
pub async fn list_services(
    viewer: MaybeAuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<Service>>> {
    Ok(Json(state.repo.list_services(!viewer.is_staff()).await?))
}

/// get_service
///
/// [Public Route] By UUID or slug.
#[utoipa::path(
    get,
    path = "/api/services/{id}",
    params(("id" = String, Path, description = "Service UUID or slug")),
    responses((status = 200, description = "Found", body = Service), (status = 404, description = "Not found")),
    tag = "content"
)]
pub async fn get_service(
    viewer: MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Service>> {
    let service = match IdOrSlug::parse(&id) {
        IdOrSlug::Id(id) => state.repo.get_service(id).await?,
        IdOrSlug::Slug(slug) => state.repo.get_service_by_slug(&slug).await?,
    }
    .filter(|s| s.published || viewer.is_staff())
    .ok_or(AppError::NotFound("Service"))?;
    Ok(Json(service))
}

/// create_service
///
/// [Staff Route]
#[utoipa::path(
    post,
    path = "/api/services",
    request_body = CreateServiceRequest,
    responses((status = 201, description = "Created", body = Service), (status = 409, description = "Slug already in use")),
    tag = "content"
)]
pub async fn create_service(
    State(state): State<AppState>,
    Json(mut payload): Json<CreateServiceRequest>,
) -> AppResult<(StatusCode, Json<Service>)> {
    payload.validate()?;
    let slug = resolve_slug(payload.slug.as_deref(), &payload.title)?;
    payload.icon = non_empty(payload.icon);

    let service = state.repo.create_service(slug, payload).await?;
    state.invalidate_search();
    Ok((StatusCode::CREATED, Json(service)))
}

/// update_service
///
/// [Staff Route]
#[utoipa::path(
    patch,
    path = "/api/services/{id}",
    params(("id" = Uuid, Path, description = "Service ID")),
    request_body = UpdateServiceRequest,
    responses((status = 200, description = "Updated", body = Service), (status = 404, description = "Not found")),
    tag = "content"
)]
pub async fn update_service(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<UpdateServiceRequest>,
) -> AppResult<Json<Service>> {
    payload.validate()?;
    payload.slug = payload.slug.as_deref().map(check_slug).transpose()?;

    let service = state
        .repo
        .update_service(id, payload)
        .await?
        .ok_or(AppError::NotFound("Service"))?;
    state.invalidate_search();
    Ok(Json(service))
}

/// delete_service
///
/// [Staff Route]
#[utoipa::path(
    delete,
    path = "/api/services/{id}",
    params(("id" = Uuid, Path, description = "Service ID")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not found")),
    tag = "content"
)]
pub async fn delete_service(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if !state.repo.delete_service(id).await? {
        return Err(AppError::NotFound("Service"));
    }
    state.invalidate_search();
    Ok(StatusCode::NO_CONTENT)
}
