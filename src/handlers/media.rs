use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;
use validator::Validate;

use super::non_empty;
use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{CreateMediaRequest, Media, UpdateMediaRequest, UploadUrlRequest, UploadUrlResponse},
    storage::sanitize_key,
};

pub const MEDIA_PREFIX: &str = "media/";
const MAX_EXTENSION_LEN: usize = 8;

pub fn is_allowed_content_type(content_type: &str) -> bool {
    let content_type = content_type.trim().to_ascii_lowercase();
    (content_type.starts_with("image/") && content_type.len() > "image/".len())
        || matches!(
            content_type.as_str(),
            "video/mp4" | "video/webm" | "application/pdf"
        )
}

/// Lower-cased extension of `filename`, or `bin` when it has none we can use.
pub fn file_extension(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(stem, ext)| (stem, ext.to_ascii_lowercase()))
        .filter(|(stem, ext)| {
            !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|(_, ext)| ext)
        .unwrap_or_else(|| "bin".to_string())
}

fn check_upload(content_type: &str, size_bytes: i64, max_bytes: i64) -> AppResult<()> {
    if !is_allowed_content_type(content_type) {
        return Err(AppError::BadRequest(format!(
            "Content type '{content_type}' is not allowed"
        )));
    }
    if size_bytes < 1 || size_bytes > max_bytes {
        return Err(AppError::BadRequest(format!(
            "File size must be between 1 and {max_bytes} bytes"
        )));
    }
    Ok(())
}

/// create_upload_url
///
/// [Staff Route] First step of an upload: reserves a fresh object key and
/// returns a presigned PUT URL (valid 10 minutes) so the browser uploads
/// straight to storage.
#[utoipa::path(
    post,
    path = "/api/media/upload-url",
    request_body = UploadUrlRequest,
    responses(
        (status = 200, description = "Presigned upload URL", body = UploadUrlResponse),
        (status = 400, description = "Disallowed type or size"),
        (status = 502, description = "Storage provider failed")
    ),
    tag = "media"
)]
pub async fn create_upload_url(
    State(state): State<AppState>,
    Json(payload): Json<UploadUrlRequest>,
) -> AppResult<Json<UploadUrlResponse>> {
    payload.validate()?;
    check_upload(
        &payload.content_type,
        payload.size_bytes,
        state.config.max_upload_bytes,
    )?;

    let key = format!(
        "{MEDIA_PREFIX}{}.{}",
        Uuid::new_v4(),
        file_extension(&payload.filename)
    );

    let upload_url = state
        .storage
        .get_presigned_upload_url(&key, payload.content_type.trim())
        .await
        .map_err(AppError::Upstream)?;

    Ok(Json(UploadUrlResponse {
        upload_url,
        public_url: state.config.media_url(&key),
        key,
    }))
}

/// register_media
///
/// [Staff Route] Second step of an upload: records the object in the library.
#[utoipa::path(
    post,
    path = "/api/media",
    request_body = CreateMediaRequest,
    responses(
        (status = 201, description = "Recorded", body = Media),
        (status = 400, description = "Invalid key, type or size"),
        (status = 409, description = "Key already recorded")
    ),
    tag = "media"
)]
pub async fn register_media(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(mut payload): Json<CreateMediaRequest>,
) -> AppResult<(StatusCode, Json<Media>)> {
    payload.validate()?;
    if !payload.key.starts_with(MEDIA_PREFIX) || sanitize_key(&payload.key) != payload.key {
        return Err(AppError::BadRequest(format!(
            "Object key must live under '{MEDIA_PREFIX}'"
        )));
    }
    check_upload(
        &payload.mime_type,
        payload.size_bytes,
        state.config.max_upload_bytes,
    )?;
    payload.alt_text = non_empty(payload.alt_text);

    let url = state.config.media_url(&payload.key);
    let media = state.repo.create_media(payload, url, user_id).await?;
    tracing::info!(media_id = %media.id, key = %media.key, "media recorded");
    Ok((StatusCode::CREATED, Json(media)))
}

/// list_media
///
/// [Staff Route]
#[utoipa::path(
    get,
    path = "/api/media",
    responses((status = 200, description = "Media library", body = [Media])),
    tag = "media"
)]
pub async fn list_media(State(state): State<AppState>) -> AppResult<Json<Vec<Media>>> {
    Ok(Json(state.repo.list_media().await?))
}

/// update_media
///
/// [Staff Route] Sets or clears (empty / null) the alt text.
#[utoipa::path(
    patch,
    path = "/api/media/{id}",
    params(("id" = Uuid, Path, description = "Media ID")),
    request_body = UpdateMediaRequest,
    responses((status = 200, description = "Updated", body = Media), (status = 404, description = "Not found")),
    tag = "media"
)]
pub async fn update_media(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateMediaRequest>,
) -> AppResult<Json<Media>> {
    payload.validate()?;
    let media = state
        .repo
        .update_media(id, non_empty(payload.alt_text))
        .await?
        .ok_or(AppError::NotFound("Media"))?;
    Ok(Json(media))
}

/// delete_media
///
/// [Staff Route] Deletes the row, then the stored object. A storage failure
/// leaves an orphaned object behind and is only logged.
#[utoipa::path(
    delete,
    path = "/api/media/{id}",
    params(("id" = Uuid, Path, description = "Media ID")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not found")),
    tag = "media"
)]
pub async fn delete_media(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let media = state
        .repo
        .delete_media(id)
        .await?
        .ok_or(AppError::NotFound("Media"))?;

    if let Err(e) = state.storage.delete_object(&media.key).await {
        tracing::warn!(key = %media.key, error = %e, "failed to delete stored object");
    }
    Ok(StatusCode::NO_CONTENT)
}
