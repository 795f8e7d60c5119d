use axum::{Json, extract::State};

use crate::{
    AppState,
    error::{AppError, AppResult},
    forms::{FieldError, is_valid_name},
    models::{DashboardStats, PUBLIC_SETTING_KEYS, Setting, SettingsMap},
};

fn to_map(settings: Vec<Setting>) -> SettingsMap {
    settings.into_iter().map(|s| (s.key, s.value)).collect()
}

/// public_settings
///
/// [Public Route] The whitelisted subset the marketing pages render (site
/// name, contact details, pricing, careers).
#[utoipa::path(
    get,
    path = "/api/settings/public",
    responses((status = 200, description = "Public settings", body = Object)),
    tag = "settings"
)]
pub async fn public_settings(State(state): State<AppState>) -> AppResult<Json<SettingsMap>> {
    let mut settings = to_map(state.repo.list_settings().await?);
    settings.retain(|key, _| PUBLIC_SETTING_KEYS.contains(&key.as_str()));
    Ok(Json(settings))
}

/// list_settings
///
/// [Staff Route] Every stored key.
#[utoipa::path(
    get,
    path = "/api/settings",
    responses((status = 200, description = "All settings", body = Object)),
    tag = "settings"
)]
pub async fn list_settings(State(state): State<AppState>) -> AppResult<Json<SettingsMap>> {
    Ok(Json(to_map(state.repo.list_settings().await?)))
}

/// update_settings
///
/// [Staff Route] Upserts the given keys; keys not mentioned are untouched.
/// Returns the full map afterwards.
#[utoipa::path(
    put,
    path = "/api/settings",
    request_body = Object,
    responses(
        (status = 200, description = "Saved", body = Object),
        (status = 422, description = "Invalid keys")
    ),
    tag = "settings"
)]
pub async fn update_settings(
    State(state): State<AppState>,
    Json(values): Json<SettingsMap>,
) -> AppResult<Json<SettingsMap>> {
    if values.is_empty() {
        return Err(AppError::BadRequest("No settings given".into()));
    }
    let invalid: Vec<FieldError> = values
        .keys()
        .filter(|key| !is_valid_name(key))
        .map(|key| {
            FieldError::new(
                key.clone(),
                "invalid_key",
                "Keys are lowercase letters, digits and underscores",
            )
        })
        .collect();
    if !invalid.is_empty() {
        return Err(AppError::invalid_fields("Invalid setting keys", invalid));
    }

    let saved = state.repo.upsert_settings(values).await?;
    Ok(Json(to_map(saved)))
}

/// get_stats
///
/// [Staff Route] Dashboard counters.
#[utoipa::path(
    get,
    path = "/api/stats",
    responses((status = 200, description = "Counters", body = DashboardStats)),
    tag = "settings"
)]
pub async fn get_stats(State(state): State<AppState>) -> AppResult<Json<DashboardStats>> {
    Ok(Json(state.repo.get_stats().await?))
}
