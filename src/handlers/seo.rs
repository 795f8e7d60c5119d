use axum::{extract::State, http::header, response::IntoResponse};

use crate::{
    AppState,
    error::{AppError, AppResult},
    models::SettingsMap,
    repository::all_published_posts,
    retry::{is_transient_db_error, with_backoff},
    seo::{WebManifest, render_sitemap, robots_txt, sitemap_entries},
};

fn setting_str<'a>(settings: &'a SettingsMap, key: &str) -> Option<&'a str> {
    settings
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// sitemap
///
/// [Public Route] `sitemap.xml` for the marketing site.
#[utoipa::path(
    get,
    path = "/sitemap.xml",
    responses((status = 200, description = "sitemaps.org urlset", content_type = "application/xml")),
    tag = "seo"
)]
pub async fn sitemap(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let repo = state.repo.as_ref();
    let posts = all_published_posts(repo, &state.retry).await?;
    let services = with_backoff(&state.retry, || repo.list_services(true), is_transient_db_error).await?;
    let projects = with_backoff(
        &state.retry,
        || repo.list_projects(true, false),
        is_transient_db_error,
    )
    .await?;

    let xml = render_sitemap(
        &state.config.site_url,
        &sitemap_entries(&posts, &services, &projects),
    );
    Ok(([(header::CONTENT_TYPE, "application/xml; charset=utf-8")], xml))
}

/// robots
///
/// [Public Route] `robots.txt`; the back office and API are disallowed.
#[utoipa::path(
    get,
    path = "/robots.txt",
    responses((status = 200, description = "robots.txt", content_type = "text/plain")),
    tag = "seo"
)]
pub async fn robots(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        robots_txt(&state.config.site_url),
    )
}

/// manifest
///
/// [Public Route] Web app manifest. Names and colour come from the settings
/// table, falling back to the configured site name.
#[utoipa::path(
    get,
    path = "/manifest.webmanifest",
    responses((status = 200, description = "Web app manifest", content_type = "application/manifest+json")),
    tag = "seo"
)]
pub async fn manifest(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let settings: SettingsMap = state
        .repo
        .list_settings()
        .await?
        .into_iter()
        .map(|s| (s.key, s.value))
        .collect();

    let name = setting_str(&settings, "site_name").unwrap_or(state.config.site_name.as_str());
    let manifest = WebManifest::new(
        name,
        setting_str(&settings, "short_name"),
        setting_str(&settings, "tagline"),
        setting_str(&settings, "theme_color"),
    );

    let body = serde_json::to_string(&manifest).map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "application/manifest+json")], body))
}
