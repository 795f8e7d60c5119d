use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// SEO Router Module
///
/// Standard crawler files. Mounted at the root, next to `/api`.
pub fn seo_routes() -> Router<AppState> {
    Router::new()
        .route("/sitemap.xml", get(handlers::seo::sitemap))
        .route("/robots.txt", get(handlers::seo::robots))
        .route("/manifest.webmanifest", get(handlers::seo::manifest))
}
