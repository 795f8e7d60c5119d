use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, patch, post},
};

/// Staff Router Module
///
/// Content management for the `admin` and `editor` roles. Wrapped in the
/// `staff_middleware` route layer: 401 without a session, 403 for role `user`.
pub fn staff_routes() -> Router<AppState> {
    Router::new()
        // --- Posts ---
        .route("/posts", post(handlers::posts::create_post))
        // PATCH/DELETE /posts/{id}
        // Mutations clear the search cache.
        .route(
            "/posts/{id}",
            patch(handlers::posts::update_post).delete(handlers::posts::delete_post),
        )
        // --- Projects & services ---
        .route("/projects", post(handlers::content::create_project))
        .route(
            "/projects/{id}",
            patch(handlers::content::update_project).delete(handlers::content::delete_project),
        )
        .route("/services", post(handlers::content::create_service))
        .route(
            "/services/{id}",
            patch(handlers::content::update_service).delete(handlers::content::delete_service),
        )
        // --- Forms & entries ---
        // GET/POST /forms
        // The definition is validated as a whole (422 listing every issue).
        .route(
            "/forms",
            get(handlers::forms::list_forms).post(handlers::forms::create_form),
        )
        .route(
            "/forms/{id}",
            patch(handlers::forms::update_form).delete(handlers::forms::delete_form),
        )
        // GET /forms/{id}/entries?status=
        .route("/forms/{id}/entries", get(handlers::forms::list_entries))
        .route(
            "/entries/{id}",
            patch(handlers::forms::update_entry).delete(handlers::forms::delete_entry),
        )
        // --- Media ---
        // POST /media/upload-url
        // Presigned PUT (10 minutes) for a direct browser upload.
        .route("/media/upload-url", post(handlers::media::create_upload_url))
        .route(
            "/media",
            get(handlers::media::list_media).post(handlers::media::register_media),
        )
        // DELETE also removes the stored object; storage failures are only logged.
        .route(
            "/media/{id}",
            patch(handlers::media::update_media).delete(handlers::media::delete_media),
        )
        // --- Settings & dashboard ---
        .route(
            "/settings",
            get(handlers::settings::list_settings).put(handlers::settings::update_settings),
        )
        .route("/stats", get(handlers::settings::get_stats))
}

/// Admin Router Module
///
/// User administration, restricted to the `admin` role by the
/// `admin_middleware` route layer. Handlers also take `RequireAdmin` to know
/// who is acting (self-demotion and last-admin checks).
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users",
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        .route(
            "/users/{id}",
            patch(handlers::users::update_user).delete(handlers::users::delete_user),
        )
}
