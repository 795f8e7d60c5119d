use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session. Listing handlers hide unpublished
/// content unless the optional session belongs to staff.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for load balancers.
        .route("/health", get(|| async { "ok" }))
        // --- Session ---
        // POST /auth/login
        // Verifies the password and sets the HttpOnly session cookie.
        .route("/auth/login", post(handlers::auth::login))
        // POST /auth/register
        // Visitor self-registration; always creates role `user`.
        .route("/auth/register", post(handlers::auth::register))
        // POST /auth/logout
        .route("/auth/logout", post(handlers::auth::logout))
        // --- Content ---
        // GET /posts?tag=&search=&status=&page=&per_page=
        .route("/posts", get(handlers::posts::list_posts))
        // GET /posts/{id}
        // UUID or slug; drafts only for staff.
        .route("/posts/{id}", get(handlers::posts::get_post))
        // GET /projects?featured=
        .route("/projects", get(handlers::content::list_projects))
        .route("/projects/{id}", get(handlers::content::get_project))
        // GET /services
        // Ordered by sort_order.
        .route("/services", get(handlers::content::list_services))
        .route("/services/{id}", get(handlers::content::get_service))
        // --- Forms ---
        // GET /forms/{id}
        // Render descriptor of an active form (UUID or slug).
        .route("/forms/{id}", get(handlers::forms::get_public_form))
        // POST /forms/submit
        // Schema-validated submission; honeypot hits are accepted but dropped.
        .route("/forms/submit", post(handlers::forms::submit_form))
        // --- Site data ---
        // GET /settings/public
        .route("/settings/public", get(handlers::settings::public_settings))
        // GET /search?q=&limit=
        // Memoized ranking across published content.
        .route("/search", get(handlers::search::search))
        // POST /analytics/event
        // Fire-and-forget forwarding to the analytics provider.
        .route("/analytics/event", post(handlers::analytics::track_event))
}
