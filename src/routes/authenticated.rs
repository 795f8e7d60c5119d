use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Self-service routes for any signed-in account, whatever its role. The
/// `auth_middleware` route layer rejects requests without a valid session (401).
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET/PATCH /me
        // The caller's profile; only the display name is editable here.
        .route(
            "/me",
            get(handlers::auth::get_me).patch(handlers::auth::update_me),
        )
        // POST /me/password
        // Requires the current password.
        .route("/me/password", post(handlers::auth::change_password))
}
