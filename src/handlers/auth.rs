use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    AppState,
    auth::{AuthUser, clear_session_cookie, issue_token, session_cookie},
    error::{AppError, AppResult},
    models::{
        ChangePasswordRequest, LoginRequest, NewUser, RegisterRequest, Role, SessionResponse,
        UpdateProfileRequest, User,
    },
    password::{hash_password_async, validate_password_strength, verify_password_async},
    repository::AdminGuard,
};

const BAD_CREDENTIALS: &str = "Invalid email or password";

/// Builds the session body and its `Set-Cookie` header for `user`.
fn start_session(state: &AppState, user: User) -> AppResult<(String, SessionResponse)> {
    let (token, expires_at) = issue_token(&user, &state.config)?;
    let cookie = session_cookie(&token, &state.config);
    Ok((
        cookie,
        SessionResponse {
            token,
            user,
            expires_at,
        },
    ))
}

/// login
///
/// [Public Route] Exchanges e-mail and password for a session. The token is
/// returned in the body and set as the HttpOnly session cookie. Unknown e-mail
/// and wrong password produce the same 401.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session started", body = SessionResponse),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    payload.validate()?;

    let Some(credentials) = state.repo.get_credentials_by_email(&payload.email).await? else {
        tracing::info!("login attempt for unknown e-mail");
        return Err(AppError::Unauthorized(BAD_CREDENTIALS.into()));
    };

    if !verify_password_async(payload.password, credentials.password_hash.clone()).await? {
        tracing::info!(user_id = %credentials.id, "login attempt with wrong password");
        return Err(AppError::Unauthorized(BAD_CREDENTIALS.into()));
    }

    let user = credentials.into_user();
    tracing::info!(user_id = %user.id, role = %user.role, "user logged in");
    let (cookie, body) = start_session(&state, user)?;
    Ok(([(header::SET_COOKIE, cookie)], Json(body)))
}

/// register
///
/// [Public Route] Creates a visitor account (role `user`) and signs it in.
/// A duplicate e-mail is rejected by the unique index with 409.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = SessionResponse),
        (status = 400, description = "Invalid payload"),
        (status = 409, description = "E-mail already registered")
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    payload.validate()?;
    validate_password_strength(&payload.password)?;
    let password_hash = hash_password_async(payload.password).await?;

    let user = state
        .repo
        .create_user(NewUser {
            email: payload.email,
            name: payload.name,
            role: Role::User,
            password_hash,
        })
        .await?;

    tracing::info!(user_id = %user.id, "visitor registered");
    let (cookie, body) = start_session(&state, user)?;
    Ok((StatusCode::CREATED, [(header::SET_COOKIE, cookie)], Json(body)))
}

/// logout
///
/// [Public Route] Expires the session cookie. Tokens are stateless, so a copied
/// bearer token stays valid until its `exp`.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses((status = 204, description = "Session cookie cleared")),
    tag = "auth"
)]
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, clear_session_cookie(&state.config))],
    )
}

/// get_me
///
/// [Authenticated Route] The caller's own account.
#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Profile", body = User),
        (status = 401, description = "Not signed in")
    ),
    tag = "auth"
)]
pub async fn get_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<User>> {
    let user = state.repo.get_user(id).await?.ok_or(AppError::NotFound("User"))?;
    Ok(Json(user))
}

/// update_me
///
/// [Authenticated Route] Changes the caller's display name. Role changes go
/// through the admin-only user endpoints.
#[utoipa::path(
    patch,
    path = "/api/me",
    request_body = UpdateProfileRequest,
    responses((status = 200, description = "Updated", body = User)),
    tag = "auth"
)]
pub async fn update_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Json<User>> {
    payload.validate()?;
    match state.repo.update_user(id, Some(payload.name), None).await? {
        AdminGuard::Applied(user) => Ok(Json(user)),
        // No role change, so only a vanished account can fail here.
        AdminGuard::NotFound | AdminGuard::LastAdmin => Err(AppError::NotFound("User")),
    }
}

/// change_password
///
/// [Authenticated Route] Requires the current password; 401 when it does not match.
#[utoipa::path(
    post,
    path = "/api/me/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "New password too weak"),
        (status = 401, description = "Current password is wrong")
    ),
    tag = "auth"
)]
pub async fn change_password(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<StatusCode> {
    validate_password_strength(&payload.new_password)?;

    let credentials = state
        .repo
        .get_credentials(id)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    if !verify_password_async(payload.current_password, credentials.password_hash).await? {
        return Err(AppError::Unauthorized("Current password is incorrect".into()));
    }

    let password_hash = hash_password_async(payload.new_password).await?;
    state.repo.set_password(id, password_hash).await?;
    tracing::info!(user_id = %id, "password changed");
    Ok(StatusCode::NO_CONTENT)
}
