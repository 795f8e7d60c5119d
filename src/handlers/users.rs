use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    AppState,
    auth::RequireAdmin,
    error::{AppError, AppResult},
    models::{CreateUserRequest, NewUser, Role, UpdateUserRequest, User},
    password::{hash_password_async, validate_password_strength},
    repository::{AdminGuard, Repository},
};

/// Maps a guarded user change onto the response: 404 for a missing row,
/// 409 when it would have left the site without an administrator.
fn guarded<T>(outcome: AdminGuard<T>) -> AppResult<T> {
    match outcome {
        AdminGuard::Applied(value) => Ok(value),
        AdminGuard::NotFound => Err(AppError::NotFound("User")),
        AdminGuard::LastAdmin => Err(AppError::Conflict(
            "The last administrator cannot be removed or demoted".into(),
        )),
    }
}

/// list_users
///
/// [Admin Route] Every account, oldest first.
#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "Users", body = [User]),
        (status = 403, description = "Not an administrator")
    ),
    tag = "users"
)]
pub async fn list_users(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<User>>> {
    Ok(Json(state.repo.list_users().await?))
}

/// create_user
///
/// [Admin Route] Creates an account with any role.
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Created", body = User),
        (status = 409, description = "E-mail already registered")
    ),
    tag = "users"
)]
pub async fn create_user(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    payload.validate()?;
    validate_password_strength(&payload.password)?;
    let password_hash = hash_password_async(payload.password).await?;

    let user = state
        .repo
        .create_user(NewUser {
            email: payload.email,
            name: payload.name,
            role: payload.role,
            password_hash,
        })
        .await?;

    tracing::info!(admin_id = %admin.id, user_id = %user.id, role = %user.role, "user created");
    Ok((StatusCode::CREATED, Json(user)))
}

/// update_user
///
/// [Admin Route] Renames or re-roles an account. Admins cannot demote
/// themselves, and the last admin cannot be demoted.
#[utoipa::path(
    patch,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = User),
        (status = 404, description = "Not found"),
        (status = 409, description = "Would demote yourself or the last admin")
    ),
    tag = "users"
)]
pub async fn update_user(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<Json<User>> {
    payload.validate()?;
    if id == admin.id && payload.role.is_some_and(|role| role != Role::Admin) {
        return Err(AppError::Conflict("You cannot demote yourself".into()));
    }

    let user = guarded(
        state
            .repo
            .update_user(id, payload.name, payload.role)
            .await?,
    )?;

    tracing::info!(admin_id = %admin.id, user_id = %user.id, role = %user.role, "user updated");
    Ok(Json(user))
}

/// delete_user
///
/// [Admin Route] Authored posts and uploads keep their rows with the author
/// reference cleared.
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Would delete yourself or the last admin")
    ),
    tag = "users"
)]
pub async fn delete_user(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if id == admin.id {
        return Err(AppError::Conflict("You cannot delete your own account".into()));
    }
    guarded(state.repo.delete_user(id).await?)?;
    tracing::info!(admin_id = %admin.id, user_id = %id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// bootstrap_admin
///
/// Creates the configured initial administrator when no account with that
/// e-mail exists. Returns whether an account was created.
pub async fn bootstrap_admin(repo: &dyn Repository, email: &str, password: &str) -> AppResult<bool> {
    if repo.get_credentials_by_email(email).await?.is_some() {
        return Ok(false);
    }
    validate_password_strength(password)?;

    let user = repo
        .create_user(NewUser {
            email: email.to_string(),
            name: "Administrator".to_string(),
            role: Role::Admin,
            password_hash: hash_password_async(password.to_string()).await?,
        })
        .await?;
    tracing::info!(user_id = %user.id, "initial administrator created");
    Ok(true)
}
