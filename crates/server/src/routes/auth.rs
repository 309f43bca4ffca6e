//! Authentication and profile routes.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, http::StatusCode, Json};
use mylocal_shared::{
    validate_email, AuthResponse, ChangePasswordRequest, LoginRequest, RegisterRequest, Role,
    UpdateProfileRequest, User, MIN_PASSWORD_LEN,
};

use crate::error::{ApiError, ApiResult};
use crate::middleware::auth::AuthUser;
use crate::state::AppState;
use crate::store::users::NewUser;

pub(crate) fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

fn verify_password(password: &str, hash: &str) -> ApiResult<bool> {
    let parsed = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn check_password_len(password: &str) -> ApiResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn issue(state: &AppState, user: User) -> ApiResult<AuthResponse> {
    let token = state.tokens.issue(&user.id, user.role).map_err(|e| {
        tracing::error!("Token issue failed: {e:#}");
        ApiError::internal("An unexpected error occurred")
    })?;
    Ok(AuthResponse { token, user })
}

/// Register a new account. Admins cannot self-register.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    tracing::info!("Registering user: {}", payload.email);

    if payload.name.trim().is_empty() {
        return Err(ApiError::bad_request("Name is required"));
    }
    if !validate_email(&payload.email) {
        return Err(ApiError::bad_request("A valid email address is required"));
    }
    check_password_len(&payload.password)?;
    let role = match payload.role.unwrap_or(Role::Customer) {
        Role::Admin => return Err(ApiError::forbidden("Admin accounts cannot be self-registered")),
        role => role,
    };

    let password_hash = hash_password(&payload.password)?;
    let user = state
        .store
        .create_user(NewUser {
            name: payload.name,
            email: payload.email,
            password_hash,
            role,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(issue(&state, user)?)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    tracing::info!("Logging in user: {}", payload.email);

    let record = state
        .store
        .find_user_by_email(&payload.email)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;

    if !verify_password(&payload.password, &record.password_hash)? {
        return Err(ApiError::unauthorized("Invalid email or password"));
    }
    if !record.user.is_active {
        return Err(ApiError::unauthorized("Account is deactivated"));
    }

    Ok(Json(issue(&state, record.user)?))
}

pub async fn me(user: AuthUser) -> Json<User> {
    Json(user.0)
}

pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    if payload.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::bad_request("Name cannot be empty"));
    }
    let updated = state.store.update_profile(user.id(), &payload).await?;
    Ok(Json(updated))
}

pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> ApiResult<StatusCode> {
    let record = state
        .store
        .find_user(user.id())
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if !verify_password(&payload.current_password, &record.password_hash)? {
        return Err(ApiError::bad_request("Current password is incorrect"));
    }
    check_password_len(&payload.new_password)?;

    let hash = hash_password(&payload.new_password)?;
    state.store.set_password_hash(user.id(), &hash).await?;
    tracing::info!("Password changed for user {}", user.id());
    Ok(StatusCode::NO_CONTENT)
}
