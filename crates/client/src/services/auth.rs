//! Registration, login and profile management.

use mylocal_shared::{
    ApiError, AuthResponse, ChangePasswordRequest, LoginRequest, RegisterRequest,
    UpdateProfileRequest, User,
};

use crate::api_client::ApiClient;
use crate::session::AuthSession;

/// Register and store the returned session.
pub async fn register(api: &ApiClient, req: &RegisterRequest) -> Result<User, ApiError> {
    let resp: AuthResponse = api.post_json("/api/auth/register", req).await?;
    let user = resp.user.clone();
    api.session().set(AuthSession::from(resp));
    Ok(user)
}

/// Log in and store the returned session.
pub async fn login(api: &ApiClient, email: &str, password: &str) -> Result<User, ApiError> {
    let req = LoginRequest {
        email: email.to_string(),
        password: password.to_string(),
    };
    let resp: AuthResponse = api.post_json("/api/auth/login", &req).await?;
    let user = resp.user.clone();
    tracing::info!("Logged in as {}", user.email);
    api.session().set(AuthSession::from(resp));
    Ok(user)
}

/// Forget the local session. Tokens are stateless, so no request is made.
pub fn logout(api: &ApiClient) {
    api.session().clear();
}

/// Fetch the current profile and refresh the cached copy.
pub async fn me(api: &ApiClient) -> Result<User, ApiError> {
    let user: User = api.get_json("/api/auth/me").await?;
    api.session().set_user(user.clone());
    Ok(user)
}

pub async fn update_profile(api: &ApiClient, req: &UpdateProfileRequest) -> Result<User, ApiError> {
    let user: User = api.put_json("/api/auth/profile", req).await?;
    api.session().set_user(user.clone());
    Ok(user)
}

pub async fn change_password(
    api: &ApiClient,
    current_password: &str,
    new_password: &str,
) -> Result<(), ApiError> {
    let req = ChangePasswordRequest {
        current_password: current_password.to_string(),
        new_password: new_password.to_string(),
    };
    api.put_json("/api/auth/password", &req).await
}
