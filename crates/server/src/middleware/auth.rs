//! Bearer-token authentication extractors.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, Uri},
};
use mylocal_shared::{Role, User, WS_TOKEN_PARAM};

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated, active user making the request.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// Like [`AuthUser`] but yields `None` for anonymous or invalid credentials.
#[derive(Debug, Clone)]
pub struct OptionalAuthUser(pub Option<User>);

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn is_admin(&self) -> bool {
        self.0.role == Role::Admin
    }

    /// 403 unless the user holds one of `roles`.
    pub fn require_role(&self, roles: &[Role]) -> Result<(), ApiError> {
        if roles.contains(&self.0.role) {
            Ok(())
        } else {
            Err(ApiError::forbidden("You do not have permission to perform this action"))
        }
    }

    /// 403 unless the user is `owner_id` or an admin.
    pub fn require_owner_or_admin(&self, owner_id: &str) -> Result<(), ApiError> {
        if self.0.id == owner_id || self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden("You do not have permission to perform this action"))
        }
    }
}

/// Token from `Authorization: Bearer ...`, falling back to the `token` query
/// parameter used by WebSocket upgrades.
pub fn extract_token(parts: &Parts) -> Option<String> {
    let from_header = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    from_header.or_else(|| token_from_query(&parts.uri))
}

fn token_from_query(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == WS_TOKEN_PARAM)
        .map(|(_, v)| v.into_owned())
        .filter(|t| !t.is_empty())
}

/// Validate a raw token and load the active user it names.
pub async fn authenticate(state: &AppState, token: &str) -> Result<User, ApiError> {
    let claims = state.tokens.validate(token).map_err(|e| {
        tracing::debug!("Token rejected: {e:#}");
        ApiError::unauthorized("Invalid or expired token")
    })?;
    let record = state
        .store
        .find_user(&claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User no longer exists"))?;
    if !record.user.is_active {
        return Err(ApiError::unauthorized("Account is deactivated"));
    }
    Ok(record.user)
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiError;

    fn from_request_parts(parts: &mut Parts, state: &S) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let app_state = AppState::from_ref(state);
        let token = extract_token(parts);

        async move {
            let token = token.ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
            let user = authenticate(&app_state, &token).await?;
            Ok(AuthUser(user))
        }
    }
}

impl<S> FromRequestParts<S> for OptionalAuthUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    fn from_request_parts(parts: &mut Parts, state: &S) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let app_state = AppState::from_ref(state);
        let token = extract_token(parts);

        async move {
            let Some(token) = token else {
                return Ok(OptionalAuthUser(None));
            };
            Ok(OptionalAuthUser(authenticate(&app_state, &token).await.ok()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(req: Request<()>) -> Parts {
        req.into_parts().0
    }

    #[test]
    fn header_token_wins_over_query() {
        let p = parts(
            Request::builder()
                .uri("/api/ws?token=from-query")
                .header(header::AUTHORIZATION, "Bearer from-header")
                .body(())
                .unwrap(),
        );
        assert_eq!(extract_token(&p).as_deref(), Some("from-header"));
    }

    #[test]
    fn query_token_is_decoded() {
        let p = parts(Request::builder().uri("/api/ws?token=a%2Eb").body(()).unwrap());
        assert_eq!(extract_token(&p).as_deref(), Some("a.b"));
    }

    #[test]
    fn missing_or_malformed_header_yields_none() {
        let p = parts(
            Request::builder()
                .uri("/api/auth/me")
                .header(header::AUTHORIZATION, "Basic abc")
                .body(())
                .unwrap(),
        );
        assert_eq!(extract_token(&p), None);
    }
}
