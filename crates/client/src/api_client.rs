//! HTTP API client: one reqwest instance, bearer auth and uniform failure
//! handling for every REST call.

use std::fmt;
use std::sync::Arc;

use mylocal_shared::ApiError;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::ClientConfig;
use crate::session::SessionStore;
use crate::stores::{Notifications, Route, RouteStore};

type SignedOutHook = Arc<dyn Fn() + Send + Sync>;

/// HTTP client for the MyLocal API.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: SessionStore,
    notifications: Notifications,
    router: RouteStore,
    on_signed_out: Option<SignedOutHook>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(
        config: &ClientConfig,
        session: SessionStore,
        notifications: Notifications,
        router: RouteStore,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            session,
            notifications,
            router,
            on_signed_out: None,
        })
    }

    /// Run `hook` after a 401 has cleared the session, to tear down
    /// anything still bound to the rejected identity.
    pub fn on_signed_out(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_signed_out = Some(Arc::new(hook));
        self
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn notifications(&self) -> &Notifications {
        &self.notifications
    }

    pub fn router(&self) -> &RouteStore {
        &self.router
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let rb = self.client.request(method, self.url(path));
        match self.session.token() {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        self.send(self.request(Method::GET, path)).await
    }

    /// GET with query parameters taken from a flat serializable filter.
    pub async fn get_query<TQuery: Serialize + ?Sized, TRes: DeserializeOwned>(
        &self,
        path: &str,
        query: &TQuery,
    ) -> Result<TRes, ApiError> {
        self.send(self.request(Method::GET, path).query(query)).await
    }

    pub async fn post_json<TReq: Serialize + ?Sized, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    /// POST without a body (toggles, reports).
    pub async fn post_empty<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        self.send(self.request(Method::POST, path)).await
    }

    pub async fn put_json<TReq: Serialize + ?Sized, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        self.send(self.request(Method::PUT, path).json(body)).await
    }

    pub async fn patch_json<TReq: Serialize + ?Sized, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        self.send(self.request(Method::PATCH, path).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(self.request(Method::DELETE, path)).await
    }

    /// DELETE whose response carries the updated parent resource.
    pub async fn delete_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        self.send(self.request(Method::DELETE, path)).await
    }

    async fn send<TRes: DeserializeOwned>(&self, rb: RequestBuilder) -> Result<TRes, ApiError> {
        let resp = rb.send().await.map_err(|e| self.transport_failure(e))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| self.transport_failure(e))?;

        if !status.is_success() {
            return Err(self.http_failure(status, &text));
        }

        let body = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(body).map_err(|e| ApiError::Deserialize(e.to_string()))
    }

    fn transport_failure(&self, e: reqwest::Error) -> ApiError {
        let err = if e.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Network(e.to_string())
        };
        tracing::warn!("Request failed: {}", e);
        self.notifications.error(err.user_message());
        err
    }

    fn http_failure(&self, status: StatusCode, body: &str) -> ApiError {
        let err = ApiError::from_status(status.as_u16(), body);
        match status {
            StatusCode::UNAUTHORIZED => {
                tracing::info!("Session rejected by server, logging out");
                self.session.clear();
                if let Some(hook) = &self.on_signed_out {
                    hook();
                }
                self.router.navigate(Route::Login);
            }
            StatusCode::FORBIDDEN => {
                self.notifications.error(err.user_message());
            }
            s if s.is_server_error() => {
                tracing::error!("Server error {}: {}", s, body);
                self.notifications.error(err.user_message());
            }
            // Validation failures are shown inline by the caller.
            _ => {}
        }
        err
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::session::{sample_user, AuthSession};
    use crate::storage::Storage;

    pub(crate) struct Harness {
        pub api: ApiClient,
        pub dir: tempfile::TempDir,
    }

    pub(crate) fn harness(base_url: &str, token: Option<&str>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::new(base_url).with_storage_dir(dir.path());
        let session = SessionStore::load(Storage::new(dir.path()));
        if let Some(token) = token {
            session.set(AuthSession {
                token: token.to_string(),
                user: sample_user("u1"),
            });
        }
        let api = ApiClient::new(&config, session, Notifications::new(), RouteStore::new()).unwrap();
        Harness { api, dir }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::harness;
    use super::*;
    use mylocal_shared::{HealthResponse, ProblemDetails};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn attaches_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server.uri(), Some("tok-1"));
        let health: HealthResponse = h.api.get_json("/api/health").await.unwrap();
        assert_eq!(health.status, "ok");
    }

    #[tokio::test]
    async fn unauthorized_clears_session_and_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/me"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(ProblemDetails::unauthorized("Token expired")),
            )
            .mount(&server)
            .await;

        let h = harness(&server.uri(), Some("stale"));
        h.api.router().navigate(Route::Chats);

        let err = h.api.get_json::<serde_json::Value>("/api/auth/me").await.unwrap_err();
        assert_eq!(err, ApiError::Unauthorized("Token expired".into()));
        assert!(!h.api.session().is_authenticated());
        assert!(!h.dir.path().join("session.json").exists());
        assert_eq!(h.api.router().current(), Route::Login);
        assert!(h.api.notifications().is_empty());
    }

    #[tokio::test]
    async fn forbidden_notifies_but_keeps_session() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/posts/p1"))
            .respond_with(ResponseTemplate::new(403).set_body_json(ProblemDetails::forbidden("Not yours")))
            .mount(&server)
            .await;

        let h = harness(&server.uri(), Some("tok"));
        let err = h.api.delete("/api/posts/p1").await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
        assert!(h.api.session().is_authenticated());
        let notes = h.api.notifications().list();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].message.starts_with("You do not have permission"));
    }

    #[tokio::test]
    async fn validation_errors_pass_through_silently() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/businesses/b1/reviews"))
            .respond_with(
                ResponseTemplate::new(409)
                    .set_body_json(ProblemDetails::conflict("You have already reviewed this business")),
            )
            .mount(&server)
            .await;

        let h = harness(&server.uri(), Some("tok"));
        let err = h
            .api
            .post_json::<_, serde_json::Value>("/api/businesses/b1/reviews", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "You have already reviewed this business");
        assert_eq!(err.status(), Some(409));
        assert!(h.api.notifications().is_empty());
    }

    #[tokio::test]
    async fn server_errors_notify() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/posts"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let h = harness(&server.uri(), None);
        let err = h.api.get_json::<serde_json::Value>("/api/posts").await.unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert_eq!(h.api.notifications().list().len(), 1);
    }

    #[tokio::test]
    async fn timeouts_notify() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(2)))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::new(server.uri())
            .with_storage_dir(dir.path())
            .with_request_timeout(std::time::Duration::from_millis(100));
        let notes = Notifications::new();
        let api = ApiClient::new(
            &config,
            SessionStore::load(crate::storage::Storage::new(dir.path())),
            notes.clone(),
            RouteStore::new(),
        )
        .unwrap();

        let err = api.get_json::<serde_json::Value>("/api/health").await.unwrap_err();
        assert_eq!(err, ApiError::Timeout);
        assert_eq!(notes.list().len(), 1);
    }

    #[tokio::test]
    async fn network_failure_notifies() {
        // Nothing listens on port 9 on loopback.
        let h = harness("http://127.0.0.1:9", None);
        let err = h.api.get_json::<serde_json::Value>("/api/health").await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
        assert_eq!(h.api.notifications().list().len(), 1);
    }

    #[tokio::test]
    async fn empty_body_decodes_as_unit() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/auth/password"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let h = harness(&server.uri(), Some("tok"));
        let () = h
            .api
            .put_json("/api/auth/password", &serde_json::json!({}))
            .await
            .unwrap();
    }

    #[test]
    fn joins_paths_onto_base() {
        let h = harness("http://localhost:8080/", None);
        assert_eq!(h.api.url("/api/posts"), "http://localhost:8080/api/posts");
        assert_eq!(h.api.url("api/posts"), "http://localhost:8080/api/posts");
        assert_eq!(h.api.url("https://cdn.example/x"), "https://cdn.example/x");
    }
}
