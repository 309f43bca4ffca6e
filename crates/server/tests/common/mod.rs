#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use mylocal_server::{api_router, store::users::NewUser, AppState, Config, Store};
use mylocal_shared::Role;
use serde_json::{json, Value};
use tower::ServiceExt;

const MAX_SIZE: usize = 1024 * 1024;

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        init_logging();
        let store = Store::open_in_memory().expect("in-memory store");
        let state = AppState::new(store, Config::for_tests());
        Self {
            app: api_router(state.clone()),
            state,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), MAX_SIZE).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::PATCH, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, token, None).await
    }

    /// Register through the API; returns `(token, user_id)`.
    pub async fn register(&self, name: &str, email: &str, role: &str) -> (String, String) {
        let (status, body) = self
            .post(
                "/api/auth/register",
                None,
                json!({"name": name, "email": email, "password": "secret123", "role": role}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        (
            body["token"].as_str().unwrap().to_string(),
            body["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    /// Admins cannot self-register, so they are inserted directly.
    pub async fn admin(&self) -> (String, String) {
        let user = self
            .state
            .store
            .create_user(NewUser {
                name: "Admin".into(),
                email: "admin@example.com".into(),
                password_hash: "unused".into(),
                role: Role::Admin,
            })
            .await
            .unwrap();
        let token = self.state.tokens.issue(&user.id, Role::Admin).unwrap();
        (token, user.id)
    }

    pub async fn create_business(&self, token: &str, name: &str, city: &str) -> String {
        let (status, body) = self
            .post(
                "/api/businesses",
                Some(token),
                json!({
                    "name": name,
                    "description": "Family run since 1990",
                    "category": "restaurant",
                    "address": {"street": "1 Main St", "city": city, "state": "OR", "zipCode": "97201"},
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create business failed: {body}");
        body["id"].as_str().unwrap().to_string()
    }
}
