//! MyLocal Connect server: REST API, moderation endpoints and the chat relay.

use axum::{
    routing::{get, patch, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod frontend;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod store;
pub mod token;
pub mod ws;

pub use config::{Config, FrontendMode};
pub use state::AppState;
pub use store::Store;

/// API routes with state applied, without the frontend fallback.
pub fn api_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(routes::health))
        // Auth
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/me", get(routes::auth::me))
        .route("/api/auth/profile", put(routes::auth::update_profile))
        .route("/api/auth/password", put(routes::auth::change_password))
        // Businesses
        .route(
            "/api/businesses",
            get(routes::businesses::list_businesses).post(routes::businesses::create_business),
        )
        .route("/api/businesses/mine", get(routes::businesses::my_businesses))
        .route(
            "/api/businesses/{id}",
            get(routes::businesses::get_business)
                .put(routes::businesses::update_business)
                .delete(routes::businesses::delete_business),
        )
        .route(
            "/api/businesses/{id}/reviews",
            get(routes::reviews::list_business_reviews).post(routes::reviews::create_review),
        )
        // Reviews
        .route(
            "/api/reviews/{id}",
            put(routes::reviews::update_review).delete(routes::reviews::delete_review),
        )
        .route("/api/reviews/{id}/report", post(routes::reviews::report_review))
        // Posts
        .route("/api/posts", get(routes::posts::list_posts).post(routes::posts::create_post))
        .route(
            "/api/posts/{id}",
            get(routes::posts::get_post)
                .put(routes::posts::update_post)
                .delete(routes::posts::delete_post),
        )
        .route("/api/posts/{id}/like", post(routes::posts::toggle_like))
        .route("/api/posts/{id}/comments", post(routes::posts::add_comment))
        .route(
            "/api/posts/{id}/comments/{comment_id}",
            put(routes::posts::edit_comment).delete(routes::posts::delete_comment),
        )
        .route(
            "/api/posts/{id}/comments/{comment_id}/like",
            post(routes::posts::toggle_comment_like),
        )
        // Admin
        .route("/api/admin/stats", get(routes::admin::stats))
        .route("/api/admin/users", get(routes::admin::list_users))
        .route(
            "/api/admin/users/{id}",
            patch(routes::admin::update_user).delete(routes::admin::delete_user),
        )
        .route("/api/admin/businesses", get(routes::admin::list_businesses))
        .route(
            "/api/admin/businesses/{id}",
            patch(routes::admin::update_business).delete(routes::admin::delete_business),
        )
        .route("/api/admin/reviews", get(routes::admin::list_reviews))
        .route(
            "/api/admin/reviews/{id}",
            patch(routes::admin::update_review).delete(routes::admin::delete_review),
        )
        .route("/api/admin/posts", get(routes::admin::list_posts))
        .route(
            "/api/admin/posts/{id}",
            patch(routes::admin::update_post).delete(routes::admin::delete_post),
        )
        // Chats
        .route("/api/chats", get(routes::chats::list_chats).post(routes::chats::create_chat))
        .route("/api/chats/unread-count", get(routes::chats::unread_count))
        .route("/api/chats/{id}", get(routes::chats::get_chat))
        .route(
            "/api/chats/{id}/messages",
            get(routes::chats::list_messages).post(routes::chats::send_message),
        )
        // WebSocket
        .route(mylocal_shared::WS_PATH, get(ws::ws_handler))
        // Apply middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Full application: API routes plus the configured frontend.
pub fn build_router(state: AppState) -> Router {
    let mode = state.config.frontend.clone();
    frontend::with_frontend_fallback(api_router(state), &mode)
}
