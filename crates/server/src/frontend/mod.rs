//! Frontend serving - proxy and static file services.

use axum::Router;
use axum_reverse_proxy::ReverseProxy;
use std::path::PathBuf;
use tower_http::services::{ServeDir, ServeFile};

use crate::config::FrontendMode;

/// Attach the configured frontend behind the API routes.
///
/// `router` must already have its state applied; unmatched paths fall through
/// to the proxy or the static directory (with `index.html` as SPA fallback).
pub fn with_frontend_fallback(router: Router, mode: &FrontendMode) -> Router {
    match mode {
        FrontendMode::Proxy { target } => {
            tracing::info!("Frontend mode: proxy to {}", target);
            let proxy: Router = ReverseProxy::new("/", target).into();
            router.merge(proxy)
        }
        FrontendMode::Static { dir } => {
            tracing::info!("Frontend mode: static files from {}", dir);
            let path = PathBuf::from(dir);
            let serve_dir = ServeDir::new(&path).fallback(ServeFile::new(path.join("index.html")));
            router.fallback_service(serve_dir)
        }
        FrontendMode::Disabled => {
            tracing::info!("Frontend mode: disabled (API only)");
            router
        }
    }
}
