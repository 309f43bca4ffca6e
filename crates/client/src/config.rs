//! Client configuration.

use std::path::PathBuf;
use std::time::Duration;

use mylocal_shared::WS_PATH;
use url::Url;

/// Fixed timeout applied to every REST request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const APP_DIR: &str = "mylocal";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// API origin, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// Relay endpoint, e.g. `ws://localhost:8080/api/ws`.
    pub ws_url: String,
    pub request_timeout: Duration,
    /// Directory holding persisted client state (`session.json`).
    pub storage_dir: PathBuf,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let ws_url = ws_url_for(&base_url);
        Self {
            base_url,
            ws_url,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            storage_dir: default_storage_dir(),
        }
    }

    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = dir.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_ws_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = ws_url.into();
        self
    }
}

/// Map an http(s) origin onto the relay endpoint on the same host.
fn ws_url_for(base_url: &str) -> String {
    match Url::parse(base_url) {
        Ok(mut url) => {
            let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
            if url.set_scheme(scheme).is_err() {
                return format!("ws://{base_url}{WS_PATH}");
            }
            url.set_path(WS_PATH);
            url.to_string()
        }
        Err(_) => format!("ws://{base_url}{WS_PATH}"),
    }
}

fn default_storage_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}
