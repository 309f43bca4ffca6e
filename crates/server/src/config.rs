//! Server configuration from environment variables.

use std::net::SocketAddr;

/// Frontend serving mode configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontendMode {
    /// Proxy requests to a development server.
    Proxy { target: String },
    /// Serve static files from a directory.
    Static { dir: String },
    /// No frontend serving - API only.
    Disabled,
}

impl FrontendMode {
    /// Parse frontend mode from environment variables.
    ///
    /// Environment variables:
    /// - `MYLOCAL_FRONTEND_MODE`: "proxy" | "static" | "disabled" (default: "disabled")
    /// - `MYLOCAL_PROXY_TARGET`: Target URL for proxy mode (default: "http://localhost:8081")
    /// - `MYLOCAL_STATIC_DIR`: Directory for static mode (default: "./public")
    pub fn from_env() -> Self {
        let mode = std::env::var("MYLOCAL_FRONTEND_MODE")
            .unwrap_or_else(|_| "disabled".to_string())
            .to_lowercase();

        match mode.as_str() {
            "proxy" => {
                let target = std::env::var("MYLOCAL_PROXY_TARGET")
                    .unwrap_or_else(|_| "http://localhost:8081".to_string());
                FrontendMode::Proxy { target }
            }
            "static" => {
                let dir = std::env::var("MYLOCAL_STATIC_DIR")
                    .unwrap_or_else(|_| "./public".to_string());
                FrontendMode::Static { dir }
            }
            _ => FrontendMode::Disabled,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub db_path: String,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub base_url: String,
    pub frontend: FrontendMode,
}

const DEV_JWT_SECRET: &str = "mylocal-dev-secret-change-me";

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = std::env::var("MYLOCAL_BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid MYLOCAL_BIND_ADDR: {e}"))?;
        let token_ttl_hours = match std::env::var("MYLOCAL_TOKEN_TTL_HOURS") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid MYLOCAL_TOKEN_TTL_HOURS: {e}"))?,
            Err(_) => 168,
        };
        let jwt_secret = std::env::var("MYLOCAL_JWT_SECRET").unwrap_or_else(|_| {
            tracing::warn!("MYLOCAL_JWT_SECRET not set; using the development secret");
            DEV_JWT_SECRET.to_string()
        });

        Ok(Self {
            bind_addr,
            db_path: std::env::var("MYLOCAL_DB_PATH").unwrap_or_else(|_| "mylocal.db".to_string()),
            jwt_secret,
            token_ttl_hours,
            base_url: std::env::var("MYLOCAL_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            frontend: FrontendMode::from_env(),
        })
    }

    /// Settings for tests: in-memory database, API only.
    pub fn for_tests() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            db_path: ":memory:".to_string(),
            jwt_secret: "test-secret".to_string(),
            token_ttl_hours: 1,
            base_url: "http://localhost".to_string(),
            frontend: FrontendMode::Disabled,
        }
    }
}
