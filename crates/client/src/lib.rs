//! MyLocal Connect client runtime.
//!
//! Session handling, the REST wrapper and domain services, the realtime chat
//! session, and the view-state stores a rendering layer subscribes to.

pub mod api_client;
pub mod config;
pub mod context;
pub mod realtime;
pub mod services;
pub mod session;
pub mod storage;
pub mod stores;

pub use api_client::ApiClient;
pub use config::ClientConfig;
pub use context::AppContext;
pub use realtime::{ConnectionState, RealtimeError, RealtimeSession, ReconnectConfig};
pub use session::{AuthSession, SessionStore};
pub use storage::Storage;
pub use stores::{ChatStore, Notifications, Route, RouteStore};
