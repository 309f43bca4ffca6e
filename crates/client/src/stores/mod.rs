//! Shared view state: the stores a rendering layer subscribes to.

pub mod chat;
pub mod notifications;
pub mod route;

pub use chat::{ChatMessages, ChatState, ChatStore};
pub use notifications::{Notification, NotificationLevel, Notifications};
pub use route::{Route, RouteStore};
