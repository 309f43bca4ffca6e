//! Application routes and the current-route store.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Route {
    #[default]
    Home,
    Login,
    Register,
    Businesses,
    BusinessDetail { id: String },
    MyBusinesses,
    Posts,
    PostDetail { id: String },
    Chats,
    ChatRoom { id: String },
    Profile,
    Admin,
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".into(),
            Route::Login => "/login".into(),
            Route::Register => "/register".into(),
            Route::Businesses => "/businesses".into(),
            Route::BusinessDetail { id } => format!("/businesses/{id}"),
            Route::MyBusinesses => "/businesses/mine".into(),
            Route::Posts => "/posts".into(),
            Route::PostDetail { id } => format!("/posts/{id}"),
            Route::Chats => "/chats".into(),
            Route::ChatRoom { id } => format!("/chats/{id}"),
            Route::Profile => "/profile".into(),
            Route::Admin => "/admin".into(),
        }
    }

    /// Parse a client path; unknown paths are `None`.
    pub fn parse(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let route = match segments.as_slice() {
            [] => Route::Home,
            ["login"] => Route::Login,
            ["register"] => Route::Register,
            ["businesses"] => Route::Businesses,
            ["businesses", "mine"] => Route::MyBusinesses,
            ["businesses", id] => Route::BusinessDetail { id: id.to_string() },
            ["posts"] => Route::Posts,
            ["posts", id] => Route::PostDetail { id: id.to_string() },
            ["chats"] => Route::Chats,
            ["chats", id] => Route::ChatRoom { id: id.to_string() },
            ["profile"] => Route::Profile,
            ["admin"] => Route::Admin,
            _ => return None,
        };
        Some(route)
    }

    /// Routes that only make sense with a session.
    pub fn requires_auth(&self) -> bool {
        matches!(
            self,
            Route::MyBusinesses | Route::Chats | Route::ChatRoom { .. } | Route::Profile | Route::Admin
        )
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[derive(Debug, Default, Clone)]
pub struct RouteStore {
    current: Arc<RwLock<Route>>,
}

impl RouteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn navigate(&self, route: Route) {
        tracing::debug!("Navigating to {}", route);
        *self.current.write() = route;
    }

    pub fn current(&self) -> Route {
        self.current.read().clone()
    }
}
