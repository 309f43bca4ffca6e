//! Authentication session: bearer token plus the cached user profile.
//!
//! The session lives in memory behind a shared lock and is mirrored to
//! `session.json` in the client storage directory.

use std::sync::Arc;

use mylocal_shared::{AuthResponse, Role, User};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::storage::Storage;

const STORAGE_KEY: &str = "session";

/// Stored session data
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AuthSession {
    pub token: String,
    pub user: User,
}

impl From<AuthResponse> for AuthSession {
    fn from(resp: AuthResponse) -> Self {
        Self {
            token: resp.token,
            user: resp.user,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionStore {
    current: Arc<RwLock<Option<AuthSession>>>,
    storage: Storage,
}

impl SessionStore {
    /// Restore a previously persisted session, if any.
    pub fn load(storage: Storage) -> Self {
        let restored = match storage.load::<AuthSession>(STORAGE_KEY) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Discarding unreadable session: {e:#}");
                None
            }
        };
        Self {
            current: Arc::new(RwLock::new(restored)),
            storage,
        }
    }

    pub fn set(&self, session: AuthSession) {
        if let Err(e) = self.storage.save(STORAGE_KEY, &session) {
            tracing::warn!("Failed to persist session: {e:#}");
        }
        *self.current.write() = Some(session);
    }

    /// Replace the cached profile, keeping the token.
    pub fn set_user(&self, user: User) {
        let updated = {
            let mut current = self.current.write();
            match current.as_mut() {
                Some(session) => {
                    session.user = user;
                    Some(session.clone())
                }
                None => None,
            }
        };
        if let Some(session) = updated {
            if let Err(e) = self.storage.save(STORAGE_KEY, &session) {
                tracing::warn!("Failed to persist session: {e:#}");
            }
        }
    }

    /// Drop the session from memory and storage.
    pub fn clear(&self) {
        *self.current.write() = None;
        if let Err(e) = self.storage.remove(STORAGE_KEY) {
            tracing::warn!("Failed to remove stored session: {e:#}");
        }
    }

    pub fn get(&self) -> Option<AuthSession> {
        self.current.read().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.current.read().as_ref().map(|s| s.token.clone())
    }

    pub fn user(&self) -> Option<User> {
        self.current.read().as_ref().map(|s| s.user.clone())
    }

    pub fn user_id(&self) -> Option<String> {
        self.current.read().as_ref().map(|s| s.user.id.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.current
            .read()
            .as_ref()
            .is_some_and(|s| s.user.role == role)
    }
}

#[cfg(test)]
pub(crate) fn sample_user(id: &str) -> User {
    use chrono::Utc;
    User {
        id: id.to_string(),
        name: "Ann".into(),
        email: "ann@example.com".into(),
        role: Role::Customer,
        phone: None,
        avatar: None,
        bio: None,
        location: None,
        is_active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persists_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::load(Storage::new(dir.path()));
        assert!(!store.is_authenticated());

        store.set(AuthSession {
            token: "t1".into(),
            user: sample_user("u1"),
        });
        assert!(dir.path().join("session.json").exists());

        let restored = SessionStore::load(Storage::new(dir.path()));
        assert_eq!(restored.token().as_deref(), Some("t1"));
        assert_eq!(restored.user_id().as_deref(), Some("u1"));
        assert!(restored.has_role(Role::Customer));
    }

    #[test]
    fn clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::load(Storage::new(dir.path()));
        store.set(AuthSession {
            token: "t1".into(),
            user: sample_user("u1"),
        });
        store.clear();
        assert_eq!(store.get(), None);
        assert!(!dir.path().join("session.json").exists());
    }

    #[test]
    fn set_user_keeps_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::load(Storage::new(dir.path()));
        store.set_user(sample_user("ignored"));
        assert_eq!(store.get(), None);

        store.set(AuthSession {
            token: "t1".into(),
            user: sample_user("u1"),
        });
        let mut renamed = sample_user("u1");
        renamed.name = "Annie".into();
        store.set_user(renamed);
        assert_eq!(store.token().as_deref(), Some("t1"));
        assert_eq!(store.user().unwrap().name, "Annie");
    }

    #[test]
    fn corrupt_file_starts_logged_out() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("session.json"), "nope").unwrap();
        let store = SessionStore::load(Storage::new(dir.path()));
        assert!(!store.is_authenticated());
    }
}
