//! User-facing notification queue (toasts).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Oldest notifications are dropped beyond this many.
const MAX_QUEUED: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: u64,
    pub level: NotificationLevel,
    pub message: String,
}

#[derive(Debug, Default, Clone)]
pub struct Notifications {
    queue: Arc<RwLock<VecDeque<Notification>>>,
    next_id: Arc<AtomicU64>,
}

impl Notifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, level: NotificationLevel, message: impl Into<String>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut queue = self.queue.write();
        queue.push_back(Notification {
            id,
            level,
            message: message.into(),
        });
        while queue.len() > MAX_QUEUED {
            queue.pop_front();
        }
        id
    }

    pub fn error(&self, message: impl Into<String>) -> u64 {
        self.push(NotificationLevel::Error, message)
    }

    pub fn success(&self, message: impl Into<String>) -> u64 {
        self.push(NotificationLevel::Success, message)
    }

    pub fn dismiss(&self, id: u64) {
        self.queue.write().retain(|n| n.id != id);
    }

    pub fn list(&self) -> Vec<Notification> {
        self.queue.read().iter().cloned().collect()
    }

    /// Remove and return everything queued so far.
    pub fn drain(&self) -> Vec<Notification> {
        self.queue.write().drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.read().is_empty()
    }
}
