//! Realtime session: one WebSocket to the chat relay per logged-in session.
//!
//! Operations are fire-and-forget. While the session is not connected every
//! operation fails with [`RealtimeError::Disconnected`]; nothing is queued.
//! Inbound events are reduced into the [`ChatStore`].

mod connection;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mylocal_shared::{ChatMessageType, ClientEvent, WsEnvelope};
use parking_lot::Mutex;
use tokio::sync::{mpsc::UnboundedSender, watch};
use tokio::task::JoinHandle;

use crate::session::SessionStore;
use crate::stores::ChatStore;

/// Connection state for the relay socket
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out the backoff before reconnect attempt `attempt`.
    ReconnectPending { attempt: u32 },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::ReconnectPending { .. }
        )
    }
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u32,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u32,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 1.5,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay for a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> u32 {
        let delay = self.initial_delay_ms as f32 * self.backoff_multiplier.powi(attempt as i32);
        (delay as u32).min(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RealtimeError {
    #[error("Not connected to the chat server")]
    Disconnected,
    #[error("Log in to use chat")]
    NotAuthenticated,
}

/// State shared between the session handle and its connection task.
pub(crate) struct Shared {
    pub(crate) chat: ChatStore,
    pub(crate) state: watch::Sender<ConnectionState>,
    /// Writer for the live socket; `None` whenever not connected.
    pub(crate) outbound: Mutex<Option<UnboundedSender<WsEnvelope<ClientEvent>>>>,
    /// Chats joined in this session, re-joined after a reconnect.
    pub(crate) joined: Mutex<BTreeSet<String>>,
}

impl Shared {
    pub(crate) fn new(chat: ChatStore) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            chat,
            state,
            outbound: Mutex::new(None),
            joined: Mutex::new(BTreeSet::new()),
        }
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.chat.set_connected(state.is_connected());
        self.state.send_replace(state);
    }

    /// Publish a state change from a connection task. Holding the outbound
    /// lock orders this against [`RealtimeSession::disconnect`], so a
    /// cancelled task can never publish over it.
    pub(crate) fn publish(&self, cancel: &AtomicBool, state: ConnectionState) -> bool {
        let _outbound = self.outbound.lock();
        if cancel.load(Ordering::Acquire) {
            return false;
        }
        self.set_state(state);
        true
    }
}

/// A spawned connection task and its cancel flag.
struct Running {
    handle: JoinHandle<()>,
    cancel: Arc<AtomicBool>,
}

impl Running {
    fn stop(self) {
        self.cancel.store(true, Ordering::Release);
        self.handle.abort();
    }
}

pub struct RealtimeSession {
    ws_url: String,
    session: SessionStore,
    reconnect: ReconnectConfig,
    shared: Arc<Shared>,
    task: Mutex<Option<Running>>,
}

impl RealtimeSession {
    pub fn new(ws_url: impl Into<String>, session: SessionStore, chat: ChatStore) -> Self {
        Self {
            ws_url: ws_url.into(),
            session,
            reconnect: ReconnectConfig::default(),
            shared: Arc::new(Shared::new(chat)),
            task: Mutex::new(None),
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.borrow().clone()
    }

    /// Watch connection state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Start the connection task. A no-op while one is already running.
    pub fn connect(&self) -> Result<(), RealtimeError> {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return Ok(());
        }
        if !self.session.is_authenticated() {
            return Err(RealtimeError::NotAuthenticated);
        }
        let cancel = Arc::new(AtomicBool::new(false));
        let handle = connection::spawn(
            self.ws_url.clone(),
            self.session.clone(),
            self.reconnect.clone(),
            self.shared.clone(),
            cancel.clone(),
        );
        *task = Some(Running { handle, cancel });
        Ok(())
    }

    /// Close the socket without reconnecting.
    pub fn disconnect(&self) {
        if let Some(task) = self.task.lock().take() {
            task.stop();
        }
        let mut outbound = self.shared.outbound.lock();
        *outbound = None;
        self.shared.joined.lock().clear();
        self.shared.set_state(ConnectionState::Disconnected);
    }

    fn emit(&self, event: ClientEvent) -> Result<(), RealtimeError> {
        let outbound = self.shared.outbound.lock();
        let Some(sender) = outbound.as_ref() else {
            tracing::debug!("Dropping {} while disconnected", event.name());
            return Err(RealtimeError::Disconnected);
        };
        sender
            .send(WsEnvelope::new(event))
            .map_err(|_| RealtimeError::Disconnected)
    }

    pub fn join_chat(&self, chat_id: &str) -> Result<(), RealtimeError> {
        self.emit(ClientEvent::JoinChat {
            chat_id: chat_id.to_string(),
        })?;
        self.shared.joined.lock().insert(chat_id.to_string());
        Ok(())
    }

    pub fn leave_chat(&self, chat_id: &str) -> Result<(), RealtimeError> {
        self.shared.joined.lock().remove(chat_id);
        self.emit(ClientEvent::LeaveChat {
            chat_id: chat_id.to_string(),
        })
    }

    pub fn send_message(&self, chat_id: &str, content: &str) -> Result<(), RealtimeError> {
        self.emit(ClientEvent::SendMessage {
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            message_type: None,
            attachment_url: None,
        })
    }

    pub fn send_attachment(
        &self,
        chat_id: &str,
        attachment_url: &str,
        caption: &str,
    ) -> Result<(), RealtimeError> {
        self.emit(ClientEvent::SendMessage {
            chat_id: chat_id.to_string(),
            content: caption.to_string(),
            message_type: Some(ChatMessageType::Attachment),
            attachment_url: Some(attachment_url.to_string()),
        })
    }

    /// Pass the version the edit was based on to get a `message_error`
    /// instead of overwriting a concurrent edit.
    pub fn edit_message(
        &self,
        message_id: &str,
        content: &str,
        expected_version: Option<u32>,
    ) -> Result<(), RealtimeError> {
        self.emit(ClientEvent::EditMessage {
            message_id: message_id.to_string(),
            content: content.to_string(),
            expected_version,
        })
    }

    pub fn delete_message(&self, message_id: &str) -> Result<(), RealtimeError> {
        self.emit(ClientEvent::DeleteMessage {
            message_id: message_id.to_string(),
        })
    }

    pub fn typing_start(&self, chat_id: &str) -> Result<(), RealtimeError> {
        self.emit(ClientEvent::TypingStart {
            chat_id: chat_id.to_string(),
        })
    }

    pub fn typing_stop(&self, chat_id: &str) -> Result<(), RealtimeError> {
        self.emit(ClientEvent::TypingStop {
            chat_id: chat_id.to_string(),
        })
    }

    /// Empty `message_ids` marks everything in the chat as read.
    pub fn mark_messages_read(&self, chat_id: &str, message_ids: Vec<String>) -> Result<(), RealtimeError> {
        self.emit(ClientEvent::MarkMessagesRead {
            chat_id: chat_id.to_string(),
            message_ids,
        })
    }
}

impl Drop for RealtimeSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay_for_attempt(0), 1000);
        assert_eq!(config.delay_for_attempt(1), 1500);
        assert_eq!(config.delay_for_attempt(2), 2250);
        assert_eq!(config.delay_for_attempt(20), 30000);
    }

    #[test]
    fn cancelled_task_cannot_publish() {
        let chat = ChatStore::new();
        let shared = Shared::new(chat.clone());
        let cancel = AtomicBool::new(false);

        assert!(shared.publish(&cancel, ConnectionState::Connecting));
        cancel.store(true, Ordering::Release);
        shared.set_state(ConnectionState::Disconnected);

        assert!(!shared.publish(&cancel, ConnectionState::Connected));
        assert_eq!(*shared.state.borrow(), ConnectionState::Disconnected);
        assert!(!chat.is_connected());
    }

    #[test]
    fn state_predicates() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(ConnectionState::ReconnectPending { attempt: 2 }.is_connecting());
        assert!(!ConnectionState::Disconnected.is_connecting());
    }
}
