//! Chat store: the single source of truth for chats, messages and presence
//! indicators rendered by the chat views.
//!
//! Messages are organized by chat id, and each chat tracks whether its
//! history has been loaded from the REST API. Realtime events are reduced
//! into the store with [`ChatStore::apply`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use mylocal_shared::{Chat, ChatMessage, ReadReceipt, ServerEvent};
use parking_lot::RwLock;

/// Messages for a single chat.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChatMessages {
    /// Sorted by `(created_at, id)` ascending.
    pub messages: Vec<ChatMessage>,
    /// Whether the chat history has been fetched from the REST API.
    pub is_loaded: bool,
}

impl ChatMessages {
    /// Add a message, maintaining sort order.
    /// Returns false if a message with the same id already exists.
    pub fn add_message(&mut self, msg: ChatMessage) -> bool {
        if self.messages.iter().any(|m| m.id == msg.id) {
            return false;
        }

        let pos = self
            .messages
            .binary_search_by(|m| (m.created_at, &m.id).cmp(&(msg.created_at, &msg.id)))
            .unwrap_or_else(|pos| pos);

        self.messages.insert(pos, msg);
        true
    }

    /// Set the full message history (from REST API fetch) and mark the chat
    /// as loaded. Messages already received over the relay are kept.
    pub fn set_history(&mut self, messages: Vec<ChatMessage>) {
        let live = std::mem::take(&mut self.messages);
        for msg in messages.into_iter().chain(live) {
            self.add_message(msg);
        }
        self.is_loaded = true;
    }

    /// Replace a stored message unless the stored copy is newer or deleted.
    fn replace(&mut self, msg: ChatMessage) {
        match self.messages.iter_mut().find(|m| m.id == msg.id) {
            Some(existing) if !existing.is_deleted && existing.version <= msg.version => {
                *existing = msg
            }
            Some(_) => {}
            None => {
                self.add_message(msg);
            }
        }
    }

    fn mark_deleted(&mut self, message_id: &str, version: u32) {
        if let Some(msg) = self.messages.iter_mut().find(|m| m.id == message_id) {
            msg.is_deleted = true;
            msg.version = msg.version.max(version);
            msg.content.clear();
            msg.attachment_url = None;
        }
    }

    fn add_receipts(&mut self, user_id: &str, message_ids: &[String], read_at: chrono::DateTime<chrono::Utc>) {
        for msg in self.messages.iter_mut() {
            if message_ids.contains(&msg.id) && !msg.is_read_by(user_id) {
                msg.read_by.push(ReadReceipt {
                    user_id: user_id.to_string(),
                    read_at,
                });
            }
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChatState {
    /// Most recently updated first.
    pub chats: Vec<Chat>,
    pub messages: HashMap<String, ChatMessages>,
    /// chat id -> (user id -> display name) of users currently typing.
    pub typing: HashMap<String, BTreeMap<String, String>>,
    /// Mirrors the realtime session; false whenever it is not connected.
    pub connected: bool,
    /// Last `chat_error` / `message_error` reported by the relay.
    pub last_error: Option<String>,
    pub unread: u64,
}

impl ChatState {
    fn upsert_chat(&mut self, chat: Chat) {
        match self.chats.iter_mut().find(|c| c.id == chat.id) {
            Some(existing) => *existing = chat,
            None => self.chats.push(chat),
        }
        self.chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    }

    fn stop_typing(&mut self, chat_id: &str, user_id: &str) {
        if let Some(users) = self.typing.get_mut(chat_id) {
            users.remove(user_id);
            if users.is_empty() {
                self.typing.remove(chat_id);
            }
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ChatStore {
    state: Arc<RwLock<ChatState>>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reduce one relay event into the store.
    pub fn apply(&self, event: ServerEvent) {
        let mut state = self.state.write();
        match event {
            ServerEvent::NewMessage { chat_id, message } => {
                let sender = message.sender_id.clone();
                state.messages.entry(chat_id.clone()).or_default().add_message(message);
                state.stop_typing(&chat_id, &sender);
            }
            ServerEvent::MessageEdited { chat_id, message } => {
                state.messages.entry(chat_id).or_default().replace(message);
            }
            ServerEvent::MessageDeleted {
                chat_id,
                message_id,
                version,
            } => {
                if let Some(chat) = state.messages.get_mut(&chat_id) {
                    chat.mark_deleted(&message_id, version);
                }
            }
            ServerEvent::UserTyping {
                chat_id,
                user_id,
                user_name,
            } => {
                state.typing.entry(chat_id).or_default().insert(user_id, user_name);
            }
            ServerEvent::UserStoppedTyping { chat_id, user_id } => {
                state.stop_typing(&chat_id, &user_id);
            }
            ServerEvent::ChatUpdated { chat } => state.upsert_chat(chat),
            ServerEvent::MessagesRead {
                chat_id,
                user_id,
                message_ids,
                read_at,
            } => {
                if let Some(chat) = state.messages.get_mut(&chat_id) {
                    chat.add_receipts(&user_id, &message_ids, read_at);
                }
            }
            ServerEvent::ChatError { message } | ServerEvent::MessageError { message } => {
                tracing::debug!("Relay reported: {}", message);
                state.last_error = Some(message);
            }
        }
    }

    pub fn set_chats(&self, chats: Vec<Chat>) {
        let mut state = self.state.write();
        state.chats.clear();
        for chat in chats {
            state.upsert_chat(chat);
        }
    }

    pub fn upsert_chat(&self, chat: Chat) {
        self.state.write().upsert_chat(chat);
    }

    pub fn set_history(&self, chat_id: &str, messages: Vec<ChatMessage>) {
        self.state
            .write()
            .messages
            .entry(chat_id.to_string())
            .or_default()
            .set_history(messages);
    }

    /// Record a message obtained outside the relay (e.g. a REST send).
    pub fn add_message(&self, message: ChatMessage) -> bool {
        self.state
            .write()
            .messages
            .entry(message.chat_id.clone())
            .or_default()
            .add_message(message)
    }

    pub fn set_unread(&self, count: u64) {
        self.state.write().unread = count;
    }

    pub fn set_connected(&self, connected: bool) {
        let mut state = self.state.write();
        state.connected = connected;
        if !connected {
            state.typing.clear();
        }
    }

    /// Return and clear the last relay error.
    pub fn take_error(&self) -> Option<String> {
        self.state.write().last_error.take()
    }

    /// Forget everything, e.g. on logout.
    pub fn reset(&self) {
        *self.state.write() = ChatState::default();
    }

    pub fn snapshot(&self) -> ChatState {
        self.state.read().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.read().connected
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.read().last_error.clone()
    }

    pub fn chats(&self) -> Vec<Chat> {
        self.state.read().chats.clone()
    }

    pub fn messages(&self, chat_id: &str) -> Vec<ChatMessage> {
        self.state
            .read()
            .messages
            .get(chat_id)
            .map(|c| c.messages.clone())
            .unwrap_or_default()
    }

    pub fn is_loaded(&self, chat_id: &str) -> bool {
        self.state
            .read()
            .messages
            .get(chat_id)
            .is_some_and(|c| c.is_loaded)
    }

    /// Display names of users typing in a chat, sorted by user id.
    pub fn typing(&self, chat_id: &str) -> Vec<String> {
        self.state
            .read()
            .typing
            .get(chat_id)
            .map(|users| users.values().cloned().collect())
            .unwrap_or_default()
    }
}
