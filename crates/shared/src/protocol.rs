//! Realtime relay protocol: event envelope and the named chat events.
//!
//! Frames are JSON text: `{"id": .., "event": "join_chat", "data": {..}, "ts": ..}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Chat, ChatMessage, ChatMessageType};

/// Path of the relay endpoint on the API server.
pub const WS_PATH: &str = "/api/ws";

/// Query parameter carrying the bearer token on the upgrade request.
pub const WS_TOKEN_PARAM: &str = "token";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WsEnvelope<T> {
    pub id: String,
    #[serde(flatten)]
    pub payload: T,
    pub ts: DateTime<Utc>,
}

impl<T> WsEnvelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            ts: Utc::now(),
        }
    }
}

/// Events emitted by a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinChat { chat_id: String },
    #[serde(rename_all = "camelCase")]
    LeaveChat { chat_id: String },
    #[serde(rename_all = "camelCase")]
    SendMessage {
        chat_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_type: Option<ChatMessageType>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attachment_url: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    EditMessage {
        message_id: String,
        content: String,
        /// When present the edit only applies if the stored version matches.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_version: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    DeleteMessage { message_id: String },
    #[serde(rename_all = "camelCase")]
    TypingStart { chat_id: String },
    #[serde(rename_all = "camelCase")]
    TypingStop { chat_id: String },
    #[serde(rename_all = "camelCase")]
    MarkMessagesRead {
        chat_id: String,
        /// Empty means every unread message in the chat.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        message_ids: Vec<String>,
    },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinChat { .. } => "join_chat",
            ClientEvent::LeaveChat { .. } => "leave_chat",
            ClientEvent::SendMessage { .. } => "send_message",
            ClientEvent::EditMessage { .. } => "edit_message",
            ClientEvent::DeleteMessage { .. } => "delete_message",
            ClientEvent::TypingStart { .. } => "typing_start",
            ClientEvent::TypingStop { .. } => "typing_stop",
            ClientEvent::MarkMessagesRead { .. } => "mark_messages_read",
        }
    }
}

/// Events pushed by the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    NewMessage { chat_id: String, message: ChatMessage },
    #[serde(rename_all = "camelCase")]
    MessageEdited { chat_id: String, message: ChatMessage },
    #[serde(rename_all = "camelCase")]
    MessageDeleted {
        chat_id: String,
        message_id: String,
        /// Version assigned by the delete.
        version: u32,
    },
    #[serde(rename_all = "camelCase")]
    UserTyping {
        chat_id: String,
        user_id: String,
        user_name: String,
    },
    #[serde(rename_all = "camelCase")]
    UserStoppedTyping { chat_id: String, user_id: String },
    #[serde(rename_all = "camelCase")]
    ChatUpdated { chat: Chat },
    #[serde(rename_all = "camelCase")]
    MessagesRead {
        chat_id: String,
        user_id: String,
        message_ids: Vec<String>,
        read_at: DateTime<Utc>,
    },
    ChatError { message: String },
    MessageError { message: String },
}

impl ServerEvent {
    pub fn chat_error(message: impl Into<String>) -> Self {
        ServerEvent::ChatError {
            message: message.into(),
        }
    }

    pub fn message_error(message: impl Into<String>) -> Self {
        ServerEvent::MessageError {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_event_wire_shape() {
        let env = WsEnvelope::new(ClientEvent::JoinChat {
            chat_id: "c1".into(),
        });
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["event"], "join_chat");
        assert_eq!(json["data"]["chatId"], "c1");
        assert!(json["id"].is_string());
        assert!(json["ts"].is_string());
    }

    #[test]
    fn parses_mark_read_without_ids() {
        let raw = r#"{"id":"x","event":"mark_messages_read","data":{"chatId":"c9"},"ts":"2024-05-01T10:00:00Z"}"#;
        let env: WsEnvelope<ClientEvent> = serde_json::from_str(raw).unwrap();
        assert_eq!(
            env.payload,
            ClientEvent::MarkMessagesRead {
                chat_id: "c9".into(),
                message_ids: vec![],
            }
        );
        assert_eq!(env.payload.name(), "mark_messages_read");
    }

    #[test]
    fn server_error_events_carry_plain_strings() {
        let json = serde_json::to_value(WsEnvelope::new(ServerEvent::chat_error("nope"))).unwrap();
        assert_eq!(json["event"], "chat_error");
        assert_eq!(json["data"]["message"], "nope");
    }

    #[test]
    fn typing_event_round_trip() {
        let raw = r#"{"id":"e","event":"user_typing","data":{"chatId":"c","userId":"u","userName":"Ann"},"ts":"2024-05-01T10:00:00Z"}"#;
        let env: WsEnvelope<ServerEvent> = serde_json::from_str(raw).unwrap();
        match env.payload {
            ServerEvent::UserTyping { user_name, .. } => assert_eq!(user_name, "Ann"),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
