//! WebSocket relay for real-time chat.
//!
//! Every connection subscribes to its user room on connect and to a chat room
//! per `join_chat`. Rooms are broadcast channels created on first use.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use mylocal_shared::{
    Chat, ChatMessage, ChatMessageType, ClientEvent, Role, ServerEvent, User, WsEnvelope,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc, RwLock,
};
use uuid::Uuid;

use crate::middleware::auth::AuthUser;
use crate::state::AppState;
use crate::store::{chats::NewMessage, StoreError};

const ROOM_CAPACITY: usize = 100;

/// An event published to a room, tagged with the connection that caused it
/// so that connection can be skipped.
#[derive(Debug, Clone)]
pub struct RoomEvent {
    pub origin: Option<Uuid>,
    pub envelope: WsEnvelope<ServerEvent>,
}

fn chat_room(chat_id: &str) -> String {
    format!("chat:{chat_id}")
}

fn user_room(user_id: &str) -> String {
    format!("user:{user_id}")
}

/// Registry of broadcast rooms shared by all connections.
#[derive(Clone, Default)]
pub struct ChatHub {
    rooms: Arc<RwLock<HashMap<String, broadcast::Sender<RoomEvent>>>>,
}

impl ChatHub {
    /// Get or create the broadcast channel for `key`.
    async fn room(&self, key: &str) -> broadcast::Sender<RoomEvent> {
        {
            let rooms = self.rooms.read().await;
            if let Some(sender) = rooms.get(key) {
                return sender.clone();
            }
        }

        let mut rooms = self.rooms.write().await;
        if let Some(sender) = rooms.get(key) {
            return sender.clone();
        }

        let (tx, _rx) = broadcast::channel(ROOM_CAPACITY);
        rooms.insert(key.to_string(), tx.clone());
        tx
    }

    async fn subscribe(&self, key: &str) -> broadcast::Receiver<RoomEvent> {
        self.room(key).await.subscribe()
    }

    /// Drop a room nobody listens to any more.
    async fn release(&self, key: &str) {
        let mut rooms = self.rooms.write().await;
        if rooms.get(key).is_some_and(|tx| tx.receiver_count() == 0) {
            rooms.remove(key);
        }
    }

    async fn publish(&self, key: &str, origin: Option<Uuid>, event: ServerEvent) {
        let rooms = self.rooms.read().await;
        if let Some(tx) = rooms.get(key) {
            // No receivers is not an error for a relay.
            let _ = tx.send(RoomEvent {
                origin,
                envelope: WsEnvelope::new(event),
            });
        }
    }

    pub async fn publish_chat(&self, chat_id: &str, event: ServerEvent) {
        self.publish(&chat_room(chat_id), None, event).await;
    }

    pub async fn publish_user(&self, user_id: &str, event: ServerEvent) {
        self.publish(&user_room(user_id), None, event).await;
    }

    /// Send `chat_updated` to every participant's user room.
    pub async fn notify_participants(&self, chat: &Chat) {
        for participant in &chat.participants {
            self.publish_user(participant, ServerEvent::ChatUpdated { chat: chat.clone() })
                .await;
        }
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

/// Persist a message and fan it out. Shared by the relay and the REST route.
pub async fn deliver_message(
    state: &AppState,
    chat: &Chat,
    sender_id: &str,
    new: NewMessage,
) -> Result<ChatMessage, StoreError> {
    let (message, chat) = state.store.insert_message(&chat.id, sender_id, new).await?;
    state
        .hub
        .publish_chat(
            &chat.id,
            ServerEvent::NewMessage {
                chat_id: chat.id.clone(),
                message: message.clone(),
            },
        )
        .await;
    state.hub.notify_participants(&chat).await;
    Ok(message)
}

/// Validate the sender-supplied parts of a message.
pub fn check_new_message(
    content: &str,
    message_type: ChatMessageType,
    attachment_url: Option<&str>,
) -> Result<(), &'static str> {
    match message_type {
        ChatMessageType::Text if content.trim().is_empty() => Err("Message content cannot be empty"),
        ChatMessageType::Attachment if !attachment_url.is_some_and(|u| !u.trim().is_empty()) => {
            Err("Attachment messages need an attachment URL")
        }
        _ => Ok(()),
    }
}

/// WebSocket upgrade handler. The token may come from the `token` query
/// parameter or an `Authorization` header.
pub async fn ws_handler(State(state): State<AppState>, user: AuthUser, ws: WebSocketUpgrade) -> Response {
    tracing::info!("WebSocket connection authenticated for user: {}", user.id());
    ws.on_upgrade(move |socket| handle_socket(socket, user.0, state))
}

/// Per-connection state for one authenticated socket.
struct Session {
    state: AppState,
    user: User,
    conn_id: Uuid,
    forward_tx: mpsc::UnboundedSender<WsEnvelope<ServerEvent>>,
    subscriptions: HashMap<String, tokio::task::JoinHandle<()>>,
    /// Chats this user was already confirmed to take part in.
    verified_chats: HashSet<String>,
}

type EventResult = Result<(), ServerEvent>;

async fn handle_socket(socket: WebSocket, user: User, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (forward_tx, mut forward_rx) = mpsc::unbounded_channel::<WsEnvelope<ServerEvent>>();

    // Task to forward events to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(event) = forward_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("Failed to encode event: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut session = Session {
        state,
        conn_id: Uuid::new_v4(),
        user,
        forward_tx,
        subscriptions: HashMap::new(),
        verified_chats: HashSet::new(),
    };
    let own_room = user_room(&session.user.id);
    session.subscribe(&own_room).await;

    // Main receive loop
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<WsEnvelope<ClientEvent>>(&text) {
                Ok(envelope) => {
                    let event = envelope.payload;
                    let name = event.name();
                    if let Err(reply) = session.handle(event).await {
                        tracing::debug!("{} from {} failed: {:?}", name, session.user.id, reply);
                        session.reply(reply);
                    }
                }
                Err(e) => tracing::warn!("Ignoring malformed frame from {}: {e}", session.user.id),
            },
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    // Cleanup
    let keys: Vec<String> = session.subscriptions.keys().cloned().collect();
    for key in keys {
        session.unsubscribe(&key).await;
    }
    send_task.abort();

    tracing::info!("WebSocket connection closed for user: {}", session.user.id);
}

impl Session {
    fn reply(&self, event: ServerEvent) {
        let _ = self.forward_tx.send(WsEnvelope::new(event));
    }

    async fn subscribe(&mut self, key: &str) {
        if self.subscriptions.contains_key(key) {
            return;
        }
        let mut rx = self.state.hub.subscribe(key).await;
        let forward_tx = self.forward_tx.clone();
        let conn_id = self.conn_id;
        let room = key.to_string();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if event.origin == Some(conn_id) {
                            continue;
                        }
                        if forward_tx.send(event.envelope).is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Connection {} lagged on {}, skipped {}", conn_id, room, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("Subscription task for {} ended", room);
        });
        self.subscriptions.insert(key.to_string(), handle);
    }

    async fn unsubscribe(&mut self, key: &str) {
        if let Some(handle) = self.subscriptions.remove(key) {
            handle.abort();
            // Let the aborted task drop its receiver before checking for listeners.
            let _ = handle.await;
            self.state.hub.release(key).await;
        }
    }

    fn internal(err: StoreError) -> ServerEvent {
        tracing::error!("Relay store error: {err}");
        ServerEvent::chat_error("Something went wrong. Please try again.")
    }

    async fn participant_chat(&mut self, chat_id: &str) -> Result<Chat, ServerEvent> {
        let chat = match self.state.store.get_chat(chat_id).await {
            Ok(chat) => chat,
            Err(StoreError::NotFound(_)) => return Err(ServerEvent::chat_error("Chat not found")),
            Err(e) => return Err(Self::internal(e)),
        };
        if !chat.has_participant(&self.user.id) {
            return Err(ServerEvent::chat_error("You are not a participant in this chat"));
        }
        self.verified_chats.insert(chat.id.clone());
        Ok(chat)
    }

    async fn ensure_participant(&mut self, chat_id: &str) -> EventResult {
        if self.verified_chats.contains(chat_id) {
            return Ok(());
        }
        self.participant_chat(chat_id).await.map(|_| ())
    }

    async fn load_message(&self, message_id: &str) -> Result<ChatMessage, ServerEvent> {
        match self.state.store.get_message(message_id).await {
            Ok(message) => Ok(message),
            Err(StoreError::NotFound(_)) => Err(ServerEvent::message_error("Message not found")),
            Err(e) => Err(Self::internal(e)),
        }
    }

    async fn handle(&mut self, event: ClientEvent) -> EventResult {
        match event {
            ClientEvent::JoinChat { chat_id } => {
                self.participant_chat(&chat_id).await?;
                self.subscribe(&chat_room(&chat_id)).await;
                tracing::debug!("User {} joined chat {}", self.user.id, chat_id);
                Ok(())
            }

            ClientEvent::LeaveChat { chat_id } => {
                self.unsubscribe(&chat_room(&chat_id)).await;
                Ok(())
            }

            ClientEvent::SendMessage {
                chat_id,
                content,
                message_type,
                attachment_url,
            } => {
                let chat = self.participant_chat(&chat_id).await?;
                let message_type = message_type.unwrap_or_default();
                check_new_message(&content, message_type, attachment_url.as_deref())
                    .map_err(ServerEvent::message_error)?;
                let new = NewMessage {
                    message_type,
                    content: content.trim().to_string(),
                    attachment_url,
                };
                deliver_message(&self.state, &chat, &self.user.id, new)
                    .await
                    .map_err(Self::internal)?;
                Ok(())
            }

            ClientEvent::EditMessage {
                message_id,
                content,
                expected_version,
            } => {
                let current = self.load_message(&message_id).await?;
                if current.sender_id != self.user.id {
                    return Err(ServerEvent::message_error("You can only edit your own messages"));
                }
                if current.is_deleted {
                    return Err(ServerEvent::message_error("Message has been deleted"));
                }
                if content.trim().is_empty() {
                    return Err(ServerEvent::message_error("Message content cannot be empty"));
                }
                let message = match self
                    .state
                    .store
                    .edit_message(&message_id, content.trim(), expected_version)
                    .await
                {
                    Ok(message) => message,
                    Err(StoreError::Conflict(reason)) => return Err(ServerEvent::message_error(reason)),
                    Err(e) => return Err(Self::internal(e)),
                };
                let chat_id = message.chat_id.clone();
                self.state
                    .hub
                    .publish_chat(
                        &chat_id,
                        ServerEvent::MessageEdited {
                            chat_id: message.chat_id.clone(),
                            message,
                        },
                    )
                    .await;
                Ok(())
            }

            ClientEvent::DeleteMessage { message_id } => {
                let current = self.load_message(&message_id).await?;
                if current.sender_id != self.user.id && self.user.role != Role::Admin {
                    return Err(ServerEvent::message_error("You can only delete your own messages"));
                }
                let message = self
                    .state
                    .store
                    .soft_delete_message(&message_id)
                    .await
                    .map_err(Self::internal)?;
                self.state
                    .hub
                    .publish_chat(
                        &message.chat_id,
                        ServerEvent::MessageDeleted {
                            chat_id: message.chat_id.clone(),
                            message_id: message.id,
                            version: message.version,
                        },
                    )
                    .await;
                Ok(())
            }

            ClientEvent::TypingStart { chat_id } => {
                self.ensure_participant(&chat_id).await?;
                let event = ServerEvent::UserTyping {
                    chat_id: chat_id.clone(),
                    user_id: self.user.id.clone(),
                    user_name: self.user.name.clone(),
                };
                self.state
                    .hub
                    .publish(&chat_room(&chat_id), Some(self.conn_id), event)
                    .await;
                Ok(())
            }

            ClientEvent::TypingStop { chat_id } => {
                self.ensure_participant(&chat_id).await?;
                let event = ServerEvent::UserStoppedTyping {
                    chat_id: chat_id.clone(),
                    user_id: self.user.id.clone(),
                };
                self.state
                    .hub
                    .publish(&chat_room(&chat_id), Some(self.conn_id), event)
                    .await;
                Ok(())
            }

            ClientEvent::MarkMessagesRead { chat_id, message_ids } => {
                self.ensure_participant(&chat_id).await?;
                let (marked, read_at) = self
                    .state
                    .store
                    .mark_read(&chat_id, &self.user.id, &message_ids)
                    .await
                    .map_err(Self::internal)?;
                if !marked.is_empty() {
                    self.state
                        .hub
                        .publish_chat(
                            &chat_id,
                            ServerEvent::MessagesRead {
                                chat_id: chat_id.clone(),
                                user_id: self.user.id.clone(),
                                message_ids: marked,
                                read_at,
                            },
                        )
                        .await;
                }
                Ok(())
            }
        }
    }
}
