use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use mylocal_client::{
    AuthSession, ChatStore, ConnectionState, RealtimeError, RealtimeSession, ReconnectConfig,
    SessionStore, Storage,
};
use mylocal_shared::{ClientEvent, ServerEvent, WsEnvelope};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{
    handshake::server::{ErrorResponse, Request, Response},
    http::StatusCode,
    Message,
};

const WAIT: Duration = Duration::from_secs(5);

fn logged_in(dir: &tempfile::TempDir, token: &str) -> SessionStore {
    let session = SessionStore::load(Storage::new(dir.path()));
    let user = serde_json::from_value(json!({
        "id": "u1",
        "name": "Ann",
        "email": "ann@example.com",
        "role": "customer",
        "isActive": true,
        "createdAt": "2024-05-01T10:00:00Z",
        "updatedAt": "2024-05-01T10:00:00Z"
    }))
    .unwrap();
    session.set(AuthSession {
        token: token.to_string(),
        user,
    });
    session
}

fn fast_reconnect(max_attempts: u32) -> ReconnectConfig {
    ReconnectConfig {
        max_attempts,
        initial_delay_ms: 10,
        max_delay_ms: 20,
        backoff_multiplier: 1.5,
    }
}

/// A one-connection relay stand-in: accepts `tok-1`, pushes one
/// `new_message`, then forwards every client frame to the returned channel.
async fn fake_relay() -> (String, mpsc::UnboundedReceiver<ClientEvent>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let check = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            if req.uri().query() == Some("token=tok-1") {
                Ok(resp)
            } else {
                let mut denied = ErrorResponse::new(None);
                *denied.status_mut() = StatusCode::UNAUTHORIZED;
                Err(denied)
            }
        };
        let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, check).await else {
            return;
        };

        let hello = WsEnvelope::new(ServerEvent::NewMessage {
            chat_id: "c1".into(),
            message: serde_json::from_value(json!({
                "id": "m1", "chatId": "c1", "senderId": "u2", "messageType": "text",
                "content": "Welcome!", "version": 1, "createdAt": "2024-05-01T10:00:00Z"
            }))
            .unwrap(),
        });
        ws.send(Message::Text(serde_json::to_string(&hello).unwrap().into()))
            .await
            .unwrap();

        while let Some(Ok(frame)) = ws.next().await {
            if let Message::Text(text) = frame {
                let envelope: WsEnvelope<ClientEvent> = serde_json::from_str(&text).unwrap();
                let _ = tx.send(envelope.payload);
            }
        }
    });

    (format!("ws://{addr}/api/ws"), rx)
}

async fn wait_state(realtime: &RealtimeSession, want: impl Fn(&ConnectionState) -> bool) {
    let mut rx = realtime.subscribe_state();
    tokio::time::timeout(WAIT, rx.wait_for(|s| want(s)))
        .await
        .expect("timed out waiting for state")
        .unwrap();
}

#[tokio::test]
async fn operations_fail_fast_while_disconnected() {
    let dir = tempfile::tempdir().unwrap();
    let chat = ChatStore::new();
    let realtime = RealtimeSession::new("ws://127.0.0.1:9/api/ws", logged_in(&dir, "tok"), chat.clone());

    assert_eq!(realtime.state(), ConnectionState::Disconnected);
    assert_eq!(realtime.send_message("c1", "hello"), Err(RealtimeError::Disconnected));
    assert_eq!(realtime.join_chat("c1"), Err(RealtimeError::Disconnected));
    assert!(!chat.is_connected());
}

#[tokio::test]
async fn connect_requires_a_session() {
    let dir = tempfile::tempdir().unwrap();
    let session = SessionStore::load(Storage::new(dir.path()));
    let realtime = RealtimeSession::new("ws://127.0.0.1:9/api/ws", session, ChatStore::new());
    assert_eq!(realtime.connect(), Err(RealtimeError::NotAuthenticated));
}

#[tokio::test]
async fn events_flow_both_ways() {
    let (url, mut frames) = fake_relay().await;
    let dir = tempfile::tempdir().unwrap();
    let chat = ChatStore::new();
    let realtime = RealtimeSession::new(url, logged_in(&dir, "tok-1"), chat.clone());

    realtime.connect().unwrap();
    wait_state(&realtime, ConnectionState::is_connected).await;
    assert!(chat.is_connected());

    realtime.join_chat("c1").unwrap();
    realtime.edit_message("m1", "Thanks!", Some(1)).unwrap();

    let first = tokio::time::timeout(WAIT, frames.recv()).await.unwrap().unwrap();
    assert_eq!(first, ClientEvent::JoinChat { chat_id: "c1".into() });
    let second = tokio::time::timeout(WAIT, frames.recv()).await.unwrap().unwrap();
    assert_eq!(
        second,
        ClientEvent::EditMessage {
            message_id: "m1".into(),
            content: "Thanks!".into(),
            expected_version: Some(1),
        }
    );

    tokio::time::timeout(WAIT, async {
        while chat.messages("c1").is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("pushed event never reached the store");
    let messages = chat.messages("c1");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "Welcome!");

    realtime.disconnect();
    assert_eq!(realtime.state(), ConnectionState::Disconnected);
    assert!(!chat.is_connected());
    assert_eq!(realtime.typing_start("c1"), Err(RealtimeError::Disconnected));
}

#[tokio::test]
async fn rejected_token_stops_without_retrying() {
    let (url, _frames) = fake_relay().await;
    let dir = tempfile::tempdir().unwrap();
    let realtime = RealtimeSession::new(url, logged_in(&dir, "wrong"), ChatStore::new())
        .with_reconnect(fast_reconnect(5));

    realtime.connect().unwrap();
    let mut rx = realtime.subscribe_state();
    let mut seen = vec![rx.borrow_and_update().clone()];
    while seen.last() != Some(&ConnectionState::Disconnected) || seen.len() == 1 {
        tokio::time::timeout(WAIT, rx.changed()).await.unwrap().unwrap();
        seen.push(rx.borrow_and_update().clone());
    }
    assert!(!seen
        .iter()
        .any(|s| matches!(s, ConnectionState::ReconnectPending { .. })));
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    // Reserve a port, then close it so every attempt is refused.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let dir = tempfile::tempdir().unwrap();
    let chat = ChatStore::new();
    let realtime = RealtimeSession::new(format!("ws://{addr}/api/ws"), logged_in(&dir, "tok"), chat.clone())
        .with_reconnect(fast_reconnect(2));

    realtime.connect().unwrap();
    wait_state(&realtime, |s| matches!(s, ConnectionState::ReconnectPending { .. })).await;
    wait_state(&realtime, |s| *s == ConnectionState::Disconnected).await;
    assert!(!chat.is_connected());
    assert_eq!(realtime.send_message("c1", "anyone?"), Err(RealtimeError::Disconnected));
}
