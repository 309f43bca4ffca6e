use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use mylocal_server::build_router;
use mylocal_shared::{ClientEvent, ServerEvent, WsEnvelope};
use serde_json::json;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

mod common;
use common::TestApp;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn serve(app: &TestApp) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = build_router(app.state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("ws://{addr}/api/ws")
}

async fn connect(url: &str, token: &str) -> Socket {
    let (socket, _) = connect_async(format!("{url}?token={token}")).await.unwrap();
    socket
}

async fn send(socket: &mut Socket, event: ClientEvent) {
    let json = serde_json::to_string(&WsEnvelope::new(event)).unwrap();
    socket.send(Message::Text(json.into())).await.unwrap();
}

async fn next_event(socket: &mut Socket) -> ServerEvent {
    loop {
        let frame = tokio::time::timeout(WAIT, socket.next())
            .await
            .expect("timed out waiting for an event")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            let envelope: WsEnvelope<ServerEvent> = serde_json::from_str(&text).unwrap();
            return envelope.payload;
        }
    }
}

/// Wait for the first event matching `pick`, skipping others.
async fn wait_for<T>(socket: &mut Socket, mut pick: impl FnMut(ServerEvent) -> Option<T>) -> T {
    loop {
        if let Some(found) = pick(next_event(socket).await) {
            return found;
        }
    }
}

/// Frames are handled in order, so once the reply to a bogus join arrives
/// every earlier frame from this socket has been processed.
async fn sync(socket: &mut Socket) {
    send(
        socket,
        ClientEvent::JoinChat {
            chat_id: "sync-probe".into(),
        },
    )
    .await;
    wait_for(socket, |e| match e {
        ServerEvent::ChatError { message } if message == "Chat not found" => Some(()),
        _ => None,
    })
    .await;
}

async fn setup() -> (TestApp, String, (String, String), (String, String), String) {
    let app = TestApp::new();
    let url = serve(&app).await;
    let ann = app.register("Ann", "ann@example.com", "customer").await;
    let bob = app.register("Bob", "bob@example.com", "vendor").await;
    let (_, chat) = app
        .post("/api/chats", Some(&ann.0), json!({"participantIds": [bob.1]}))
        .await;
    let chat_id = chat["id"].as_str().unwrap().to_string();
    (app, url, ann, bob, chat_id)
}

#[tokio::test]
async fn upgrade_without_valid_token_is_rejected() {
    let app = TestApp::new();
    let url = serve(&app).await;
    assert!(connect_async(url.as_str()).await.is_err());
    assert!(connect_async(format!("{url}?token=garbage")).await.is_err());
}

#[tokio::test]
async fn messages_reach_joined_participants() {
    let (_app, url, ann, bob, chat_id) = setup().await;
    let mut a = connect(&url, &ann.0).await;
    let mut b = connect(&url, &bob.0).await;

    send(&mut b, ClientEvent::JoinChat { chat_id: chat_id.clone() }).await;
    sync(&mut b).await;
    sync(&mut a).await;

    send(
        &mut a,
        ClientEvent::SendMessage {
            chat_id: chat_id.clone(),
            content: "Are you open Sunday?".into(),
            message_type: None,
            attachment_url: None,
        },
    )
    .await;

    let message = wait_for(&mut b, |e| match e {
        ServerEvent::NewMessage { message, .. } => Some(message),
        _ => None,
    })
    .await;
    assert_eq!(message.content, "Are you open Sunday?");
    assert_eq!(message.sender_id, ann.1);

    // The sender's user room gets the refreshed chat summary even without joining.
    let chat = wait_for(&mut a, |e| match e {
        ServerEvent::ChatUpdated { chat } => Some(chat),
        _ => None,
    })
    .await;
    assert_eq!(chat.last_message.unwrap().preview, "Are you open Sunday?");

    send(
        &mut b,
        ClientEvent::MarkMessagesRead {
            chat_id: chat_id.clone(),
            message_ids: vec![],
        },
    )
    .await;
    let read = wait_for(&mut b, |e| match e {
        ServerEvent::MessagesRead { message_ids, user_id, .. } => Some((message_ids, user_id)),
        _ => None,
    })
    .await;
    assert_eq!(read.0, vec![message.id]);
    assert_eq!(read.1, bob.1);
}

#[tokio::test]
async fn outsiders_cannot_join() {
    let (app, url, _ann, _bob, chat_id) = setup().await;
    let eve = app.register("Eve", "eve@example.com", "customer").await;
    let mut e = connect(&url, &eve.0).await;

    send(&mut e, ClientEvent::JoinChat { chat_id: chat_id.clone() }).await;
    let error = wait_for(&mut e, |ev| match ev {
        ServerEvent::ChatError { message } => Some(message),
        _ => None,
    })
    .await;
    assert_eq!(error, "You are not a participant in this chat");
}

#[tokio::test]
async fn typing_skips_the_sender() {
    let (_app, url, ann, bob, chat_id) = setup().await;
    let mut a = connect(&url, &ann.0).await;
    let mut b = connect(&url, &bob.0).await;

    send(&mut a, ClientEvent::JoinChat { chat_id: chat_id.clone() }).await;
    send(&mut b, ClientEvent::JoinChat { chat_id: chat_id.clone() }).await;
    sync(&mut a).await;
    sync(&mut b).await;

    send(&mut a, ClientEvent::TypingStart { chat_id: chat_id.clone() }).await;
    let (user_id, user_name) = wait_for(&mut b, |e| match e {
        ServerEvent::UserTyping { user_id, user_name, .. } => Some((user_id, user_name)),
        _ => None,
    })
    .await;
    assert_eq!(user_id, ann.1);
    assert_eq!(user_name, "Ann");

    // The next thing Ann sees is her own probe reply, not her typing event.
    send(&mut a, ClientEvent::JoinChat { chat_id: "sync-probe".into() }).await;
    match next_event(&mut a).await {
        ServerEvent::ChatError { message } => assert_eq!(message, "Chat not found"),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn stale_edits_and_foreign_deletes_are_refused() {
    let (_app, url, ann, bob, chat_id) = setup().await;
    let mut a = connect(&url, &ann.0).await;
    let mut b = connect(&url, &bob.0).await;
    send(&mut a, ClientEvent::JoinChat { chat_id: chat_id.clone() }).await;
    sync(&mut a).await;

    send(
        &mut a,
        ClientEvent::SendMessage {
            chat_id: chat_id.clone(),
            content: "v1".into(),
            message_type: None,
            attachment_url: None,
        },
    )
    .await;
    let message = wait_for(&mut a, |e| match e {
        ServerEvent::NewMessage { message, .. } => Some(message),
        _ => None,
    })
    .await;

    send(
        &mut a,
        ClientEvent::EditMessage {
            message_id: message.id.clone(),
            content: "v2".into(),
            expected_version: Some(1),
        },
    )
    .await;
    let edited = wait_for(&mut a, |e| match e {
        ServerEvent::MessageEdited { message, .. } => Some(message),
        _ => None,
    })
    .await;
    assert_eq!(edited.version, 2);

    send(
        &mut a,
        ClientEvent::EditMessage {
            message_id: message.id.clone(),
            content: "v3".into(),
            expected_version: Some(1),
        },
    )
    .await;
    let error = wait_for(&mut a, |e| match e {
        ServerEvent::MessageError { message } => Some(message),
        _ => None,
    })
    .await;
    assert_eq!(error, "Message was modified by another client");

    send(&mut b, ClientEvent::DeleteMessage { message_id: message.id.clone() }).await;
    let error = wait_for(&mut b, |e| match e {
        ServerEvent::MessageError { message } => Some(message),
        _ => None,
    })
    .await;
    assert_eq!(error, "You can only delete your own messages");

    send(&mut a, ClientEvent::DeleteMessage { message_id: message.id.clone() }).await;
    let (deleted_id, version) = wait_for(&mut a, |e| match e {
        ServerEvent::MessageDeleted {
            message_id, version, ..
        } => Some((message_id, version)),
        _ => None,
    })
    .await;
    assert_eq!(deleted_id, message.id);
    assert_eq!(version, 3);
}

#[tokio::test]
async fn malformed_frames_are_ignored() {
    let (_app, url, ann, _bob, _chat_id) = setup().await;
    let mut a = connect(&url, &ann.0).await;
    a.send(Message::Text("{not json".into())).await.unwrap();
    sync(&mut a).await;
}
