//! Connection task: connect, pump frames both ways, reconnect with backoff.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use mylocal_shared::{ClientEvent, ServerEvent, WsEnvelope, WS_TOKEN_PARAM};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message},
    MaybeTlsStream, WebSocketStream,
};

use super::{ConnectionState, ReconnectConfig, Shared};
use crate::session::SessionStore;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Start the connection management loop in a background tokio task
pub(crate) fn spawn(
    ws_url: String,
    session: SessionStore,
    reconnect: ReconnectConfig,
    shared: Arc<Shared>,
    cancel: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut attempt = 0u32;

        loop {
            // The token is read on every attempt so a re-login is picked up.
            let Some(token) = session.token() else {
                tracing::info!("No session, stopping realtime connection");
                break;
            };
            let url = format!("{ws_url}?{WS_TOKEN_PARAM}={}", urlencoding::encode(&token));

            let pending = if attempt == 0 {
                ConnectionState::Connecting
            } else {
                ConnectionState::ReconnectPending { attempt }
            };
            if !shared.publish(&cancel, pending) {
                return;
            }

            match connect_async(url.as_str()).await {
                Ok((socket, _response)) => {
                    tracing::info!("Realtime connected to {}", ws_url);
                    attempt = 0;

                    let (tx, rx) = mpsc::unbounded_channel();
                    let rejoin: Vec<String> = shared.joined.lock().iter().cloned().collect();
                    for chat_id in rejoin {
                        let _ = tx.send(WsEnvelope::new(ClientEvent::JoinChat { chat_id }));
                    }
                    {
                        let mut outbound = shared.outbound.lock();
                        if cancel.load(Ordering::Acquire) {
                            return;
                        }
                        *outbound = Some(tx);
                        shared.set_state(ConnectionState::Connected);
                    }

                    pump(socket, rx, &shared, &cancel).await;

                    {
                        let mut outbound = shared.outbound.lock();
                        if cancel.load(Ordering::Acquire) {
                            return;
                        }
                        *outbound = None;
                    }
                    tracing::info!("Realtime connection to {} closed", ws_url);
                }
                Err(tungstenite::Error::Http(resp)) if resp.status().as_u16() == 401 => {
                    tracing::warn!("Relay rejected the session token");
                    break;
                }
                Err(e) => {
                    tracing::warn!("Realtime connect to {} failed: {}", ws_url, e);
                }
            }

            // Check if we should retry
            attempt += 1;
            if reconnect.max_attempts > 0 && attempt > reconnect.max_attempts {
                tracing::warn!(
                    "Giving up on realtime after {} reconnect attempts",
                    reconnect.max_attempts
                );
                break;
            }

            let delay = reconnect.delay_for_attempt(attempt - 1);
            if !shared.publish(&cancel, ConnectionState::ReconnectPending { attempt }) {
                return;
            }
            tracing::info!("Reconnecting in {}ms (attempt {})", delay, attempt);
            tokio::time::sleep(tokio::time::Duration::from_millis(u64::from(delay))).await;
        }

        let mut outbound = shared.outbound.lock();
        if !cancel.load(Ordering::Acquire) {
            *outbound = None;
            shared.set_state(ConnectionState::Disconnected);
        }
    })
}

/// Run one live connection until either side closes it.
async fn pump(
    socket: Socket,
    mut rx: UnboundedReceiver<WsEnvelope<ClientEvent>>,
    shared: &Shared,
    cancel: &AtomicBool,
) {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if cancel.load(Ordering::Acquire) {
                        break;
                    }
                    match serde_json::from_str::<WsEnvelope<ServerEvent>>(&text) {
                        Ok(envelope) => shared.chat.apply(envelope.payload),
                        Err(e) => tracing::warn!("Failed to parse relay event: {}", e),
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                // Pong is handled automatically by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("Realtime read error: {}", e);
                    break;
                }
            },
            outgoing = rx.recv() => {
                let Some(envelope) = outgoing else { break };
                match serde_json::to_string(&envelope) {
                    Ok(json) => {
                        tracing::debug!("Sending {}", envelope.payload.name());
                        if let Err(e) = write.send(Message::Text(json.into())).await {
                            tracing::warn!("Realtime send failed: {}", e);
                            break;
                        }
                    }
                    Err(e) => tracing::error!("Failed to encode {}: {}", envelope.payload.name(), e),
                }
            }
        }
    }
}
