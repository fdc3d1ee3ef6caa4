//! WebSocket accept loop and blind envelope forwarding.
//!
//! Each connection gets one read loop and one writer task draining a
//! bounded outbound queue. The relay stamps `from` with the sender's
//! registered name, resolves `to` through the directory, and forwards
//! without inspecting payloads. An envelope for an offline recipient is
//! dropped, not queued; a malformed frame is a no-op, not a disconnect.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use confab_common::{ClientEnvelope, ServerEnvelope};

use crate::directory::{ConnId, Directory, Outbox};

const WS_OUTBOX_CAPACITY: usize = 128;
const WS_MAX_TEXT_BYTES: usize = 64 * 1024;
const MAX_USERNAME_BYTES: usize = 32;

/// Everything the relay knows: the presence directory plus every open
/// socket (registered or not, for presence broadcasts).
pub struct RelayState {
    pub directory: Directory,
    sockets: HashMap<ConnId, Outbox>,
}

/// Shared handle to the relay state. Mutated only on register/disconnect.
pub type SharedState = Arc<RwLock<RelayState>>;

impl RelayState {
    pub fn new() -> Self {
        Self {
            directory: Directory::new(),
            sockets: HashMap::new(),
        }
    }

    pub fn open_sockets(&self) -> usize {
        self.sockets.len()
    }

    /// Send the current snapshot to every open connection.
    ///
    /// Called on every successful register and every entry-deleting remove;
    /// nothing else broadcasts.
    fn broadcast_presence(&self) {
        let envelope = ServerEnvelope::PresenceUpdate {
            users: self.directory.snapshot(),
        };
        for outbox in self.sockets.values() {
            if !outbox.try_send(&envelope) {
                debug!("presence update dropped for a slow connection");
            }
        }
    }
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

fn is_valid_username(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_USERNAME_BYTES && !name.chars().any(|c| c.is_control())
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    ws.max_message_size(WS_MAX_TEXT_BYTES)
        .max_frame_size(WS_MAX_TEXT_BYTES)
        .on_upgrade(move |socket| handle_socket(socket, state, addr))
}

async fn handle_socket(stream: WebSocket, state: SharedState, addr: SocketAddr) {
    info!("client connecting from {}", addr);
    let conn = ConnId::next();
    let (mut sender, mut receiver) = stream.split();
    let (tx, mut rx) = mpsc::channel::<Message>(WS_OUTBOX_CAPACITY);
    let outbox = Outbox::new(tx);

    let (disconnect_tx, mut disconnect_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
        let _ = disconnect_tx.try_send(());
    });

    state.write().await.sockets.insert(conn, outbox.clone());

    // Name this connection registered under; `from` is always stamped from
    // here, never from client-supplied data.
    let mut registered: Option<String> = None;

    loop {
        tokio::select! {
            _ = disconnect_rx.recv() => {
                break;
            }
            msg = receiver.next() => {
                let Some(msg) = msg else { break; };
                let Ok(msg) = msg else { break; };

                let text = match msg {
                    Message::Text(text) => text,
                    Message::Binary(_) => {
                        warn!("ignoring binary frame from {}", addr);
                        continue;
                    }
                    Message::Close(_) => break,
                    Message::Ping(_) | Message::Pong(_) => continue,
                };

                let envelope: ClientEnvelope = match serde_json::from_str(&text) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        warn!("ignoring malformed envelope from {}: {}", addr, err);
                        continue;
                    }
                };

                handle_envelope(&state, conn, &outbox, &mut registered, envelope).await;
            }
        }
    }

    let mut guard = state.write().await;
    guard.sockets.remove(&conn);
    if let Some(name) = guard.directory.remove(conn) {
        info!("user disconnected: {}", name);
        guard.broadcast_presence();
    } else {
        debug!("unregistered connection from {} closed", addr);
    }
}

async fn handle_envelope(
    state: &SharedState,
    conn: ConnId,
    outbox: &Outbox,
    registered: &mut Option<String>,
    envelope: ClientEnvelope,
) {
    match envelope {
        ClientEnvelope::Register {
            username,
            public_key,
        } => {
            if registered.is_some() {
                warn!(
                    "connection already registered, ignoring Register for {}",
                    username
                );
                return;
            }
            if !is_valid_username(&username) {
                warn!("rejecting registration with invalid username");
                return;
            }

            let mut guard = state.write().await;
            match guard
                .directory
                .register(&username, public_key, conn, outbox.clone())
            {
                Ok(()) => {
                    info!("user registered: {}", username);
                    *registered = Some(username);
                    guard.broadcast_presence();
                }
                // Silent refusal: the client is not told (known protocol
                // limitation) and the existing entry is untouched.
                Err(_) => warn!("username {} is already taken", username),
            }
        }

        ClientEnvelope::RequestPublicKey { username } => {
            let guard = state.read().await;
            match guard.directory.lookup(&username) {
                Some(record) => {
                    let response = ServerEnvelope::PublicKeyResponse {
                        username: username.clone(),
                        public_key: record.public_key.clone(),
                    };
                    if !outbox.try_send(&response) {
                        warn!("failed to queue public key response for requester");
                    }
                }
                // No response at all for an offline name.
                None => debug!("dropping public key request for offline user {}", username),
            }
        }

        ClientEnvelope::SendWrappedKey { to, wrapped_key } => {
            let Some(from) = registered.clone() else {
                warn!("dropping SendWrappedKey from unregistered connection");
                return;
            };
            debug!("relaying wrapped key from {} to {}", from, to);
            forward(state, &to, ServerEnvelope::WrappedKey { from, wrapped_key }).await;
        }

        ClientEnvelope::SendCiphertext { to, ciphertext } => {
            let Some(from) = registered.clone() else {
                warn!("dropping SendCiphertext from unregistered connection");
                return;
            };
            debug!("relaying ciphertext from {} to {}", from, to);
            forward(state, &to, ServerEnvelope::Ciphertext { from, ciphertext }).await;
        }
    }
}

/// Forward one envelope to the recipient's current connection, or drop it.
/// Fire-and-forget: the sender is never told about a miss.
async fn forward(state: &SharedState, to: &str, envelope: ServerEnvelope) {
    let outbox = {
        let guard = state.read().await;
        guard.directory.lookup(to).map(|r| r.outbox.clone())
    };

    match outbox {
        Some(outbox) => {
            if !outbox.try_send(&envelope) {
                warn!("failed to queue {} for {}", envelope.kind(), to);
            }
        }
        None => warn!("recipient {} offline, dropping {}", to, envelope.kind()),
    }
}
