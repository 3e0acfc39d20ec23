use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use huddle_db::Database;
use huddle_types::api::Claims;
use huddle_types::events::{ChatLine, GatewayCommand, GatewayEvent};

use crate::archive::ChatArchiver;
use crate::hub::Hub;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Everything a connection needs besides its socket.
#[derive(Clone)]
pub struct GatewayContext {
    pub hub: Hub,
    pub db: Arc<Database>,
    pub jwt_secret: Arc<str>,
    pub archiver: ChatArchiver,
    /// Lobby lines replayed after `identify`
    pub history_limit: u32,
}

/// Where a connection is in its lifecycle. A socket that has closed is
/// simply gone, so there is no explicit disconnected state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Receives broadcasts but may not post
    Connected,
    Identified { user_id: Uuid, username: String },
}

/// Drive one WebSocket from upgrade to close.
pub async fn handle_connection(socket: WebSocket, ctx: GatewayContext) {
    let (sender, receiver) = socket.split();

    let (conn_id, targeted_rx) = ctx.hub.connect().await;
    let broadcast_rx = ctx.hub.subscribe();
    info!("Connection {} opened", conn_id);

    let pong_received = Arc::new(AtomicBool::new(true));

    let mut send_task = tokio::spawn(forward_events(
        sender,
        broadcast_rx,
        targeted_rx,
        pong_received.clone(),
    ));

    let recv_ctx = ctx.clone();
    let mut recv_task = tokio::spawn(async move {
        read_commands(receiver, recv_ctx, conn_id, pong_received).await
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    ctx.hub.disconnect(conn_id).await;
    info!("Connection {} closed", conn_id);
}

/// Relay broadcast and targeted events to the client, with heartbeat.
async fn forward_events(
    mut sender: SplitSink<WebSocket, Message>,
    mut broadcast_rx: broadcast::Receiver<GatewayEvent>,
    mut targeted_rx: mpsc::UnboundedReceiver<GatewayEvent>,
    pong_received: Arc<AtomicBool>,
) {
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut missed_heartbeats: u8 = 0;

    loop {
        let event = tokio::select! {
            result = broadcast_rx.recv() => match result {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Broadcast receiver lagged by {} messages", n);
                    continue;
                }
                Err(_) => break,
            },
            result = targeted_rx.recv() => match result {
                Some(event) => event,
                None => break,
            },
            _ = heartbeat.tick() => {
                if pong_received.swap(false, Ordering::Acquire) {
                    missed_heartbeats = 0;
                } else {
                    missed_heartbeats += 1;
                    if missed_heartbeats >= 2 {
                        warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                        break;
                    }
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let text = match serde_json::to_string(&event) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to serialize gateway event: {}", e);
                continue;
            }
        };
        if sender.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }
}

/// Read commands from the client until it goes away.
async fn read_commands(
    mut receiver: SplitStream<WebSocket>,
    ctx: GatewayContext,
    conn_id: Uuid,
    pong_received: Arc<AtomicBool>,
) {
    let mut state = SessionState::Connected;

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                Ok(cmd) => handle_command(&ctx, conn_id, &mut state, cmd).await,
                Err(e) => {
                    warn!(
                        "Connection {} bad command: {} -- raw: {}",
                        conn_id,
                        e,
                        text.chars().take(200).collect::<String>()
                    );
                }
            },
            Message::Pong(_) => {
                pong_received.store(true, Ordering::Release);
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}

/// Apply one client command to the connection's state.
pub async fn handle_command(
    ctx: &GatewayContext,
    conn_id: Uuid,
    state: &mut SessionState,
    cmd: GatewayCommand,
) {
    match cmd {
        GatewayCommand::Identify { token } => {
            if matches!(state, SessionState::Identified { .. }) {
                reject(ctx, conn_id, "Connection is already identified").await;
                return;
            }

            let Some(claims) = verify_token(&ctx.jwt_secret, &token) else {
                warn!("Connection {} presented an invalid token", conn_id);
                reject(ctx, conn_id, "Invalid token").await;
                return;
            };

            ctx.hub
                .send_to_connection(
                    conn_id,
                    GatewayEvent::Ready {
                        user_id: claims.sub,
                        username: claims.username.clone(),
                    },
                )
                .await;

            let history = load_history(ctx).await;
            ctx.hub
                .send_to_connection(conn_id, GatewayEvent::ChatHistory { messages: history })
                .await;

            if ctx
                .hub
                .identify(conn_id, claims.sub, claims.username.clone())
                .await
            {
                *state = SessionState::Identified {
                    user_id: claims.sub,
                    username: claims.username,
                };
            }
        }

        GatewayCommand::ChatMessage { text } => {
            let SessionState::Identified { user_id, username } = state else {
                reject(ctx, conn_id, "Identify before sending messages").await;
                return;
            };
            if text.trim().is_empty() {
                reject(ctx, conn_id, "Message must not be empty").await;
                return;
            }

            debug!("{} ({}) chat: {} bytes", username, user_id, text.len());
            ctx.hub.broadcast(GatewayEvent::ChatMessage(ChatLine {
                user: username.clone(),
                text: text.clone(),
                time: chrono::Utc::now(),
            }));

            ctx.archiver.submit(*user_id, text);
        }
    }
}

async fn load_history(ctx: &GatewayContext) -> Vec<ChatLine> {
    let db = ctx.db.clone();
    let limit = ctx.history_limit;
    match tokio::task::spawn_blocking(move || db.recent_chat_messages(limit)).await {
        Ok(Ok(rows)) => rows.into_iter().map(ChatLine::from).collect(),
        Ok(Err(e)) => {
            warn!("Failed to load chat history: {}", e);
            Vec::new()
        }
        Err(e) => {
            warn!("spawn_blocking join error while loading history: {}", e);
            Vec::new()
        }
    }
}

async fn reject(ctx: &GatewayContext, conn_id: Uuid, message: &str) {
    ctx.hub
        .send_to_connection(
            conn_id,
            GatewayEvent::Error {
                message: message.to_string(),
            },
        )
        .await;
}

/// Decode and validate a bearer token issued by the REST API.
pub fn verify_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}
