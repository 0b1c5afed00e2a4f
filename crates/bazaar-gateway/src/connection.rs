use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::{
    Router,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{self, CloseFrame, Message, Utf8Bytes, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use bazaar_db::Database;
use bazaar_types::api::Claims;
use bazaar_types::events::{GatewayEvent, close_code};

use crate::dispatcher::Dispatcher;

pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(15);

/// Missed pongs tolerated before a socket is dropped.
const MAX_MISSED_PONGS: u8 = 2;

#[derive(Clone)]
pub struct GatewayState {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
    pub heartbeat: Duration,
}

/// Query string of `GET /gateway`. Fields are optional here so a malformed
/// request still upgrades and gets a close code instead of a bare 400.
#[derive(Debug, Default, Deserialize)]
pub struct GatewayQuery {
    pub room_id: Option<String>,
    pub user_id: Option<String>,
    pub token: Option<String>,
}

struct Admission {
    room_id: Uuid,
    user_id: String,
    last_seq: i64,
}

struct Refusal {
    code: u16,
    reason: &'static str,
}

impl Refusal {
    fn new(code: u16, reason: &'static str) -> Self {
        Self { code, reason }
    }
}

pub fn router(state: GatewayState) -> Router {
    Router::new().route("/gateway", get(room_socket)).with_state(state)
}

pub async fn room_socket(
    State(state): State<GatewayState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, query))
}

async fn handle_connection(mut socket: WebSocket, state: GatewayState, query: GatewayQuery) {
    let admission = match admit(&state, query).await {
        Ok(admission) => admission,
        Err(refusal) => {
            warn!("Refusing room socket: {} ({})", refusal.reason, refusal.code);
            let frame = CloseFrame {
                code: refusal.code,
                reason: Utf8Bytes::from_static(refusal.reason),
            };
            let _ = socket.send(Message::Close(Some(frame))).await;
            return;
        }
    };

    run_connection_loop(socket, state, admission).await;
}

/// Validate the query, the token and room membership, in that order.
async fn admit(state: &GatewayState, query: GatewayQuery) -> Result<Admission, Refusal> {
    let room_id = query
        .room_id
        .as_deref()
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or(Refusal::new(close_code::BAD_QUERY, "room_id missing or malformed"))?;
    let user_id = query
        .user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(Refusal::new(close_code::BAD_QUERY, "user_id missing"))?;
    let token = query
        .token
        .ok_or(Refusal::new(close_code::BAD_QUERY, "token missing"))?;

    let claims = Claims::decode(&token, &state.jwt_secret)
        .ok_or(Refusal::new(close_code::BAD_TOKEN, "invalid token"))?;
    if claims.sub != user_id {
        return Err(Refusal::new(close_code::BAD_TOKEN, "token issued for another user"));
    }

    let db = state.db.clone();
    let room = tokio::task::spawn_blocking(move || db.get_room(room_id))
        .await
        .map_err(|e| {
            error!("Membership lookup task failed: {}", e);
            Refusal::new(ws::close_code::ERROR, "internal error")
        })?
        .map_err(|e| {
            error!("Membership lookup for room {} failed: {}", room_id, e);
            Refusal::new(ws::close_code::ERROR, "internal error")
        })?
        .ok_or(Refusal::new(close_code::UNKNOWN_ROOM, "unknown room"))?;

    if !room.members.contains(&user_id) {
        return Err(Refusal::new(close_code::NOT_MEMBER, "not a member of this room"));
    }

    Ok(Admission {
        room_id,
        user_id,
        last_seq: room.last_seq,
    })
}

async fn run_connection_loop(socket: WebSocket, state: GatewayState, admission: Admission) {
    let Admission {
        room_id,
        user_id,
        last_seq,
    } = admission;
    let (mut sender, mut receiver) = socket.split();

    // Register before Ready so nothing persisted after Ready can be missed.
    let (conn_id, mut room_rx) = state.dispatcher.register(room_id, &user_id);
    info!("{} joined room socket {} (conn {})", user_id, room_id, conn_id);

    let ready = GatewayEvent::Ready {
        room_id,
        user_id: user_id.clone(),
        last_seq,
    };
    if send_event(&mut sender, &ready).await.is_err() {
        state.dispatcher.unregister(room_id, conn_id);
        return;
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;
    let heartbeat_every = state.heartbeat;

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(heartbeat_every);
        heartbeat.tick().await;
        let mut missed: u8 = 0;

        loop {
            tokio::select! {
                event = room_rx.recv() => {
                    let Some(event) = event else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed = 0;
                    } else {
                        missed += 1;
                        if missed >= MAX_MISSED_PONGS {
                            warn!("Heartbeat timeout (missed {} pongs), dropping room socket", missed);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Sockets are push-only; inbound frames only matter for liveness.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Pong(_) => pong_flag_recv.store(true, Ordering::Release),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.dispatcher.unregister(room_id, conn_id);
    info!("{} left room socket {} (conn {})", user_id, room_id, conn_id);
}

async fn send_event<S>(sender: &mut S, event: &GatewayEvent) -> Result<(), ()>
where
    S: Sink<Message> + Unpin,
{
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to encode gateway frame: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}
