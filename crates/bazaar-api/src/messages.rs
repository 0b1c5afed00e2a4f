use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use bazaar_db::messages::MessageBody;
use bazaar_db::{Conflict, StoreError};
use bazaar_types::api::{Claims, MarkReadRequest, MessageResponse, ReadCursorResponse, SendMessageRequest};

use crate::error::ApiError;
use crate::rooms::member_room;
use crate::state::{AppState, run_blocking};

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    /// 0 (default) loads the newest page; a positive value catches up after it.
    #[serde(default)]
    pub since_seq: i64,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = run_blocking(&state, move |db| {
        member_room(db, room_id, &claims.sub)?;
        db.fetch_since(room_id, query.since_seq, query.limit)
    })
    .await?;

    let messages: Vec<MessageResponse> = rows.into_iter().map(MessageResponse::from).collect();
    Ok(Json(messages))
}

/// Persist, then push to live sockets. The push is best effort and never
/// affects the response.
pub async fn send_message(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let body = MessageBody::from_client(req.kind, req.text, req.file_ref)?;

    let row = run_blocking(&state, move |db| {
        let room = member_room(db, room_id, &claims.sub)?;
        if let Some(peer) = room.members.peer_of(&claims.sub) {
            if db.is_blocked_either(&claims.sub, peer)? {
                return Err(StoreError::Conflict(Conflict::Blocked));
            }
        }
        db.append_message(room_id, &claims.sub, &body)
    })
    .await?;

    let message = MessageResponse::from(row);
    let delivered = state.fanout.publish(&message);
    debug!("Message {} seq {} pushed to {} sockets", message.id, message.seq, delivered);

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MarkReadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.clone();
    let cursor = run_blocking(&state, move |db| {
        member_room(db, room_id, &claims.sub)?;
        db.mark_read(room_id, &claims.sub, req.message_id)
    })
    .await?;

    let response = cursor.map(ReadCursorResponse::from).unwrap_or(ReadCursorResponse {
        room_id,
        user_id,
        message_id: None,
        seq: 0,
    });
    Ok(Json(response))
}
