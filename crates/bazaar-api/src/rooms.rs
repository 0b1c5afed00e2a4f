use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use bazaar_db::models::RoomRow;
use bazaar_db::{Database, StoreError, StoreResult};
use bazaar_types::api::{
    Claims, EnsureFriendRoomRequest, EnsureTradeRoomRequest, RoomIdResponse, RoomSummary,
};

use crate::error::ApiError;
use crate::state::{AppState, run_blocking};

/// Load a room on behalf of `user_id`: unknown rooms are 404, rooms the caller
/// does not sit in are 403.
pub(crate) fn member_room(db: &Database, room_id: Uuid, user_id: &str) -> StoreResult<RoomRow> {
    let room = db.get_room(room_id)?.ok_or(StoreError::NotFound("room"))?;
    if !room.members.contains(user_id) {
        return Err(StoreError::Permission("not a member of this room"));
    }
    Ok(room)
}

pub async fn ensure_friend_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EnsureFriendRoomRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let room_id = run_blocking(&state, move |db| db.ensure_friend_room(&claims.sub, &req.peer_id)).await?;
    Ok(Json(RoomIdResponse { room_id }))
}

pub async fn ensure_trade_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EnsureTradeRoomRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let room_id =
        run_blocking(&state, move |db| db.ensure_trade_room(&claims.sub, &req.product_id)).await?;
    Ok(Json(RoomIdResponse { room_id }))
}

pub async fn list_rooms(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = run_blocking(&state, move |db| db.list_rooms_for(&claims.sub)).await?;
    let rooms: Vec<RoomSummary> = rows.into_iter().map(RoomSummary::from).collect();
    Ok(Json(rooms))
}

pub async fn leave_room(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    run_blocking(&state, move |db| db.leave_room(room_id, &claims.sub)).await?;
    Ok(StatusCode::NO_CONTENT)
}
