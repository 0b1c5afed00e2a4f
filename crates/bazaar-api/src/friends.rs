use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use bazaar_db::friends::Recipient;
use bazaar_types::api::{
    AcceptFriendResponse, Claims, FriendRequestBoxEntry, FriendRequestResponse, FriendResponse,
    SendFriendRequest,
};
use bazaar_types::models::BoxDirection;

use crate::error::ApiError;
use crate::state::{AppState, run_blocking};

#[derive(Debug, Default, Deserialize)]
pub struct BoxQuery {
    #[serde(rename = "box", default)]
    pub direction: BoxDirection,
}

pub async fn send_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendFriendRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let row = match (req.recipient_id, req.recipient_email) {
        (Some(id), None) => {
            run_blocking(&state, move |db| db.send_friend_request(&claims.sub, Recipient::Id(&id))).await?
        }
        (None, Some(email)) => {
            run_blocking(&state, move |db| {
                db.send_friend_request(&claims.sub, Recipient::Email(&email))
            })
            .await?
        }
        _ => {
            return Err(ApiError::BadRequest(
                "exactly one of recipient_id or recipient_email is required".into(),
            ));
        }
    };
    Ok((StatusCode::CREATED, Json(FriendRequestResponse::from(row))))
}

pub async fn list_box(
    State(state): State<AppState>,
    Query(query): Query<BoxQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = run_blocking(&state, move |db| db.list_request_box(&claims.sub, query.direction)).await?;
    let entries: Vec<FriendRequestBoxEntry> = rows.into_iter().map(FriendRequestBoxEntry::from).collect();
    Ok(Json(entries))
}

pub async fn accept_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let acceptance = run_blocking(&state, move |db| db.accept_friend_request(&claims.sub, request_id)).await?;
    Ok(Json(AcceptFriendResponse {
        request: acceptance.request.into(),
        friend_id: acceptance.friend.id,
        room_id: acceptance.room_id,
    }))
}

pub async fn reject_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let row = run_blocking(&state, move |db| db.reject_friend_request(&claims.sub, request_id)).await?;
    Ok(Json(FriendRequestResponse::from(row)))
}

pub async fn cancel_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let row = run_blocking(&state, move |db| db.cancel_friend_request(&claims.sub, request_id)).await?;
    Ok(Json(FriendRequestResponse::from(row)))
}

pub async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = run_blocking(&state, move |db| db.list_friends(&claims.sub)).await?;
    let friends: Vec<FriendResponse> = rows.into_iter().map(FriendResponse::from).collect();
    Ok(Json(friends))
}

pub async fn unfriend(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = run_blocking(&state, move |db| db.unfriend(&claims.sub, &user_id)).await?;
    if !removed {
        return Err(ApiError::NotFound("friendship"));
    }
    Ok(StatusCode::NO_CONTENT)
}
