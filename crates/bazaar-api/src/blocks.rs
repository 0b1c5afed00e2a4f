use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use bazaar_types::api::{BlockRequest, BlockResponse, Claims};

use crate::error::ApiError;
use crate::state::{AppState, run_blocking};

pub async fn list_blocks(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = run_blocking(&state, move |db| db.list_blocks(&claims.sub)).await?;
    let blocks: Vec<BlockResponse> = rows.into_iter().map(BlockResponse::from).collect();
    Ok(Json(blocks))
}

pub async fn block(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<BlockRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let row = run_blocking(&state, move |db| db.block(&claims.sub, &req.user_id)).await?;
    Ok((StatusCode::CREATED, Json(BlockResponse::from(row))))
}

/// Idempotent: unblocking someone who is not blocked still succeeds.
pub async fn unblock(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    run_blocking(&state, move |db| db.unblock(&claims.sub, &user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
