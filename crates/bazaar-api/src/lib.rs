pub mod blocks;
pub mod error;
pub mod friends;
pub mod messages;
pub mod middleware;
pub mod rooms;
pub mod state;

use axum::{
    Json, Router, middleware as axum_middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// Every REST route. `/health` is open; the rest sit behind `require_auth`.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(health));

    let protected_routes = Router::new()
        .route("/rooms", get(rooms::list_rooms))
        .route("/rooms/friend", post(rooms::ensure_friend_room))
        .route("/rooms/trade", post(rooms::ensure_trade_room))
        .route("/rooms/{room_id}", delete(rooms::leave_room))
        .route(
            "/rooms/{room_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/rooms/{room_id}/read", post(messages::mark_read))
        .route(
            "/friend-requests",
            get(friends::list_box).post(friends::send_request),
        )
        .route("/friend-requests/{request_id}/accept", post(friends::accept_request))
        .route("/friend-requests/{request_id}/reject", post(friends::reject_request))
        .route("/friend-requests/{request_id}/cancel", post(friends::cancel_request))
        .route("/friends", get(friends::list_friends))
        .route("/friends/{user_id}", delete(friends::unfriend))
        .route("/blocks", get(blocks::list_blocks).post(blocks::block))
        .route("/blocks/{user_id}", delete(blocks::unblock))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
