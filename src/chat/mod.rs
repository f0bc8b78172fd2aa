pub mod broker;
pub mod ws;

use axum::{
    Json, Router, debug_handler,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use serde_json::json;

use crate::AppState;
use crate::error::AppResult;
use self::broker::ChatRoomBroker;

/// Nested under `/api/groups`; the websocket endpoint is routed separately
/// at `/ws`.
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/{group_id}/chat",
        get(list_messages).post(send_message),
    )
}

#[derive(Deserialize)]
struct ChatQuery {
    user: Option<String>,
}

#[derive(Deserialize)]
struct SendMessageBody {
    user: Option<String>,
    message: Option<String>,
    timestamp: Option<String>,
}

#[debug_handler(state = AppState)]
async fn list_messages(
    Path(group_id): Path<u64>,
    Query(ChatQuery { user }): Query<ChatQuery>,
    State(broker): State<ChatRoomBroker>,
) -> AppResult<impl IntoResponse> {
    let messages = broker.list_messages(group_id, user.as_deref().unwrap_or_default())?;
    Ok(Json(json!({ "messages": messages })))
}

#[debug_handler(state = AppState)]
async fn send_message(
    Path(group_id): Path<u64>,
    State(broker): State<ChatRoomBroker>,
    Json(body): Json<SendMessageBody>,
) -> AppResult<impl IntoResponse> {
    let message = broker.post_message(
        group_id,
        body.user.unwrap_or_default(),
        body.message.as_deref().unwrap_or_default(),
        body.timestamp,
    )?;
    Ok((StatusCode::CREATED, Json(json!({ "message": message }))))
}
