pub mod store;

use axum::{
    Json, Router, debug_handler,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;

use crate::AppState;
use crate::error::AppResult;
use crate::trades::ledger::TradeLedger;
use self::store::{GroupStore, NewGroup};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_groups).post(create_group))
        .route("/search", get(search_groups))
        .route("/{group_id}", get(group_details))
        .route("/{group_id}/join", post(request_join))
        .route("/{group_id}/join/{request_id}/approve", post(approve_join))
        .route("/{group_id}/join/{request_id}/reject", post(reject_join))
        .merge(crate::chat::router())
}

#[derive(Deserialize)]
struct UserQuery {
    #[serde(default = "default_user")]
    user: String,
}

fn default_user() -> String {
    "alex".to_owned()
}

#[debug_handler(state = AppState)]
async fn list_groups(
    Query(UserQuery { user }): Query<UserQuery>,
    State(groups): State<GroupStore>,
) -> impl IntoResponse {
    Json(json!({ "groups": groups.groups_for_user(&user) }))
}

#[debug_handler(state = AppState)]
async fn create_group(
    State(groups): State<GroupStore>,
    Json(body): Json<NewGroup>,
) -> AppResult<impl IntoResponse> {
    let group = groups.create_group(body)?;
    Ok((StatusCode::CREATED, Json(json!({ "group": group }))))
}

#[debug_handler(state = AppState)]
async fn search_groups(
    Query(UserQuery { user }): Query<UserQuery>,
    State(groups): State<GroupStore>,
) -> impl IntoResponse {
    Json(json!({ "groups": groups.search(&user) }))
}

#[debug_handler(state = AppState)]
async fn group_details(
    Path(group_id): Path<u64>,
    Query(UserQuery { user }): Query<UserQuery>,
    State(groups): State<GroupStore>,
    State(trades): State<TradeLedger>,
) -> AppResult<impl IntoResponse> {
    let details = groups.details(group_id, &user)?;
    let group_trades = trades.list(Some(group_id));

    Ok(Json(json!({
        "group": details.group,
        "trades": group_trades,
        "trade_count": group_trades.len(),
        "pending_requests": details.pending_requests,
        "is_admin": details.is_admin,
    })))
}

#[derive(Deserialize)]
struct JoinBody {
    #[serde(default = "default_user")]
    user: String,
    requested_at: Option<String>,
}

#[debug_handler(state = AppState)]
async fn request_join(
    Path(group_id): Path<u64>,
    State(groups): State<GroupStore>,
    Json(body): Json<JoinBody>,
) -> AppResult<impl IntoResponse> {
    let request = groups.request_join(group_id, body.user, body.requested_at)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Join request sent successfully",
            "request": request,
        })),
    ))
}

#[derive(Deserialize)]
struct AdminBody {
    admin_user: Option<String>,
}

#[debug_handler(state = AppState)]
async fn approve_join(
    Path((group_id, request_id)): Path<(u64, u64)>,
    State(groups): State<GroupStore>,
    Json(body): Json<AdminBody>,
) -> AppResult<impl IntoResponse> {
    let group = groups.approve_join(
        group_id,
        request_id,
        body.admin_user.as_deref().unwrap_or_default(),
    )?;
    Ok(Json(json!({
        "message": "Join request approved",
        "group": group,
    })))
}

#[debug_handler(state = AppState)]
async fn reject_join(
    Path((group_id, request_id)): Path<(u64, u64)>,
    State(groups): State<GroupStore>,
    Json(body): Json<AdminBody>,
) -> AppResult<impl IntoResponse> {
    groups.reject_join(
        group_id,
        request_id,
        body.admin_user.as_deref().unwrap_or_default(),
    )?;
    Ok(Json(json!({ "message": "Join request rejected" })))
}
