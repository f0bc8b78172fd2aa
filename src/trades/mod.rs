pub mod ledger;

use axum::{
    Json, Router, debug_handler,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
};
use serde::Deserialize;
use serde_json::json;

use crate::AppState;
use crate::error::AppResult;
use self::ledger::{NewTrade, TradeLedger};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_trades).post(create_trade))
        .route("/{trade_id}", delete(delete_trade))
}

#[derive(Deserialize)]
struct TradeQuery {
    group_id: Option<u64>,
}

#[debug_handler(state = AppState)]
async fn list_trades(
    Query(TradeQuery { group_id }): Query<TradeQuery>,
    State(trades): State<TradeLedger>,
) -> impl IntoResponse {
    Json(json!({ "trades": trades.list(group_id) }))
}

#[debug_handler(state = AppState)]
async fn create_trade(
    State(trades): State<TradeLedger>,
    Json(body): Json<NewTrade>,
) -> AppResult<impl IntoResponse> {
    let trade = trades.create(body)?;
    Ok((StatusCode::CREATED, Json(json!({ "trade": trade }))))
}

#[debug_handler(state = AppState)]
async fn delete_trade(
    Path(trade_id): Path<u64>,
    State(trades): State<TradeLedger>,
) -> AppResult<impl IntoResponse> {
    trades.delete(trade_id)?;
    Ok(Json(json!({ "message": format!("Trade {trade_id} deleted") })))
}
