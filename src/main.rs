use axum::{Json, Router, debug_handler, response::IntoResponse, routing::get};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use tradecircle::chat::broker::ChatRoomBroker;
use tradecircle::groups::store::GroupStore;
use tradecircle::storage::Storage;
use tradecircle::trades::ledger::TradeLedger;
use tradecircle::{AppState, chat, groups, trades};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tradecircle=info")),
        )
        .init();

    let data_dir = dotenv::var("DATA_DIR").unwrap_or_else(|_| "./data".to_owned());
    let port: u16 = dotenv::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5001);

    let storage = Storage::new(&data_dir);
    let group_store = GroupStore::open(storage.clone())?;
    let trade_ledger = TradeLedger::open(storage.clone())?;
    let chat_broker = ChatRoomBroker::open(storage, group_store.clone())?;

    let app_state = AppState {
        groups: group_store,
        trades: trade_ledger,
        chat: chat_broker,
    };

    let app = Router::new()
        .route("/api/health", get(health))
        .nest("/api/trades", trades::router())
        .nest("/api/groups", groups::router())
        .route("/ws", get(chat::ws::chat_ws))
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("listening on port {port}, data dir {data_dir}");
    axum::serve(listener, app).await?;
    Ok(())
}

#[debug_handler]
async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "message": "TradeCircle API is running",
    }))
}
