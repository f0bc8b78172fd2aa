pub mod chat;
pub mod error;
pub mod groups;
pub mod storage;
pub mod trades;

use axum::extract::FromRef;

pub use error::{AppError, AppResult};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub groups: groups::store::GroupStore,
    pub trades: trades::ledger::TradeLedger,
    pub chat: chat::broker::ChatRoomBroker,
}
