use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::storage::Storage;

/// Trade quantities are expressed as one of three closed buckets rather
/// than an exact count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantityBucket {
    #[serde(rename = "1-10")]
    Small,
    #[serde(rename = "10-100")]
    Medium,
    #[serde(rename = "100-1000")]
    Large,
}

impl QuantityBucket {
    pub const ALL: [QuantityBucket; 3] = [Self::Small, Self::Medium, Self::Large];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1-10" => Some(Self::Small),
            "10-100" => Some(Self::Medium),
            "100-1000" => Some(Self::Large),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Small => "1-10",
            Self::Medium => "10-100",
            Self::Large => "100-1000",
        }
    }

    pub fn bounds(&self) -> (u32, u32) {
        match self {
            Self::Small => (1, 10),
            Self::Medium => (10, 100),
            Self::Large => (100, 1000),
        }
    }

    /// Total value range for this bucket at a given price.
    pub fn total_range(&self, price: f64) -> (f64, f64) {
        let (min, max) = self.bounds();
        (min as f64 * price, max as f64 * price)
    }
}

impl fmt::Display for QuantityBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// Case-insensitive, so "BUY" and "buy" both land on the lowercase form.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Some(Self::Buy),
            "sell" => Some(Self::Sell),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: u64,
    pub symbol: String,
    pub quantity: QuantityBucket,
    pub price: f64,
    #[serde(rename = "type")]
    pub side: TradeSide,
    pub timestamp: String,
    pub user: String,
    pub group_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct NewTrade {
    pub symbol: Option<String>,
    pub quantity: Option<String>,
    pub price: Option<f64>,
    #[serde(rename = "type")]
    pub side: Option<String>,
    pub group_id: Option<u64>,
    pub timestamp: Option<String>,
    #[serde(default = "default_user")]
    pub user: String,
}

fn default_user() -> String {
    "alex".to_owned()
}

/// Append/filter/delete over the trade collection. Group existence is not
/// checked; a trade may reference a group id nothing else knows about.
#[derive(Clone)]
pub struct TradeLedger {
    inner: Arc<Mutex<Inner>>,
    storage: Storage,
}

struct Inner {
    trades: Vec<Trade>,
    next_id: u64,
}

impl TradeLedger {
    pub fn open(storage: Storage) -> anyhow::Result<Self> {
        let trades: Vec<Trade> = storage.load_or_default("trades")?;
        let next_id = trades.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner { trades, next_id })),
            storage,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn list(&self, group_id: Option<u64>) -> Vec<Trade> {
        let inner = self.lock();
        match group_id {
            Some(id) => inner
                .trades
                .iter()
                .filter(|t| t.group_id == id)
                .cloned()
                .collect(),
            None => inner.trades.clone(),
        }
    }

    pub fn create(&self, req: NewTrade) -> AppResult<Trade> {
        let (Some(symbol), Some(quantity), Some(price), Some(side), Some(group_id)) =
            (req.symbol, req.quantity, req.price, req.side, req.group_id)
        else {
            return Err(AppError::validation("Missing required fields"));
        };

        let quantity = QuantityBucket::parse(&quantity).ok_or_else(|| {
            AppError::validation(format!(
                "Invalid quantity range. Must be one of: {}",
                QuantityBucket::ALL.map(|b| b.as_str()).join(", ")
            ))
        })?;
        let side = TradeSide::parse(&side)
            .ok_or_else(|| AppError::validation("Invalid trade type. Must be buy or sell"))?;

        let mut inner = self.lock();
        let trade = Trade {
            id: inner.next_id,
            symbol: symbol.to_uppercase(),
            quantity,
            price,
            side,
            timestamp: req.timestamp.unwrap_or_else(|| Utc::now().to_rfc3339()),
            user: req.user,
            group_id,
        };
        inner.next_id += 1;
        inner.trades.push(trade.clone());
        self.storage.save("trades", &inner.trades)?;

        tracing::info!(trade = trade.id, symbol = %trade.symbol, "trade recorded");
        Ok(trade)
    }

    /// Removing an id that does not exist is a no-op, not an error.
    pub fn delete(&self, trade_id: u64) -> AppResult<()> {
        let mut inner = self.lock();
        inner.trades.retain(|t| t.id != trade_id);
        self.storage.save("trades", &inner.trades)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(dir: &tempfile::TempDir) -> TradeLedger {
        TradeLedger::open(Storage::new(dir.path())).unwrap()
    }

    fn new_trade(symbol: &str, quantity: &str, side: &str, group_id: u64) -> NewTrade {
        NewTrade {
            symbol: Some(symbol.to_owned()),
            quantity: Some(quantity.to_owned()),
            price: Some(150.5),
            side: Some(side.to_owned()),
            group_id: Some(group_id),
            timestamp: None,
            user: "alex".to_owned(),
        }
    }

    #[test]
    fn create_normalizes_symbol_and_side() {
        let dir = tempfile::tempdir().unwrap();
        let trades = ledger(&dir);

        let trade = trades.create(new_trade("aapl", "1-10", "BUY", 1)).unwrap();
        assert_eq!(trade.symbol, "AAPL");
        assert_eq!(trade.side, TradeSide::Buy);
        assert_eq!(trade.quantity, QuantityBucket::Small);

        let json = serde_json::to_value(&trade).unwrap();
        assert_eq!(json["type"], "buy");
        assert_eq!(json["quantity"], "1-10");
    }

    #[test]
    fn create_rejects_unknown_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let trades = ledger(&dir);

        let err = trades.create(new_trade("AAPL", "5-50", "buy", 1)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid quantity range. Must be one of: 1-10, 10-100, 100-1000"
        );
    }

    #[test]
    fn create_rejects_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let trades = ledger(&dir);

        let mut req = new_trade("AAPL", "1-10", "buy", 1);
        req.price = None;
        let err = trades.create(req).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn list_filters_by_group() {
        let dir = tempfile::tempdir().unwrap();
        let trades = ledger(&dir);
        trades.create(new_trade("AAPL", "1-10", "buy", 1)).unwrap();
        trades.create(new_trade("MSFT", "10-100", "sell", 2)).unwrap();

        assert_eq!(trades.list(None).len(), 2);
        let filtered = trades.list(Some(2));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].symbol, "MSFT");
    }

    #[test]
    fn delete_missing_id_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let trades = ledger(&dir);
        trades.create(new_trade("AAPL", "1-10", "buy", 1)).unwrap();

        trades.delete(42).unwrap();
        assert_eq!(trades.list(None).len(), 1);
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let dir = tempfile::tempdir().unwrap();
        let trades = ledger(&dir);
        let first = trades.create(new_trade("AAPL", "1-10", "buy", 1)).unwrap();
        trades.delete(first.id).unwrap();

        let second = trades.create(new_trade("MSFT", "1-10", "buy", 1)).unwrap();
        assert!(second.id > first.id);
    }

    #[test]
    fn reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let trades = TradeLedger::open(storage.clone()).unwrap();
        let trade = trades.create(new_trade("AAPL", "1-10", "buy", 1)).unwrap();

        let reloaded = TradeLedger::open(storage).unwrap();
        assert_eq!(reloaded.list(None), vec![trade]);
    }

    #[test]
    fn bucket_bounds_and_totals() {
        assert_eq!(QuantityBucket::parse("10-100"), Some(QuantityBucket::Medium));
        assert_eq!(QuantityBucket::parse("2-20"), None);
        assert_eq!(QuantityBucket::Large.bounds(), (100, 1000));

        let (min, max) = QuantityBucket::Small.total_range(150.5);
        assert_eq!(min, 150.5);
        assert_eq!(max, 1505.0);
    }
}
