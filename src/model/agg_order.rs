use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::market::MarketKey;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Deserialize, Serialize)]
pub enum AggOrderType {
    Bid,
    Ask,
}

/// A price-level snapshot point in a venue's aggregate (level-2) order book
/// history. Append-only: a given `(order_type, price)` is superseded by the
/// row with the highest `last_update_id <= t`; `size == 0` at that row means
/// the level was removed.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct AggOrder {
    pub exchange_id: i64,
    pub market: MarketKey,
    pub order_type: AggOrderType,
    pub price: f64,
    pub size: f64,
    /// Integer sequence scoped to (exchange, market); may recur across markets.
    pub last_update_id: i64,
    pub timestamp: DateTime<Utc>,
}
