use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::market::MarketKey;

/// The aggressor side reported by the venue for this execution.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, Deserialize, Serialize)]
pub enum TradeSide {
    #[display("Buy")]
    Buy,
    #[display("Sell")]
    Sell,
}

/// An execution record reported by a venue.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct Trade {
    /// Venue-assigned trade identifier.
    pub id: String,
    pub exchange_id: i64,
    pub market: MarketKey,
    pub timestamp: DateTime<Utc>,
    pub trade_type: TradeSide,
    /// Maker/taker counterparty identifiers, when the venue reports them.
    pub maker: Option<String>,
    pub taker: Option<String>,
    pub price: f64,
    pub size: f64,
    pub maker_fee: Option<f64>,
    pub taker_fee: Option<f64>,
    /// Originating order identifiers, present when the venue reports them.
    pub buy_order_id: Option<String>,
    pub sell_order_id: Option<String>,
}
