use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Composite foreign key shared by [`Order`], [`OrderSize`] and
/// [`MarketOrderFunds`]. Modeled as a standalone value object composed by
/// inclusion rather than via inheritance.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Deserialize, Serialize)]
pub struct OrderKey {
    pub exchange_id: i64,
    pub exchange_order_id: String,
}

impl OrderKey {
    pub fn new(exchange_id: i64, exchange_order_id: impl Into<String>) -> Self {
        Self {
            exchange_id,
            exchange_order_id: exchange_order_id.into(),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, Deserialize, Serialize)]
pub enum OrderSide {
    #[display("Buy")]
    Buy,
    #[display("Sell")]
    Sell,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, Deserialize, Serialize)]
pub enum OrderType {
    #[display("Limit")]
    Limit,
    #[display("Market")]
    Market,
}

/// An individual limit/market order.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct Order {
    pub key: OrderKey,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: Option<f64>,
    pub placed_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
    pub expiry: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn merge_from(&mut self, other: &Order) {
        if other.price.is_some() {
            self.price = other.price;
        }
        if other.filled_at.is_some() {
            self.filled_at = other.filled_at;
        }
        if other.expiry.is_some() {
            self.expiry = other.expiry;
        }
        if other.cancelled_at.is_some() {
            self.cancelled_at = other.cancelled_at;
        }
    }
}

/// Time-stamped amendment to the evolving size of a live order.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct OrderSize {
    pub order: OrderKey,
    pub timestamp: DateTime<Utc>,
    pub size: f64,
}

/// Time-stamped amendment to the evolving funds of a live market order.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct MarketOrderFunds {
    pub order: OrderKey,
    pub timestamp: DateTime<Utc>,
    pub funds: f64,
}
