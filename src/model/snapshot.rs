use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::market::MarketKey;

/// Descriptive statistics of a reconstructed order book at one instant, plus
/// the same statistics restricted to the "quartile" sub-book (bids at or
/// above the 75th percentile of bid prices, asks at or below the 25th
/// percentile of ask prices).
///
/// Idempotent w.r.t. `(exchange_id, market, timestamp)` — the snapshot
/// generator may be re-run over the same window and produce identical rows.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct OrderBookSnapshot {
    pub exchange_id: i64,
    pub market: MarketKey,
    pub timestamp: DateTime<Utc>,

    pub spread: f64,
    pub bids_count: usize,
    pub asks_count: usize,
    pub bids_volume: f64,
    pub asks_volume: f64,
    pub bids_price_mean: f64,
    pub asks_price_mean: f64,
    pub bids_price_stddev: f64,
    pub asks_price_stddev: f64,
    pub bid_price_median: f64,
    pub ask_price_median: f64,
    pub min_ask_price: f64,
    pub min_ask_size: f64,
    pub max_bid_price: f64,
    pub max_bid_size: f64,

    // Quartile sub-book statistics.
    pub bid_price_upper_quartile: f64,
    pub ask_price_lower_quartile: f64,
    pub bids_volume_upper_quartile: f64,
    pub asks_volume_lower_quartile: f64,
    pub bids_count_upper_quartile: usize,
    pub asks_count_lower_quartile: usize,
    pub bids_price_stddev_upper_quartile: f64,
    pub asks_price_stddev_lower_quartile: f64,
    pub bids_price_mean_upper_quartile: f64,
    pub asks_price_mean_lower_quartile: f64,
}
