//! Offline/on-demand snapshot generator: walks a `[start, stop)` wall-clock
//! window per (venue, market) in fixed steps, reconstructs the order book at
//! each tick from append-only `AggOrder` history, and writes descriptive
//! statistics.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::Error;
use crate::listener::StopSignal;
use crate::model::{AggOrder, AggOrderType, MarketKey, OrderBookSnapshot};
use crate::store::Store;

/// Interval between snapshot ticks.
pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);

/// Number of snapshots buffered before a commit is triggered, mirroring the
/// orchestrator's commit policy.
pub const DEFAULT_COMMIT_INTERVAL: usize = 100;

pub struct SnapshotGenerator {
    store: Arc<dyn Store>,
    snapshot_interval: chrono::Duration,
    commit_interval: usize,
    stop: Arc<StopSignal>,
}

impl SnapshotGenerator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_policy(store, DEFAULT_SNAPSHOT_INTERVAL, DEFAULT_COMMIT_INTERVAL)
    }

    pub fn with_policy(
        store: Arc<dyn Store>,
        snapshot_interval: Duration,
        commit_interval: usize,
    ) -> Self {
        Self {
            store,
            snapshot_interval: chrono::Duration::from_std(snapshot_interval)
                .expect("snapshot_interval fits in chrono::Duration"),
            commit_interval,
            stop: Arc::new(StopSignal::default()),
        }
    }

    pub fn stop_signal(&self) -> Arc<StopSignal> {
        Arc::clone(&self.stop)
    }

    /// Run the generator for every (venue, market) pair with aggregate-order
    /// history among `exchange_names`, up to `stop_time`. Returns the number
    /// of snapshots committed.
    pub async fn run(
        &self,
        exchange_names: &[String],
        stop_time: DateTime<Utc>,
    ) -> Result<usize, Error> {
        let markets = self.store.markets_with_agg_history(exchange_names).await?;

        let mut buffer: Vec<OrderBookSnapshot> = Vec::with_capacity(self.commit_interval);
        let mut total_committed = 0;

        for market in markets {
            if self.stop.is_set() {
                break;
            }

            let mut t = market.earliest_timestamp;
            while t < stop_time {
                if self.stop.is_set() {
                    break;
                }

                let rows = self
                    .store
                    .agg_orders_until(market.exchange_id, &market.market, t)
                    .await?;
                let book = reconstruct_book(&rows);

                if let Some(snapshot) = snapshot_at(market.exchange_id, &market.market, t, &book) {
                    buffer.push(snapshot);
                    if buffer.len() >= self.commit_interval {
                        total_committed += self.flush(&mut buffer).await?;
                    }
                }

                t = t + self.snapshot_interval;
            }
        }

        total_committed += self.flush(&mut buffer).await?;
        Ok(total_committed)
    }

    pub fn request_stop(&self) {
        self.stop.request();
    }

    async fn flush(&self, buffer: &mut Vec<OrderBookSnapshot>) -> Result<usize, Error> {
        if buffer.is_empty() {
            return Ok(0);
        }
        self.store.insert_snapshots(buffer.as_slice()).await?;
        let n = buffer.len();
        buffer.clear();
        Ok(n)
    }
}

/// One reconstructed price level: the latest (by `last_update_id`) row for
/// an `(order_type, price)` pair with `timestamp <= t`, restricted to
/// `size > 0`.
#[derive(Clone, Debug)]
struct Level {
    order_type: AggOrderType,
    price: f64,
    size: f64,
    last_update_id: i64,
}

fn reconstruct_book(rows: &[AggOrder]) -> Vec<Level> {
    let mut latest: HashMap<(AggOrderType, u64), Level> = HashMap::new();
    for row in rows {
        let bucket = (row.order_type, row.price.to_bits());
        match latest.get(&bucket) {
            Some(existing) if existing.last_update_id >= row.last_update_id => {}
            _ => {
                latest.insert(
                    bucket,
                    Level {
                        order_type: row.order_type,
                        price: row.price,
                        size: row.size,
                        last_update_id: row.last_update_id,
                    },
                );
            }
        }
    }
    latest.into_values().filter(|level| level.size > 0.0).collect()
}

/// Discrete percentile matching SQL `percentile_disc(q)`: `idx = ceil(q * n) - 1`,
/// clamped into range. `prices` need not be sorted; `q` in `[0, 1]`.
fn discrete_percentile(prices: &[f64], q: f64) -> Option<f64> {
    if prices.is_empty() {
        return None;
    }
    let mut sorted = prices.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = sorted.len();
    let idx = (q * n as f64).ceil() as isize - 1;
    let idx = idx.clamp(0, n as isize - 1) as usize;
    Some(sorted[idx])
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_stddev(values: &[f64]) -> f64 {
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Aggregate statistics over one side of the book.
struct SideStats {
    count: usize,
    volume: f64,
    price_mean: f64,
    price_stddev: f64,
    price_median: f64,
}

fn side_stats(levels: &[&Level]) -> SideStats {
    let prices: Vec<f64> = levels.iter().map(|l| l.price).collect();
    SideStats {
        count: levels.len(),
        volume: levels.iter().map(|l| l.price * l.size).sum(),
        price_mean: mean(&prices),
        price_stddev: population_stddev(&prices),
        price_median: median(&prices),
    }
}

/// `size` at the extremum price; if several rows share it, the maximum size
/// among them.
fn size_at_extremum<'a>(levels: &[&'a Level], extremum: f64) -> f64 {
    levels
        .iter()
        .filter(|l| l.price == extremum)
        .map(|l| l.size)
        .fold(0.0, f64::max)
}

fn snapshot_at(
    exchange_id: i64,
    market: &MarketKey,
    timestamp: DateTime<Utc>,
    book: &[Level],
) -> Option<OrderBookSnapshot> {
    let bids: Vec<&Level> = book.iter().filter(|l| l.order_type == AggOrderType::Bid).collect();
    let asks: Vec<&Level> = book.iter().filter(|l| l.order_type == AggOrderType::Ask).collect();

    // Empty book (either side) -> skip tick.
    if bids.is_empty() || asks.is_empty() {
        return None;
    }

    let bid_prices: Vec<f64> = bids.iter().map(|l| l.price).collect();
    let ask_prices: Vec<f64> = asks.iter().map(|l| l.price).collect();

    let max_bid_price = bid_prices.iter().cloned().fold(f64::MIN, f64::max);
    let min_ask_price = ask_prices.iter().cloned().fold(f64::MAX, f64::min);
    let max_bid_size = size_at_extremum(&bids, max_bid_price);
    let min_ask_size = size_at_extremum(&asks, min_ask_price);

    let full_bids = side_stats(&bids);
    let full_asks = side_stats(&asks);

    // Quartile sub-book: bids >= Q3(bid prices), asks <= Q1(ask prices). The
    // percentile is always one of the existing prices, so both subsets are
    // non-empty whenever `bids`/`asks` are.
    let bid_q3 = discrete_percentile(&bid_prices, 0.75).expect("bids is non-empty");
    let ask_q1 = discrete_percentile(&ask_prices, 0.25).expect("asks is non-empty");

    let quartile_bids: Vec<&Level> = bids.iter().copied().filter(|l| l.price >= bid_q3).collect();
    let quartile_asks: Vec<&Level> = asks.iter().copied().filter(|l| l.price <= ask_q1).collect();

    let quartile_bids_stats = side_stats(&quartile_bids);
    let quartile_asks_stats = side_stats(&quartile_asks);

    let bid_price_upper_quartile = quartile_bids
        .iter()
        .map(|l| l.price)
        .fold(f64::MAX, f64::min);
    let ask_price_lower_quartile = quartile_asks
        .iter()
        .map(|l| l.price)
        .fold(f64::MIN, f64::max);

    Some(OrderBookSnapshot {
        exchange_id,
        market: market.clone(),
        timestamp,
        spread: min_ask_price - max_bid_price,
        bids_count: full_bids.count,
        asks_count: full_asks.count,
        bids_volume: full_bids.volume,
        asks_volume: full_asks.volume,
        bids_price_mean: full_bids.price_mean,
        asks_price_mean: full_asks.price_mean,
        bids_price_stddev: full_bids.price_stddev,
        asks_price_stddev: full_asks.price_stddev,
        bid_price_median: full_bids.price_median,
        ask_price_median: full_asks.price_median,
        min_ask_price,
        min_ask_size,
        max_bid_price,
        max_bid_size,
        bid_price_upper_quartile,
        ask_price_lower_quartile,
        bids_volume_upper_quartile: quartile_bids_stats.volume,
        asks_volume_lower_quartile: quartile_asks_stats.volume,
        bids_count_upper_quartile: quartile_bids_stats.count,
        asks_count_lower_quartile: quartile_asks_stats.count,
        bids_price_stddev_upper_quartile: quartile_bids_stats.price_stddev,
        asks_price_stddev_lower_quartile: quartile_asks_stats.price_stddev,
        bids_price_mean_upper_quartile: quartile_bids_stats.price_mean,
        asks_price_mean_lower_quartile: quartile_asks_stats.price_mean,
    })
}
