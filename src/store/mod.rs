//! Durable backing for entities and events: transactional batch commit plus
//! the queries the snapshot generator needs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::action::Action;
use crate::error::StoreError;
use crate::model::{AggOrder, MarketKey, OrderBookSnapshot};

/// Earliest observed aggregate-order timestamp for one (exchange, market)
/// pair — used to seed the snapshot generator's starting point.
#[derive(Clone, PartialEq, Debug)]
pub struct MarketHistoryStart {
    pub exchange_id: i64,
    pub exchange_name: String,
    pub market: MarketKey,
    pub earliest_timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Commit a batch of actions transactionally, in buffer order, within a
    /// single transaction. On a constraint violation the whole batch is
    /// retried once with per-action isolation — offending actions are
    /// logged and skipped, the rest still commit. Returns the number of
    /// actions actually committed.
    async fn commit_batch(&self, actions: &[Action]) -> Result<usize, StoreError>;

    /// Every (exchange, market) pair with any `AggOrder` history among the
    /// named exchanges, with the earliest timestamp observed for each.
    async fn markets_with_agg_history(
        &self,
        exchange_names: &[String],
    ) -> Result<Vec<MarketHistoryStart>, StoreError>;

    /// All `AggOrder` rows for `(exchange_id, market)` with `timestamp <= until`.
    /// Point-in-time reduction (latest `last_update_id` per price level) is
    /// performed by the caller in application code, not by this query.
    async fn agg_orders_until(
        &self,
        exchange_id: i64,
        market: &MarketKey,
        until: DateTime<Utc>,
    ) -> Result<Vec<AggOrder>, StoreError>;

    /// Persist a batch of snapshots, upserting on `(exchange_id, market,
    /// timestamp)` so re-running the generator over the same window is
    /// idempotent.
    async fn insert_snapshots(&self, snapshots: &[OrderBookSnapshot]) -> Result<(), StoreError>;
}
