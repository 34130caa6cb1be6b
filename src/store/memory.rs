//! In-memory [`Store`]/[`ActionSink`] fake. Implements the same
//! insert-as-merge semantics as the model's `merge_from` methods so unit
//! tests can exercise orchestrator, listener and snapshot logic without a
//! live Postgres instance.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::action::{Action, ActionError, ActionSink, Delta};
use crate::error::StoreError;
use crate::model::{AggOrder, Entity, EntityKey, MarketKey, OrderBookSnapshot, OrderKey};

use super::{MarketHistoryStart, Store};

#[derive(Default)]
struct Tables {
    entities: HashMap<EntityKey, Entity>,
    agg_orders: Vec<AggOrder>,
    snapshots: Vec<OrderBookSnapshot>,
}

/// An in-memory stand-in for [`super::postgres::PgStore`], backed by a single
/// mutex-guarded table map keyed by [`EntityKey`].
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entity currently held, for test assertions.
    pub fn entities(&self) -> Vec<Entity> {
        self.tables.lock().entities.values().cloned().collect()
    }

    pub fn get(&self, key: &EntityKey) -> Option<Entity> {
        self.tables.lock().entities.get(key).cloned()
    }

    /// Snapshot of every `OrderBookSnapshot` currently held, for test assertions.
    pub fn snapshots(&self) -> Vec<OrderBookSnapshot> {
        self.tables.lock().snapshots.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn commit_batch(&self, actions: &[Action]) -> Result<usize, StoreError> {
        let mut sink = MemoryActionSink {
            tables: &self.tables,
        };
        let mut committed = 0;
        for action in actions {
            match action.execute(&mut sink).await {
                Ok(()) => committed += 1,
                Err(error) => {
                    tracing::warn!(%error, ?action, "dropping offending action");
                }
            }
        }
        Ok(committed)
    }

    async fn markets_with_agg_history(
        &self,
        exchange_names: &[String],
    ) -> Result<Vec<MarketHistoryStart>, StoreError> {
        let tables = self.tables.lock();
        let mut by_key: HashMap<(i64, MarketKey), DateTime<Utc>> = HashMap::new();
        for agg in &tables.agg_orders {
            let exchange_name = match tables.entities.get(&EntityKey::Exchange(agg.exchange_id)) {
                Some(Entity::Exchange(e)) => e.name.clone(),
                _ => continue,
            };
            if !exchange_names.iter().any(|name| *name == exchange_name) {
                continue;
            }
            let entry = by_key
                .entry((agg.exchange_id, agg.market.clone()))
                .or_insert(agg.timestamp);
            if agg.timestamp < *entry {
                *entry = agg.timestamp;
            }
        }
        Ok(by_key
            .into_iter()
            .map(|((exchange_id, market), earliest_timestamp)| {
                let exchange_name = match tables.entities.get(&EntityKey::Exchange(exchange_id)) {
                    Some(Entity::Exchange(e)) => e.name.clone(),
                    _ => String::new(),
                };
                MarketHistoryStart {
                    exchange_id,
                    exchange_name,
                    market,
                    earliest_timestamp,
                }
            })
            .collect())
    }

    async fn agg_orders_until(
        &self,
        exchange_id: i64,
        market: &MarketKey,
        until: DateTime<Utc>,
    ) -> Result<Vec<AggOrder>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .agg_orders
            .iter()
            .filter(|a| a.exchange_id == exchange_id && &a.market == market && a.timestamp <= until)
            .cloned()
            .collect())
    }

    async fn insert_snapshots(&self, snapshots: &[OrderBookSnapshot]) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        for snapshot in snapshots {
            if let Some(existing) = tables.snapshots.iter_mut().find(|s| {
                s.exchange_id == snapshot.exchange_id
                    && s.market == snapshot.market
                    && s.timestamp == snapshot.timestamp
            }) {
                *existing = snapshot.clone();
            } else {
                tables.snapshots.push(snapshot.clone());
            }
        }
        Ok(())
    }
}

struct MemoryActionSink<'a> {
    tables: &'a Mutex<Tables>,
}

#[async_trait]
impl<'a> ActionSink for MemoryActionSink<'a> {
    async fn insert(&mut self, entities: &[Entity]) -> Result<(), ActionError> {
        let mut tables = self.tables.lock();
        for entity in entities {
            if let Entity::AggOrder(agg) = entity {
                tables.agg_orders.push(agg.clone());
                continue;
            }
            let key = entity.key();
            match tables.entities.get_mut(&key) {
                Some(existing) => existing.merge_from(entity),
                None => {
                    tables.entities.insert(key, entity.clone());
                }
            }
        }
        Ok(())
    }

    async fn update(&mut self, key: &EntityKey, delta: &Delta) -> Result<(), ActionError> {
        let mut tables = self.tables.lock();
        let Some(entity) = tables.entities.get_mut(key) else {
            return Ok(());
        };
        match (entity, delta) {
            (Entity::Coin(coin), Delta::Coin { name, price_usd, last_price_updated }) => {
                if name.is_some() {
                    coin.name = name.clone();
                }
                if price_usd.is_some() {
                    coin.price_usd = *price_usd;
                }
                if last_price_updated.is_some() {
                    coin.last_price_updated = *last_price_updated;
                }
            }
            (Entity::ExchangeMarket(em), Delta::ExchangeMarket { volume_usd, vol_usd_timestamp }) => {
                if volume_usd.is_some() {
                    em.volume_usd = *volume_usd;
                }
                if vol_usd_timestamp.is_some() {
                    em.vol_usd_timestamp = *vol_usd_timestamp;
                }
            }
            _ => {
                return Err(ActionError::Constraint(
                    "update delta does not match addressed entity kind".into(),
                ))
            }
        }
        Ok(())
    }

    async fn cancel(
        &mut self,
        order: &OrderKey,
        cancelled_at: DateTime<Utc>,
    ) -> Result<(), ActionError> {
        let mut tables = self.tables.lock();
        match tables.entities.get_mut(&EntityKey::Order(order.clone())) {
            Some(Entity::Order(o)) => {
                o.cancelled_at = Some(cancelled_at);
                Ok(())
            }
            _ => Err(ActionError::Constraint(format!(
                "no such order: {order:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Coin, Exchange};

    #[tokio::test]
    async fn insert_then_update_merges_by_presence() {
        let store = MemoryStore::new();
        store
            .commit_batch(&[Action::insert(vec![Entity::Coin(Coin::new("btc"))])])
            .await
            .unwrap();
        store
            .commit_batch(&[Action::Update {
                key: EntityKey::Coin("BTC".into()),
                delta: Delta::Coin {
                    name: Some("Bitcoin".into()),
                    price_usd: None,
                    last_price_updated: None,
                },
            }])
            .await
            .unwrap();

        match store.get(&EntityKey::Coin("BTC".into())).unwrap() {
            Entity::Coin(coin) => assert_eq!(coin.name.as_deref(), Some("Bitcoin")),
            _ => panic!("expected Coin"),
        }
    }

    #[tokio::test]
    async fn cancel_sets_cancelled_at_on_existing_order() {
        use crate::model::{Order, OrderSide, OrderType};

        let store = MemoryStore::new();
        store
            .commit_batch(&[Action::insert(vec![
                Entity::Exchange(Exchange::new(1, "hitbtc")),
                Entity::Order(Order {
                    key: OrderKey::new(1, "abc"),
                    side: OrderSide::Buy,
                    order_type: OrderType::Limit,
                    price: Some(100.0),
                    placed_at: Utc::now(),
                    filled_at: None,
                    expiry: None,
                    cancelled_at: None,
                }),
            ])])
            .await
            .unwrap();

        let now = Utc::now();
        store
            .commit_batch(&[Action::Cancel {
                order: OrderKey::new(1, "abc"),
                cancelled_at: now,
            }])
            .await
            .unwrap();

        match store.get(&EntityKey::Order(OrderKey::new(1, "abc"))).unwrap() {
            Entity::Order(o) => assert_eq!(o.cancelled_at, Some(now)),
            _ => panic!("expected Order"),
        }
    }

    #[tokio::test]
    async fn agg_orders_until_excludes_later_timestamps() {
        use crate::model::AggOrderType;

        let store = MemoryStore::new();
        let market = MarketKey::canonicalize("BTC", "USD");
        let early = AggOrder {
            exchange_id: 1,
            market: market.clone(),
            order_type: AggOrderType::Bid,
            price: 100.0,
            size: 1.0,
            last_update_id: 1,
            timestamp: Utc::now() - chrono::Duration::seconds(10),
        };
        let late = AggOrder {
            timestamp: Utc::now() + chrono::Duration::seconds(3600),
            last_update_id: 2,
            ..early.clone()
        };
        store
            .commit_batch(&[
                Action::insert(vec![Entity::AggOrder(early.clone())]),
                Action::insert(vec![Entity::AggOrder(late)]),
            ])
            .await
            .unwrap();

        let rows = store
            .agg_orders_until(1, &market, Utc::now())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].last_update_id, 1);
    }
}
