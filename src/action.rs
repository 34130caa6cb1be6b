//! The action algebra: a small set of persistence intents, decoupled from when
//! and how they are committed. Parsers emit [`Action`]s; nothing else in the
//! pipeline writes to the store directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{Entity, EntityKey, OrderKey};

/// A bounded set of field deltas an [`Action::Update`] can apply. Kept
/// explicit per entity kind rather than a generic reflective patch, matching
/// the "no runtime reflection" design note for the listener registry.
#[derive(Clone, Debug, PartialEq)]
pub enum Delta {
    Coin {
        name: Option<String>,
        price_usd: Option<f64>,
        last_price_updated: Option<DateTime<Utc>>,
    },
    ExchangeMarket {
        volume_usd: Option<f64>,
        vol_usd_timestamp: Option<DateTime<Utc>>,
    },
}

#[derive(Clone, Debug)]
pub enum Action {
    /// Add each entity to the pending transaction. Duplicates by primary key
    /// within one `Insert` are coalesced — last write wins within the batch.
    Insert(Vec<Entity>),
    /// Mutate fields of the row addressed by `key`; a no-op if the row is absent.
    Update { key: EntityKey, delta: Delta },
    /// Set `cancelled_at` on the `Order` addressed by `order`.
    Cancel {
        order: OrderKey,
        cancelled_at: DateTime<Utc>,
    },
}

impl Action {
    /// Build an `Insert` action, coalescing duplicate keys within `entities`
    /// (last write wins) before it ever reaches a sink.
    pub fn insert(entities: Vec<Entity>) -> Self {
        let mut by_key: Vec<(EntityKey, Entity)> = Vec::with_capacity(entities.len());
        for entity in entities {
            let key = entity.key();
            if let Some(slot) = by_key.iter_mut().find(|(k, _)| *k == key) {
                slot.1 = entity;
            } else {
                by_key.push((key, entity));
            }
        }
        Action::Insert(by_key.into_iter().map(|(_, e)| e).collect())
    }

    pub async fn execute(&self, sink: &mut dyn ActionSink) -> Result<(), ActionError> {
        match self {
            Action::Insert(entities) => sink.insert(entities).await,
            Action::Update { key, delta } => sink.update(key, delta).await,
            Action::Cancel {
                order,
                cancelled_at,
            } => sink.cancel(order, *cancelled_at).await,
        }
    }
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("store constraint violated while applying action: {0}")]
    Constraint(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Object-safe collaborator an [`Action`] executes itself against. Implemented
/// by the real `PgActionSink` (wrapping a `sqlx` transaction) and by the
/// in-memory test fake, so actions stay decoupled from the backend.
#[async_trait]
pub trait ActionSink: Send {
    async fn insert(&mut self, entities: &[Entity]) -> Result<(), ActionError>;
    async fn update(&mut self, key: &EntityKey, delta: &Delta) -> Result<(), ActionError>;
    async fn cancel(
        &mut self,
        order: &OrderKey,
        cancelled_at: DateTime<Utc>,
    ) -> Result<(), ActionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Coin;

    #[test]
    fn insert_coalesces_duplicate_keys_last_write_wins() {
        let action = Action::insert(vec![
            Entity::Coin(Coin {
                symbol: "BTC".into(),
                name: Some("Bitcoin (old)".into()),
                price_usd: None,
                last_price_updated: None,
            }),
            Entity::Coin(Coin {
                symbol: "BTC".into(),
                name: Some("Bitcoin".into()),
                price_usd: None,
                last_price_updated: None,
            }),
        ]);

        match action {
            Action::Insert(entities) => {
                assert_eq!(entities.len(), 1);
                match &entities[0] {
                    Entity::Coin(c) => assert_eq!(c.name.as_deref(), Some("Bitcoin")),
                    _ => panic!("expected Coin"),
                }
            }
            _ => panic!("expected Insert"),
        }
    }
}
