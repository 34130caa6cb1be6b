//! `sqlx`-backed [`Store`] implementation. Insert-as-merge ("only fields
//! present in the new entity overwrite") is expressed directly as
//! `ON CONFLICT ... DO UPDATE SET col = COALESCE(EXCLUDED.col, table.col)`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::action::{Action, ActionError, ActionSink, Delta};
use crate::error::StoreError;
use crate::model::{AggOrder, AggOrderType, Entity, EntityKey, MarketKey, OrderBookSnapshot, OrderKey};

use super::{MarketHistoryStart, Store};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn commit_all(&self, actions: &[Action]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        {
            let mut sink = PgActionSink { tx: &mut tx };
            for action in actions {
                action
                    .execute(&mut sink)
                    .await
                    .map_err(StoreError::from)?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn commit_each_isolated(&self, actions: &[Action]) -> Result<usize, StoreError> {
        let mut committed = 0;
        for action in actions {
            let mut tx = self.pool.begin().await?;
            let outcome = {
                let mut sink = PgActionSink { tx: &mut tx };
                action.execute(&mut sink).await
            };
            match outcome {
                Ok(()) => {
                    tx.commit().await?;
                    committed += 1;
                }
                Err(error) => {
                    tracing::warn!(%error, ?action, "dropping offending action after isolated retry");
                    tx.rollback().await?;
                }
            }
        }
        Ok(committed)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn commit_batch(&self, actions: &[Action]) -> Result<usize, StoreError> {
        match self.commit_all(actions).await {
            Ok(()) => Ok(actions.len()),
            Err(StoreError::Constraint(reason)) => {
                tracing::warn!(reason, "batch commit violated a constraint, retrying in isolation");
                self.commit_each_isolated(actions).await
            }
            Err(error) => Err(error),
        }
    }

    async fn markets_with_agg_history(
        &self,
        exchange_names: &[String],
    ) -> Result<Vec<MarketHistoryStart>, StoreError> {
        let rows: Vec<(i64, String, String, String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            select exchanges.id, exchanges.name, aggregate_orders.first_coin, aggregate_orders.second_coin,
                   min(aggregate_orders.timestamp) as earliest
            from aggregate_orders
            inner join exchanges on aggregate_orders.exchange_id = exchanges.id
            where exchanges.name = any($1)
            group by exchanges.id, exchanges.name, aggregate_orders.first_coin, aggregate_orders.second_coin
            "#,
        )
        .bind(exchange_names)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(exchange_id, exchange_name, first, second, earliest_timestamp)| {
                MarketHistoryStart {
                    exchange_id,
                    exchange_name,
                    market: MarketKey::canonicalize(first, second),
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
        let rows: Vec<(String, f64, f64, i64, DateTime<Utc>)> = sqlx::query_as(
            r#"
            select order_type, price, size, last_update_id, timestamp
            from aggregate_orders
            where exchange_id = $1 and first_coin = $2 and second_coin = $3 and timestamp <= $4
            "#,
        )
        .bind(exchange_id)
        .bind(market.first_coin())
        .bind(market.second_coin())
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(order_type, price, size, last_update_id, timestamp)| {
                let order_type = match order_type.as_str() {
                    "bid" => AggOrderType::Bid,
                    "ask" => AggOrderType::Ask,
                    _ => return None,
                };
                Some(AggOrder {
                    exchange_id,
                    market: market.clone(),
                    order_type,
                    price,
                    size,
                    last_update_id,
                    timestamp,
                })
            })
            .collect())
    }

    async fn insert_snapshots(&self, snapshots: &[OrderBookSnapshot]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for snapshot in snapshots {
            insert_snapshot(&mut tx, snapshot).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

struct PgActionSink<'a, 'b> {
    tx: &'a mut Transaction<'b, Postgres>,
}

#[async_trait]
impl<'a, 'b> ActionSink for PgActionSink<'a, 'b> {
    async fn insert(&mut self, entities: &[Entity]) -> Result<(), ActionError> {
        for entity in entities {
            insert_entity(self.tx, entity)
                .await
                .map_err(|error| ActionError::Constraint(error.to_string()))?;
        }
        Ok(())
    }

    async fn update(&mut self, key: &EntityKey, delta: &Delta) -> Result<(), ActionError> {
        apply_update(self.tx, key, delta)
            .await
            .map_err(|error| ActionError::Constraint(error.to_string()))
    }

    async fn cancel(
        &mut self,
        order: &OrderKey,
        cancelled_at: DateTime<Utc>,
    ) -> Result<(), ActionError> {
        sqlx::query("update orders set cancelled_at = $1 where exchange_id = $2 and exchange_order_id = $3")
            .bind(cancelled_at)
            .bind(order.exchange_id)
            .bind(&order.exchange_order_id)
            .execute(&mut **self.tx)
            .await
            .map_err(|error| ActionError::Constraint(error.to_string()))?;
        Ok(())
    }
}

async fn insert_entity(
    tx: &mut Transaction<'_, Postgres>,
    entity: &Entity,
) -> Result<(), sqlx::Error> {
    match entity {
        Entity::Coin(coin) => {
            sqlx::query(
                r#"
                insert into coins (symbol, name, price_usd, last_price_updated)
                values ($1, $2, $3, $4)
                on conflict (symbol) do update set
                    name = coalesce(excluded.name, coins.name),
                    price_usd = coalesce(excluded.price_usd, coins.price_usd),
                    last_price_updated = coalesce(excluded.last_price_updated, coins.last_price_updated)
                "#,
            )
            .bind(&coin.symbol)
            .bind(&coin.name)
            .bind(coin.price_usd)
            .bind(coin.last_price_updated)
            .execute(&mut **tx)
            .await?;
        }
        Entity::Exchange(exchange) => {
            sqlx::query(
                "insert into exchanges (id, name) values ($1, $2) on conflict (id) do update set name = excluded.name",
            )
            .bind(exchange.id)
            .bind(&exchange.name)
            .execute(&mut **tx)
            .await?;
        }
        Entity::Market(market) => {
            sqlx::query(
                "insert into markets (first_coin, second_coin) values ($1, $2) on conflict (first_coin, second_coin) do nothing",
            )
            .bind(market.key.first_coin())
            .bind(market.key.second_coin())
            .execute(&mut **tx)
            .await?;
        }
        Entity::ExchangeMarket(em) => {
            sqlx::query(
                r#"
                insert into exchange_markets
                    (first_coin, second_coin, exchange_id, quoted_volume_id, quoted_volume, quoted_vol_timestamp, volume_usd, vol_usd_timestamp)
                values ($1, $2, $3, $4, $5, $6, $7, $8)
                on conflict (first_coin, second_coin, exchange_id) do update set
                    quoted_volume = coalesce(excluded.quoted_volume, exchange_markets.quoted_volume),
                    quoted_vol_timestamp = coalesce(excluded.quoted_vol_timestamp, exchange_markets.quoted_vol_timestamp),
                    volume_usd = coalesce(excluded.volume_usd, exchange_markets.volume_usd),
                    vol_usd_timestamp = coalesce(excluded.vol_usd_timestamp, exchange_markets.vol_usd_timestamp)
                "#,
            )
            .bind(em.market.first_coin())
            .bind(em.market.second_coin())
            .bind(em.exchange_id)
            .bind(&em.quoted_volume_id)
            .bind(em.quoted_volume)
            .bind(em.quoted_vol_timestamp)
            .bind(em.volume_usd)
            .bind(em.vol_usd_timestamp)
            .execute(&mut **tx)
            .await?;
        }
        Entity::Order(order) => {
            sqlx::query(
                r#"
                insert into orders
                    (exchange_id, exchange_order_id, side, order_type, price, placed_at, filled_at, expiry, cancelled_at)
                values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                on conflict (exchange_id, exchange_order_id) do update set
                    price = coalesce(excluded.price, orders.price),
                    filled_at = coalesce(excluded.filled_at, orders.filled_at),
                    expiry = coalesce(excluded.expiry, orders.expiry),
                    cancelled_at = coalesce(excluded.cancelled_at, orders.cancelled_at)
                "#,
            )
            .bind(order.key.exchange_id)
            .bind(&order.key.exchange_order_id)
            .bind(order.side.to_string())
            .bind(order.order_type.to_string())
            .bind(order.price)
            .bind(order.placed_at)
            .bind(order.filled_at)
            .bind(order.expiry)
            .bind(order.cancelled_at)
            .execute(&mut **tx)
            .await?;
        }
        Entity::OrderSize(size) => {
            sqlx::query(
                "insert into order_sizes (exchange_id, exchange_order_id, timestamp, size) values ($1, $2, $3, $4)",
            )
            .bind(size.order.exchange_id)
            .bind(&size.order.exchange_order_id)
            .bind(size.timestamp)
            .bind(size.size)
            .execute(&mut **tx)
            .await?;
        }
        Entity::MarketOrderFunds(funds) => {
            sqlx::query(
                "insert into market_order_funds (exchange_id, exchange_order_id, timestamp, funds) values ($1, $2, $3, $4)",
            )
            .bind(funds.order.exchange_id)
            .bind(&funds.order.exchange_order_id)
            .bind(funds.timestamp)
            .bind(funds.funds)
            .execute(&mut **tx)
            .await?;
        }
        Entity::Trade(trade) => {
            sqlx::query(
                r#"
                insert into trades
                    (id, exchange_id, first_coin, second_coin, timestamp, trade_type, maker, taker, price, size, maker_fee, taker_fee, buy_order_id, sell_order_id)
                values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                on conflict (id, exchange_id) do nothing
                "#,
            )
            .bind(&trade.id)
            .bind(trade.exchange_id)
            .bind(trade.market.first_coin())
            .bind(trade.market.second_coin())
            .bind(trade.timestamp)
            .bind(trade.trade_type.to_string())
            .bind(&trade.maker)
            .bind(&trade.taker)
            .bind(trade.price)
            .bind(trade.size)
            .bind(trade.maker_fee)
            .bind(trade.taker_fee)
            .bind(&trade.buy_order_id)
            .bind(&trade.sell_order_id)
            .execute(&mut **tx)
            .await?;
        }
        Entity::AggOrder(agg) => {
            let order_type = match agg.order_type {
                AggOrderType::Bid => "bid",
                AggOrderType::Ask => "ask",
            };
            sqlx::query(
                r#"
                insert into aggregate_orders
                    (exchange_id, first_coin, second_coin, order_type, price, size, last_update_id, timestamp)
                values ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(agg.exchange_id)
            .bind(agg.market.first_coin())
            .bind(agg.market.second_coin())
            .bind(order_type)
            .bind(agg.price)
            .bind(agg.size)
            .bind(agg.last_update_id)
            .bind(agg.timestamp)
            .execute(&mut **tx)
            .await?;
        }
        Entity::OrderBookSnapshot(snapshot) => {
            insert_snapshot(tx, snapshot).await?;
        }
    }
    Ok(())
}

async fn insert_snapshot(
    tx: &mut Transaction<'_, Postgres>,
    snapshot: &OrderBookSnapshot,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        insert into order_book_snapshots
            (exchange_id, first_coin, second_coin, timestamp, spread, bids_count, asks_count,
             bids_volume, asks_volume, bids_price_mean, asks_price_mean, bids_price_stddev, asks_price_stddev,
             bid_price_median, ask_price_median, min_ask_price, min_ask_size, max_bid_price, max_bid_size,
             bid_price_upper_quartile, ask_price_lower_quartile, bids_volume_upper_quartile, asks_volume_lower_quartile,
             bids_count_upper_quartile, asks_count_lower_quartile, bids_price_stddev_upper_quartile,
             asks_price_stddev_lower_quartile, bids_price_mean_upper_quartile, asks_price_mean_lower_quartile)
        values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22,$23,$24,$25,$26,$27,$28,$29)
        on conflict (exchange_id, first_coin, second_coin, timestamp) do update set
            spread = excluded.spread,
            bids_count = excluded.bids_count,
            asks_count = excluded.asks_count
        "#,
    )
    .bind(snapshot.exchange_id)
    .bind(snapshot.market.first_coin())
    .bind(snapshot.market.second_coin())
    .bind(snapshot.timestamp)
    .bind(snapshot.spread)
    .bind(snapshot.bids_count as i64)
    .bind(snapshot.asks_count as i64)
    .bind(snapshot.bids_volume)
    .bind(snapshot.asks_volume)
    .bind(snapshot.bids_price_mean)
    .bind(snapshot.asks_price_mean)
    .bind(snapshot.bids_price_stddev)
    .bind(snapshot.asks_price_stddev)
    .bind(snapshot.bid_price_median)
    .bind(snapshot.ask_price_median)
    .bind(snapshot.min_ask_price)
    .bind(snapshot.min_ask_size)
    .bind(snapshot.max_bid_price)
    .bind(snapshot.max_bid_size)
    .bind(snapshot.bid_price_upper_quartile)
    .bind(snapshot.ask_price_lower_quartile)
    .bind(snapshot.bids_volume_upper_quartile)
    .bind(snapshot.asks_volume_lower_quartile)
    .bind(snapshot.bids_count_upper_quartile as i64)
    .bind(snapshot.asks_count_lower_quartile as i64)
    .bind(snapshot.bids_price_stddev_upper_quartile)
    .bind(snapshot.asks_price_stddev_lower_quartile)
    .bind(snapshot.bids_price_mean_upper_quartile)
    .bind(snapshot.asks_price_mean_lower_quartile)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn apply_update(
    tx: &mut Transaction<'_, Postgres>,
    key: &EntityKey,
    delta: &Delta,
) -> Result<(), sqlx::Error> {
    match (key, delta) {
        (
            EntityKey::Coin(symbol),
            Delta::Coin {
                name,
                price_usd,
                last_price_updated,
            },
        ) => {
            sqlx::query(
                r#"
                update coins set
                    name = coalesce($2, name),
                    price_usd = coalesce($3, price_usd),
                    last_price_updated = coalesce($4, last_price_updated)
                where symbol = $1
                "#,
            )
            .bind(symbol)
            .bind(name)
            .bind(price_usd)
            .bind(last_price_updated)
            .execute(&mut **tx)
            .await?;
        }
        (
            EntityKey::ExchangeMarket(market, exchange_id),
            Delta::ExchangeMarket {
                volume_usd,
                vol_usd_timestamp,
            },
        ) => {
            sqlx::query(
                r#"
                update exchange_markets set
                    volume_usd = coalesce($4, volume_usd),
                    vol_usd_timestamp = coalesce($5, vol_usd_timestamp)
                where first_coin = $1 and second_coin = $2 and exchange_id = $3
                "#,
            )
            .bind(market.first_coin())
            .bind(market.second_coin())
            .bind(*exchange_id)
            .bind(volume_usd)
            .bind(vol_usd_timestamp)
            .execute(&mut **tx)
            .await?;
        }
        _ => {
            tracing::warn!(?key, "update delta does not match addressed entity kind; no-op");
        }
    }
    Ok(())
}
