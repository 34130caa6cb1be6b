//! Domain model shared by every parser, the action layer, and the store.
//!
//! Reference entities (`Coin`, `Exchange`, `Market`, `ExchangeMarket`) are
//! created on venue bootstrap and updated by the (out of scope) volume/price
//! utilities. Event entities (`Order`, `Trade`, `AggOrder`, sizes, funds) are
//! append-only during ingestion. `OrderBookSnapshot`s are written only by the
//! snapshot generator.

pub mod agg_order;
pub mod coin;
pub mod exchange;
pub mod market;
pub mod order;
pub mod snapshot;
pub mod trade;

pub use agg_order::{AggOrder, AggOrderType};
pub use coin::Coin;
pub use exchange::Exchange;
pub use market::{ExchangeMarket, Market, MarketKey};
pub use order::{MarketOrderFunds, Order, OrderKey, OrderSide, OrderSize, OrderType};
pub use snapshot::OrderBookSnapshot;
pub use trade::{Trade, TradeSide};

/// Any entity the action layer can insert. `execute(store)` never writes raw
/// SQL for these directly — it always goes through an [`crate::action::ActionSink`].
#[derive(Clone, PartialEq, Debug)]
pub enum Entity {
    Coin(Coin),
    Exchange(Exchange),
    Market(Market),
    ExchangeMarket(ExchangeMarket),
    Order(Order),
    OrderSize(OrderSize),
    MarketOrderFunds(MarketOrderFunds),
    Trade(Trade),
    AggOrder(AggOrder),
    OrderBookSnapshot(OrderBookSnapshot),
}

/// Primary key of an [`Entity`], used to coalesce duplicate inserts within a
/// batch ("last write wins within a batch") and to address [`Entity::Update`]
/// and [`Entity::Cancel`] actions.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum EntityKey {
    Coin(String),
    Exchange(i64),
    Market(MarketKey),
    ExchangeMarket(MarketKey, i64),
    Order(OrderKey),
    OrderSize(OrderKey, chrono::DateTime<chrono::Utc>),
    MarketOrderFunds(OrderKey, chrono::DateTime<chrono::Utc>),
    Trade(String),
    AggOrder(i64, MarketKey, AggOrderType, ordered_float::OrderedPrice, i64),
    OrderBookSnapshot(i64, MarketKey, chrono::DateTime<chrono::Utc>),
}

impl Entity {
    pub fn key(&self) -> EntityKey {
        match self {
            Entity::Coin(c) => EntityKey::Coin(c.symbol.clone()),
            Entity::Exchange(e) => EntityKey::Exchange(e.id),
            Entity::Market(m) => EntityKey::Market(m.key.clone()),
            Entity::ExchangeMarket(em) => {
                EntityKey::ExchangeMarket(em.market.clone(), em.exchange_id)
            }
            Entity::Order(o) => EntityKey::Order(o.key.clone()),
            Entity::OrderSize(s) => EntityKey::OrderSize(s.order.clone(), s.timestamp),
            Entity::MarketOrderFunds(f) => {
                EntityKey::MarketOrderFunds(f.order.clone(), f.timestamp)
            }
            Entity::Trade(t) => EntityKey::Trade(t.id.clone()),
            Entity::AggOrder(a) => EntityKey::AggOrder(
                a.exchange_id,
                a.market.clone(),
                a.order_type,
                ordered_float::OrderedPrice(a.price),
                a.last_update_id,
            ),
            Entity::OrderBookSnapshot(s) => {
                EntityKey::OrderBookSnapshot(s.exchange_id, s.market.clone(), s.timestamp)
            }
        }
    }

    /// Merge `other`'s fields into `self` for entities that support
    /// insert-as-merge (reference entities); event entities are append-only
    /// and simply overwrite on collision.
    pub fn merge_from(&mut self, other: &Entity) {
        match (self, other) {
            (Entity::Coin(a), Entity::Coin(b)) => a.merge_from(b),
            (Entity::ExchangeMarket(a), Entity::ExchangeMarket(b)) => a.merge_from(b),
            (Entity::Order(a), Entity::Order(b)) => a.merge_from(b),
            (a, b) => *a = b.clone(),
        }
    }
}

/// Tiny local replacement for a total-ordering float wrapper. `AggOrder` price
/// only ever flows through here as part of a key for in-batch deduplication;
/// NaN/Inf are rejected before an `AggOrder` is ever constructed (see
/// `listener::numeric::parse_finite_f64`), so bit-pattern equality is safe.
pub mod ordered_float {
    #[derive(Clone, Copy, Debug)]
    pub struct OrderedPrice(pub f64);

    impl PartialEq for OrderedPrice {
        fn eq(&self, other: &Self) -> bool {
            self.0.to_bits() == other.0.to_bits()
        }
    }
    impl Eq for OrderedPrice {}
    impl std::hash::Hash for OrderedPrice {
        fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
            self.0.to_bits().hash(state);
        }
    }
}
