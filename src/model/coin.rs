use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A traded asset, keyed by its uppercase ticker symbol.
///
/// `name`, `price_usd` and `last_price_updated` are populated later by the
/// (out of scope) USD-price enrichment utility, so they start out `None`.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct Coin {
    pub symbol: String,
    pub name: Option<String>,
    pub price_usd: Option<f64>,
    pub last_price_updated: Option<DateTime<Utc>>,
}

impl Coin {
    /// Construct a `Coin`, upper-casing the symbol per the canonical-symbol invariant.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into().to_uppercase(),
            name: None,
            price_usd: None,
            last_price_updated: None,
        }
    }

    /// Merge `other` into `self`, keeping `self`'s fields wherever `other` leaves them unset.
    ///
    /// This is the insert-conflict resolution rule from the action layer: "only fields
    /// present in the new entity overwrite".
    pub fn merge_from(&mut self, other: &Coin) {
        if other.name.is_some() {
            self.name = other.name.clone();
        }
        if other.price_usd.is_some() {
            self.price_usd = other.price_usd;
        }
        if other.last_price_updated.is_some() {
            self.last_price_updated = other.last_price_updated;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_coin_uppercases_symbol() {
        let coin = Coin::new("btc");
        assert_eq!(coin.symbol, "BTC");
    }

    #[test]
    fn merge_only_overwrites_present_fields() {
        let mut existing = Coin {
            symbol: "BTC".into(),
            name: Some("Bitcoin".into()),
            price_usd: Some(50_000.0),
            last_price_updated: None,
        };
        let update = Coin {
            symbol: "BTC".into(),
            name: None,
            price_usd: Some(51_000.0),
            last_price_updated: None,
        };
        existing.merge_from(&update);
        assert_eq!(existing.name.as_deref(), Some("Bitcoin"));
        assert_eq!(existing.price_usd, Some(51_000.0));
    }
}
