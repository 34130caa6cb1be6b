use serde::{Deserialize, Serialize};

/// A venue-agnostic coin pair, always stored in canonical (lexicographic) order.
///
/// Never construct `MarketKey` field-by-field directly outside this module —
/// always go through [`MarketKey::canonicalize`] so the ordering invariant
/// can't be forgotten at a call site.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Deserialize, Serialize)]
pub struct MarketKey {
    first: String,
    second: String,
}

impl MarketKey {
    /// Build a `MarketKey` from two coin symbols, sorting them lexicographically.
    pub fn canonicalize(a: impl Into<String>, b: impl Into<String>) -> Self {
        let mut a = a.into().to_uppercase();
        let mut b = b.into().to_uppercase();
        if b < a {
            std::mem::swap(&mut a, &mut b);
        }
        Self {
            first: a,
            second: b,
        }
    }

    pub fn first_coin(&self) -> &str {
        &self.first
    }

    pub fn second_coin(&self) -> &str {
        &self.second
    }
}

/// A venue-agnostic market: the canonical pair of coins it trades.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct Market {
    pub key: MarketKey,
}

impl Market {
    pub fn new(key: MarketKey) -> Self {
        Self { key }
    }
}

/// Per-venue instance of a [`Market`], carrying the venue's reported quoted
/// volume and its USD-normalised counterpart (populated later out of scope).
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct ExchangeMarket {
    pub market: MarketKey,
    pub exchange_id: i64,
    /// The coin symbol the reported volume is denominated in.
    pub quoted_volume_id: String,
    pub quoted_volume: Option<f64>,
    pub quoted_vol_timestamp: Option<chrono::DateTime<chrono::Utc>>,
    pub volume_usd: Option<f64>,
    pub vol_usd_timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

impl ExchangeMarket {
    pub fn merge_from(&mut self, other: &ExchangeMarket) {
        if other.quoted_volume.is_some() {
            self.quoted_volume = other.quoted_volume;
        }
        if other.quoted_vol_timestamp.is_some() {
            self.quoted_vol_timestamp = other.quoted_vol_timestamp;
        }
        if other.volume_usd.is_some() {
            self.volume_usd = other.volume_usd;
        }
        if other.vol_usd_timestamp.is_some() {
            self.vol_usd_timestamp = other.vol_usd_timestamp;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_sorts_lexicographically() {
        // venue symbol "LTCBTC" (base LTC, quote BTC)
        let key = MarketKey::canonicalize("LTC", "BTC");
        assert_eq!(key.first_coin(), "BTC");
        assert_eq!(key.second_coin(), "LTC");
    }

    #[test]
    fn canonicalize_is_order_independent() {
        let a = MarketKey::canonicalize("eth", "btc");
        let b = MarketKey::canonicalize("btc", "eth");
        assert_eq!(a, b);
    }
}
