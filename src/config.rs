//! Environment-driven configuration. Unknown venues or missing credentials
//! are a fatal [`ConfigError`] at startup — never silently defaulted.

use std::env;

use crate::error::ConfigError;

/// A `"BASE_QUOTE"` market pair as configured via `<VENUE>_MARKETS`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ConfiguredMarket {
    pub base: String,
    pub quote: String,
}

#[derive(Clone, Debug)]
pub struct VenueConfig {
    pub name: String,
    pub ws_url: String,
    pub api_base: String,
    pub api_key: String,
    pub markets: Vec<ConfiguredMarket>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub db_url: String,
    pub venues: Vec<VenueConfig>,
}

fn required_var(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

/// Require a variable and validate it parses as a URL, without discarding
/// the original string form — listeners take plain URL strings, not a
/// parsed `Url`.
fn required_url_var(name: &str) -> Result<String, ConfigError> {
    let raw = required_var(name)?;
    url::Url::parse(&raw).map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value: raw.clone(),
    })?;
    Ok(raw)
}

fn parse_markets(name: &str, raw: &str) -> Result<Vec<ConfiguredMarket>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let mut parts = pair.splitn(2, '_');
            match (parts.next(), parts.next()) {
                (Some(base), Some(quote)) if !base.is_empty() && !quote.is_empty() => {
                    Ok(ConfiguredMarket {
                        base: base.to_uppercase(),
                        quote: quote.to_uppercase(),
                    })
                }
                _ => Err(ConfigError::InvalidValue {
                    name: name.to_string(),
                    value: pair.to_string(),
                }),
            }
        })
        .collect()
}

impl Config {
    /// Load `DB_URL` plus one [`VenueConfig`] per name in `venue_names` from
    /// the process environment.
    pub fn from_env(venue_names: &[&str]) -> Result<Self, ConfigError> {
        let db_url = required_var("DB_URL")?;

        let venues = venue_names
            .iter()
            .map(|venue| {
                let upper = venue.to_uppercase();
                let markets_raw = required_var(&format!("{upper}_MARKETS"))?;
                Ok(VenueConfig {
                    name: venue.to_string(),
                    ws_url: required_url_var(&format!("{upper}_WS_URL"))?,
                    api_base: required_url_var(&format!("{upper}_API"))?,
                    api_key: required_var(&format!("{upper}_API_KEY"))?,
                    markets: parse_markets(&format!("{upper}_MARKETS"), &markets_raw)?,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self { db_url, venues })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_markets_splits_base_and_quote() {
        let markets = parse_markets("HITBTC_MARKETS", "btc_usd, eth_usd").unwrap();
        assert_eq!(
            markets,
            vec![
                ConfiguredMarket {
                    base: "BTC".into(),
                    quote: "USD".into()
                },
                ConfiguredMarket {
                    base: "ETH".into(),
                    quote: "USD".into()
                },
            ]
        );
    }

    #[test]
    fn parse_markets_rejects_malformed_pair() {
        let err = parse_markets("HITBTC_MARKETS", "btcusd").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn required_url_var_rejects_non_url_values() {
        let err = required_url_var("__TIDEWATCH_TEST_NOT_SET__").unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(_)));
    }
}
