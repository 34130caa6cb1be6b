//! Explicit `{venue -> constructor}` registry populated once at startup — no
//! decorator-based reflection.

use std::collections::HashMap;

use crate::config::VenueConfig;
use crate::error::ListenerError;
use crate::listener::hitbtc::HitBtcParser;
use crate::listener::websocket::WebsocketListener;
use crate::listener::{ActionSender, ExchangeListener};
use crate::model::Exchange;

type Constructor = fn(Exchange, VenueConfig, ActionSender) -> Box<dyn ExchangeListener>;

/// All venues this build knows how to listen to, keyed by their registered
/// name (matches the `<VENUE>` prefix in configuration, e.g. `"hitbtc"`).
pub struct ListenerRegistry {
    constructors: HashMap<&'static str, Constructor>,
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        let mut constructors: HashMap<&'static str, Constructor> = HashMap::new();
        constructors.insert("hitbtc", construct_hitbtc as Constructor);
        Self { constructors }
    }
}

fn construct_hitbtc(
    exchange: Exchange,
    config: VenueConfig,
    on_event: ActionSender,
) -> Box<dyn ExchangeListener> {
    let parser = HitBtcParser::new(
        exchange,
        config.ws_url,
        config.api_base,
        config.api_key,
        config.markets,
    );
    Box::new(WebsocketListener::new(parser, on_event))
}

impl ListenerRegistry {
    /// Every registered venue name, in registration order.
    pub fn registered(&self) -> Vec<&'static str> {
        self.constructors.keys().copied().collect()
    }

    pub fn build(
        &self,
        exchange: Exchange,
        config: VenueConfig,
        on_event: ActionSender,
    ) -> Result<Box<dyn ExchangeListener>, ListenerError> {
        let constructor = self
            .constructors
            .get(exchange.name.as_str())
            .ok_or_else(|| ListenerError::UnknownVenue(exchange.name.clone()))?;
        Ok(constructor(exchange, config, on_event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hitbtc_is_registered() {
        let registry = ListenerRegistry::default();
        assert!(registry.registered().contains(&"hitbtc"));
    }

    #[test]
    fn unknown_venue_is_rejected() {
        let registry = ListenerRegistry::default();
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let exchange = Exchange::new(99, "not-a-real-venue");
        let config = VenueConfig {
            name: exchange.name.clone(),
            ws_url: String::new(),
            api_base: String::new(),
            api_key: String::new(),
            markets: vec![],
        };
        assert!(registry.build(exchange, config, tx).is_err());
    }
}
