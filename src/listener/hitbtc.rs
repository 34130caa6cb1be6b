//! HitBTC venue parser: `snapshotOrderbook` → one `AggOrder` per bid/ask
//! level with the venue `sequence` as `last_update_id`;
//! `snapshotTrades`/`updateTrades` → one `Trade` per entry.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::action::Action;
use crate::config::ConfiguredMarket;
use crate::error::ListenerError;
use crate::listener::catalog::{SymbolCatalog, SymbolEntry};
use crate::listener::numeric::{parse_finite_f64, parse_timestamp};
use crate::listener::websocket::VenueParser;
use crate::model::{
    AggOrder, AggOrderType, Coin, Entity, Exchange as ExchangeModel, ExchangeMarket, Market,
    MarketKey, Trade, TradeSide,
};

const TRADES_LIMIT: u32 = 10;

pub struct HitBtcParser {
    exchange: ExchangeModel,
    ws_url: String,
    api_base: String,
    api_key: String,
    markets: Vec<ConfiguredMarket>,
    http: reqwest::Client,
}

impl HitBtcParser {
    pub fn new(
        exchange: ExchangeModel,
        ws_url: impl Into<String>,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        markets: Vec<ConfiguredMarket>,
    ) -> Self {
        Self {
            exchange,
            ws_url: ws_url.into(),
            api_base: api_base.into(),
            api_key: api_key.into(),
            markets,
            http: reqwest::Client::new(),
        }
    }

    fn market_from_symbol(&self, catalog: &SymbolCatalog, symbol: &str) -> Option<MarketKey> {
        catalog
            .lookup(symbol)
            .map(|(base, quote)| MarketKey::canonicalize(base, quote))
    }

    fn parse_snapshot_orderbook(
        &self,
        catalog: &SymbolCatalog,
        payload: &WsOrderbookSnapshot,
    ) -> Vec<Action> {
        let Some(market) = self.market_from_symbol(catalog, &payload.symbol) else {
            tracing::warn!(symbol = %payload.symbol, "no market found for orderbook snapshot");
            return vec![];
        };
        let Ok(timestamp) = parse_timestamp(&payload.timestamp) else {
            tracing::warn!(timestamp = %payload.timestamp, "unparseable orderbook timestamp");
            return vec![];
        };

        let mut orders = Vec::with_capacity(payload.bid.len() + payload.ask.len());
        for level in &payload.bid {
            if let Some(order) = self.convert_level(&market, AggOrderType::Bid, level, payload.sequence, timestamp) {
                orders.push(Entity::AggOrder(order));
            }
        }
        for level in &payload.ask {
            if let Some(order) = self.convert_level(&market, AggOrderType::Ask, level, payload.sequence, timestamp) {
                orders.push(Entity::AggOrder(order));
            }
        }

        tracing::debug!(count = orders.len(), symbol = %payload.symbol, "parsed orderbook snapshot");
        vec![Action::insert(orders)]
    }

    fn convert_level(
        &self,
        market: &MarketKey,
        order_type: AggOrderType,
        level: &WsLevel,
        sequence: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    ) -> Option<AggOrder> {
        let price = parse_finite_f64(&level.price).ok()?;
        let size = parse_finite_f64(&level.size).ok()?;
        Some(AggOrder {
            exchange_id: self.exchange.id,
            market: market.clone(),
            order_type,
            price,
            size,
            last_update_id: sequence,
            timestamp,
        })
    }

    fn parse_raw_trades(&self, catalog: &SymbolCatalog, payload: &WsTradesPayload) -> Vec<Action> {
        let Some(market) = self.market_from_symbol(catalog, &payload.symbol) else {
            tracing::warn!(symbol = %payload.symbol, "no market found for trades payload");
            return vec![];
        };

        let trades: Vec<Entity> = payload
            .data
            .iter()
            .filter_map(|raw| self.convert_trade(&market, raw))
            .map(Entity::Trade)
            .collect();

        vec![Action::insert(trades)]
    }

    fn convert_trade(&self, market: &MarketKey, raw: &WsTrade) -> Option<Trade> {
        let timestamp = match parse_timestamp(&raw.timestamp) {
            Ok(ts) => ts,
            Err(_) => {
                tracing::warn!(timestamp = %raw.timestamp, "unparseable trade timestamp");
                return None;
            }
        };
        let price = parse_finite_f64(&raw.price).ok()?;
        let size = parse_finite_f64(&raw.quantity).ok()?;
        let trade_type = match raw.side.as_str() {
            "buy" => TradeSide::Buy,
            "sell" => TradeSide::Sell,
            other => {
                tracing::warn!(side = other, "unknown trade side");
                return None;
            }
        };

        Some(Trade {
            id: raw.id.to_string(),
            exchange_id: self.exchange.id,
            market: market.clone(),
            timestamp,
            trade_type,
            maker: None,
            taker: None,
            price,
            size,
            maker_fee: None,
            taker_fee: None,
            buy_order_id: None,
            sell_order_id: None,
        })
    }
}

#[async_trait]
impl VenueParser for HitBtcParser {
    fn venue(&self) -> &'static str {
        "hitbtc"
    }

    fn exchange_id(&self) -> i64 {
        self.exchange.id
    }

    fn ws_url(&self) -> &str {
        &self.ws_url
    }

    fn markets(&self) -> &[ConfiguredMarket] {
        &self.markets
    }

    async fn fetch_symbol_catalog(&self) -> Result<SymbolCatalog, ListenerError> {
        let url = format!("{}/public/symbol", self.api_base);
        let entries: Vec<RawSymbol> = self.http.get(url).send().await?.json().await?;
        Ok(SymbolCatalog::new(
            entries
                .into_iter()
                .map(|s| SymbolEntry {
                    id: s.id,
                    base_currency: s.base_currency,
                    quote_currency: s.quote_currency,
                })
                .collect(),
        ))
    }

    async fn fetch_markets(&self, catalog: &SymbolCatalog) -> Result<Vec<Action>, ListenerError> {
        let url = format!("{}/public/ticker", self.api_base);
        let tickers: Vec<RawTicker> = self.http.get(url).send().await?.json().await?;

        let mut coins = Vec::new();
        let mut markets = Vec::new();
        let mut exchange_markets = Vec::new();

        for ticker in tickers {
            let Some((base, quote)) = catalog.lookup(&ticker.symbol) else {
                tracing::warn!(symbol = %ticker.symbol, "symbol not found in fetched symbols");
                continue;
            };
            let market = MarketKey::canonicalize(base, quote);
            coins.push(Entity::Coin(Coin::new(base)));
            coins.push(Entity::Coin(Coin::new(quote)));
            markets.push(Entity::Market(Market::new(market.clone())));

            let quoted_volume = ticker.volume.as_deref().and_then(|v| parse_finite_f64(v).ok());
            let quoted_vol_timestamp = ticker
                .timestamp
                .as_deref()
                .and_then(|t| parse_timestamp(t).ok());

            exchange_markets.push(Entity::ExchangeMarket(ExchangeMarket {
                market,
                exchange_id: self.exchange.id,
                quoted_volume_id: base.to_uppercase(),
                quoted_volume,
                quoted_vol_timestamp,
                volume_usd: None,
                vol_usd_timestamp: None,
            }));
        }

        Ok(vec![
            Action::insert(coins),
            Action::insert(markets),
            Action::insert(exchange_markets),
        ])
    }

    fn subscription_frames(&self, market: &ConfiguredMarket) -> Vec<String> {
        let symbol = format!("{}{}", market.base, market.quote).to_uppercase();
        vec![
            json!({
                "method": "subscribeOrderbook",
                "params": {"symbol": symbol},
                "id": self.api_key,
            })
            .to_string(),
            json!({
                "method": "subscribeTrades",
                "params": {"symbol": symbol, "limit": TRADES_LIMIT},
                "id": self.api_key,
            })
            .to_string(),
        ]
    }

    fn parse_message(&self, catalog: &SymbolCatalog, raw: &str) -> Vec<Action> {
        let frame: WsFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(error) => {
                tracing::warn!(%error, "malformed websocket frame");
                return vec![];
            }
        };

        let Some(method) = frame.method else {
            tracing::warn!(raw, "unknown message received (no method field)");
            return vec![];
        };

        // Explicit {event_name -> parse_fn} dispatch table.
        match method.as_str() {
            "snapshotOrderbook" => match serde_json::from_value::<WsOrderbookSnapshot>(frame.params) {
                Ok(payload) => self.parse_snapshot_orderbook(catalog, &payload),
                Err(error) => {
                    tracing::warn!(%error, "malformed snapshotOrderbook payload");
                    vec![]
                }
            },
            "snapshotTrades" | "updateTrades" => {
                match serde_json::from_value::<WsTradesPayload>(frame.params) {
                    Ok(payload) => self.parse_raw_trades(catalog, &payload),
                    Err(error) => {
                        tracing::warn!(%error, "malformed trades payload");
                        vec![]
                    }
                }
            }
            other => {
                tracing::debug!(method = other, "unknown message method");
                vec![]
            }
        }
    }
}

#[derive(Deserialize)]
struct WsFrame {
    method: Option<String>,
    #[serde(default)]
    params: serde_json::Value,
}

#[derive(Deserialize)]
struct WsLevel {
    price: String,
    size: String,
}

#[derive(Deserialize)]
struct WsOrderbookSnapshot {
    symbol: String,
    sequence: i64,
    timestamp: String,
    ask: Vec<WsLevel>,
    bid: Vec<WsLevel>,
}

#[derive(Deserialize)]
struct WsTrade {
    id: u64,
    price: String,
    quantity: String,
    side: String,
    timestamp: String,
}

#[derive(Deserialize)]
struct WsTradesPayload {
    symbol: String,
    data: Vec<WsTrade>,
}

#[derive(Deserialize)]
struct RawSymbol {
    id: String,
    #[serde(rename = "baseCurrency")]
    base_currency: String,
    #[serde(rename = "quoteCurrency")]
    quote_currency: String,
}

#[derive(Deserialize)]
struct RawTicker {
    symbol: String,
    volume: Option<String>,
    timestamp: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::catalog::SymbolEntry;

    fn parser() -> HitBtcParser {
        HitBtcParser::new(
            ExchangeModel::new(1, "hitbtc"),
            "wss://api.hitbtc.com/api/2/ws",
            "https://api.hitbtc.com/api/2",
            "subscription-key",
            vec![],
        )
    }

    fn catalog() -> SymbolCatalog {
        SymbolCatalog::new(vec![SymbolEntry {
            id: "BTCUSD".into(),
            base_currency: "BTC".into(),
            quote_currency: "USD".into(),
        }])
    }

    #[test]
    fn drops_trade_with_unknown_symbol() {
        let parser = parser();
        let raw = r#"{"method":"updateTrades","params":{"symbol":"ETHUSD","data":[]}}"#;
        let actions = parser.parse_message(&catalog(), raw);
        match &actions[..] {
            [Action::Insert(entities)] => assert!(entities.is_empty()),
            _ => panic!("expected a single empty insert"),
        }
    }

    #[test]
    fn unknown_method_is_dropped() {
        let parser = parser();
        let raw = r#"{"method":"somethingElse","params":{}}"#;
        assert!(parser.parse_message(&catalog(), raw).is_empty());
    }

    #[test]
    fn snapshot_orderbook_produces_bid_and_ask_agg_orders() {
        let parser = parser();
        let raw = r#"{
            "method": "snapshotOrderbook",
            "params": {
                "symbol": "BTCUSD",
                "sequence": 42,
                "timestamp": "2024-01-01T00:00:00Z",
                "ask": [{"price": "11", "size": "2"}],
                "bid": [{"price": "10", "size": "1"}]
            }
        }"#;
        let actions = parser.parse_message(&catalog(), raw);
        match &actions[..] {
            [Action::Insert(entities)] => {
                assert_eq!(entities.len(), 2);
                for entity in entities {
                    match entity {
                        Entity::AggOrder(order) => assert_eq!(order.last_update_id, 42),
                        _ => panic!("expected AggOrder"),
                    }
                }
            }
            _ => panic!("expected a single insert action"),
        }
    }

    #[test]
    fn rejects_non_finite_level_price() {
        let parser = parser();
        let raw = r#"{
            "method": "snapshotOrderbook",
            "params": {
                "symbol": "BTCUSD",
                "sequence": 1,
                "timestamp": "2024-01-01T00:00:00Z",
                "ask": [],
                "bid": [{"price": "NaN", "size": "1"}]
            }
        }"#;
        let actions = parser.parse_message(&catalog(), raw);
        match &actions[..] {
            [Action::Insert(entities)] => assert!(entities.is_empty()),
            _ => panic!("expected a single empty insert"),
        }
    }
}
