//! Generic websocket listener specialization. A [`VenueParser`] supplies the
//! venue-specific bits (URLs, subscription frames, message dispatch);
//! [`WebsocketListener`] supplies the connect/subscribe/reconnect state
//! machine that's the same for every venue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::Message;

use crate::action::Action;
use crate::config::ConfiguredMarket;
use crate::error::ListenerError;
use crate::listener::backoff::{BackoffPolicy, BackoffState};
use crate::listener::catalog::SymbolCatalog;
use crate::listener::{ActionSender, ExchangeListener, ListenerEvent, ListenerState, Stoppable};

/// Venue-specific collaborator a [`WebsocketListener`] drives. Each message is
/// dispatched by `parse_message` via an explicit `{event_name -> parse_fn}`
/// table owned by the implementor — never by reflection or method-name
/// lookup.
#[async_trait]
pub trait VenueParser: Send + Sync {
    fn venue(&self) -> &'static str;
    fn exchange_id(&self) -> i64;
    fn ws_url(&self) -> &str;
    fn markets(&self) -> &[ConfiguredMarket];

    /// Refresh the listener-local symbol catalog. Called before every
    /// (re)subscribe.
    async fn fetch_symbol_catalog(&self) -> Result<SymbolCatalog, ListenerError>;

    /// One-shot market list fetch (`get_markets()`).
    async fn fetch_markets(&self, catalog: &SymbolCatalog) -> Result<Vec<Action>, ListenerError>;

    /// Subscription frames to send for one configured market (order book +
    /// trades channels).
    fn subscription_frames(&self, market: &ConfiguredMarket) -> Vec<String>;

    /// Parse one inbound websocket frame into zero or more actions. Unknown
    /// messages and malformed payloads are logged and dropped internally —
    /// this method never raises.
    fn parse_message(&self, catalog: &SymbolCatalog, raw: &str) -> Vec<Action>;
}

/// Longest gap tolerated between inbound frames (data or ping/pong) before a
/// session is considered stalled and torn down for reconnect.
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(30);

/// Cooperative shutdown signal shared between the orchestrator and a listener.
/// Checked at every suspension point.
#[derive(Debug, Default)]
pub struct StopSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

impl Stoppable for StopSignal {
    fn request(&self) {
        StopSignal::request(self);
    }
}

pub struct WebsocketListener<P: VenueParser> {
    parser: P,
    on_event: ActionSender,
    catalog: SymbolCatalog,
    state: Mutex<ListenerState>,
    backoff: Mutex<BackoffState>,
    stop: Arc<StopSignal>,
}

impl<P: VenueParser> WebsocketListener<P> {
    pub fn new(parser: P, on_event: ActionSender) -> Self {
        Self {
            parser,
            on_event,
            catalog: SymbolCatalog::default(),
            state: Mutex::new(ListenerState::Disconnected),
            backoff: Mutex::new(BackoffState::from(BackoffPolicy::default())),
            stop: Arc::new(StopSignal::default()),
        }
    }

    pub fn stop_signal(&self) -> Arc<StopSignal> {
        Arc::clone(&self.stop)
    }

    fn set_state(&self, state: ListenerState) {
        *self.state.lock() = state;
    }

    async fn run_session(&mut self) -> Result<(), ListenerError> {
        self.catalog = self.parser.fetch_symbol_catalog().await?;
        self.set_state(ListenerState::Connecting);

        let (ws_stream, _) = tokio_tungstenite::connect_async(self.parser.ws_url()).await?;
        let (mut write, mut read) = ws_stream.split();
        self.set_state(ListenerState::Subscribed);

        for market in self.parser.markets() {
            for frame in self.parser.subscription_frames(market) {
                write.send(Message::Text(frame.into())).await?;
            }
        }
        self.backoff.lock().reset();

        let mut streaming = false;
        loop {
            if self.stop.is_set() {
                return Ok(());
            }

            tokio::select! {
                _ = self.stop.notified() => {
                    return Ok(());
                }
                timed = tokio::time::timeout(HEARTBEAT_TIMEOUT, read.next()) => {
                    let msg = match timed {
                        Ok(msg) => msg,
                        Err(_elapsed) => return Err(ListenerError::HeartbeatTimeout(HEARTBEAT_TIMEOUT)),
                    };
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if !streaming {
                                self.set_state(ListenerState::Streaming);
                                streaming = true;
                            }
                            let actions = self.parser.parse_message(&self.catalog, &text);
                            if !actions.is_empty() {
                                let event = ListenerEvent {
                                    venue: self.parser.venue().to_string(),
                                    actions,
                                };
                                if self.on_event.send(event).await.is_err() {
                                    return Ok(());
                                }
                            }
                        }
                        Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                        Some(Ok(Message::Close(_))) | None => {
                            return Err(ListenerError::MalformedPayload(
                                "websocket closed by venue".into(),
                            ));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(error)) => return Err(error.into()),
                    }
                }
            }
        }
    }
}

#[async_trait]
impl<P: VenueParser + Send + Sync> ExchangeListener for WebsocketListener<P> {
    fn venue(&self) -> &str {
        self.parser.venue()
    }

    fn state(&self) -> ListenerState {
        *self.state.lock()
    }

    async fn get_markets(&mut self) -> Result<(), ListenerError> {
        let catalog = self.parser.fetch_symbol_catalog().await?;
        let actions = self.parser.fetch_markets(&catalog).await?;
        self.catalog = catalog;
        if !actions.is_empty() {
            let event = ListenerEvent {
                venue: self.parser.venue().to_string(),
                actions,
            };
            let _ = self.on_event.send(event).await;
        }
        Ok(())
    }

    async fn listen(&mut self) -> Result<(), ListenerError> {
        self.set_state(ListenerState::Connecting);

        loop {
            if self.stop.is_set() {
                break;
            }

            match self.run_session().await {
                Ok(()) => break,
                Err(error) => {
                    tracing::warn!(venue = self.parser.venue(), %error, "listener session ended, reconnecting");
                    self.set_state(ListenerState::Reconnecting);

                    if self.stop.is_set() {
                        break;
                    }

                    let delay = self.backoff.lock().next_delay();
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.stop.notified() => {}
                    }
                }
            }
        }

        self.set_state(ListenerState::Closed);
        Ok(())
    }

    fn request_stop(&self) {
        self.stop.request();
    }

    fn stop_handle(&self) -> Arc<dyn Stoppable> {
        Arc::clone(&self.stop) as Arc<dyn Stoppable>
    }
}
