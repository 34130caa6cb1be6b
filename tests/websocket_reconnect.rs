//! A real local websocket server drops the connection after a message; the
//! listener must reconnect, refresh its symbol catalog, resubscribe, and
//! keep emitting actions from the new session.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use tidewatch::action::Action;
use tidewatch::config::ConfiguredMarket;
use tidewatch::error::ListenerError;
use tidewatch::listener::catalog::SymbolCatalog;
use tidewatch::listener::websocket::{VenueParser, WebsocketListener};
use tidewatch::listener::{ExchangeListener, Stoppable};
use tidewatch::model::{Coin, Entity};

struct EchoParser {
    ws_url: String,
    markets: Vec<ConfiguredMarket>,
    catalog_fetches: Arc<AtomicUsize>,
}

#[async_trait]
impl VenueParser for EchoParser {
    fn venue(&self) -> &'static str {
        "echo"
    }

    fn exchange_id(&self) -> i64 {
        1
    }

    fn ws_url(&self) -> &str {
        &self.ws_url
    }

    fn markets(&self) -> &[ConfiguredMarket] {
        &self.markets
    }

    async fn fetch_symbol_catalog(&self) -> Result<SymbolCatalog, ListenerError> {
        self.catalog_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(SymbolCatalog::default())
    }

    async fn fetch_markets(&self, _catalog: &SymbolCatalog) -> Result<Vec<Action>, ListenerError> {
        Ok(vec![])
    }

    fn subscription_frames(&self, market: &ConfiguredMarket) -> Vec<String> {
        vec![format!("subscribe:{}{}", market.base, market.quote)]
    }

    fn parse_message(&self, _catalog: &SymbolCatalog, raw: &str) -> Vec<Action> {
        vec![Action::insert(vec![Entity::Coin(Coin::new(raw))])]
    }
}

/// Accept one connection, send `sends` text frames, then close the stream —
/// simulating the venue dropping the socket mid-session.
async fn serve_one_session(listener: &TcpListener, sends: &[&str]) {
    let (tcp, _) = listener.accept().await.expect("accept connection");
    let mut ws = tokio_tungstenite::accept_async(tcp)
        .await
        .expect("websocket handshake");
    for message in sends {
        ws.send(Message::Text((*message).into()))
            .await
            .expect("send frame");
    }
    let _ = ws.close(None).await;
}

#[tokio::test]
async fn reconnects_and_refreshes_catalog_after_drop() {
    let tcp_listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = tcp_listener.local_addr().expect("local addr");

    let server = tokio::spawn(async move {
        serve_one_session(&tcp_listener, &["first"]).await;
        serve_one_session(&tcp_listener, &["second"]).await;
    });

    let catalog_fetches = Arc::new(AtomicUsize::new(0));
    let parser = EchoParser {
        ws_url: format!("ws://{addr}"),
        markets: vec![ConfiguredMarket {
            base: "BTC".into(),
            quote: "USD".into(),
        }],
        catalog_fetches: Arc::clone(&catalog_fetches),
    };

    let (tx, mut rx) = tokio::sync::mpsc::channel(16);
    let mut listener = WebsocketListener::new(parser, tx);
    let stop = listener.stop_handle();

    let run = tokio::spawn(async move { listener.listen().await });

    let first = rx.recv().await.expect("first session's event");
    assert_eq!(first.actions.len(), 1);

    let second = rx.recv().await.expect("second session's event (post-reconnect)");
    assert_eq!(second.actions.len(), 1);

    stop.request();
    run.await.expect("listener task should not panic").unwrap();
    server.await.expect("server task should not panic");

    // One fetch for the initial connect, one more after the reconnect.
    assert_eq!(catalog_fetches.load(Ordering::SeqCst), 2);
}
