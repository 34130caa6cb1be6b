//! Exchange listener protocol: an abstract collaborator parameterized by
//! venue, plus a websocket specialization encapsulating
//! connect/subscribe/reconnect.

pub mod backoff;
pub mod catalog;
pub mod hitbtc;
pub mod numeric;
pub mod registry;
pub mod websocket;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::action::Action;
use crate::error::ListenerError;

/// A cheap, cloneable handle that can request a running listener to stop
/// without needing `&mut` access to it — obtained from [`ExchangeListener::stop_handle`]
/// before the listener is moved into its own task.
pub trait Stoppable: Send + Sync {
    fn request(&self);
}

/// One batch of actions emitted by a single listener, routed through the
/// orchestrator's on-event sink. Ordering within one listener's stream of
/// sends is preserved by the channel.
#[derive(Debug)]
pub struct ListenerEvent {
    pub venue: String,
    pub actions: Vec<Action>,
}

pub type ActionSender = mpsc::Sender<ListenerEvent>;

pub use websocket::StopSignal;

/// Websocket connection state machine.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ListenerState {
    Disconnected,
    Connecting,
    Subscribed,
    Streaming,
    Reconnecting,
    Closed,
}

/// Capability set per venue: `get_markets` (one-shot) and `listen` (a
/// suspending stream of actions delivered through the `on_event` sink passed
/// at construction).
#[async_trait]
pub trait ExchangeListener: Send {
    fn venue(&self) -> &str;

    fn state(&self) -> ListenerState;

    async fn get_markets(&mut self) -> Result<(), ListenerError>;

    /// Runs until the shared termination flag is observed, transitioning
    /// through [`ListenerState`], then returns.
    async fn listen(&mut self) -> Result<(), ListenerError>;

    /// Request termination. The listener observes this at its next
    /// suspension point, flushes any half-built action list, and transitions
    /// to `Closed`.
    fn request_stop(&self);

    /// A [`Stoppable`] handle equivalent to calling `request_stop` later,
    /// obtainable before the listener is moved into its own task.
    fn stop_handle(&self) -> Arc<dyn Stoppable>;
}
