//! Owns listener lifecycles and the pending-action buffer: fans every
//! [`ListenerEvent`] into one buffer, commits when it reaches
//! `commit_interval`, and flushes any residue once `stop()` drains the
//! listeners.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::action::Action;
use crate::error::Error;
use crate::listener::{ActionSender, ExchangeListener, ListenerEvent, StopSignal, Stoppable};
use crate::store::Store;

/// Number of actions buffered before a commit is triggered.
pub const DEFAULT_COMMIT_INTERVAL: usize = 100;

pub struct Orchestrator {
    store: Arc<dyn Store>,
    commit_interval: usize,
    events_tx: ActionSender,
    events_rx: Mutex<Option<mpsc::Receiver<ListenerEvent>>>,
    stop_handles: Mutex<Vec<Arc<dyn Stoppable>>>,
    /// Checked before parking on `run()`'s select — an `AtomicBool`-backed
    /// flag, not a bare `Notify`, so a `stop()` landing before `run()` first
    /// awaits is never lost (spec §4.3: `stop()` must be safe to call from a
    /// signal handler, i.e. order-independent of `run()`'s progress).
    shutdown: StopSignal,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_commit_interval(store, DEFAULT_COMMIT_INTERVAL)
    }

    pub fn with_commit_interval(store: Arc<dyn Store>, commit_interval: usize) -> Self {
        let (events_tx, events_rx) = mpsc::channel(1024);
        Self {
            store,
            commit_interval,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            stop_handles: Mutex::new(Vec::new()),
            shutdown: StopSignal::default(),
        }
    }

    /// The sender listeners should be constructed with so their events reach
    /// this orchestrator's buffer.
    pub fn event_sender(&self) -> ActionSender {
        self.events_tx.clone()
    }

    /// One-shot market bootstrap for every registered listener, driving the
    /// `markets` CLI command.
    pub async fn get_markets(listeners: &mut [Box<dyn ExchangeListener>]) -> Result<(), Error> {
        for listener in listeners.iter_mut() {
            listener.get_markets().await?;
        }
        Ok(())
    }

    /// Spawn every listener's `listen()` loop on its own task and drain the
    /// shared event channel, committing batches of `commit_interval` actions
    /// as they accumulate. Returns once `stop()` has been called and every
    /// listener task and residual buffered action has been flushed.
    pub async fn run(&self, mut listeners: Vec<Box<dyn ExchangeListener>>) -> Result<(), Error> {
        {
            let mut stop_handles = self.stop_handles.lock();
            stop_handles.extend(listeners.iter().map(|l| l.stop_handle()));
        }

        let mut join_handles: Vec<JoinHandle<()>> = Vec::with_capacity(listeners.len());
        for mut listener in listeners.drain(..) {
            let venue = listener.venue().to_string();
            join_handles.push(tokio::spawn(async move {
                if let Err(error) = listener.listen().await {
                    tracing::error!(venue, %error, "listener exited with error");
                }
            }));
        }

        let mut rx = self
            .events_rx
            .lock()
            .take()
            .expect("Orchestrator::run may only be called once");

        let mut buffer: Vec<Action> = Vec::with_capacity(self.commit_interval);
        while !self.shutdown.is_set() {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(event) => {
                            buffer.extend(event.actions);
                            if buffer.len() >= self.commit_interval {
                                self.flush(&mut buffer).await?;
                            }
                        }
                        None => break,
                    }
                }
                _ = self.shutdown.notified() => break,
            }
        }
        while let Ok(event) = rx.try_recv() {
            buffer.extend(event.actions);
        }
        self.flush(&mut buffer).await?;

        for handle in join_handles {
            let _ = handle.await;
        }
        Ok(())
    }

    /// Request every running listener to stop and unblock [`Orchestrator::run`]'s
    /// drain loop so it can flush and return.
    pub fn stop(&self) {
        for handle in self.stop_handles.lock().iter() {
            handle.request();
        }
        self.shutdown.request();
    }

    async fn flush(&self, buffer: &mut Vec<Action>) -> Result<(), Error> {
        if buffer.is_empty() {
            return Ok(());
        }
        let committed = self.store.commit_batch(buffer.as_slice()).await?;
        tracing::debug!(committed, buffered = buffer.len(), "committed action batch");
        buffer.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::{DateTime, Utc};

    use crate::error::{ListenerError, StoreError};
    use crate::listener::{ListenerState, StopSignal};
    use crate::model::{AggOrder, Coin, Entity, EntityKey, MarketKey, OrderBookSnapshot};
    use crate::store::memory::MemoryStore;
    use crate::store::MarketHistoryStart;

    /// A listener with no transport: emits `count` single-action events back
    /// to back, signals `sent` once they've all reached the channel, then
    /// idles until its stop flag is set. Used to drive the orchestrator's
    /// buffering/flush logic deterministically in tests, without sleeping to
    /// synchronize with the test body.
    struct BatchListener {
        tx: ActionSender,
        count: usize,
        sent: Option<tokio::sync::oneshot::Sender<()>>,
        stop: Arc<StopSignal>,
    }

    #[async_trait::async_trait]
    impl ExchangeListener for BatchListener {
        fn venue(&self) -> &str {
            "batch"
        }

        fn state(&self) -> ListenerState {
            ListenerState::Streaming
        }

        async fn get_markets(&mut self) -> Result<(), ListenerError> {
            Ok(())
        }

        async fn listen(&mut self) -> Result<(), ListenerError> {
            for i in 0..self.count {
                let action = Action::insert(vec![Entity::Coin(Coin::new(format!("c{i}")))]);
                let event = ListenerEvent {
                    venue: "batch".to_string(),
                    actions: vec![action],
                };
                if self.tx.send(event).await.is_err() {
                    break;
                }
            }
            if let Some(sent) = self.sent.take() {
                let _ = sent.send(());
            }
            while !self.stop.is_set() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Ok(())
        }

        fn request_stop(&self) {
            self.stop.request();
        }

        fn stop_handle(&self) -> Arc<dyn Stoppable> {
            Arc::clone(&self.stop) as Arc<dyn Stoppable>
        }
    }

    /// Wraps a [`MemoryStore`] and counts `commit_batch` invocations, so
    /// tests can assert on the orchestrator's commit cadence without
    /// inspecting its private buffer.
    struct CountingStore {
        inner: MemoryStore,
        commits: AtomicUsize,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                commits: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl Store for CountingStore {
        async fn commit_batch(&self, actions: &[Action]) -> Result<usize, StoreError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            self.inner.commit_batch(actions).await
        }

        async fn markets_with_agg_history(
            &self,
            exchange_names: &[String],
        ) -> Result<Vec<MarketHistoryStart>, StoreError> {
            self.inner.markets_with_agg_history(exchange_names).await
        }

        async fn agg_orders_until(
            &self,
            exchange_id: i64,
            market: &MarketKey,
            until: DateTime<Utc>,
        ) -> Result<Vec<AggOrder>, StoreError> {
            self.inner.agg_orders_until(exchange_id, market, until).await
        }

        async fn insert_snapshots(&self, snapshots: &[OrderBookSnapshot]) -> Result<(), StoreError> {
            self.inner.insert_snapshots(snapshots).await
        }
    }

    #[tokio::test]
    async fn batching_law_commits_floor_n_over_k_plus_one_residual() {
        let store = Arc::new(CountingStore::new());
        let orchestrator = Arc::new(Orchestrator::with_commit_interval(
            Arc::clone(&store) as Arc<dyn Store>,
            100,
        ));

        let (sent_tx, sent_rx) = tokio::sync::oneshot::channel();
        let listener = BatchListener {
            tx: orchestrator.event_sender(),
            count: 250,
            sent: Some(sent_tx),
            stop: Arc::new(StopSignal::default()),
        };

        let runner = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.run(vec![Box::new(listener)]).await })
        };

        // Wait until the listener has pushed all 250 actions through the
        // channel, then until the orchestrator has actually drained both
        // intermediate batches, before requesting shutdown — otherwise a
        // stop() racing the buffer's drain loop could fold an in-flight
        // intermediate batch into the residual flush.
        sent_rx.await.expect("listener should signal once all actions are sent");
        for _ in 0..200 {
            if store.commits.load(Ordering::SeqCst) >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(
            store.commits.load(Ordering::SeqCst),
            2,
            "both intermediate commits should have landed before shutdown"
        );
        orchestrator.stop();

        let result = tokio::time::timeout(Duration::from_secs(1), runner)
            .await
            .expect("run() should return promptly after stop()")
            .unwrap();
        assert!(result.is_ok());

        // floor(250/100) = 2 intermediate commits, plus one residual commit
        // of the remaining 50 actions.
        assert_eq!(store.commits.load(Ordering::SeqCst), 3);
        assert_eq!(store.inner.entities().len(), 250);
    }

    #[tokio::test]
    async fn cancellation_mid_batch_flushes_exactly_one_residual_commit() {
        let store = Arc::new(CountingStore::new());
        let orchestrator = Arc::new(Orchestrator::with_commit_interval(
            Arc::clone(&store) as Arc<dyn Store>,
            100,
        ));

        let (sent_tx, sent_rx) = tokio::sync::oneshot::channel();
        let listener = BatchListener {
            tx: orchestrator.event_sender(),
            count: 50,
            sent: Some(sent_tx),
            stop: Arc::new(StopSignal::default()),
        };

        let runner = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.run(vec![Box::new(listener)]).await })
        };

        sent_rx.await.expect("listener should signal once all actions are sent");
        orchestrator.stop();

        let result = tokio::time::timeout(Duration::from_secs(1), runner)
            .await
            .expect("run() should return promptly after stop()")
            .unwrap();
        assert!(result.is_ok());

        // Below commit_interval=100: no intermediate flush, exactly one
        // residual commit on stop, and all 50 actions persisted.
        assert_eq!(store.commits.load(Ordering::SeqCst), 1);
        assert_eq!(store.inner.entities().len(), 50);
    }

    #[tokio::test]
    async fn flush_commits_remaining_actions_below_commit_interval() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = Orchestrator::with_commit_interval(
            Arc::clone(&store) as Arc<dyn Store>,
            100,
        );

        let mut buffer = vec![Action::insert(vec![Entity::Coin(Coin::new("btc"))])];
        orchestrator.flush(&mut buffer).await.unwrap();

        assert!(buffer.is_empty());
        assert!(store.get(&EntityKey::Coin("BTC".into())).is_some());
    }

    #[tokio::test]
    async fn stop_unblocks_run_with_no_listeners() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let orchestrator = Arc::new(Orchestrator::new(store));

        let runner = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.run(Vec::new()).await })
        };

        orchestrator.stop();
        let result = tokio::time::timeout(std::time::Duration::from_secs(1), runner)
            .await
            .expect("run() should return promptly after stop()")
            .unwrap();
        assert!(result.is_ok());
    }
}
