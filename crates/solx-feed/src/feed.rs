/*
[INPUT]:  Feed configuration + consumer subscribe/unsubscribe calls
[OUTPUT]: Shared book/ticker state, per-key event streams, connectivity status
[POS]:    Service layer - connection supervision and fan-out
[UPDATE]: When reconnection policy, heartbeat, or the command surface changes
*/

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use solx_feed_adapter::ws::{FeedTransport, TransportEvent};
use solx_feed_adapter::{Channel, ChannelKey, ClientFrame};

use crate::book::{BookStore, BookView, PriceDirection};
use crate::config::FeedConfig;
use crate::dispatch::Dispatcher;
use crate::mux::{FeedEvent, SubscriptionId};
use crate::status::{FeedStatus, backoff_delay};
use crate::ticker::{TickerCache, TickerSnapshot};

#[derive(Debug)]
enum FeedCommand {
    Subscribe {
        key: ChannelKey,
        id: SubscriptionId,
        tx: mpsc::UnboundedSender<FeedEvent>,
    },
    Unsubscribe {
        id: SubscriptionId,
    },
    Restart,
    Shutdown,
}

/// Handle returned by `MarketFeed::subscribe`.
///
/// Dropping the receiver stops delivery; passing the handle back to
/// `MarketFeed::unsubscribe` also frees the server-side stream.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    key: ChannelKey,
    events: mpsc::UnboundedReceiver<FeedEvent>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<FeedEvent> {
        self.events.try_recv().ok()
    }
}

/// Market feed service: one connection, many logical subscriptions.
///
/// Explicitly constructed and passed by reference to consumers; created at
/// session start and torn down via `shutdown` (or drop). The internal
/// worker starts lazily on the first subscription.
#[derive(Debug)]
pub struct MarketFeed {
    config: FeedConfig,
    books: Arc<RwLock<BookStore>>,
    tickers: Arc<RwLock<TickerCache>>,
    status: watch::Sender<FeedStatus>,
    shutdown: CancellationToken,
    cmd_tx: mpsc::UnboundedSender<FeedCommand>,
    cmd_rx: Option<mpsc::UnboundedReceiver<FeedCommand>>,
    worker_handle: Option<JoinHandle<()>>,
    auto_connect: bool,
}

impl MarketFeed {
    pub fn new(config: FeedConfig) -> Self {
        Self::new_internal(config, true)
    }

    #[cfg(test)]
    fn new_for_test(config: FeedConfig) -> Self {
        Self::new_internal(config, false)
    }

    fn new_internal(config: FeedConfig, auto_connect: bool) -> Self {
        let (status, _rx) = watch::channel(FeedStatus::Idle);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let books = Arc::new(RwLock::new(BookStore::new(config.pending_update_limit)));
        let tickers = Arc::new(RwLock::new(TickerCache::new()));

        Self {
            config,
            books,
            tickers,
            status,
            shutdown: CancellationToken::new(),
            cmd_tx,
            cmd_rx: Some(cmd_rx),
            worker_handle: None,
            auto_connect,
        }
    }

    /// Spawn the worker eagerly.
    ///
    /// Optional: `subscribe` does this lazily. The connection itself is
    /// only opened once at least one subscription exists.
    pub fn start(&mut self) {
        self.start_worker_if_needed();
    }

    /// Subscribe to one (channel, market) stream.
    ///
    /// The first consumer for a key triggers a subscribe frame once the
    /// connection is open; keys registered while disconnected are replayed
    /// automatically on (re)connect.
    pub fn subscribe(&mut self, channel: Channel, market: &str) -> Subscription {
        if self.auto_connect {
            self.start_worker_if_needed();
        }

        let key = ChannelKey::new(channel, market);
        let id = SubscriptionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.cmd_tx.send(FeedCommand::Subscribe {
            key: key.clone(),
            id,
            tx,
        });

        Subscription {
            id,
            key,
            events: rx,
        }
    }

    /// Release a subscription; the last consumer of a key sends a
    /// best-effort unsubscribe frame.
    pub fn unsubscribe(&self, subscription: Subscription) {
        let _ = self.cmd_tx.send(FeedCommand::Unsubscribe {
            id: subscription.id,
        });
    }

    /// Top `depth` levels per side for a market; empty for unknown markets
    pub fn order_book(&self, market: &str, depth: usize) -> BookView {
        self.books
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .view(market, depth)
    }

    /// Book view at the configured default depth
    pub fn order_book_default(&self, market: &str) -> BookView {
        self.order_book(market, self.config.default_depth)
    }

    /// Latest ticker snapshot; all-zero default for unseen symbols
    pub fn ticker(&self, symbol: &str) -> TickerSnapshot {
        self.tickers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(symbol)
    }

    pub fn is_stale(&self, symbol: &str, threshold_ms: u64) -> bool {
        self.tickers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_stale(symbol, threshold_ms)
    }

    /// Staleness against the configured default threshold
    pub fn is_stale_default(&self, symbol: &str) -> bool {
        self.is_stale(symbol, self.config.stale_after_ms)
    }

    pub fn price_direction(&self, market: &str) -> PriceDirection {
        self.books
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .direction(market)
    }

    pub fn status(&self) -> FeedStatus {
        *self.status.borrow()
    }

    /// Subscribe to connectivity state changes
    pub fn subscribe_status(&self) -> watch::Receiver<FeedStatus> {
        self.status.subscribe()
    }

    /// Resume reconnecting after the policy gave up
    pub fn restart(&self) {
        let _ = self.cmd_tx.send(FeedCommand::Restart);
    }

    /// Trigger a graceful shutdown of the internal worker
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let _ = self.cmd_tx.send(FeedCommand::Shutdown);
    }

    fn start_worker_if_needed(&mut self) {
        if self.worker_handle.is_some() {
            return;
        }

        let Some(cmd_rx) = self.cmd_rx.take() else {
            return;
        };

        if tokio::runtime::Handle::try_current().is_err() {
            warn!("MarketFeed created without Tokio runtime; worker not started");
            self.cmd_rx = Some(cmd_rx);
            return;
        }

        let worker = FeedWorker {
            config: self.config.clone(),
            dispatcher: Dispatcher::new(Arc::clone(&self.books), Arc::clone(&self.tickers)),
            cmd_rx,
            status: self.status.clone(),
            shutdown: self.shutdown.clone(),
        };
        self.worker_handle = Some(tokio::spawn(worker.run()));
    }
}

impl Drop for MarketFeed {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamExit {
    Disconnected,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandOutcome {
    Continue,
    Restart,
    Exit,
}

struct FeedWorker {
    config: FeedConfig,
    dispatcher: Dispatcher,
    cmd_rx: mpsc::UnboundedReceiver<FeedCommand>,
    status: watch::Sender<FeedStatus>,
    shutdown: CancellationToken,
}

impl FeedWorker {
    async fn run(mut self) {
        // failed cycles since the last successful connect
        let mut attempt: u32 = 0;

        'run: loop {
            if self.shutdown.is_cancelled() {
                break 'run;
            }

            if !self.dispatcher.has_subscriptions() {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break 'run,
                    cmd = self.cmd_rx.recv() => {
                        match cmd {
                            Some(cmd) => match self.apply_command_offline(cmd) {
                                CommandOutcome::Exit => break 'run,
                                CommandOutcome::Restart => attempt = 0,
                                CommandOutcome::Continue => {}
                            },
                            None => break 'run,
                        }
                    }
                }
                continue 'run;
            }

            self.publish(FeedStatus::Connecting);
            let mut transport = FeedTransport::new();
            let Some(mut events) = transport.take_events() else {
                break 'run;
            };
            transport.open(&self.config.ws_url);

            // the first event decides the cycle: Opened, or a failed connect
            let opened = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    transport.close().await;
                    break 'run;
                }
                event = events.recv() => matches!(event, Some(TransportEvent::Opened)),
            };

            if opened {
                attempt = 0;
                self.publish(FeedStatus::Connected);
                info!(ws_url = %self.config.ws_url, "market feed connected");

                // stale books buffer updates until the fresh snapshot lands
                self.dispatcher.reset_books();
                for frame in self.dispatcher.replay_frames() {
                    transport.send(&frame).await;
                }

                match self.stream_loop(&transport, &mut events).await {
                    StreamExit::Shutdown => {
                        transport.close().await;
                        break 'run;
                    }
                    StreamExit::Disconnected => {
                        transport.close().await;
                    }
                }
            }

            if attempt >= self.config.max_attempts {
                warn!(
                    attempt,
                    max_attempts = self.config.max_attempts,
                    "reconnect attempts exhausted; waiting for restart"
                );
                self.publish(FeedStatus::Exhausted);
                if !self.wait_for_restart().await {
                    break 'run;
                }
                attempt = 0;
                continue 'run;
            }

            let delay = backoff_delay(self.config.base_delay(), attempt);
            attempt = attempt.saturating_add(1);
            self.publish(FeedStatus::Backoff { attempt });
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "market feed disconnected; retrying after backoff"
            );

            let deadline = tokio::time::Instant::now() + delay;
            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break 'run,
                    _ = tokio::time::sleep_until(deadline) => break,
                    cmd = self.cmd_rx.recv() => {
                        match cmd {
                            Some(cmd) => match self.apply_command_offline(cmd) {
                                CommandOutcome::Exit => break 'run,
                                CommandOutcome::Restart => {
                                    attempt = 0;
                                    break;
                                }
                                CommandOutcome::Continue => {}
                            },
                            None => break 'run,
                        }
                    }
                }
            }
        }

        self.publish(FeedStatus::Idle);
        debug!("market feed worker stopped");
    }

    async fn stream_loop(
        &mut self,
        transport: &FeedTransport,
        events: &mut mpsc::Receiver<TransportEvent>,
    ) -> StreamExit {
        let period = self.config.ping_interval();
        let mut ping = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("market feed shutdown requested");
                    return StreamExit::Shutdown;
                }
                _ = ping.tick() => {
                    transport.send(&ClientFrame::ping()).await;
                }
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(FeedCommand::Subscribe { key, id, tx }) => {
                            let first = self.dispatcher.add_consumer(key.clone(), id, tx);
                            if first {
                                transport.send(&ClientFrame::subscribe(&key)).await;
                            }
                        }
                        Some(FeedCommand::Unsubscribe { id }) => {
                            if let Some(key) = self.dispatcher.remove_consumer(id) {
                                // best effort; the server times the stream out anyway
                                transport.send(&ClientFrame::unsubscribe(&key)).await;
                            }
                        }
                        Some(FeedCommand::Restart) => {}
                        Some(FeedCommand::Shutdown) | None => return StreamExit::Shutdown,
                    }
                }
                event = events.recv() => {
                    match event {
                        Some(TransportEvent::Message(raw)) => {
                            for frame in self.dispatcher.handle_raw(&raw) {
                                transport.send(&frame).await;
                            }
                        }
                        Some(TransportEvent::Opened) => {}
                        Some(TransportEvent::Error(err)) => {
                            warn!(error = %err, "transport error");
                        }
                        Some(TransportEvent::Closed { code, reason }) => {
                            warn!(?code, %reason, "feed connection closed");
                            return StreamExit::Disconnected;
                        }
                        None => return StreamExit::Disconnected,
                    }
                }
            }
        }
    }

    /// Handle a command while no connection is up; registration only,
    /// frames are covered by replay on the next connect.
    fn apply_command_offline(&mut self, cmd: FeedCommand) -> CommandOutcome {
        match cmd {
            FeedCommand::Subscribe { key, id, tx } => {
                let first = self.dispatcher.add_consumer(key.clone(), id, tx);
                if first {
                    debug!(%key, "subscription queued until connect");
                }
                CommandOutcome::Continue
            }
            FeedCommand::Unsubscribe { id } => {
                let _ = self.dispatcher.remove_consumer(id);
                CommandOutcome::Continue
            }
            FeedCommand::Restart => CommandOutcome::Restart,
            FeedCommand::Shutdown => CommandOutcome::Exit,
        }
    }

    /// Park in the terminal state until an explicit restart.
    ///
    /// Returns false when the worker should exit instead.
    async fn wait_for_restart(&mut self) -> bool {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => match self.apply_command_offline(cmd) {
                            CommandOutcome::Restart => {
                                info!("market feed restart requested");
                                return true;
                            }
                            CommandOutcome::Exit => return false,
                            CommandOutcome::Continue => {}
                        },
                        None => return false,
                    }
                }
            }
        }
    }

    fn publish(&self, status: FeedStatus) {
        let _ = self.status.send(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_queues_command_with_key() {
        let mut feed = MarketFeed::new_for_test(FeedConfig::default());
        let sub = feed.subscribe(Channel::Orderbook, "SOL-USDC");
        assert_eq!(sub.key(), &ChannelKey::new(Channel::Orderbook, "SOL-USDC"));

        let mut cmd_rx = feed.cmd_rx.take().unwrap();
        match cmd_rx.try_recv() {
            Ok(FeedCommand::Subscribe { key, .. }) => {
                assert_eq!(key, ChannelKey::new(Channel::Orderbook, "SOL-USDC"));
            }
            other => panic!("expected subscribe command, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unsubscribe_queues_matching_id() {
        let mut feed = MarketFeed::new_for_test(FeedConfig::default());
        let sub = feed.subscribe(Channel::Ticker, "SOL-USDC");
        let id = sub.id();
        feed.unsubscribe(sub);

        let mut cmd_rx = feed.cmd_rx.take().unwrap();
        assert!(matches!(cmd_rx.try_recv(), Ok(FeedCommand::Subscribe { .. })));
        match cmd_rx.try_recv() {
            Ok(FeedCommand::Unsubscribe { id: removed }) => assert_eq!(removed, id),
            other => panic!("expected unsubscribe command, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reads_default_to_zero_values_before_any_data() {
        let mut feed = MarketFeed::new_for_test(FeedConfig::default());
        let _sub = feed.subscribe(Channel::Ticker, "SOL-USDC");

        assert!(feed.order_book("SOL-USDC", 5).bids.is_empty());
        assert!(feed.order_book_default("SOL-USDC").asks.is_empty());
        assert_eq!(feed.ticker("SOL-USDC").price, rust_decimal::Decimal::ZERO);
        assert!(feed.is_stale("SOL-USDC", 5000));
        assert!(feed.is_stale_default("SOL-USDC"));
        assert_eq!(feed.status(), FeedStatus::Idle);
        assert_eq!(feed.price_direction("SOL-USDC"), PriceDirection::Flat);
    }

    #[tokio::test]
    async fn status_watch_broadcasts_transitions() {
        let feed = MarketFeed::new_for_test(FeedConfig::default());
        let mut rx = feed.subscribe_status();
        assert_eq!(*rx.borrow(), FeedStatus::Idle);

        feed.status.send(FeedStatus::Connecting).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), FeedStatus::Connecting);
    }

    #[test]
    fn worker_not_started_without_runtime() {
        let mut feed = MarketFeed::new_internal(FeedConfig::default(), true);
        feed.start_worker_if_needed();
        assert!(feed.worker_handle.is_none());
        assert!(feed.cmd_rx.is_some());
    }
}
