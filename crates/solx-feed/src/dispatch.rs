/*
[INPUT]:  Raw inbound frames from the transport
[OUTPUT]: Updated book/ticker state, consumer fan-out, and resync frames
[POS]:    Data layer - single mutation path for shared feed state
[UPDATE]: When channels gain payload types or routing rules change
*/

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use solx_feed_adapter::ws::{FrameKind, ServerFrame};
use solx_feed_adapter::{Channel, ChannelKey, ClientFrame, FeedError, TickerData, TradeData};

use crate::book::{ApplyOutcome, BookStore};
use crate::mux::{FeedEvent, SubscriptionId, SubscriptionRegistry};
use crate::ticker::TickerCache;

const PARSE_FAIL_LOG_LIMIT: usize = 5;

static PARSE_FAIL_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Routes inbound frames into the shared state and out to consumers.
///
/// All mutation of the registry, book store, and ticker cache happens here,
/// one message at a time in arrival order; readers only ever take snapshots
/// through the shared locks.
#[derive(Debug)]
pub struct Dispatcher {
    registry: SubscriptionRegistry,
    books: Arc<RwLock<BookStore>>,
    tickers: Arc<RwLock<TickerCache>>,
}

impl Dispatcher {
    pub fn new(books: Arc<RwLock<BookStore>>, tickers: Arc<RwLock<TickerCache>>) -> Self {
        Self {
            registry: SubscriptionRegistry::new(),
            books,
            tickers,
        }
    }

    pub fn add_consumer(
        &mut self,
        key: ChannelKey,
        id: SubscriptionId,
        tx: tokio::sync::mpsc::UnboundedSender<FeedEvent>,
    ) -> bool {
        self.registry.add(key, id, tx)
    }

    pub fn remove_consumer(&mut self, id: SubscriptionId) -> Option<ChannelKey> {
        self.registry.remove(id)
    }

    pub fn replay_frames(&self) -> Vec<ClientFrame> {
        self.registry.replay_frames()
    }

    pub fn has_subscriptions(&self) -> bool {
        !self.registry.is_empty()
    }

    /// Mark every book as awaiting a fresh snapshot (called on disconnect)
    pub fn reset_books(&self) {
        self.books
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .reset_all();
    }

    /// Route one raw frame; returns frames the caller must send
    /// (resync cycles and unsubscribes for keys that lost all consumers).
    pub fn handle_raw(&mut self, raw: &str) -> Vec<ClientFrame> {
        let frame = match ServerFrame::parse(raw) {
            Ok(frame) => frame,
            Err(err) => {
                log_parse_drop_once(&err, raw);
                return Vec::new();
            }
        };

        if matches!(frame.kind, Some(FrameKind::Pong)) {
            return Vec::new();
        }
        if matches!(frame.kind, Some(FrameKind::Error)) {
            warn!(payload = ?frame.data, "feed reported an error frame");
            return Vec::new();
        }

        let Some(key) = frame.key() else {
            debug!("dropping channel-less frame");
            return Vec::new();
        };

        match key.channel {
            Channel::Orderbook => self.handle_book(&key, &frame),
            Channel::Ticker => self.handle_ticker(&key, &frame),
            Channel::Trades => self.handle_trades(&key, &frame),
            _ => self.handle_account(&key, &frame),
        }
    }

    fn handle_book(&mut self, key: &ChannelKey, frame: &ServerFrame) -> Vec<ClientFrame> {
        let msg = match frame.book_message() {
            Ok(msg) => msg,
            Err(err) => {
                debug!(%key, error = %err, "dropping malformed orderbook frame");
                return Vec::new();
            }
        };

        let outcome = self
            .books
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(&key.market, msg.clone());

        let mut frames = Vec::new();
        if matches!(outcome, ApplyOutcome::Resync) {
            warn!(%key, "forcing snapshot resync");
            frames.push(ClientFrame::unsubscribe(key));
            frames.push(ClientFrame::subscribe(key));
        }

        // fan out after mutation so consumers reading the book on wake see
        // the post-message view
        if let Some(emptied) = self.registry.route(key, FeedEvent::Book(msg)) {
            frames.push(ClientFrame::unsubscribe(&emptied));
        }
        frames
    }

    fn handle_ticker(&mut self, key: &ChannelKey, frame: &ServerFrame) -> Vec<ClientFrame> {
        let data: TickerData = match frame.payload() {
            Ok(data) => data,
            Err(err) => {
                debug!(%key, error = %err, "dropping malformed ticker frame");
                return Vec::new();
            }
        };

        self.tickers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(&key.market, &data);

        self.unsubscribe_if_emptied(key, FeedEvent::Ticker(data))
    }

    fn handle_trades(&mut self, key: &ChannelKey, frame: &ServerFrame) -> Vec<ClientFrame> {
        let trades: Vec<TradeData> = match frame.payload() {
            Ok(trades) => trades,
            Err(err) => {
                debug!(%key, error = %err, "dropping malformed trades frame");
                return Vec::new();
            }
        };

        self.unsubscribe_if_emptied(key, FeedEvent::Trades(trades))
    }

    fn handle_account(&mut self, key: &ChannelKey, frame: &ServerFrame) -> Vec<ClientFrame> {
        let payload = frame.data.clone().unwrap_or(serde_json::Value::Null);
        self.unsubscribe_if_emptied(key, FeedEvent::Account(payload))
    }

    fn unsubscribe_if_emptied(&mut self, key: &ChannelKey, event: FeedEvent) -> Vec<ClientFrame> {
        match self.registry.route(key, event) {
            Some(emptied) => vec![ClientFrame::unsubscribe(&emptied)],
            None => Vec::new(),
        }
    }
}

fn log_parse_drop_once(err: &FeedError, raw: &str) {
    let count = PARSE_FAIL_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count < PARSE_FAIL_LOG_LIMIT {
        warn!(
            sample_index = count + 1,
            sample_limit = PARSE_FAIL_LOG_LIMIT,
            error = %err,
            bytes = raw.len(),
            "inbound frame parse failed"
        );
    }
}
