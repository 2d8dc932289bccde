/*
[INPUT]:  Snapshot and diff messages per market
[OUTPUT]: Sorted, deduplicated bid/ask views plus derived spread metrics
[POS]:    State layer - order book reconstruction
[UPDATE]: When book application rules or derived metrics change
*/

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use tracing::{debug, warn};

use solx_feed_adapter::PriceLevel;
use solx_feed_adapter::ws::{BookKind, BookMessage};

/// Outcome of applying one book message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Update arrived before the baseline snapshot and was queued
    Buffered,
    /// Pending-update buffer overflowed; the market needs a fresh snapshot cycle
    Resync,
}

/// Direction of the last midpoint move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceDirection {
    Up,
    Down,
    #[default]
    Flat,
}

/// Read-side view of one market's book, truncated to the requested depth
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookView {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

impl BookView {
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Absolute spread; None until both sides have at least one level
    pub fn spread(&self) -> Option<Decimal> {
        let bid = self.best_bid()?.price;
        let ask = self.best_ask()?.price;
        Some(ask - bid)
    }

    /// Spread as a percentage of the best ask
    pub fn spread_pct(&self) -> Option<Decimal> {
        let spread = self.spread()?;
        let ask = self.best_ask()?.price;
        if ask.is_zero() {
            return None;
        }
        Some(spread / ask * Decimal::ONE_HUNDRED)
    }

    pub fn midpoint(&self) -> Option<Decimal> {
        let bid = self.best_bid()?.price;
        let ask = self.best_ask()?.price;
        Some((bid + ask) / Decimal::TWO)
    }
}

/// Both sides of one market's book.
///
/// Levels are keyed by exact decimal price, so per-price uniqueness and
/// strict ordering hold by construction; zero-size levels never enter the
/// maps.
#[derive(Debug, Default)]
struct OrderBook {
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
}

impl OrderBook {
    fn replace(&mut self, msg: &BookMessage) {
        self.bids.clear();
        self.asks.clear();
        Self::merge_side(&mut self.bids, &msg.bids);
        Self::merge_side(&mut self.asks, &msg.asks);
    }

    fn merge(&mut self, msg: &BookMessage) {
        Self::merge_side(&mut self.bids, &msg.bids);
        Self::merge_side(&mut self.asks, &msg.asks);
    }

    fn merge_side(side: &mut BTreeMap<Decimal, Decimal>, levels: &[PriceLevel]) {
        for level in levels {
            if level.size.is_zero() {
                // deleting an absent price is a no-op
                side.remove(&level.price);
            } else {
                // insert-or-replace; the last write for a price in a batch wins
                side.insert(level.price, level.size);
            }
        }
    }

    fn midpoint(&self) -> Option<Decimal> {
        let bid = *self.bids.keys().next_back()?;
        let ask = *self.asks.keys().next()?;
        Some((bid + ask) / Decimal::TWO)
    }

    fn view(&self, depth: usize) -> BookView {
        BookView {
            bids: self
                .bids
                .iter()
                .rev()
                .take(depth)
                .map(|(price, size)| PriceLevel::new(*price, *size))
                .collect(),
            asks: self
                .asks
                .iter()
                .take(depth)
                .map(|(price, size)| PriceLevel::new(*price, *size))
                .collect(),
        }
    }
}

#[derive(Debug)]
struct MarketBook {
    book: OrderBook,
    /// False until a snapshot arrives for the current subscription cycle
    synced: bool,
    pending: Vec<BookMessage>,
    last_mid: Option<Decimal>,
    direction: PriceDirection,
}

impl Default for MarketBook {
    fn default() -> Self {
        Self {
            book: OrderBook::default(),
            synced: false,
            pending: Vec::new(),
            last_mid: None,
            direction: PriceDirection::Flat,
        }
    }
}

impl MarketBook {
    fn update_direction(&mut self) {
        let Some(mid) = self.book.midpoint() else {
            return;
        };
        self.direction = match self.last_mid {
            Some(prev) if mid > prev => PriceDirection::Up,
            Some(prev) if mid < prev => PriceDirection::Down,
            Some(_) => self.direction,
            None => PriceDirection::Flat,
        };
        self.last_mid = Some(mid);
    }
}

/// Per-market order books driven by snapshot + diff messages.
///
/// Updates that arrive before the baseline snapshot are buffered and
/// replayed in arrival order once it lands; the buffer is bounded, and
/// overflowing it marks the market for a fresh subscribe/snapshot cycle.
#[derive(Debug)]
pub struct BookStore {
    books: HashMap<String, MarketBook>,
    pending_limit: usize,
}

impl BookStore {
    pub fn new(pending_limit: usize) -> Self {
        Self {
            books: HashMap::new(),
            pending_limit,
        }
    }

    pub fn apply(&mut self, market: &str, msg: BookMessage) -> ApplyOutcome {
        let entry = self.books.entry(market.to_string()).or_default();
        let outcome = match msg.kind {
            BookKind::Snapshot => {
                entry.book.replace(&msg);
                let pending = std::mem::take(&mut entry.pending);
                if !pending.is_empty() {
                    debug!(
                        market,
                        queued = pending.len(),
                        "replaying updates buffered before snapshot"
                    );
                    for queued in &pending {
                        entry.book.merge(queued);
                    }
                }
                entry.synced = true;
                ApplyOutcome::Applied
            }
            BookKind::Update if entry.synced => {
                entry.book.merge(&msg);
                ApplyOutcome::Applied
            }
            BookKind::Update => {
                entry.pending.push(msg);
                if entry.pending.len() > self.pending_limit {
                    warn!(
                        market,
                        dropped = entry.pending.len(),
                        "pending update buffer overflowed; forcing resync"
                    );
                    entry.pending.clear();
                    ApplyOutcome::Resync
                } else {
                    ApplyOutcome::Buffered
                }
            }
        };

        if matches!(outcome, ApplyOutcome::Applied) {
            entry.update_direction();
        }
        outcome
    }

    /// Top `depth` levels per side; unknown markets read as an empty book
    pub fn view(&self, market: &str, depth: usize) -> BookView {
        match self.books.get(market) {
            Some(entry) => entry.book.view(depth.max(1)),
            None => BookView::default(),
        }
    }

    pub fn direction(&self, market: &str) -> PriceDirection {
        self.books
            .get(market)
            .map(|entry| entry.direction)
            .unwrap_or_default()
    }

    /// Mark every market as awaiting a fresh snapshot.
    ///
    /// Called on disconnect: the last known levels stay readable, but any
    /// update arriving before the post-reconnect snapshot is buffered
    /// rather than merged onto stale state.
    pub fn reset_all(&mut self) {
        for entry in self.books.values_mut() {
            entry.synced = false;
            entry.pending.clear();
        }
    }

    pub fn reset(&mut self, market: &str) {
        if let Some(entry) = self.books.get_mut(market) {
            entry.synced = false;
            entry.pending.clear();
        }
    }

    pub fn is_synced(&self, market: &str) -> bool {
        self.books
            .get(market)
            .map(|entry| entry.synced)
            .unwrap_or(false)
    }
}
