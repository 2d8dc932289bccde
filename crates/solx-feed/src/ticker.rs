/*
[INPUT]:  Partial ticker payloads per symbol
[OUTPUT]: Latest-known snapshots with read-time staleness
[POS]:    State layer - per-symbol price cache
[UPDATE]: When ticker fields or staleness semantics change
*/

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use solx_feed_adapter::TickerData;

/// Latest known state for one symbol; fields stay zero until first seen.
///
/// Snapshots are created on the first message for a symbol and never
/// deleted during a session; consumers decide freshness via `is_stale`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerSnapshot {
    pub symbol: String,
    pub price: Decimal,
    pub volume: Decimal,
    pub change_24h: Decimal,
    pub high_24h: Decimal,
    pub low_24h: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub open_price: Decimal,
    pub last_update: Option<DateTime<Utc>>,
}

impl TickerSnapshot {
    pub fn empty(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            price: Decimal::ZERO,
            volume: Decimal::ZERO,
            change_24h: Decimal::ZERO,
            high_24h: Decimal::ZERO,
            low_24h: Decimal::ZERO,
            bid: Decimal::ZERO,
            ask: Decimal::ZERO,
            open_price: Decimal::ZERO,
            last_update: None,
        }
    }

    /// 24h change relative to the open price, in percent
    pub fn change_pct(&self) -> Decimal {
        if self.open_price.is_zero() {
            return Decimal::ZERO;
        }
        (self.price - self.open_price) / self.open_price * Decimal::ONE_HUNDRED
    }
}

/// Per-symbol latest-price cache.
///
/// There is no background expiry; staleness is computed at read time
/// against a caller-supplied threshold.
#[derive(Debug, Default)]
pub struct TickerCache {
    tickers: HashMap<String, TickerSnapshot>,
}

impl TickerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the fields present in `update` and advance `last_update`
    pub fn apply(&mut self, symbol: &str, update: &TickerData) {
        self.apply_at(symbol, update, Utc::now());
    }

    fn apply_at(&mut self, symbol: &str, update: &TickerData, now: DateTime<Utc>) {
        let entry = self
            .tickers
            .entry(symbol.to_string())
            .or_insert_with(|| TickerSnapshot::empty(symbol));

        if let Some(price) = update.price {
            entry.price = price;
        }
        if let Some(bid) = update.bid {
            entry.bid = bid;
        }
        if let Some(ask) = update.ask {
            entry.ask = ask;
        }
        if let Some(volume) = update.volume {
            entry.volume = volume;
        }
        if let Some(change) = update.change_24h {
            entry.change_24h = change;
        }
        if let Some(high) = update.high_24h {
            entry.high_24h = high;
        }
        if let Some(low) = update.low_24h {
            entry.low_24h = low;
        }
        if let Some(open) = update.open_price {
            entry.open_price = open;
        }
        entry.last_update = Some(now);
    }

    /// Stored snapshot, or an all-zero default for unseen symbols
    pub fn get(&self, symbol: &str) -> TickerSnapshot {
        self.tickers
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| TickerSnapshot::empty(symbol))
    }

    /// True when the symbol's last update is older than `threshold_ms`.
    ///
    /// A never-seen symbol is always stale.
    pub fn is_stale(&self, symbol: &str, threshold_ms: u64) -> bool {
        self.stale_at(symbol, threshold_ms, Utc::now())
    }

    fn stale_at(&self, symbol: &str, threshold_ms: u64, now: DateTime<Utc>) -> bool {
        let Some(last) = self.tickers.get(symbol).and_then(|t| t.last_update) else {
            return true;
        };
        (now - last).num_milliseconds() > threshold_ms as i64
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }
}
