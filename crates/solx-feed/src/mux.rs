/*
[INPUT]:  Consumer subscribe/unsubscribe calls and routed feed payloads
[OUTPUT]: Per-key consumer fan-out and replayable subscription set
[POS]:    Data layer - subscription registry
[UPDATE]: When subscription bookkeeping or delivery rules change
*/

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use solx_feed_adapter::ws::BookMessage;
use solx_feed_adapter::{ChannelKey, ClientFrame, TickerData, TradeData};

/// Identifies one registered consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Owned payload delivered to subscribers; never a reference into feed state
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Trades(Vec<TradeData>),
    Book(BookMessage),
    Ticker(TickerData),
    Account(Value),
}

#[derive(Debug)]
struct Consumer {
    id: SubscriptionId,
    tx: mpsc::UnboundedSender<FeedEvent>,
}

/// Registry of (channel, market) -> consumers, kept in registration order.
///
/// The registry is the single owner of subscription entries; an entry exists
/// exactly while it has at least one consumer.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<ChannelKey, Vec<Consumer>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer; returns true when it is the first for the key
    pub fn add(
        &mut self,
        key: ChannelKey,
        id: SubscriptionId,
        tx: mpsc::UnboundedSender<FeedEvent>,
    ) -> bool {
        let consumers = self.entries.entry(key).or_default();
        let first = consumers.is_empty();
        consumers.push(Consumer { id, tx });
        first
    }

    /// Remove a consumer; returns the key when its consumer set became empty
    pub fn remove(&mut self, id: SubscriptionId) -> Option<ChannelKey> {
        let key = self.entries.iter().find_map(|(key, consumers)| {
            consumers
                .iter()
                .any(|consumer| consumer.id == id)
                .then(|| key.clone())
        })?;

        let consumers = self.entries.get_mut(&key)?;
        consumers.retain(|consumer| consumer.id != id);
        if consumers.is_empty() {
            self.entries.remove(&key);
            Some(key)
        } else {
            None
        }
    }

    /// One subscribe frame per active key, for replay after (re)connect
    pub fn replay_frames(&self) -> Vec<ClientFrame> {
        self.entries.keys().map(ClientFrame::subscribe).collect()
    }

    pub fn contains(&self, key: &ChannelKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Deliver to every consumer of `key` in registration order.
    ///
    /// Consumers whose receiver is gone are pruned; when the last one goes,
    /// the entry is dropped and the key is returned so the caller can send
    /// an unsubscribe frame.
    pub fn route(&mut self, key: &ChannelKey, event: FeedEvent) -> Option<ChannelKey> {
        let consumers = self.entries.get_mut(key)?;
        consumers.retain(|consumer| consumer.tx.send(event.clone()).is_ok());
        if consumers.is_empty() {
            debug!(%key, "all consumers gone; dropping subscription entry");
            self.entries.remove(key);
            Some(key.clone())
        } else {
            None
        }
    }
}
