/*
[INPUT]:  Raw JSON frames to and from the feed socket
[OUTPUT]: Typed envelope structs for the feed protocol
[POS]:    WebSocket layer - wire frame schema
[UPDATE]: When the feed protocol adds ops or frame kinds
*/

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FeedError, Result};
use crate::types::{Channel, ChannelKey, PriceLevel};

/// Operation verbs sent by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientOp {
    Subscribe,
    Unsubscribe,
    Ping,
}

/// Frame sent by the client: subscription management and heartbeats
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClientFrame {
    pub op: ClientOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market: Option<String>,
}

impl ClientFrame {
    pub fn subscribe(key: &ChannelKey) -> Self {
        Self {
            op: ClientOp::Subscribe,
            channel: Some(key.channel),
            market: frame_market(key),
        }
    }

    pub fn unsubscribe(key: &ChannelKey) -> Self {
        Self {
            op: ClientOp::Unsubscribe,
            channel: Some(key.channel),
            market: frame_market(key),
        }
    }

    pub fn ping() -> Self {
        Self {
            op: ClientOp::Ping,
            channel: None,
            market: None,
        }
    }
}

fn frame_market(key: &ChannelKey) -> Option<String> {
    if key.market.is_empty() {
        None
    } else {
        Some(key.market.clone())
    }
}

/// Discriminator on inbound frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Snapshot,
    Update,
    Pong,
    Error,
    #[serde(other)]
    Unknown,
}

/// Frame received from the feed; channel-less frames are control traffic
#[derive(Debug, Clone, Deserialize)]
pub struct ServerFrame {
    #[serde(default)]
    pub channel: Option<Channel>,
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<FrameKind>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl ServerFrame {
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Subscription key this frame belongs to, if it carries a channel
    pub fn key(&self) -> Option<ChannelKey> {
        let channel = self.channel?;
        Some(ChannelKey::new(
            channel,
            self.market.clone().unwrap_or_default(),
        ))
    }

    /// Deserialize the data payload into a concrete type
    pub fn payload<T>(&self) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let data = self
            .data
            .clone()
            .ok_or_else(|| FeedError::InvalidFrame("frame missing data payload".to_string()))?;
        Ok(serde_json::from_value(data)?)
    }

    /// Interpret an orderbook frame as a snapshot or update message
    pub fn book_message(&self) -> Result<BookMessage> {
        let kind = match self.kind {
            Some(FrameKind::Snapshot) => BookKind::Snapshot,
            Some(FrameKind::Update) => BookKind::Update,
            other => {
                return Err(FeedError::InvalidFrame(format!(
                    "orderbook frame without snapshot/update kind: {other:?}"
                )));
            }
        };
        let levels: BookLevels = match &self.data {
            Some(data) => serde_json::from_value(data.clone())?,
            None => BookLevels::default(),
        };
        Ok(BookMessage {
            kind,
            bids: levels.bids,
            asks: levels.asks,
        })
    }
}

/// Price levels carried by an orderbook frame
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BookLevels {
    #[serde(default)]
    pub bids: Vec<PriceLevel>,
    #[serde(default)]
    pub asks: Vec<PriceLevel>,
}

/// A snapshot fully replaces the book; an update touches only named levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookKind {
    Snapshot,
    Update,
}

/// Decoded orderbook message
#[derive(Debug, Clone, PartialEq)]
pub struct BookMessage {
    pub kind: BookKind,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}
