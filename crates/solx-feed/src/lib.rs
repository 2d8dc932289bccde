/*
[INPUT]:  Public API exports for the solx-feed crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod book;
pub mod config;
pub mod dispatch;
pub mod feed;
pub mod mux;
pub mod status;
pub mod ticker;

// Re-export main types for convenience
pub use book::{ApplyOutcome, BookStore, BookView, PriceDirection};
pub use config::FeedConfig;
pub use dispatch::Dispatcher;
pub use feed::{MarketFeed, Subscription};
pub use mux::{FeedEvent, SubscriptionId, SubscriptionRegistry};
pub use status::{FeedStatus, backoff_delay};
pub use ticker::{TickerCache, TickerSnapshot};

// Re-export the adapter surface consumers need alongside the service
pub use solx_feed_adapter::{
    Channel, ChannelKey, ClientFrame, FeedError, PriceLevel, TickerData, TradeData, TradeSide,
};
