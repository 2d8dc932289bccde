/*
[INPUT]:  Domain type submodules
[OUTPUT]: Public market data type surface
[POS]:    Types layer - module wiring
[UPDATE]: When adding new type modules
*/

pub mod market;

pub use market::{Channel, ChannelKey, PriceLevel, TickerData, TradeData, TradeSide};
