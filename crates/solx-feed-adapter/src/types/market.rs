/*
[INPUT]:  Channel identifiers and market data payload shapes
[OUTPUT]: Typed market data model shared by transport and consumers
[POS]:    Types layer - wire-facing market data model
[UPDATE]: When the feed adds channels or payload fields
*/

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Logical stream categories multiplexed over one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Trades,
    Orderbook,
    Ticker,
    Balances,
    Positions,
    Orders,
    Fills,
}

impl Channel {
    /// Account-scoped channels carry no market in their subscription key
    pub fn is_account_scoped(self) -> bool {
        matches!(
            self,
            Channel::Balances | Channel::Positions | Channel::Orders | Channel::Fills
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Trades => "trades",
            Channel::Orderbook => "orderbook",
            Channel::Ticker => "ticker",
            Channel::Balances => "balances",
            Channel::Positions => "positions",
            Channel::Orders => "orders",
            Channel::Fills => "fills",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniquely identifies one logical subscription stream
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelKey {
    pub channel: Channel,
    pub market: String,
}

impl ChannelKey {
    /// Build a key; the market is ignored for account-scoped channels
    pub fn new(channel: Channel, market: impl Into<String>) -> Self {
        let market = if channel.is_account_scoped() {
            String::new()
        } else {
            market.into()
        };
        Self { channel, market }
    }

    pub fn account(channel: Channel) -> Self {
        Self {
            channel,
            market: String::new(),
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel, self.market)
    }
}

/// One (price, size) pair; a zero size deletes the level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }

    pub fn is_delete(&self) -> bool {
        self.size.is_zero()
    }
}

/// Taker side of an executed trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Single executed trade from the trades channel
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TradeData {
    #[serde(default)]
    pub id: Option<i64>,
    pub price: Decimal,
    pub size: Decimal,
    pub side: TradeSide,
    #[serde(default)]
    pub liquidation: bool,
    #[serde(default)]
    pub time: String,
}

/// Partial ticker payload; absent fields leave cached values untouched
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TickerData {
    #[serde(default, alias = "last")]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub bid: Option<Decimal>,
    #[serde(default)]
    pub ask: Option<Decimal>,
    #[serde(default, rename = "volume24h", alias = "volume")]
    pub volume: Option<Decimal>,
    #[serde(default, rename = "change24h")]
    pub change_24h: Option<Decimal>,
    #[serde(default, rename = "high24h")]
    pub high_24h: Option<Decimal>,
    #[serde(default, rename = "low24h")]
    pub low_24h: Option<Decimal>,
    #[serde(default, rename = "openPrice", alias = "open")]
    pub open_price: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use std::str::FromStr;

    use super::*;

    #[test]
    fn channel_key_display_matches_wire_format() {
        let key = ChannelKey::new(Channel::Orderbook, "SOL-USDC");
        assert_eq!(key.to_string(), "orderbook:SOL-USDC");
    }

    #[test]
    fn account_scoped_key_ignores_market() {
        let key = ChannelKey::new(Channel::Fills, "SOL-USDC");
        assert!(key.market.is_empty());
        assert_eq!(key, ChannelKey::account(Channel::Fills));
    }

    #[rstest]
    #[case("trades", Channel::Trades)]
    #[case("orderbook", Channel::Orderbook)]
    #[case("ticker", Channel::Ticker)]
    #[case("fills", Channel::Fills)]
    fn channel_round_trips_wire_name(#[case] wire: &str, #[case] expected: Channel) {
        let parsed: Channel = serde_json::from_str(&format!("\"{wire}\"")).unwrap();
        assert_eq!(parsed, expected);
        assert_eq!(expected.as_str(), wire);
    }

    #[test]
    fn ticker_data_parses_partial_payload() {
        let data: TickerData = serde_json::from_str(r#"{"last": "101.5", "bid": 101.4}"#).unwrap();
        assert_eq!(data.price, Some(Decimal::from_str("101.5").unwrap()));
        assert_eq!(data.bid, Some(Decimal::from_str("101.4").unwrap()));
        assert_eq!(data.ask, None);
        assert_eq!(data.volume, None);
    }

    #[test]
    fn trade_data_parses_with_defaults() {
        let trade: TradeData =
            serde_json::from_str(r#"{"price": "20.5", "size": "3", "side": "buy"}"#).unwrap();
        assert_eq!(trade.side, TradeSide::Buy);
        assert!(!trade.liquidation);
        assert!(trade.id.is_none());
    }

    #[test]
    fn zero_size_level_is_delete() {
        let level = PriceLevel::new(Decimal::from(100), Decimal::ZERO);
        assert!(level.is_delete());
    }
}
