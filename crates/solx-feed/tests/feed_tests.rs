/*
[INPUT]:  Market feed end-to-end scenarios against a mock feed server
[OUTPUT]: Test results for connection, replay, and state reconstruction
[POS]:    Integration tests - feed service
[UPDATE]: When the feed service contract changes
*/

mod common;

use std::collections::BTreeSet;
use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;

use solx_feed::{Channel, FeedConfig, FeedEvent, FeedStatus, MarketFeed};

use common::MockFeedServer;

const WAIT: Duration = Duration::from_secs(10);

fn d(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap()
}

fn test_config(ws_url: String) -> FeedConfig {
    FeedConfig {
        ws_url,
        base_delay_ms: 10,
        ..Default::default()
    }
}

async fn wait_for_status(feed: &MarketFeed, wanted: FeedStatus) {
    let mut rx = feed.subscribe_status();
    tokio::time::timeout(WAIT, async {
        loop {
            if *rx.borrow() == wanted {
                return;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .unwrap_or_else(|_| panic!("status never reached {wanted:?}"));
}

#[tokio::test]
async fn snapshot_then_update_rebuilds_the_book() {
    let server = MockFeedServer::start().await;
    let mut feed = MarketFeed::new(test_config(server.ws_url()));
    let mut sub = feed.subscribe(Channel::Orderbook, "SOL-USDC");

    let mut conn = server.accept().await;
    let frame = conn.recv_json().await;
    assert_eq!(frame["op"], "subscribe");
    assert_eq!(frame["channel"], "orderbook");
    assert_eq!(frame["market"], "SOL-USDC");
    assert_eq!(feed.status(), FeedStatus::Connected);

    conn.send_json(json!({
        "channel": "orderbook",
        "market": "SOL-USDC",
        "type": "snapshot",
        "data": {
            "bids": [{"price": "19.98", "size": "40"}, {"price": "19.97", "size": "10"}],
            "asks": [{"price": "20.00", "size": "5"}, {"price": "20.02", "size": "8"}],
        },
    }))
    .await;

    let event = tokio::time::timeout(WAIT, sub.recv()).await.unwrap().unwrap();
    assert!(matches!(event, FeedEvent::Book(_)));

    let view = feed.order_book("SOL-USDC", 5);
    assert_eq!(view.bids.len(), 2);
    assert_eq!(view.asks.len(), 2);
    assert_eq!(view.spread(), Some(d("0.02")));

    // deleting the best ask moves the spread to the next level
    conn.send_json(json!({
        "channel": "orderbook",
        "market": "SOL-USDC",
        "type": "update",
        "data": {"asks": [{"price": "20.00", "size": "0"}]},
    }))
    .await;

    let event = tokio::time::timeout(WAIT, sub.recv()).await.unwrap().unwrap();
    assert!(matches!(event, FeedEvent::Book(_)));

    let view = feed.order_book("SOL-USDC", 5);
    assert_eq!(view.best_ask().map(|l| l.price), Some(d("20.02")));
    assert_eq!(view.asks.len(), 1);
    assert_eq!(view.spread(), Some(d("0.04")));
}

#[tokio::test]
async fn keys_subscribed_while_disconnected_replay_exactly_once() {
    let server = MockFeedServer::start().await;
    let mut feed = MarketFeed::new(test_config(server.ws_url()));
    let _book = feed.subscribe(Channel::Orderbook, "SOL-USDC");
    let _trades = feed.subscribe(Channel::Trades, "SOL-USDC");
    let _ticker = feed.subscribe(Channel::Ticker, "BONK-USDC");

    let mut conn = server.accept().await;
    let mut seen = BTreeSet::new();
    for _ in 0..3 {
        let frame = conn.recv_json().await;
        assert_eq!(frame["op"], "subscribe");
        seen.insert(format!("{}:{}", frame["channel"], frame["market"]));
    }
    assert_eq!(seen.len(), 3, "each key must be subscribed exactly once");
    assert!(seen.contains("\"orderbook\":\"SOL-USDC\""));
    assert!(seen.contains("\"trades\":\"SOL-USDC\""));
    assert!(seen.contains("\"ticker\":\"BONK-USDC\""));
}

#[tokio::test]
async fn reconnect_replays_subscriptions_and_resyncs_the_book() {
    let server = MockFeedServer::start().await;
    let mut feed = MarketFeed::new(test_config(server.ws_url()));
    let mut sub = feed.subscribe(Channel::Orderbook, "SOL-USDC");

    let mut conn = server.accept().await;
    assert_eq!(conn.recv_json().await["op"], "subscribe");
    conn.send_json(json!({
        "channel": "orderbook",
        "market": "SOL-USDC",
        "type": "snapshot",
        "data": {"bids": [{"price": "19.90", "size": "1"}], "asks": []},
    }))
    .await;
    tokio::time::timeout(WAIT, sub.recv()).await.unwrap().unwrap();

    // server drops the connection; the feed must come back on its own
    conn.close().await;

    let mut conn = server.accept().await;
    let frame = conn.recv_json().await;
    assert_eq!(frame["op"], "subscribe");
    assert_eq!(frame["market"], "SOL-USDC");
    assert_eq!(feed.status(), FeedStatus::Connected);

    // the fresh snapshot replaces the pre-disconnect book wholesale
    conn.send_json(json!({
        "channel": "orderbook",
        "market": "SOL-USDC",
        "type": "snapshot",
        "data": {"bids": [{"price": "19.50", "size": "2"}], "asks": []},
    }))
    .await;
    tokio::time::timeout(WAIT, sub.recv()).await.unwrap().unwrap();

    let view = feed.order_book("SOL-USDC", 5);
    assert_eq!(view.bids.len(), 1);
    assert_eq!(view.bids[0].price, d("19.50"));
}

#[tokio::test]
async fn ticker_updates_reach_cache_with_staleness() {
    let server = MockFeedServer::start().await;
    let mut feed = MarketFeed::new(test_config(server.ws_url()));
    let mut sub = feed.subscribe(Channel::Ticker, "SOL-USDC");

    let mut conn = server.accept().await;
    assert_eq!(conn.recv_json().await["op"], "subscribe");

    conn.send_json(json!({
        "channel": "ticker",
        "market": "SOL-USDC",
        "type": "update",
        "data": {"last": "20.01", "bid": "20.00", "ask": "20.02", "volume24h": "1500"},
    }))
    .await;

    let event = tokio::time::timeout(WAIT, sub.recv()).await.unwrap().unwrap();
    assert!(matches!(event, FeedEvent::Ticker(_)));

    let ticker = feed.ticker("SOL-USDC");
    assert_eq!(ticker.price, d("20.01"));
    assert_eq!(ticker.volume, d("1500"));
    assert!(!feed.is_stale("SOL-USDC", 60_000));
    assert!(feed.is_stale("BONK-USDC", 60_000));
}

#[tokio::test]
async fn unsubscribing_last_consumer_sends_unsubscribe_frame() {
    let server = MockFeedServer::start().await;
    let mut feed = MarketFeed::new(test_config(server.ws_url()));
    let sub = feed.subscribe(Channel::Trades, "SOL-USDC");

    let mut conn = server.accept().await;
    assert_eq!(conn.recv_json().await["op"], "subscribe");

    feed.unsubscribe(sub);
    let frame = conn.recv_json().await;
    assert_eq!(frame["op"], "unsubscribe");
    assert_eq!(frame["channel"], "trades");
    assert_eq!(frame["market"], "SOL-USDC");
}

#[tokio::test]
async fn exhausted_policy_waits_for_explicit_restart() {
    // reserve an address, then kill the listener so connects are refused
    let addr = {
        let server = MockFeedServer::start().await;
        server.addr()
    };

    let config = FeedConfig {
        ws_url: format!("ws://{addr}"),
        base_delay_ms: 1,
        max_attempts: 2,
        ..Default::default()
    };
    let mut feed = MarketFeed::new(config);
    let mut sub = feed.subscribe(Channel::Ticker, "SOL-USDC");

    wait_for_status(&feed, FeedStatus::Exhausted).await;

    // no reconnect happens until restart; reads still serve zero defaults
    assert_eq!(feed.ticker("SOL-USDC").price, Decimal::ZERO);
    assert!(sub.try_recv().is_none());

    // the endpoint comes back and an explicit restart recovers
    let server = MockFeedServer::start_at(&addr).await;
    feed.restart();

    let mut conn = server.accept().await;
    assert_eq!(conn.recv_json().await["op"], "subscribe");
    assert_eq!(feed.status(), FeedStatus::Connected);
}
