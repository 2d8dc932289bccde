/*
[INPUT]:  Test configuration and mock server requirements
[OUTPUT]: Shared mock feed server for integration tests
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for solx-feed tests

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

const RECV_TIMEOUT: Duration = Duration::from_secs(10);

/// In-process WebSocket server standing in for the exchange feed
pub struct MockFeedServer {
    listener: TcpListener,
}

impl MockFeedServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self { listener }
    }

    /// Bind on a specific address, e.g. to resurrect a dead endpoint
    pub async fn start_at(addr: &str) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        Self { listener }
    }

    pub fn addr(&self) -> String {
        self.listener.local_addr().unwrap().to_string()
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr())
    }

    pub async fn accept(&self) -> MockConnection {
        let (stream, _) = tokio::time::timeout(RECV_TIMEOUT, self.listener.accept())
            .await
            .expect("client connect within timeout")
            .unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        MockConnection { ws }
    }
}

/// One accepted client connection
pub struct MockConnection {
    ws: WebSocketStream<TcpStream>,
}

impl MockConnection {
    /// Next JSON frame from the client, skipping heartbeat pings
    pub async fn recv_json(&mut self) -> Value {
        loop {
            let msg = tokio::time::timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .expect("client frame within timeout")
                .expect("connection open")
                .expect("websocket read");
            if let Message::Text(text) = msg {
                let value: Value = serde_json::from_str(&text).unwrap();
                if value["op"] == "ping" {
                    continue;
                }
                return value;
            }
        }
    }

    pub async fn send_json(&mut self, value: Value) {
        self.ws
            .send(Message::Text(value.to_string().into()))
            .await
            .unwrap();
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
