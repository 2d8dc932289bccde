/*
[INPUT]:  Feed endpoint URL and outbound client frames
[OUTPUT]: Connection state transitions and raw inbound messages via channels
[POS]:    WebSocket layer - single duplex socket ownership
[UPDATE]: When connection lifecycle or framing behavior changes
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::ws::frame::ClientFrame;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const OUTBOUND_CHANNEL_CAPACITY: usize = 256;
const SEND_DROP_LOG_LIMIT: usize = 5;

static SEND_DROP_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Socket lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// Events emitted by the transport; delivered in occurrence order
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Closed { code: Option<u16>, reason: String },
    Error(String),
}

/// One duplex streaming socket to the feed endpoint.
///
/// The transport knows nothing about subscriptions or book semantics; it
/// forwards raw text frames and reports lifecycle transitions. `open` never
/// fails synchronously: connect failures surface as an `Error` event followed
/// by `Closed`, with the state returning to `Disconnected`.
#[derive(Debug)]
pub struct FeedTransport {
    state: watch::Sender<TransportState>,
    event_tx: mpsc::Sender<TransportEvent>,
    event_rx: Option<mpsc::Receiver<TransportEvent>>,
    outbound_tx: Arc<Mutex<Option<mpsc::Sender<WsMessage>>>>,
}

impl FeedTransport {
    pub fn new() -> Self {
        let (state, _rx) = watch::channel(TransportState::Disconnected);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state,
            event_tx,
            event_rx: Some(event_rx),
            outbound_tx: Arc::new(Mutex::new(None)),
        }
    }

    /// Get the event receiver; yields once
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.event_rx.take()
    }

    pub fn state(&self) -> TransportState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<TransportState> {
        self.state.subscribe()
    }

    /// Start connecting to the endpoint.
    ///
    /// Spawns the socket task and returns immediately. A second call while a
    /// connection is in flight is ignored.
    pub fn open(&self, endpoint: &str) {
        if !matches!(self.state(), TransportState::Disconnected) {
            debug!(state = ?self.state(), "open ignored; transport not disconnected");
            return;
        }
        let _ = self.state.send(TransportState::Connecting);
        info!(endpoint, "connecting to feed WebSocket");

        tokio::spawn(connect_and_pump(
            endpoint.to_string(),
            self.state.clone(),
            self.event_tx.clone(),
            Arc::clone(&self.outbound_tx),
        ));
    }

    /// Send a frame; silently dropped when the connection is not open.
    ///
    /// Upstream callers must never block on network state, so there is no
    /// error path here.
    pub async fn send(&self, frame: &ClientFrame) {
        if !matches!(self.state(), TransportState::Open) {
            log_send_drop_once(frame);
            return;
        }
        let text = match serde_json::to_string(frame) {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "client frame serialization failed");
                return;
            }
        };

        let sender = { self.outbound_tx.lock().await.clone() };
        let Some(sender) = sender else {
            log_send_drop_once(frame);
            return;
        };
        // fire-and-forget: a full or closed outbound queue drops the frame
        // rather than blocking the dispatch path
        if let Err(err) = sender.try_send(WsMessage::Text(text.into())) {
            debug!(error = %err, "transport outbound frame dropped");
        }
    }

    /// Close the socket; idempotent and safe to call in any state.
    pub async fn close(&self) {
        if matches!(self.state(), TransportState::Disconnected) {
            return;
        }
        let _ = self.state.send(TransportState::Closing);
        let mut guard = self.outbound_tx.lock().await;
        // dropping the sender ends the pump, which sends a close frame
        *guard = None;
    }
}

impl Default for FeedTransport {
    fn default() -> Self {
        Self::new()
    }
}

async fn connect_and_pump(
    endpoint: String,
    state: watch::Sender<TransportState>,
    event_tx: mpsc::Sender<TransportEvent>,
    outbound_slot: Arc<Mutex<Option<mpsc::Sender<WsMessage>>>>,
) {
    let (ws_stream, _response) = match connect_async(endpoint.as_str()).await {
        Ok(pair) => pair,
        Err(err) => {
            warn!(endpoint = %endpoint, error = %err, "feed WebSocket connect failed");
            let _ = event_tx.send(TransportEvent::Error(err.to_string())).await;
            let _ = state.send(TransportState::Disconnected);
            let _ = event_tx
                .send(TransportEvent::Closed {
                    code: None,
                    reason: "connect failed".to_string(),
                })
                .await;
            return;
        }
    };

    // a close() issued while the connect was in flight wins
    if matches!(*state.borrow(), TransportState::Closing) {
        let _ = state.send(TransportState::Disconnected);
        let _ = event_tx
            .send(TransportEvent::Closed {
                code: None,
                reason: "closed before open".to_string(),
            })
            .await;
        return;
    }

    let (mut write, mut read) = ws_stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
    {
        let mut guard = outbound_slot.lock().await;
        *guard = Some(outbound_tx);
    }
    let _ = state.send(TransportState::Open);
    let _ = event_tx.send(TransportEvent::Opened).await;

    let mut close_info: Option<(Option<u16>, String)> = None;

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(message) => {
                        if let Err(err) = write.send(message).await {
                            let _ = event_tx.send(TransportEvent::Error(err.to_string())).await;
                            break;
                        }
                    }
                    None => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        break;
                    }
                }
            }
            incoming = read.next() => {
                match incoming {
                    Some(Ok(WsMessage::Close(frame))) => {
                        close_info = frame.map(|f| (Some(u16::from(f.code)), f.reason.to_string()));
                        let _ = write.send(WsMessage::Close(None)).await;
                        break;
                    }
                    Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => {}
                    Some(Ok(WsMessage::Text(text))) => {
                        if event_tx.send(TransportEvent::Message(text.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Binary(bytes))) => {
                        match String::from_utf8(bytes.to_vec()) {
                            Ok(text) => {
                                if event_tx.send(TransportEvent::Message(text)).await.is_err() {
                                    break;
                                }
                            }
                            Err(_) => {
                                debug!(bytes = bytes.len(), "dropping non-UTF-8 binary frame");
                            }
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        let _ = event_tx.send(TransportEvent::Error(err.to_string())).await;
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    {
        let mut guard = outbound_slot.lock().await;
        *guard = None;
    }
    let _ = state.send(TransportState::Disconnected);
    let (code, reason) = close_info.unwrap_or((None, String::new()));
    let _ = event_tx.send(TransportEvent::Closed { code, reason }).await;
}

fn log_send_drop_once(frame: &ClientFrame) {
    let count = SEND_DROP_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count < SEND_DROP_LOG_LIMIT {
        debug!(
            sample_index = count + 1,
            sample_limit = SEND_DROP_LOG_LIMIT,
            op = ?frame.op,
            "frame dropped; transport not open"
        );
    }
}
