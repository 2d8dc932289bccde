/*
[INPUT]:  Error sources (WebSocket transport, serialization, protocol)
[OUTPUT]: Structured error types with retry hints
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use thiserror::Error;

/// Main error type for the SolX feed adapter
#[derive(Error, Debug)]
pub enum FeedError {
    /// WebSocket transport failed
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Frame violated the feed protocol
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Operation requires an open connection
    #[error("Transport is not connected")]
    NotConnected,

    /// Internal channel closed before the operation completed
    #[error("Internal channel closed")]
    ChannelClosed,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reconnection policy gave up
    #[error("Reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted { attempts: u32 },
}

impl FeedError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FeedError::WebSocket(_) | FeedError::NotConnected | FeedError::ChannelClosed
        )
    }
}

/// Result type alias for feed operations
pub type Result<T> = std::result::Result<T, FeedError>;
