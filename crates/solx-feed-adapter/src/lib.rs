/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public SolX feed adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod error;
pub mod types;
pub mod ws;

// Re-export commonly used types from error
pub use error::{
    FeedError,
    Result,
};

// Re-export all domain types
pub use types::*;

// Re-export commonly used types from ws
pub use ws::{
    BookKind,
    BookMessage,
    ClientFrame,
    ClientOp,
    FeedTransport,
    FrameKind,
    ServerFrame,
    TransportEvent,
    TransportState,
};
