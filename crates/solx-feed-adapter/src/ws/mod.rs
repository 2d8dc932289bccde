/*
[INPUT]:  WebSocket submodules
[OUTPUT]: Public transport and frame surface
[POS]:    WebSocket layer - module wiring
[UPDATE]: When transport or frame exports change
*/

pub mod frame;
pub mod transport;

pub use frame::{BookKind, BookLevels, BookMessage, ClientFrame, ClientOp, FrameKind, ServerFrame};
pub use transport::{FeedTransport, TransportEvent, TransportState};
