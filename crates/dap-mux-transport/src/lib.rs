//! Transports around the debug adapter multiplexer.
//!
//! Provides:
//! - `Content-Length` framing for adapter byte streams
//! - TCP adapter connection
//! - `MuxHub` task that owns the multiplexer
//! - WebSocket consumer transport (feature: websocket)

pub mod adapter;
pub mod codec;
pub mod hub;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use adapter::AdapterConnection;
pub use hub::{Attachment, ChannelSink, HubError, HubHandle, MuxHub};
