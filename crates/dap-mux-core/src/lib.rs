//! Core abstractions for the debug adapter multiplexer.
//!
//! This crate provides the fundamental building blocks:
//! - `ProtocolMessage` - Tagged request/response/event wire model
//! - `MuxConfig` - Workspace root and remote source marker
//! - `EventLog` - Append-only adapter event history for replay
//! - Adapter and consumer sink traits

pub mod config;
pub mod event_log;
pub mod protocol;
pub mod traits;

pub use config::MuxConfig;
pub use event_log::EventLog;
pub use protocol::{Command, Event, ProtocolError, ProtocolMessage, Request, Response, Seq};
pub use traits::{AdapterSink, ConsumerId, ConsumerSink, SessionId, TransportError};
