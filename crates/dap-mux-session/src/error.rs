//! Multiplexer errors.

use dap_mux_core::{ProtocolError, SessionId};
use thiserror::Error;

/// Hard failure while processing one message.
///
/// Soft desynchronizations never surface here; they are logged and the
/// offending message is dropped.
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("Session not found: {0}")]
    UnknownSession(SessionId),
    #[error("Session already exists: {0}")]
    DuplicateSession(SessionId),
    #[error("Sessions cannot join before the adapter has been initialized")]
    NotJoinable,
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
