//! Session orchestration for multiplexed debug adapter connections.
//!
//! Provides:
//! - `Multiplexer` - Route, renumber and reconcile traffic between many
//!   consumers and one adapter
//! - `SessionRegistry` - Arena of attached sessions
//! - `SequenceTranslator` - Shared sequence-number space
//! - Breakpoint reconciliation helpers

pub mod breakpoints;
pub mod error;
pub mod multiplexer;
pub mod registry;
pub mod sequence;
pub mod session;

pub use error::MuxError;
pub use multiplexer::{Multiplexer, Output, Signal};
pub use registry::{SessionHandle, SessionRegistry};
pub use sequence::{Origin, SequenceTranslator};
pub use session::Session;
