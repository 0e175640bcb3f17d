//! Multiplexes several consumers onto one debug adapter connection.
//!
//! Processing is synchronous and run-to-completion: each call handles
//! one inbound message and returns, in order, everything that has to be
//! sent as a result. The caller owns all I/O.

mod dispatcher;
mod fanout;
mod router;

use dap_mux_core::{
    ConsumerId, EventLog, MuxConfig, ProtocolMessage, Request, Response, SessionId,
};

use crate::{
    error::MuxError,
    registry::{SessionHandle, SessionRegistry},
    sequence::SequenceTranslator,
    session::Session,
};

/// Notification for whoever orchestrates the multiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The adapter is initialized; collaborators may join now.
    Joinable,
    /// All state was reset; re-drive the handshake on a fresh adapter.
    Restart,
}

/// One thing to send after handling a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Deliver to a consumer.
    Consumer {
        consumer: ConsumerId,
        message: ProtocolMessage,
    },
    /// Forward to the adapter.
    Adapter(Request),
    /// Raise a signal.
    Signal(Signal),
}

/// The multiplexing engine.
#[derive(Debug)]
pub struct Multiplexer {
    config: MuxConfig,
    registry: SessionRegistry,
    translator: SequenceTranslator,
    events: EventLog,
    initialize_response: Option<Response>,
}

impl Multiplexer {
    /// Create a multiplexer with its primary session.
    #[must_use]
    pub fn new(config: MuxConfig, primary_id: SessionId, primary_consumer: ConsumerId) -> Self {
        Self {
            config,
            registry: SessionRegistry::new(primary_id, primary_consumer),
            translator: SequenceTranslator::new(),
            events: EventLog::new(),
            initialize_response: None,
        }
    }

    /// Attach a collaborator session.
    ///
    /// # Errors
    /// Returns error if the adapter has not completed `initialize` yet or
    /// the session id is taken.
    pub fn add_session(
        &mut self,
        id: SessionId,
        consumer_id: ConsumerId,
    ) -> Result<&Session, MuxError> {
        if !self.is_joinable() {
            return Err(MuxError::NotJoinable);
        }
        let handle = self.registry.add(id, consumer_id)?;
        tracing::info!(session_id = %id, consumer_id = %consumer_id, "Session joined");
        Ok(self.registry.get(handle))
    }

    /// Handle any message a consumer sent.
    ///
    /// Only requests are relayed; anything else is logged and dropped.
    ///
    /// # Errors
    /// Returns error if the session is unknown or the request is malformed.
    pub fn handle_consumer_message(
        &mut self,
        session_id: SessionId,
        message: ProtocolMessage,
    ) -> Result<Vec<Output>, MuxError> {
        match message {
            ProtocolMessage::Request(request) => self.handle_consumer_request(session_id, request),
            other => {
                if self.registry.lookup(session_id).is_none() {
                    return Err(MuxError::UnknownSession(session_id));
                }
                tracing::warn!(
                    session_id = %session_id,
                    seq = other.seq(),
                    "Dropping non-request message from consumer"
                );
                Ok(Vec::new())
            }
        }
    }

    /// Handle a message from the adapter.
    ///
    /// # Errors
    /// Returns error if a payload the multiplexer must interpret is
    /// malformed.
    pub fn handle_adapter_message(
        &mut self,
        message: ProtocolMessage,
    ) -> Result<Vec<Output>, MuxError> {
        let mut out = Vec::new();
        match message {
            ProtocolMessage::Response(response) => self.dispatch_response(response, &mut out)?,
            ProtocolMessage::Event(event) => self.fan_out_event(event, &mut out)?,
            ProtocolMessage::Request(request) => {
                tracing::warn!(
                    seq = request.seq,
                    command = %request.command,
                    "Dropping reverse request from adapter"
                );
            }
        }
        Ok(out)
    }

    /// Whether collaborators may join.
    #[must_use]
    pub const fn is_joinable(&self) -> bool {
        self.initialize_response.is_some()
    }

    #[must_use]
    pub const fn config(&self) -> &MuxConfig {
        &self.config
    }

    #[must_use]
    pub fn primary_session(&self) -> &Session {
        self.registry.primary()
    }

    #[must_use]
    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.registry.lookup(id).map(|h| self.registry.get(h))
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.registry.iter()
    }

    /// Number of shared sequence numbers handed out since the last restart.
    #[must_use]
    pub const fn shared_sequence_len(&self) -> usize {
        self.translator.len()
    }

    #[must_use]
    pub const fn buffered_events(&self) -> &EventLog {
        &self.events
    }

    /// Stamp `message` for `handle` and address it to its consumer.
    fn deliver(&mut self, handle: SessionHandle, message: impl Into<ProtocolMessage>) -> Output {
        let session = self.registry.get_mut(handle);
        let message = session.stamp(message.into());
        Output::Consumer {
            consumer: session.consumer_id(),
            message,
        }
    }

    /// Discard every piece of multiplexed state.
    fn reset(&mut self) {
        self.translator.clear();
        self.registry.reset();
        self.events.clear();
        self.initialize_response = None;
        tracing::info!("Multiplexer state reset for restart");
    }
}
