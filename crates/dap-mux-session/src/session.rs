//! One consumer's view of the shared debug target.

use std::collections::HashMap;

use dap_mux_core::{
    ConsumerId, ProtocolMessage, Request, Seq, SessionId,
    protocol::{Breakpoint, reason},
};

/// Per-consumer multiplexing state.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    consumer_id: ConsumerId,
    next_seq: Seq,
    pending_requests: HashMap<Seq, Request>,
    known_breakpoints: Vec<Breakpoint>,
    configuration_complete: bool,
}

impl Session {
    /// Create a fresh session; its own numbering starts at 1.
    #[must_use]
    pub fn new(id: SessionId, consumer_id: ConsumerId) -> Self {
        Self {
            id,
            consumer_id,
            next_seq: 1,
            pending_requests: HashMap::new(),
            known_breakpoints: Vec::new(),
            configuration_complete: false,
        }
    }

    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub const fn consumer_id(&self) -> ConsumerId {
        self.consumer_id
    }

    /// Number the next outgoing message will carry.
    #[must_use]
    pub const fn next_seq(&self) -> Seq {
        self.next_seq
    }

    #[must_use]
    pub const fn configuration_complete(&self) -> bool {
        self.configuration_complete
    }

    #[must_use]
    pub fn known_breakpoints(&self) -> &[Breakpoint] {
        &self.known_breakpoints
    }

    /// Request this session sent under its own number `seq`.
    #[must_use]
    pub fn pending_request(&self, seq: Seq) -> Option<&Request> {
        self.pending_requests.get(&seq)
    }

    /// Known breakpoints located in `path`.
    pub fn breakpoints_for<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a Breakpoint> {
        self.known_breakpoints
            .iter()
            .filter(move |bp| bp.source_path() == Some(path))
    }

    #[must_use]
    pub fn knows_breakpoint(&self, breakpoint: &Breakpoint) -> bool {
        self.known_breakpoints.iter().any(|bp| bp.same_as(breakpoint))
    }

    /// Stamp `message` with this session's next own number.
    pub(crate) fn stamp(&mut self, mut message: ProtocolMessage) -> ProtocolMessage {
        message.set_seq(self.next_seq);
        self.next_seq += 1;
        message
    }

    /// Remember an incoming request; returns any entry it displaced.
    pub(crate) fn record_request(&mut self, request: Request) -> Option<Request> {
        self.pending_requests.insert(request.seq, request)
    }

    pub(crate) const fn mark_configuration_complete(&mut self) {
        self.configuration_complete = true;
    }

    /// Replace everything known about `path` with the adapter-confirmed set.
    pub(crate) fn replace_breakpoints_for(&mut self, path: &str, confirmed: &[Breakpoint]) {
        self.known_breakpoints
            .retain(|bp| bp.source_path() != Some(path));
        self.known_breakpoints.extend_from_slice(confirmed);
    }

    /// Track a breakpoint change reported by the adapter.
    pub(crate) fn apply_breakpoint_change(&mut self, change: &str, breakpoint: &Breakpoint) {
        if change == reason::REMOVED {
            self.known_breakpoints.retain(|bp| !bp.same_as(breakpoint));
            return;
        }

        match self
            .known_breakpoints
            .iter_mut()
            .find(|bp| bp.same_as(breakpoint))
        {
            Some(existing) => {
                let source = existing.source.take();
                *existing = breakpoint.clone();
                // change notifications often omit the source
                if existing.source.is_none() {
                    existing.source = source;
                }
            }
            None => self.known_breakpoints.push(breakpoint.clone()),
        }
    }
}
