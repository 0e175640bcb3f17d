//! Adapter events.

use dap_mux_core::{Event, protocol::BreakpointEventBody};

use super::{Multiplexer, Output};
use crate::{breakpoints, error::MuxError, registry::SessionHandle};

impl Multiplexer {
    /// Buffer an adapter event and deliver it to every session.
    pub(super) fn fan_out_event(
        &mut self,
        event: Event,
        out: &mut Vec<Output>,
    ) -> Result<(), MuxError> {
        if event.is_breakpoint() {
            // reject before buffering so replay never trips over it
            event.decode_body::<BreakpointEventBody>()?;
        }

        tracing::debug!(event = %event.event, "Adapter event");
        self.events.push(event.clone());

        for handle in self.registry.handles() {
            self.deliver_event(handle, &event, out)?;
        }
        Ok(())
    }

    /// Replay the buffered history to one session.
    pub(super) fn replay_events(
        &mut self,
        handle: SessionHandle,
        out: &mut Vec<Output>,
    ) -> Result<(), MuxError> {
        let history = self.events.get_history();
        tracing::debug!(
            session_id = %self.registry.get(handle).id(),
            events = history.len(),
            "Replaying buffered events"
        );
        for event in &history {
            self.deliver_event(handle, event, out)?;
        }
        Ok(())
    }

    fn deliver_event(
        &mut self,
        handle: SessionHandle,
        event: &Event,
        out: &mut Vec<Output>,
    ) -> Result<(), MuxError> {
        if !event.is_breakpoint() {
            out.push(self.deliver(handle, event.clone()));
            return Ok(());
        }

        let body: BreakpointEventBody = event.decode_body()?;
        let session = self.registry.get(handle);
        let delivered = breakpoints::event_for_session(session.known_breakpoints(), &body, &self.config);

        let mut event = event.clone();
        event.set_body(&delivered)?;
        out.push(self.deliver(handle, event));

        self.registry
            .get_mut(handle)
            .apply_breakpoint_change(&body.reason, &body.breakpoint);
        Ok(())
    }
}
