//! Incoming consumer requests.

use dap_mux_core::{
    Command, Event, Request, Response, SessionId,
    protocol::{DisconnectArguments, ResumeArguments, SetBreakpointsArguments, reason},
};

use super::{Multiplexer, Output};
use crate::{breakpoints, error::MuxError, registry::SessionHandle};

impl Multiplexer {
    /// Route one request from `session_id`.
    ///
    /// Collaborators' lifecycle requests are answered locally, since the
    /// adapter already went through that transition for the primary
    /// session. Everything else is renumbered and forwarded.
    ///
    /// # Errors
    /// Returns error if the session is unknown or the request is malformed.
    pub fn handle_consumer_request(
        &mut self,
        session_id: SessionId,
        request: Request,
    ) -> Result<Vec<Output>, MuxError> {
        let handle = self
            .registry
            .lookup(session_id)
            .ok_or(MuxError::UnknownSession(session_id))?;
        let command = request.command();

        tracing::debug!(
            session_id = %session_id,
            seq = request.seq,
            command = %command,
            "Consumer request"
        );

        let mut out = Vec::new();
        if !self.registry.is_primary(handle) && command.is_lifecycle() {
            self.answer_locally(handle, &command, &request, &mut out)?;
        } else {
            self.forward(handle, &command, request.clone(), &mut out)?;
        }

        if let Some(stale) = self.registry.get_mut(handle).record_request(request) {
            tracing::warn!(
                session_id = %session_id,
                seq = stale.seq,
                command = %stale.command,
                "Pending request overwritten, consumer numbering is out of sync"
            );
        }
        Ok(out)
    }

    fn forward(
        &mut self,
        handle: SessionHandle,
        command: &Command,
        mut request: Request,
        out: &mut Vec<Output>,
    ) -> Result<(), MuxError> {
        // arguments needed to dispatch the response must be valid up front
        match command {
            Command::SetBreakpoints => self.reconcile_outgoing_breakpoints(handle, &mut request)?,
            Command::Disconnect => {
                request.decode_arguments::<DisconnectArguments>()?;
            }
            c if c.is_resume() => {
                request.decode_arguments::<ResumeArguments>()?;
            }
            _ => {}
        }

        let session_id = self.registry.get(handle).id();
        let own_seq = request.seq;
        request.seq = self.translator.allocate(session_id, own_seq);

        tracing::trace!(
            session_id = %session_id,
            own_seq,
            shared_seq = request.seq,
            "Forwarding request to adapter"
        );
        out.push(Output::Adapter(request));
        Ok(())
    }

    /// Widen a `setBreakpoints` request so it does not drop breakpoints
    /// other sessions placed in the same file.
    ///
    /// Only applies while the session is still syncing its initial
    /// configuration; afterwards its view already includes everyone's
    /// breakpoints.
    fn reconcile_outgoing_breakpoints(
        &self,
        handle: SessionHandle,
        request: &mut Request,
    ) -> Result<(), MuxError> {
        let mut args: SetBreakpointsArguments = request.decode_arguments()?;
        let mut changed = false;

        if let Some(path) = args.source.path.as_deref() {
            let adapter_path = self.config.to_adapter_path(path);
            if adapter_path != path {
                args.source.path = Some(adapter_path.to_string());
                changed = true;
            }
        }

        let session = self.registry.get(handle);
        if !session.configuration_complete() {
            if let Some(path) = args.source.path.as_deref() {
                let requested = args.breakpoints.clone().unwrap_or_default();
                let others = self
                    .registry
                    .iter()
                    .filter(|s| s.id() != session.id())
                    .flat_map(|s| s.breakpoints_for(path));
                let merged = breakpoints::merge_source_breakpoints(requested.clone(), others);

                if merged != requested {
                    tracing::debug!(
                        session_id = %session.id(),
                        path,
                        requested = requested.len(),
                        merged = merged.len(),
                        "Merged breakpoints from other sessions"
                    );
                    args.breakpoints = Some(merged);
                    changed = true;
                }
            }
        }

        if changed {
            request.set_arguments(&args)?;
        }
        Ok(())
    }

    fn answer_locally(
        &mut self,
        handle: SessionHandle,
        command: &Command,
        request: &Request,
        out: &mut Vec<Output>,
    ) -> Result<(), MuxError> {
        match command {
            Command::Initialize => self.local_initialize(handle, request, out),
            Command::ConfigurationDone => self.local_configuration_done(handle, request, out),
            // attach, disconnect and terminate only detach this view
            _ => {
                let response = Response::success(0, request, None);
                out.push(self.deliver(handle, response));
                Ok(())
            }
        }
    }

    fn local_initialize(
        &mut self,
        handle: SessionHandle,
        request: &Request,
        out: &mut Vec<Output>,
    ) -> Result<(), MuxError> {
        let Some(template) = self.initialize_response.as_ref() else {
            tracing::warn!(
                session_id = %self.registry.get(handle).id(),
                "No cached initialize response, dropping join attempt"
            );
            return Ok(());
        };

        let mut response = template.clone();
        response.request_seq = request.seq;
        out.push(self.deliver(handle, response));

        self.replay_events(handle, out)
    }

    fn local_configuration_done(
        &mut self,
        handle: SessionHandle,
        request: &Request,
        out: &mut Vec<Output>,
    ) -> Result<(), MuxError> {
        let all = breakpoints::union(self.registry.iter().flat_map(|s| s.known_breakpoints()));
        let missing: Vec<_> = all
            .into_iter()
            .filter(|bp| !self.registry.get(handle).knows_breakpoint(bp))
            .collect();

        for breakpoint in missing {
            let event = Event::breakpoint(
                reason::NEW,
                breakpoints::to_consumer_breakpoint(&breakpoint, &self.config),
            )?;
            out.push(self.deliver(handle, event));
            self.registry
                .get_mut(handle)
                .apply_breakpoint_change(reason::NEW, &breakpoint);
        }

        self.registry.get_mut(handle).mark_configuration_complete();
        let response = Response::success(0, request, None);
        out.push(self.deliver(handle, response));
        Ok(())
    }
}
