//! Adapter responses.

use dap_mux_core::{
    Command, Event, Request, Response,
    protocol::{
        ContinueResponseBody, DisconnectArguments, ResumeArguments, SetBreakpointsArguments,
        SetBreakpointsResponseBody, StackTraceResponseBody,
    },
};

use super::{Multiplexer, Output, Signal};
use crate::{breakpoints, error::MuxError, registry::SessionHandle};

impl Multiplexer {
    /// Route an adapter response back to the session that asked for it.
    pub(super) fn dispatch_response(
        &mut self,
        mut response: Response,
        out: &mut Vec<Output>,
    ) -> Result<(), MuxError> {
        let Some(origin) = self.translator.resolve(response.request_seq) else {
            tracing::warn!(
                request_seq = response.request_seq,
                command = %response.command,
                "Response to unknown shared sequence number, dropping"
            );
            return Ok(());
        };
        let Some(handle) = self.registry.lookup(origin.session) else {
            tracing::warn!(
                session_id = %origin.session,
                command = %response.command,
                "Response for a session that no longer exists, dropping"
            );
            return Ok(());
        };

        response.request_seq = origin.seq;
        let command = response.command();

        tracing::debug!(
            session_id = %origin.session,
            request_seq = origin.seq,
            command = %command,
            success = response.success,
            "Adapter response"
        );

        match command {
            Command::Initialize => {
                self.initialize_response = Some(response.clone());
                out.push(self.deliver(handle, response));
                out.push(Output::Signal(Signal::Joinable));
            }
            ref c if c.is_resume() => self.dispatch_resume(handle, c, response, out)?,
            Command::SetBreakpoints => self.dispatch_set_breakpoints(handle, response, out)?,
            Command::ConfigurationDone => {
                self.registry.get_mut(handle).mark_configuration_complete();
                out.push(self.deliver(handle, response));
            }
            Command::Disconnect => self.dispatch_disconnect(handle, response, out)?,
            Command::Terminate => {
                self.broadcast_terminated(handle, out);
                out.push(self.deliver(handle, response));
            }
            Command::StackTrace => {
                self.rewrite_stack_trace(&mut response)?;
                out.push(self.deliver(handle, response));
            }
            _ => out.push(self.deliver(handle, response)),
        }
        Ok(())
    }

    /// The stored request a response answers, if its command matches.
    fn matching_request(&self, handle: SessionHandle, response: &Response) -> Option<Request> {
        let session = self.registry.get(handle);
        match session.pending_request(response.request_seq) {
            Some(request) if request.command == response.command => Some(request.clone()),
            Some(request) => {
                tracing::warn!(
                    session_id = %session.id(),
                    request_seq = response.request_seq,
                    expected = %request.command,
                    actual = %response.command,
                    "Response command does not match pending request"
                );
                None
            }
            None => {
                tracing::warn!(
                    session_id = %session.id(),
                    request_seq = response.request_seq,
                    command = %response.command,
                    "No pending request for response"
                );
                None
            }
        }
    }

    /// Resuming is a shared-target effect, so every other session is told
    /// the target continued.
    fn dispatch_resume(
        &mut self,
        handle: SessionHandle,
        command: &Command,
        response: Response,
        out: &mut Vec<Output>,
    ) -> Result<(), MuxError> {
        let Some(request) = self.matching_request(handle, &response) else {
            return Ok(());
        };
        let args: ResumeArguments = request.decode_arguments()?;
        let all_threads_continued = if *command == Command::Continue {
            response
                .decode_body::<ContinueResponseBody>()?
                .all_threads_continued
        } else {
            None
        };

        out.push(self.deliver(handle, response));

        for other in self.registry.others(handle) {
            let event = Event::continued(args.thread_id, all_threads_continued)?;
            out.push(self.deliver(other, event));
        }
        Ok(())
    }

    /// Fold the adapter-confirmed breakpoint set into every session.
    fn dispatch_set_breakpoints(
        &mut self,
        handle: SessionHandle,
        mut response: Response,
        out: &mut Vec<Output>,
    ) -> Result<(), MuxError> {
        let Some(request) = self.matching_request(handle, &response) else {
            return Ok(());
        };

        if response.success {
            let args: SetBreakpointsArguments = request.decode_arguments()?;
            let mut body: SetBreakpointsResponseBody = response.decode_body()?;

            if let Some(path) = args.source.path.as_deref() {
                let path = self.config.to_adapter_path(path).to_string();
                let mut source = args.source.clone();
                source.path = Some(path.clone());

                for bp in &mut body.breakpoints {
                    if bp.source_path().is_none() {
                        bp.source = Some(source.clone());
                    }
                }
                for session in self.registry.iter_mut() {
                    session.replace_breakpoints_for(&path, &body.breakpoints);
                }
            }

            for bp in &mut body.breakpoints {
                if let Some(source) = bp.source.as_mut() {
                    breakpoints::rewrite_source(source, &self.config);
                }
            }
            response.set_body(&body)?;
        }

        out.push(self.deliver(handle, response));
        Ok(())
    }

    fn dispatch_disconnect(
        &mut self,
        handle: SessionHandle,
        response: Response,
        out: &mut Vec<Output>,
    ) -> Result<(), MuxError> {
        let restart = match self.matching_request(handle, &response) {
            Some(request) => request
                .decode_arguments::<DisconnectArguments>()?
                .restart
                .unwrap_or(false),
            None => false,
        };

        self.broadcast_terminated(handle, out);

        if restart {
            self.reset();
            out.push(Output::Signal(Signal::Restart));
        } else {
            out.push(self.deliver(handle, response));
        }
        Ok(())
    }

    fn broadcast_terminated(&mut self, handle: SessionHandle, out: &mut Vec<Output>) {
        for other in self.registry.others(handle) {
            out.push(self.deliver(other, Event::terminated()));
        }
    }

    fn rewrite_stack_trace(&self, response: &mut Response) -> Result<(), MuxError> {
        if !response.success || response.body.is_none() {
            return Ok(());
        }
        let mut body: StackTraceResponseBody = response.decode_body()?;
        for frame in &mut body.stack_frames {
            if let Some(source) = frame.source.as_mut() {
                breakpoints::rewrite_source(source, &self.config);
            }
        }
        response.set_body(&body)?;
        Ok(())
    }
}
