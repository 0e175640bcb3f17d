//! Breakpoint reconciliation across sessions.
//!
//! The adapter keeps a single breakpoint set per source file, while each
//! consumer believes `setBreakpoints` replaces the whole set. These
//! helpers merge, rewrite and relabel breakpoints so that one session's
//! edits never silently erase another's.

use std::collections::HashSet;

use dap_mux_core::{
    MuxConfig,
    protocol::{Breakpoint, BreakpointEventBody, Source, SourceBreakpoint, reason},
};

/// Merge a session's requested breakpoints with those other sessions
/// already hold for the same file.
///
/// Requested breakpoints come first, so they win when two entries share
/// a `(line, column)` position.
pub fn merge_source_breakpoints<'a>(
    requested: Vec<SourceBreakpoint>,
    others: impl IntoIterator<Item = &'a Breakpoint>,
) -> Vec<SourceBreakpoint> {
    let foreign = others
        .into_iter()
        .filter_map(|bp| bp.line.map(|line| SourceBreakpoint::at(line, bp.column)));

    let mut seen = HashSet::new();
    requested
        .into_iter()
        .chain(foreign)
        .filter(|bp| seen.insert((bp.line, bp.column)))
        .collect()
}

/// Every distinct breakpoint across `breakpoints`, first occurrence kept.
pub fn union<'a>(breakpoints: impl IntoIterator<Item = &'a Breakpoint>) -> Vec<Breakpoint> {
    let mut merged: Vec<Breakpoint> = Vec::new();
    for bp in breakpoints {
        if !merged.iter().any(|known| known.same_as(bp)) {
            merged.push(bp.clone());
        }
    }
    merged
}

/// Reason a session should see for a breakpoint event.
///
/// A session that has never seen the breakpoint must not be told it
/// "changed".
#[must_use]
pub fn reason_for_session<'a>(known: bool, change: &'a str) -> &'a str {
    if change == reason::CHANGED && !known {
        reason::NEW
    } else {
        change
    }
}

/// Rewrite a source path for consumer consumption.
pub fn rewrite_source(source: &mut Source, config: &MuxConfig) {
    if let Some(path) = source.path.as_mut() {
        *path = config.to_consumer_path(path);
    }
}

/// Copy of `breakpoint` with its path rewritten for consumers.
#[must_use]
pub fn to_consumer_breakpoint(breakpoint: &Breakpoint, config: &MuxConfig) -> Breakpoint {
    let mut breakpoint = breakpoint.clone();
    if let Some(source) = breakpoint.source.as_mut() {
        rewrite_source(source, config);
    }
    breakpoint
}

/// The breakpoint event one particular session should receive.
#[must_use]
pub fn event_for_session(
    known: &[Breakpoint],
    event: &BreakpointEventBody,
    config: &MuxConfig,
) -> BreakpointEventBody {
    let is_known = known.iter().any(|bp| bp.same_as(&event.breakpoint));
    BreakpointEventBody {
        reason: reason_for_session(is_known, &event.reason).to_string(),
        breakpoint: to_consumer_breakpoint(&event.breakpoint, config),
        extra: event.extra.clone(),
    }
}
