//! Append-only history of adapter events.

use crate::protocol::Event;

/// Every adapter event seen since the last restart, in arrival order.
///
/// Late joiners receive the full history before live events, so nothing
/// is ever evicted; the log is only cleared wholesale on restart.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    history: Vec<Event>,
}

impl EventLog {
    /// Create an empty log.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            history: Vec::new(),
        }
    }

    /// Record an event.
    pub fn push(&mut self, event: Event) {
        self.history.push(event);
    }

    /// History in arrival order.
    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.history.iter()
    }

    /// Snapshot of the history.
    #[must_use]
    pub fn get_history(&self) -> Vec<Event> {
        self.history.clone()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.history.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Drop the whole history.
    pub fn clear(&mut self) {
        self.history.clear();
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_keeps_arrival_order() {
        let mut log = EventLog::new();
        log.push(Event::new("initialized", None));
        log.push(Event::new("stopped", None));
        log.push(Event::new("output", None));

        let names: Vec<_> = log.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(names, ["initialized", "stopped", "output"]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_clear() {
        let mut log = EventLog::new();
        log.push(Event::terminated());
        log.clear();
        assert!(log.is_empty());
        assert!(log.get_history().is_empty());
    }
}
