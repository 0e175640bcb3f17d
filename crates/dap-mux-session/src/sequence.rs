//! Shared sequence-number space used toward the adapter.

use dap_mux_core::{Seq, SessionId};

/// Where a shared number came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    /// Session that sent the request.
    pub session: SessionId,
    /// The session's own number for that request.
    pub seq: Seq,
}

/// Maps shared numbers back to their originating session.
///
/// Shared numbers are dense and start at 1, so entry `n` lives at index
/// `n - 1`. Entries are never removed individually.
#[derive(Debug, Default, Clone)]
pub struct SequenceTranslator {
    origins: Vec<Origin>,
}

impl SequenceTranslator {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            origins: Vec::new(),
        }
    }

    /// Allocate the next shared number for `(session, seq)`.
    pub fn allocate(&mut self, session: SessionId, seq: Seq) -> Seq {
        self.origins.push(Origin { session, seq });
        Seq::try_from(self.origins.len()).unwrap_or(Seq::MAX)
    }

    /// Look up the origin of a shared number.
    #[must_use]
    pub fn resolve(&self, shared: Seq) -> Option<Origin> {
        let index = usize::try_from(shared).ok()?.checked_sub(1)?;
        self.origins.get(index).copied()
    }

    /// Number of shared numbers handed out.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.origins.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    /// Forget every mapping; the next allocation yields 1 again.
    pub fn clear(&mut self) {
        self.origins.clear();
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_allocation_is_strictly_increasing() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut translator = SequenceTranslator::new();

        let shared: Vec<_> = [(a, 1), (b, 1), (a, 2), (b, 2)]
            .into_iter()
            .map(|(s, seq)| translator.allocate(s, seq))
            .collect();

        assert_eq!(shared, [1, 2, 3, 4]);
        assert_eq!(translator.resolve(2), Some(Origin { session: b, seq: 1 }));
        assert_eq!(translator.resolve(3), Some(Origin { session: a, seq: 2 }));
    }

    #[test]
    fn test_unknown_numbers_do_not_resolve() {
        let mut translator = SequenceTranslator::new();
        translator.allocate(Uuid::new_v4(), 7);
        assert!(translator.resolve(0).is_none());
        assert!(translator.resolve(-4).is_none());
        assert!(translator.resolve(2).is_none());
    }

    #[test]
    fn test_clear_restarts_numbering() {
        let session = Uuid::new_v4();
        let mut translator = SequenceTranslator::new();
        translator.allocate(session, 1);
        translator.allocate(session, 2);
        translator.clear();
        assert!(translator.is_empty());
        assert_eq!(translator.allocate(session, 3), 1);
    }
}
