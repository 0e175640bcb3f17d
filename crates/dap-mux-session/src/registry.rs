//! Arena of attached sessions.

use std::collections::HashMap;

use dap_mux_core::{ConsumerId, SessionId};

use crate::{error::MuxError, session::Session};

/// Index of a session inside the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(usize);

impl SessionHandle {
    /// The primary session always occupies the first slot.
    pub const PRIMARY: Self = Self(0);
}

/// Owns every session; the primary one is created up front.
///
/// Sessions are never removed one by one. A restart drops them all and
/// seeds a fresh primary session.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    primary: (SessionId, ConsumerId),
    sessions: Vec<Session>,
    index: HashMap<SessionId, SessionHandle>,
}

impl SessionRegistry {
    /// Create a registry holding only the primary session.
    #[must_use]
    pub fn new(primary_id: SessionId, primary_consumer: ConsumerId) -> Self {
        let mut registry = Self {
            primary: (primary_id, primary_consumer),
            sessions: Vec::new(),
            index: HashMap::new(),
        };
        registry.reset();
        registry
    }

    /// Add a collaborator session.
    ///
    /// # Errors
    /// Returns error if the id is already taken.
    pub fn add(
        &mut self,
        id: SessionId,
        consumer_id: ConsumerId,
    ) -> Result<SessionHandle, MuxError> {
        if self.index.contains_key(&id) {
            return Err(MuxError::DuplicateSession(id));
        }
        let handle = SessionHandle(self.sessions.len());
        self.sessions.push(Session::new(id, consumer_id));
        self.index.insert(id, handle);
        Ok(handle)
    }

    /// Discard every session and recreate the primary one.
    pub fn reset(&mut self) {
        let (id, consumer_id) = self.primary;
        self.sessions.clear();
        self.index.clear();
        self.sessions.push(Session::new(id, consumer_id));
        self.index.insert(id, SessionHandle::PRIMARY);
    }

    #[must_use]
    pub fn lookup(&self, id: SessionId) -> Option<SessionHandle> {
        self.index.get(&id).copied()
    }

    #[must_use]
    pub fn get(&self, handle: SessionHandle) -> &Session {
        &self.sessions[handle.0]
    }

    pub fn get_mut(&mut self, handle: SessionHandle) -> &mut Session {
        &mut self.sessions[handle.0]
    }

    #[must_use]
    pub fn primary(&self) -> &Session {
        self.get(SessionHandle::PRIMARY)
    }

    #[must_use]
    pub fn is_primary(&self, handle: SessionHandle) -> bool {
        handle == SessionHandle::PRIMARY
    }

    /// Handles of all sessions, primary first.
    #[must_use]
    pub fn handles(&self) -> Vec<SessionHandle> {
        (0..self.sessions.len()).map(SessionHandle).collect()
    }

    /// Handles of all sessions except `handle`.
    #[must_use]
    pub fn others(&self, handle: SessionHandle) -> Vec<SessionHandle> {
        self.handles().into_iter().filter(|h| *h != handle).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Session> {
        self.sessions.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Session> {
        self.sessions.iter_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Never true; the primary session always exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_primary_exists_from_construction() {
        let primary = Uuid::new_v4();
        let registry = SessionRegistry::new(primary, Uuid::new_v4());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(primary), Some(SessionHandle::PRIMARY));
        assert_eq!(registry.primary().next_seq(), 1);
    }

    #[test]
    fn test_add_rejects_duplicates() {
        let primary = Uuid::new_v4();
        let mut registry = SessionRegistry::new(primary, Uuid::new_v4());
        let other = Uuid::new_v4();

        let handle = registry.add(other, Uuid::new_v4()).unwrap();
        assert!(!registry.is_primary(handle));
        assert!(matches!(
            registry.add(other, Uuid::new_v4()),
            Err(MuxError::DuplicateSession(id)) if id == other
        ));
        assert!(matches!(
            registry.add(primary, Uuid::new_v4()),
            Err(MuxError::DuplicateSession(_))
        ));
        assert_eq!(registry.others(handle), [SessionHandle::PRIMARY]);
    }

    #[test]
    fn test_reset_keeps_only_fresh_primary() {
        let primary = Uuid::new_v4();
        let mut registry = SessionRegistry::new(primary, Uuid::new_v4());
        let other = Uuid::new_v4();
        registry.add(other, Uuid::new_v4()).unwrap();
        registry.get_mut(SessionHandle::PRIMARY).mark_configuration_complete();

        registry.reset();

        assert_eq!(registry.len(), 1);
        assert!(registry.lookup(other).is_none());
        assert_eq!(registry.primary().id(), primary);
        assert!(!registry.primary().configuration_complete());
    }
}
