//! Process-wide registry of live sessions.
//!
//! Three disjoint maps, one per role: inbound (IRS) sessions, outbound
//! (ISS) sessions and P2P endpoints. The dispatcher reads it on every
//! frame; session lifecycle code inserts and removes entries. Locks are
//! held only across the short map operations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arq_shared::ids::SessionId;
use thiserror::Error;

use crate::p2p::P2pEndpoint;
use crate::session::{IrsSession, IssSession};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("session id {0} already registered for this role")]
    IdCollision(SessionId),
}

#[derive(Default)]
pub struct SessionRegistry {
    irs: Mutex<HashMap<SessionId, Arc<IrsSession>>>,
    iss: Mutex<HashMap<SessionId, Arc<IssSession>>>,
    p2p: Mutex<HashMap<SessionId, Arc<P2pEndpoint>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_irs(&self, session: Arc<IrsSession>) -> Result<(), RegistryError> {
        let mut irs = self.irs.lock().unwrap_or_else(|e| e.into_inner());
        match irs.entry(session.id()) {
            std::collections::hash_map::Entry::Occupied(_) => {
                Err(RegistryError::IdCollision(session.id()))
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(session);
                Ok(())
            }
        }
    }

    pub fn register_iss(&self, session: Arc<IssSession>) -> Result<(), RegistryError> {
        let mut iss = self.iss.lock().unwrap_or_else(|e| e.into_inner());
        match iss.entry(session.id()) {
            std::collections::hash_map::Entry::Occupied(_) => {
                Err(RegistryError::IdCollision(session.id()))
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(session);
                Ok(())
            }
        }
    }

    pub fn register_p2p(&self, endpoint: Arc<P2pEndpoint>) -> Result<(), RegistryError> {
        let mut p2p = self.p2p.lock().unwrap_or_else(|e| e.into_inner());
        match p2p.entry(endpoint.id()) {
            std::collections::hash_map::Entry::Occupied(_) => {
                Err(RegistryError::IdCollision(endpoint.id()))
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(endpoint);
                Ok(())
            }
        }
    }

    pub fn irs(&self, id: SessionId) -> Option<Arc<IrsSession>> {
        self.irs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    pub fn iss(&self, id: SessionId) -> Option<Arc<IssSession>> {
        self.iss
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    pub fn p2p(&self, id: SessionId) -> Option<Arc<P2pEndpoint>> {
        self.p2p
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    pub fn remove_irs(&self, id: SessionId) -> Option<Arc<IrsSession>> {
        self.irs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
    }

    pub fn remove_iss(&self, id: SessionId) -> Option<Arc<IssSession>> {
        self.iss
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
    }

    pub fn remove_p2p(&self, id: SessionId) -> Option<Arc<P2pEndpoint>> {
        self.p2p
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
    }

    /// Known peer callsign for a session id, regardless of role.
    ///
    /// Used to backfill the `origin` of frames that only carry a session
    /// id.
    pub fn dxcall_for(&self, id: SessionId) -> Option<String> {
        if let Some(session) = self.irs(id) {
            return Some(session.dxcall().to_string());
        }
        if let Some(session) = self.iss(id) {
            return Some(session.dxcall().to_string());
        }
        self.p2p(id).map(|endpoint| endpoint.dxcall().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p2p_registration_rejects_duplicate_ids() {
        let registry = SessionRegistry::new();
        let id = SessionId::from_raw(9);
        let (a, _rx_a) = P2pEndpoint::new(id, "DJ2LS-0");
        let (b, _rx_b) = P2pEndpoint::new(id, "DK5SQ-1");

        registry.register_p2p(a).unwrap();
        assert!(matches!(
            registry.register_p2p(b),
            Err(RegistryError::IdCollision(got)) if got == id
        ));
    }

    #[test]
    fn remove_frees_the_id_for_reuse() {
        let registry = SessionRegistry::new();
        let id = SessionId::from_raw(17);
        let (a, _rx_a) = P2pEndpoint::new(id, "DJ2LS-0");
        registry.register_p2p(a).unwrap();

        assert!(registry.remove_p2p(id).is_some());
        assert!(registry.p2p(id).is_none());

        let (b, _rx_b) = P2pEndpoint::new(id, "DK5SQ-1");
        registry.register_p2p(b).unwrap();
        assert_eq!(registry.p2p(id).unwrap().dxcall(), "DK5SQ-1");
    }

    #[test]
    fn dxcall_lookup_covers_p2p_entries() {
        let registry = SessionRegistry::new();
        let (endpoint, _rx) = P2pEndpoint::new(SessionId::from_raw(30), "DL1ABC-2");
        registry.register_p2p(endpoint).unwrap();

        assert_eq!(
            registry.dxcall_for(SessionId::from_raw(30)),
            Some("DL1ABC-2".to_string())
        );
        assert_eq!(registry.dxcall_for(SessionId::from_raw(31)), None);
    }
}
