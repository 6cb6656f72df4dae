// ── Session registry ──
//
// Live sessions indexed two ways: by host identity (the authoritative
// uniqueness guard) and by remote address (a convenience index that a
// reconnecting device may overwrite). Registration takes effect atomically
// with respect to lookups; both indexes are id-checked on removal so a
// stale teardown can never evict a newer session.

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::info;

use netmount_api::HostIdentity;

use crate::error::DuplicateIdentity;
use crate::session::{Session, SessionId};

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
    by_identity: DashMap<HostIdentity, SessionId>,
    by_address: DashMap<SocketAddr, SessionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an established session.
    ///
    /// Two live sessions may never share a host identity; the second
    /// registration is refused and its connection is for the caller to
    /// close. A reused remote *address* is allowed -- the newcomer
    /// supersedes the old record in the address index only, which is
    /// logged but not an error (the device may have reconnected from
    /// behind the same NAT binding).
    pub fn register(&self, session: Arc<Session>) -> Result<(), DuplicateIdentity> {
        match self.by_identity.entry(session.identity.clone()) {
            Entry::Occupied(bound) => {
                return Err(DuplicateIdentity {
                    existing: *bound.get(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(session.id);
            }
        }

        self.sessions.insert(session.id, Arc::clone(&session));

        if let Some(superseded) = self.by_address.insert(session.remote, session.id) {
            info!(
                device = %session.name,
                remote = %session.remote,
                %superseded,
                "remote address reused; superseding previous address binding"
            );
        }
        Ok(())
    }

    /// Remove a session's record and index entries. Id-checked: if either
    /// index already points at a different (newer) session, that entry is
    /// left alone. Idempotent.
    pub fn remove(&self, session: &Session) {
        self.sessions.remove(&session.id);
        self.by_identity
            .remove_if(&session.identity, |_, bound| *bound == session.id);
        self.by_address
            .remove_if(&session.remote, |_, bound| *bound == session.id);
    }

    pub fn lookup_by_identity(&self, identity: &HostIdentity) -> Option<Arc<Session>> {
        let id = *self.by_identity.get(identity)?;
        self.lookup(id)
    }

    pub fn lookup_by_address(&self, remote: &SocketAddr) -> Option<Arc<Session>> {
        let id = *self.by_address.get(remote)?;
        self.lookup(id)
    }

    pub fn lookup(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|entry| Arc::clone(&entry))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::net::SocketAddr;

    use pretty_assertions::assert_eq;

    use netmount_api::Capabilities;

    use crate::testing::{StubTransport, test_identity};

    use super::*;

    fn session(name: &str, remote: &str, key_seed: u8) -> Arc<Session> {
        let remote: SocketAddr = remote.parse().unwrap();
        Arc::new(Session::new(
            name,
            remote,
            test_identity(key_seed),
            Capabilities::default(),
            Arc::new(StubTransport::new(remote)),
        ))
    }

    #[test]
    fn duplicate_identity_is_refused() {
        let registry = SessionRegistry::new();
        let first = session("edge-1", "10.0.0.1:830", 1);
        let second = session("edge-1-again", "10.0.0.2:830", 1);

        registry.register(Arc::clone(&first)).unwrap();
        let err = registry.register(Arc::clone(&second)).unwrap_err();

        assert_eq!(err.existing, first.id);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.lookup_by_identity(&first.identity).unwrap().id,
            first.id
        );
    }

    #[test]
    fn reused_address_supersedes_address_index_only() {
        let registry = SessionRegistry::new();
        let old = session("edge-1", "10.0.0.1:830", 1);
        let new = session("edge-2", "10.0.0.1:830", 2);

        registry.register(Arc::clone(&old)).unwrap();
        registry.register(Arc::clone(&new)).unwrap();

        // Both sessions live; the address index points at the newcomer.
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.lookup_by_address(&old.remote).unwrap().id,
            new.id
        );
        assert_eq!(
            registry.lookup_by_identity(&old.identity).unwrap().id,
            old.id
        );
    }

    #[test]
    fn stale_remove_does_not_evict_newer_binding() {
        let registry = SessionRegistry::new();
        let old = session("edge-1", "10.0.0.1:830", 1);
        let new = session("edge-2", "10.0.0.1:830", 2);

        registry.register(Arc::clone(&old)).unwrap();
        registry.register(Arc::clone(&new)).unwrap();
        registry.remove(&old);

        assert_eq!(
            registry.lookup_by_address(&new.remote).unwrap().id,
            new.id
        );
        assert!(registry.lookup_by_identity(&old.identity).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = SessionRegistry::new();
        let only = session("edge-1", "10.0.0.1:830", 1);

        registry.register(Arc::clone(&only)).unwrap();
        registry.remove(&only);
        registry.remove(&only);

        assert!(registry.is_empty());
        assert!(registry.lookup_by_address(&only.remote).is_none());
    }
}
