// ── Established session record ──

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use netmount_api::{Capabilities, HostIdentity, Transport};

/// Unique id of one established session. Sessions are compared by id, not
/// by address: an address can be reused by a later connection while a
/// record for the earlier one still exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One authorized, established device session. Immutable after creation;
/// everything mutable about a live session (liveness clock, open
/// transaction) lives next to it in the facade, not in here.
pub struct Session {
    pub id: SessionId,
    /// The device name the session mounts under -- either the configured
    /// unique id or a synthesized one.
    pub name: String,
    pub remote: SocketAddr,
    pub identity: HostIdentity,
    pub capabilities: Capabilities,
    pub established_at: DateTime<Utc>,
    transport: Arc<dyn Transport>,
}

impl Session {
    pub fn new(
        name: impl Into<String>,
        remote: SocketAddr,
        identity: HostIdentity,
        capabilities: Capabilities,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            id: SessionId::generate(),
            name: name.into(),
            remote,
            identity,
            capabilities,
            established_at: Utc::now(),
            transport,
        }
    }

    /// Close the underlying transport connection.
    pub fn close_transport(&self) {
        self.transport.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("remote", &self.remote)
            .field("identity", &self.identity.algorithm())
            .field("established_at", &self.established_at)
            .finish_non_exhaustive()
    }
}
