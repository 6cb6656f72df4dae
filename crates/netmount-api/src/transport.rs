// ── Transport capability surface ──
//
// SSH and TLS call-home listeners differ wildly below this line; above it
// the registry and authorization logic only need three things. One trait,
// not parallel per-transport hierarchies.

use std::net::SocketAddr;

use crate::keys::HostIdentity;

/// Minimal surface of an established (but not yet authorized) call-home
/// transport connection.
pub trait Transport: Send + Sync + 'static {
    /// The peer's socket address.
    fn remote_address(&self) -> SocketAddr;

    /// The peer's host identity, if the transport has established it yet.
    /// SSH presents the host key during the handshake; a TLS listener may
    /// only extract it from the certificate after this object exists.
    fn remote_identity(&self) -> Option<HostIdentity>;

    /// Close the underlying connection. Idempotent, non-blocking.
    fn close(&self);
}
