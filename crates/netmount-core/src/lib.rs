//! Session, authorization, transaction, and liveness engine for remotely
//! managed NETCONF devices.
//!
//! The crate composes around one connection lifecycle:
//!
//! - **[`AuthorizationDecider`]** — decides whether an incoming call-home
//!   connection proceeds, under what device name, and with which
//!   credentials, from the [`DeviceDirectory`] of configured devices and
//!   a swappable [`GlobalConfig`] policy.
//!
//! - **[`SessionRegistry`]** — live sessions indexed by host identity
//!   (strict uniqueness) and remote address (newest wins).
//!
//! - **[`Transaction`]** — candidate/running configuration transactions
//!   with per-session [`TransactionStrategy`] selection, datastore
//!   locking, and guaranteed unlock on every exit path.
//!
//! - **[`KeepaliveWatchdog`]** — per-session liveness probing plus the
//!   [`KeepaliveRpcChannel`] wrapper that feeds real traffic into the
//!   activity clock.
//!
//! - **[`DeviceSessionFacade`]** — the composition root wiring all of the
//!   above to a [`MountHandler`], with idempotent teardown.

pub mod authorize;
pub mod backoff;
pub mod config;
pub mod error;
pub mod facade;
pub mod keepalive;
pub mod registry;
pub mod session;
pub mod transaction;

#[cfg(test)]
pub(crate) mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use authorize::{
    Authorization, AuthorizationDecider, DeviceDirectory, RemoteAddr, StatusReporter,
};
pub use backoff::ReconnectPolicy;
pub use config::{
    Credentials, DeviceRecord, DeviceStatus, GlobalConfig, GlobalConfigHandle, NamingStrategy,
};
pub use error::{ConnectError, DuplicateIdentity, RpcFailure, TransactionError};
pub use facade::{DeviceSession, DeviceSessionFacade, FacadeConfig, MountHandler};
pub use keepalive::{KeepaliveConfig, KeepaliveRpcChannel, KeepaliveWatchdog};
pub use registry::SessionRegistry;
pub use session::{Session, SessionId};
pub use transaction::{Transaction, TransactionStrategy};
