//! Wire codec and collaborator seams between NETCONF transports and the
//! session/transaction engine in `netmount-core`.
//!
//! - **[`HostIdentity`]** — decoded SSH public-key identity of a device,
//!   the canonical deduplication key across the workspace.
//!
//! - **[`Capabilities`]** — the slice of a device's hello capabilities
//!   the engine acts on.
//!
//! - **[`RpcChannel`] / [`Transport`]** — the traits a transport stack
//!   implements to plug into the engine; everything above them is
//!   transport-agnostic.

pub mod capabilities;
pub mod error;
pub mod keys;
pub mod rpc;
pub mod transport;

// ── Primary re-exports ──────────────────────────────────────────────
pub use capabilities::Capabilities;
pub use error::{ChannelError, DecodeError, RpcError, RpcErrorSeverity, RpcErrorTag, RpcErrorType};
pub use keys::HostIdentity;
pub use rpc::{Datastore, EditOperation, RpcChannel, RpcOperation, RpcReply, StoreTarget};
pub use transport::Transport;
