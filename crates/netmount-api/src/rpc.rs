// ── RPC channel abstraction ──
//
// The seam between the session/transaction engine and whatever actually
// moves NETCONF messages (SSH or TLS transport, message codec, test
// doubles). The engine only ever sees RpcOperation in, RpcReply out.

use bytes::Bytes;
use futures::future::BoxFuture;

use crate::error::{ChannelError, RpcError};

/// The two NETCONF configuration datastores this engine writes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Datastore {
    Candidate,
    Running,
}

/// Logical target of a read/write operation. Edits may only target
/// configuration data; asking for anything else is a caller bug surfaced
/// as `TransactionError::InvalidStore` by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum StoreTarget {
    Configuration,
    Operational,
}

/// The edit-config operation attribute (RFC 6241 §7.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum EditOperation {
    Merge,
    Replace,
    Create,
    Delete,
    Remove,
}

/// One NETCONF protocol operation, addressed to a datastore where that
/// matters. The payload of an edit is an opaque, already-encoded config
/// fragment -- XML marshaling is not this crate's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcOperation {
    /// `<get-config>` against the given source datastore; empty filter
    /// when `filter` is `None` (the keepalive probe shape).
    GetConfig {
        source: Datastore,
        filter: Option<Bytes>,
    },
    /// `<edit-config>` of an encoded fragment into the target datastore,
    /// optionally requesting `rollback-on-error` error handling.
    EditConfig {
        target: Datastore,
        operation: EditOperation,
        data: Bytes,
        rollback_on_error: bool,
    },
    Lock(Datastore),
    Unlock(Datastore),
    Commit,
    DiscardChanges,
}

impl RpcOperation {
    /// Short operation name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetConfig { .. } => "get-config",
            Self::EditConfig { .. } => "edit-config",
            Self::Lock(_) => "lock",
            Self::Unlock(_) => "unlock",
            Self::Commit => "commit",
            Self::DiscardChanges => "discard-changes",
        }
    }
}

/// A device reply: optional body plus the structured rpc-error list.
/// An answered reply carrying errors is still an *answered* reply -- the
/// liveness watchdog counts it as proof the session is alive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcReply {
    pub body: Option<Bytes>,
    pub errors: Vec<RpcError>,
}

impl RpcReply {
    /// A bare `<ok/>` reply.
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn with_body(body: impl Into<Bytes>) -> Self {
        Self {
            body: Some(body.into()),
            errors: Vec::new(),
        }
    }

    pub fn with_errors(errors: Vec<RpcError>) -> Self {
        Self { body: None, errors }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Asynchronous RPC invocation against one device session.
///
/// Completions may run on the transport's I/O callback context;
/// implementations and callers alike must never block there.
pub trait RpcChannel: Send + Sync + 'static {
    fn invoke(&self, operation: RpcOperation) -> BoxFuture<'static, Result<RpcReply, ChannelError>>;
}
