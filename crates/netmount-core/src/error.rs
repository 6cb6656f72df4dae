// ── Engine error types ──

use thiserror::Error;

use netmount_api::{ChannelError, Datastore, RpcError, RpcErrorSeverity, RpcReply, StoreTarget};

use crate::session::SessionId;

/// Why a single device RPC came back unusable. A device can answer with
/// rpc-errors (the session is alive, the operation was refused) or fail at
/// the transport layer (no answer at all). Recovery differs, so callers
/// can always tell the two apart.
#[derive(Debug, Error)]
pub enum RpcFailure {
    #[error("device reported {}", format_errors(.0))]
    Protocol(Vec<RpcError>),

    #[error(transparent)]
    Transport(ChannelError),
}

fn format_errors(errors: &[RpcError]) -> String {
    let rendered: Vec<String> = errors.iter().map(ToString::to_string).collect();
    rendered.join("; ")
}

impl RpcFailure {
    /// Screen one invocation result. Replies whose errors are all warnings
    /// count as success, matching how devices report advisory conditions
    /// on lock and edit.
    pub fn check(result: Result<RpcReply, ChannelError>) -> Result<RpcReply, Self> {
        match result {
            Err(channel) => Err(Self::Transport(channel)),
            Ok(reply) => {
                if reply
                    .errors
                    .iter()
                    .all(|e| e.severity == RpcErrorSeverity::Warning)
                {
                    Ok(reply)
                } else {
                    Err(Self::Protocol(reply.errors))
                }
            }
        }
    }

    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    pub fn is_transport_error(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Failure of a configuration transaction step.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("failed to lock {datastore}: {failure}")]
    LockFailed {
        datastore: Datastore,
        failure: RpcFailure,
    },

    #[error("edit of {datastore} failed: {failure}")]
    EditFailed {
        datastore: Datastore,
        failure: RpcFailure,
    },

    #[error("commit failed: {failure}")]
    CommitFailed { failure: RpcFailure },

    /// Caller asked to edit a non-configuration store.
    #[error("cannot edit {store} data")]
    InvalidStore { store: StoreTarget },

    /// The session already has an unfinished transaction; commit or
    /// discard it before opening another.
    #[error("a transaction is already in progress")]
    AlreadyInProgress,

    /// The device advertised neither the candidate nor the
    /// writable-running capability.
    #[error("device advertises no writable datastore")]
    NoWritableStore,
}

/// Registration refused because the same host identity already has a live
/// session. The caller closes the *new* connection; the existing session
/// is untouched.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("host identity already bound to session {existing}")]
pub struct DuplicateIdentity {
    pub existing: SessionId,
}

/// Why an incoming connection never became a session.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The transport could not present a host identity to authorize on.
    #[error("transport presented no host identity")]
    NoIdentity,

    /// The authorization decider refused the connection.
    #[error("connection not authorized")]
    NotAuthorized,

    #[error(transparent)]
    Duplicate(#[from] DuplicateIdentity),
}
