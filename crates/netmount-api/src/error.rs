// ── Wire-level error types ──
//
// Errors a device or transport can hand back to the core. RPC-level errors
// keep the full (type, tag, severity, message) structure from the device's
// rpc-error reply -- the core surfaces them intact, never as flat strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to decode an SSH public-key blob into a [`HostIdentity`].
///
/// Never fatal to the process: a bad key rejects just the one device.
///
/// [`HostIdentity`]: crate::keys::HostIdentity
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The leading type tag is not one of the supported key algorithms.
    #[error("unsupported key type {0:?}")]
    UnknownType(String),

    /// A length field points past the end of the blob, a field is missing,
    /// or the key material violates the algorithm's shape.
    #[error("malformed key blob: {0}")]
    Malformed(&'static str),

    /// The authorized-keys string form is not valid base64.
    #[error("invalid base64 in key string: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Classification of an rpc-error reported by the device (RFC 6241 §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum RpcErrorType {
    Transport,
    Rpc,
    Protocol,
    Application,
}

/// The error-tag of an rpc-error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum RpcErrorTag {
    InUse,
    InvalidValue,
    TooBig,
    MissingAttribute,
    BadAttribute,
    UnknownAttribute,
    MissingElement,
    BadElement,
    UnknownElement,
    UnknownNamespace,
    AccessDenied,
    LockDenied,
    ResourceDenied,
    RollbackFailed,
    DataExists,
    DataMissing,
    OperationNotSupported,
    OperationFailed,
    MalformedMessage,
}

/// The error-severity of an rpc-error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum RpcErrorSeverity {
    Error,
    Warning,
}

/// One structured rpc-error entry from a device reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub error_type: RpcErrorType,
    pub tag: RpcErrorTag,
    pub severity: RpcErrorSeverity,
    pub message: String,
}

impl RpcError {
    pub fn new(
        error_type: RpcErrorType,
        tag: RpcErrorTag,
        severity: RpcErrorSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error_type,
            tag,
            severity,
            message: message.into(),
        }
    }

    /// Shorthand for an application-level `operation-failed` error.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        Self::new(
            RpcErrorType::Application,
            RpcErrorTag::OperationFailed,
            RpcErrorSeverity::Error,
            message,
        )
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} ({}): {}",
            self.error_type, self.tag, self.severity, self.message
        )
    }
}

/// Transport-level failure of an RPC invocation: the request never reached
/// the device or the reply never arrived. Distinct from an rpc-error reply,
/// which is a *successful* exchange carrying device-reported errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// The underlying session is gone.
    #[error("session closed")]
    SessionClosed,

    /// No reply within the request timeout; the in-flight request was
    /// cancelled best-effort.
    #[error("request timed out after {timeout_millis}ms")]
    Timeout { timeout_millis: u64 },

    /// Any other transport-layer failure.
    #[error("transport failure: {0}")]
    Transport(String),
}
