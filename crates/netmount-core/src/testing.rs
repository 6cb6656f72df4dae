// ── Shared unit-test doubles ──

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use futures::future::BoxFuture;

use netmount_api::{
    ChannelError, HostIdentity, RpcChannel, RpcOperation, RpcReply, Transport,
};

/// A deterministic host identity; equal seeds produce equal identities.
pub(crate) fn test_identity(seed: u8) -> HostIdentity {
    HostIdentity::Rsa {
        exponent: Bytes::from_static(&[0x01, 0x00, 0x01]),
        modulus: Bytes::from(vec![0x80, seed, 0x01, 0x02, 0x03]),
    }
}

/// Transport double that records close() calls.
pub(crate) struct StubTransport {
    remote: SocketAddr,
    identity: Option<HostIdentity>,
    closed: AtomicUsize,
}

impl StubTransport {
    pub(crate) fn new(remote: SocketAddr) -> Self {
        Self {
            remote,
            identity: None,
            closed: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_identity(remote: SocketAddr, identity: HostIdentity) -> Self {
        Self {
            identity: Some(identity),
            ..Self::new(remote)
        }
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for StubTransport {
    fn remote_address(&self) -> SocketAddr {
        self.remote
    }

    fn remote_identity(&self) -> Option<HostIdentity> {
        self.identity.clone()
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// RPC channel double. Replies are scripted per operation name; anything
/// unscripted answers `<ok/>`. Every invocation is logged as
/// `"<name> <datastore>"` for order assertions.
#[derive(Default)]
pub(crate) struct ScriptedChannel {
    scripted: Mutex<HashMap<&'static str, VecDeque<Result<RpcReply, ChannelError>>>>,
    log: Mutex<Vec<String>>,
}

impl ScriptedChannel {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue the next reply for the named operation.
    pub(crate) fn script(&self, operation: &'static str, reply: Result<RpcReply, ChannelError>) {
        self.scripted
            .lock()
            .unwrap()
            .entry(operation)
            .or_default()
            .push_back(reply);
    }

    pub(crate) fn invocations(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn describe(operation: &RpcOperation) -> String {
        match operation {
            RpcOperation::GetConfig { source, .. } => format!("get-config {source}"),
            RpcOperation::EditConfig { target, .. } => format!("edit-config {target}"),
            RpcOperation::Lock(store) => format!("lock {store}"),
            RpcOperation::Unlock(store) => format!("unlock {store}"),
            RpcOperation::Commit => "commit".to_owned(),
            RpcOperation::DiscardChanges => "discard-changes".to_owned(),
        }
    }
}

impl RpcChannel for ScriptedChannel {
    fn invoke(&self, operation: RpcOperation) -> BoxFuture<'static, Result<RpcReply, ChannelError>> {
        self.log.lock().unwrap().push(Self::describe(&operation));
        let next = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(operation.name())
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(RpcReply::ok()));
        Box::pin(async move { next })
    }
}

/// A channel whose requests never complete. The liveness watchdog's
/// request timeout is the only way out.
pub(crate) struct HangingChannel {
    attempts: AtomicUsize,
}

impl HangingChannel {
    pub(crate) fn new() -> Self {
        Self {
            attempts: AtomicUsize::new(0),
        }
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl RpcChannel for HangingChannel {
    fn invoke(&self, _operation: RpcOperation) -> BoxFuture<'static, Result<RpcReply, ChannelError>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Box::pin(futures::future::pending())
    }
}
