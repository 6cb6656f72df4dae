// ── Configuration transactions ──
//
// One transaction per device at a time, driven by one logical caller. The
// ownership model enforces the protocol: lock and edit need `&mut self`,
// commit and discard consume the transaction, so use-after-finish is a
// compile error rather than a runtime surprise.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use netmount_api::{
    Capabilities, ChannelError, Datastore, EditOperation, RpcChannel, RpcOperation, RpcReply,
    StoreTarget,
};

use crate::error::{RpcFailure, TransactionError};

/// How configuration writes reach the device, fixed per session from the
/// capabilities advertised in its hello.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum TransactionStrategy {
    /// Edit the candidate datastore, then `<commit>`.
    CandidateOnly,
    /// Edit the running datastore directly; `<commit>` does not exist.
    RunningOnly,
    /// Edit the candidate, but lock *both* stores so no one slips a direct
    /// write into running between our edits and the commit.
    CandidateWithRunning,
}

impl TransactionStrategy {
    pub fn for_capabilities(capabilities: &Capabilities) -> Result<Self, TransactionError> {
        match (capabilities.candidate, capabilities.writable_running) {
            (true, true) => Ok(Self::CandidateWithRunning),
            (true, false) => Ok(Self::CandidateOnly),
            (false, true) => Ok(Self::RunningOnly),
            (false, false) => Err(TransactionError::NoWritableStore),
        }
    }

    /// The datastore edits are written to.
    fn write_target(self) -> Datastore {
        match self {
            Self::RunningOnly => Datastore::Running,
            Self::CandidateOnly | Self::CandidateWithRunning => Datastore::Candidate,
        }
    }

    fn uses_candidate(self) -> bool {
        !matches!(self, Self::RunningOnly)
    }
}

/// Shared flag the facade watches so a session teardown can discard a
/// transaction its owner never finished.
#[derive(Debug, Default)]
pub(crate) struct TxTracker {
    open: AtomicBool,
}

impl TxTracker {
    fn opened(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    pub(crate) fn closed(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// One in-flight configuration transaction against one device.
///
/// Edits are queued asynchronously: `edit_config` dispatches the RPC and
/// returns immediately; its outcome is settled by `commit`, which refuses
/// to issue the device `<commit>` if any queued edit failed.
pub struct Transaction {
    device: String,
    channel: Arc<dyn RpcChannel>,
    strategy: TransactionStrategy,
    rollback_on_error: bool,
    lock_allowed: bool,
    candidate_locked: bool,
    running_locked: bool,
    pending: Vec<JoinHandle<Result<RpcReply, ChannelError>>>,
    tracker: Arc<TxTracker>,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("device", &self.device)
            .field("strategy", &self.strategy)
            .field("rollback_on_error", &self.rollback_on_error)
            .field("lock_allowed", &self.lock_allowed)
            .field("candidate_locked", &self.candidate_locked)
            .field("running_locked", &self.running_locked)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl Transaction {
    pub fn new(
        device: impl Into<String>,
        channel: Arc<dyn RpcChannel>,
        capabilities: &Capabilities,
        lock_allowed: bool,
    ) -> Result<Self, TransactionError> {
        let strategy = TransactionStrategy::for_capabilities(capabilities)?;
        let tracker = Arc::new(TxTracker::default());
        tracker.opened();
        Ok(Self {
            device: device.into(),
            channel,
            strategy,
            rollback_on_error: capabilities.rollback_on_error,
            lock_allowed,
            candidate_locked: false,
            running_locked: false,
            pending: Vec::new(),
            tracker,
        })
    }

    pub fn strategy(&self) -> TransactionStrategy {
        self.strategy
    }

    pub(crate) fn tracker(&self) -> Arc<TxTracker> {
        Arc::clone(&self.tracker)
    }

    /// Take the datastore lock(s) the strategy requires.
    ///
    /// With locking administratively disabled this succeeds without
    /// touching the device, and the matching unlocks are skipped too.
    pub async fn lock(&mut self) -> Result<(), TransactionError> {
        if !self.lock_allowed {
            trace!(device = %self.device, "datastore locking disabled; lock is a no-op");
            return Ok(());
        }
        match self.strategy {
            TransactionStrategy::RunningOnly => self.lock_running().await,
            TransactionStrategy::CandidateOnly => self.lock_candidate().await,
            TransactionStrategy::CandidateWithRunning => {
                self.lock_candidate().await?;
                self.lock_running().await
            }
        }
    }

    async fn lock_running(&mut self) -> Result<(), TransactionError> {
        self.try_lock(Datastore::Running).await.map_err(|failure| {
            TransactionError::LockFailed {
                datastore: Datastore::Running,
                failure,
            }
        })?;
        self.running_locked = true;
        Ok(())
    }

    /// Lock the candidate, discarding leftovers on a first refusal. A
    /// candidate dirtied by a dead session is the common reason the lock
    /// is denied, so one discard-and-retry is attempted before giving up.
    async fn lock_candidate(&mut self) -> Result<(), TransactionError> {
        let first = match self.try_lock(Datastore::Candidate).await {
            Ok(()) => {
                self.candidate_locked = true;
                return Ok(());
            }
            Err(failure) => failure,
        };
        warn!(
            device = %self.device,
            error = %first,
            "candidate lock refused; discarding stale changes and retrying"
        );

        if RpcFailure::check(self.channel.invoke(RpcOperation::DiscardChanges).await).is_err() {
            return Err(TransactionError::LockFailed {
                datastore: Datastore::Candidate,
                failure: first,
            });
        }
        self.try_lock(Datastore::Candidate).await.map_err(|failure| {
            TransactionError::LockFailed {
                datastore: Datastore::Candidate,
                failure,
            }
        })?;
        self.candidate_locked = true;
        Ok(())
    }

    async fn try_lock(&self, datastore: Datastore) -> Result<(), RpcFailure> {
        RpcFailure::check(self.channel.invoke(RpcOperation::Lock(datastore)).await).map(|_| ())
    }

    /// Queue an edit of the session's writable datastore. Dispatches the
    /// RPC and returns immediately; the reply is settled by [`commit`].
    ///
    /// Only configuration data is editable. The datastore actually written
    /// is the strategy's choice, not the caller's.
    ///
    /// [`commit`]: Self::commit
    pub fn edit_config(
        &mut self,
        store: StoreTarget,
        operation: EditOperation,
        data: Bytes,
    ) -> Result<(), TransactionError> {
        if store != StoreTarget::Configuration {
            return Err(TransactionError::InvalidStore { store });
        }
        let rpc = RpcOperation::EditConfig {
            target: self.strategy.write_target(),
            operation,
            data,
            rollback_on_error: self.rollback_on_error,
        };
        self.pending.push(tokio::spawn(self.channel.invoke(rpc)));
        Ok(())
    }

    /// Settle all queued edits, then make them take effect: a device
    /// `<commit>` under the candidate strategies, nothing further when
    /// writing to running directly. Held locks are released on every exit
    /// path, success or not.
    pub async fn commit(mut self) -> Result<(), TransactionError> {
        let result = self.settle_and_commit().await;
        self.unlock().await;
        self.tracker.closed();
        result
    }

    /// Abandon the transaction: discard any candidate changes and release
    /// held locks.
    pub async fn discard_changes(mut self) {
        self.rollback();
        self.unlock().await;
        self.tracker.closed();
    }

    async fn settle_and_commit(&mut self) -> Result<(), TransactionError> {
        for queued in std::mem::take(&mut self.pending) {
            let settled = match queued.await {
                Ok(settled) => settled,
                Err(join) => Err(ChannelError::Transport(format!("edit task failed: {join}"))),
            };
            if let Err(failure) = RpcFailure::check(settled) {
                self.rollback();
                return Err(TransactionError::EditFailed {
                    datastore: self.strategy.write_target(),
                    failure,
                });
            }
        }

        if self.strategy.uses_candidate() {
            if let Err(failure) = RpcFailure::check(self.channel.invoke(RpcOperation::Commit).await)
            {
                self.rollback();
                return Err(TransactionError::CommitFailed { failure });
            }
        }
        Ok(())
    }

    /// Discard candidate changes, fire-and-forget. A failed discard only
    /// logs: the device will drop the stale candidate when the session
    /// closes, and the next transaction retries the discard on lock.
    fn rollback(&self) {
        if !self.strategy.uses_candidate() {
            return;
        }
        let device = self.device.clone();
        let discard = self.channel.invoke(RpcOperation::DiscardChanges);
        tokio::spawn(async move {
            match RpcFailure::check(discard.await) {
                Ok(_) => debug!(device = %device, "candidate changes discarded"),
                Err(failure) => {
                    warn!(device = %device, error = %failure, "discard-changes failed");
                }
            }
        });
    }

    /// Release whatever is held, running before candidate, each lock at
    /// most once. Unlock failures are logged, never returned: the primary
    /// outcome of the transaction must not be masked by cleanup.
    async fn unlock(&mut self) {
        if self.running_locked {
            self.unlock_one(Datastore::Running).await;
            self.running_locked = false;
        }
        if self.candidate_locked {
            self.unlock_one(Datastore::Candidate).await;
            self.candidate_locked = false;
        }
    }

    async fn unlock_one(&self, datastore: Datastore) {
        if let Err(failure) =
            RpcFailure::check(self.channel.invoke(RpcOperation::Unlock(datastore)).await)
        {
            warn!(
                device = %self.device,
                %datastore,
                error = %failure,
                "unlock failed during transaction teardown"
            );
        }
    }
}

/// A transaction dropped without commit or discard still rolls its
/// candidate changes back (when a runtime is available to carry the RPC)
/// and releases its open-transaction slot. Held datastore locks cannot be
/// released synchronously; they fall with the session.
impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.tracker.is_open() {
            return;
        }
        self.tracker.closed();
        if tokio::runtime::Handle::try_current().is_ok() {
            warn!(device = %self.device, "transaction dropped without commit or discard");
            self.rollback();
        }
    }
}
