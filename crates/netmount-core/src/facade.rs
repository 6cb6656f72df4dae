// ── Device session facade ──
//
// Composition root for one device connection: authorization, registry
// admission, liveness instrumentation, and the mount notification, in
// that order. Teardown runs the same steps in reverse and is idempotent
// no matter whether it was triggered by the operator, the transport, or
// the liveness watchdog.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use netmount_api::{Capabilities, RpcChannel, RpcOperation, Transport};

use crate::authorize::{Authorization, AuthorizationDecider, RemoteAddr};
use crate::backoff::ReconnectPolicy;
use crate::config::DeviceStatus;
use crate::error::{ConnectError, RpcFailure, TransactionError};
use crate::keepalive::{KeepaliveConfig, KeepaliveWatchdog};
use crate::registry::SessionRegistry;
use crate::session::{Session, SessionId};
use crate::transaction::{Transaction, TxTracker};

/// Consumer of established sessions, typically the mount point layer that
/// exposes devices upward. Both callbacks may run on engine tasks and
/// must not block.
pub trait MountHandler: Send + Sync + 'static {
    fn on_session_up(&self, device_id: &str, channel: Arc<dyn RpcChannel>);
    fn on_session_down(&self, device_id: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FacadeConfig {
    pub keepalive: KeepaliveConfig,
    pub reconnect: ReconnectPolicy,
    /// Disable datastore locking fleet-wide; transactions then rely on
    /// the device's own serialization.
    pub disable_locking: bool,
}

pub struct DeviceSessionFacade {
    registry: Arc<SessionRegistry>,
    decider: Arc<AuthorizationDecider>,
    mount: Arc<dyn MountHandler>,
    config: FacadeConfig,
}

impl DeviceSessionFacade {
    pub fn new(
        registry: Arc<SessionRegistry>,
        decider: Arc<AuthorizationDecider>,
        mount: Arc<dyn MountHandler>,
        config: FacadeConfig,
    ) -> Self {
        Self {
            registry,
            decider,
            mount,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        self.config.reconnect
    }

    /// Admit an established transport connection as a device session.
    ///
    /// On any refusal the transport is closed here; the caller only ever
    /// gets a live session or an error.
    pub fn connect(
        &self,
        transport: Arc<dyn Transport>,
        channel: Arc<dyn RpcChannel>,
        capability_urns: &[String],
    ) -> Result<Arc<DeviceSession>, ConnectError> {
        let remote = transport.remote_address();
        let Some(identity) = transport.remote_identity() else {
            warn!(%remote, "connection carries no host identity; dropping");
            transport.close();
            return Err(ConnectError::NoIdentity);
        };

        let decision = self
            .decider
            .authorize(&RemoteAddr::Socket(remote), &identity);
        let Authorization::Accepted { session_name, .. } = decision else {
            transport.close();
            return Err(ConnectError::NotAuthorized);
        };

        let capabilities = Capabilities::from_urns(capability_urns);
        let session = Arc::new(Session::new(
            session_name,
            remote,
            identity,
            capabilities,
            transport,
        ));
        if let Err(duplicate) = self.registry.register(Arc::clone(&session)) {
            warn!(
                device = %session.name,
                %remote,
                existing = %duplicate.existing,
                "host identity already has a live session; dropping the new connection"
            );
            session.close_transport();
            return Err(duplicate.into());
        }

        let watchdog = KeepaliveWatchdog::start(
            session.name.clone(),
            Arc::clone(&channel),
            self.config.keepalive,
        );
        let instrumented: Arc<dyn RpcChannel> = Arc::new(watchdog.instrument(channel));

        self.mount
            .on_session_up(&session.name, Arc::clone(&instrumented));
        self.decider
            .report_status(&session.name, DeviceStatus::Connected);
        info!(device = %session.name, %remote, session = %session.id, "device session up");

        let device = Arc::new(DeviceSession {
            session,
            channel: instrumented,
            watchdog,
            disable_locking: self.config.disable_locking,
            open_tx: Mutex::new(None),
            torn_down: AtomicBool::new(false),
            closed: CancellationToken::new(),
            registry: Arc::clone(&self.registry),
            decider: Arc::clone(&self.decider),
            mount: Arc::clone(&self.mount),
        });
        DeviceSession::spawn_liveness_monitor(&device);
        Ok(device)
    }
}

/// Handle to one live device session. Teardown happens at most once,
/// through whichever of [`disconnect`] or the liveness watchdog fires
/// first.
///
/// [`disconnect`]: Self::disconnect
pub struct DeviceSession {
    session: Arc<Session>,
    channel: Arc<dyn RpcChannel>,
    watchdog: KeepaliveWatchdog,
    disable_locking: bool,
    /// Tracker of the most recently opened transaction, so teardown can
    /// discard one its owner never finished.
    open_tx: Mutex<Option<Arc<TxTracker>>>,
    torn_down: AtomicBool,
    closed: CancellationToken,
    registry: Arc<SessionRegistry>,
    decider: Arc<AuthorizationDecider>,
    mount: Arc<dyn MountHandler>,
}

impl DeviceSession {
    pub fn id(&self) -> SessionId {
        self.session.id
    }

    pub fn name(&self) -> &str {
        &self.session.name
    }

    pub fn capabilities(&self) -> Capabilities {
        self.session.capabilities
    }

    /// The session's instrumented RPC channel.
    pub fn channel(&self) -> Arc<dyn RpcChannel> {
        Arc::clone(&self.channel)
    }

    /// Open a configuration transaction. One at a time per device: a
    /// second open while the first is unfinished is refused, not raced.
    pub fn transaction(&self) -> Result<Transaction, TransactionError> {
        let mut slot = self.open_tx.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|tracker| tracker.is_open()) {
            return Err(TransactionError::AlreadyInProgress);
        }
        let tx = Transaction::new(
            self.session.name.clone(),
            Arc::clone(&self.channel),
            &self.session.capabilities,
            !self.disable_locking,
        )?;
        *slot = Some(tx.tracker());
        Ok(tx)
    }

    /// Operator-initiated teardown.
    pub fn disconnect(&self) {
        self.teardown(DeviceStatus::Disconnected);
    }

    fn spawn_liveness_monitor(this: &Arc<Self>) {
        let failed = this.watchdog.liveness_failed();
        let closed = this.closed.clone();
        let this = Arc::clone(this);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = closed.cancelled() => {}
                () = failed.cancelled() => this.teardown(DeviceStatus::Failed),
            }
        });
    }

    fn teardown(&self, status: DeviceStatus) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(device = %self.session.name, %status, "tearing down device session");

        self.closed.cancel();
        self.watchdog.stop();

        let abandoned = {
            let mut slot = self.open_tx.lock().unwrap_or_else(|e| e.into_inner());
            slot.take().is_some_and(|tracker| {
                let open = tracker.is_open();
                tracker.closed();
                open
            })
        };
        // Only candidate-capable sessions have anything to discard.
        if abandoned && self.session.capabilities.candidate {
            let device = self.session.name.clone();
            let discard = self.channel.invoke(RpcOperation::DiscardChanges);
            tokio::spawn(async move {
                match RpcFailure::check(discard.await) {
                    Ok(_) => debug!(device = %device, "abandoned transaction discarded"),
                    Err(failure) => {
                        debug!(device = %device, error = %failure, "discard of abandoned transaction failed");
                    }
                }
            });
        }

        self.registry.remove(&self.session);
        self.mount.on_session_down(&self.session.name);
        self.session.close_transport();
        self.decider.report_status(&self.session.name, status);
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("session", &self.session)
            .field("torn_down", &self.torn_down.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
