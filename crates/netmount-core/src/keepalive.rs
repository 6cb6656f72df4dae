// ── Session liveness ──
//
// A per-session watchdog probes the device after every quiet interval
// with a `<get-config>` of running and an empty filter: cheap for the
// device, universally supported, and any *answered* reply -- rpc-error
// included -- proves the session is alive. Real traffic through the
// instrumented channel counts as activity and defers the next probe.
//
// Liveness loss is signalled exactly once through a `CancellationToken`
// the facade listens on, no matter how many paths observe the failure.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use netmount_api::{ChannelError, Datastore, RpcChannel, RpcOperation, RpcReply};

#[derive(Debug, Clone, Copy)]
pub struct KeepaliveConfig {
    /// Quiet time after which a probe is sent.
    pub probe_interval: Duration,
    /// Per-request reply deadline, probes and user RPCs alike.
    pub request_timeout: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(120),
            request_timeout: Duration::from_secs(60),
        }
    }
}

struct Shared {
    device: String,
    request_timeout: Duration,
    last_activity: Mutex<Instant>,
    torn_down: AtomicBool,
    failed: CancellationToken,
}

impl Shared {
    fn record_activity(&self) {
        let mut last = self.last_activity.lock().unwrap_or_else(|e| e.into_inner());
        *last = Instant::now();
    }

    fn last_activity(&self) -> Instant {
        *self.last_activity.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Signal liveness loss. First caller wins; later observations of the
    /// same dead session are silent.
    fn fail(&self, reason: &str) {
        if !self.torn_down.swap(true, Ordering::SeqCst) {
            warn!(device = %self.device, reason, "device liveness lost");
            self.failed.cancel();
        }
    }
}

/// Per-session liveness watchdog. Created at session establishment, runs
/// until stopped or until it declares the session dead.
pub struct KeepaliveWatchdog {
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

impl KeepaliveWatchdog {
    /// Spawn the probe loop over the given (uninstrumented) channel.
    pub fn start(
        device: impl Into<String>,
        channel: Arc<dyn RpcChannel>,
        config: KeepaliveConfig,
    ) -> Self {
        let shared = Arc::new(Shared {
            device: device.into(),
            request_timeout: config.request_timeout,
            last_activity: Mutex::new(Instant::now()),
            torn_down: AtomicBool::new(false),
            failed: CancellationToken::new(),
        });
        let cancel = CancellationToken::new();
        tokio::spawn(Self::run(
            Arc::clone(&shared),
            channel,
            config.probe_interval,
            cancel.clone(),
        ));
        Self { shared, cancel }
    }

    /// Token cancelled exactly once when the session is declared dead.
    pub fn liveness_failed(&self) -> CancellationToken {
        self.shared.failed.clone()
    }

    /// Note session traffic from outside the instrumented channel.
    pub fn record_activity(&self) {
        self.shared.record_activity();
    }

    /// Stop probing without declaring the session dead. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Instrument a channel so its traffic feeds the activity clock and
    /// carries the per-request timeout.
    pub fn instrument(&self, inner: Arc<dyn RpcChannel>) -> KeepaliveRpcChannel {
        KeepaliveRpcChannel {
            inner,
            shared: Arc::clone(&self.shared),
        }
    }

    async fn run(
        shared: Arc<Shared>,
        channel: Arc<dyn RpcChannel>,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        loop {
            let deadline = shared.last_activity() + interval;
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = tokio::time::sleep_until(deadline) => {}
            }
            if shared.last_activity() + interval > Instant::now() {
                // traffic arrived while we slept
                continue;
            }

            trace!(device = %shared.device, "sending keepalive probe");
            let probe = channel.invoke(RpcOperation::GetConfig {
                source: Datastore::Running,
                filter: None,
            });
            match tokio::time::timeout(shared.request_timeout, probe).await {
                Ok(Ok(reply)) => {
                    shared.record_activity();
                    if !reply.is_success() {
                        debug!(
                            device = %shared.device,
                            "keepalive probe answered with rpc-error; session is alive"
                        );
                    }
                }
                Ok(Err(error)) => {
                    shared.fail(&format!("keepalive probe failed: {error}"));
                    return;
                }
                Err(_) => {
                    shared.fail("keepalive probe timed out");
                    return;
                }
            }
        }
    }
}

/// An [`RpcChannel`] wrapper applied to every session: replies stamp the
/// activity clock, every request carries the reply deadline, and a
/// transport failure on *any* request declares the session dead just as
/// a failed probe would.
///
/// A timed-out request is cancelled best-effort and reported to its
/// caller only; the watchdog decides separately whether the session
/// itself is gone.
pub struct KeepaliveRpcChannel {
    inner: Arc<dyn RpcChannel>,
    shared: Arc<Shared>,
}

impl RpcChannel for KeepaliveRpcChannel {
    fn invoke(&self, operation: RpcOperation) -> BoxFuture<'static, Result<RpcReply, ChannelError>> {
        let name = operation.name();
        let request = self.inner.invoke(operation);
        let shared = Arc::clone(&self.shared);
        Box::pin(async move {
            match tokio::time::timeout(shared.request_timeout, request).await {
                Ok(Ok(reply)) => {
                    shared.record_activity();
                    Ok(reply)
                }
                Ok(Err(error)) => {
                    shared.fail(&format!("{name} failed in transport: {error}"));
                    Err(error)
                }
                Err(_) => Err(ChannelError::Timeout {
                    timeout_millis: u64::try_from(shared.request_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                }),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;

    use netmount_api::RpcError;

    use crate::testing::{HangingChannel, ScriptedChannel};

    use super::*;

    fn config(interval_secs: u64, timeout_secs: u64) -> KeepaliveConfig {
        KeepaliveConfig {
            probe_interval: Duration::from_secs(interval_secs),
            request_timeout: Duration::from_secs(timeout_secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_interval_triggers_a_probe() {
        let channel = Arc::new(ScriptedChannel::new());
        let watchdog = KeepaliveWatchdog::start(
            "edge-1",
            Arc::clone(&channel) as Arc<dyn RpcChannel>,
            config(120, 60),
        );

        tokio::time::sleep(Duration::from_secs(125)).await;

        assert_eq!(channel.invocations(), vec!["get-config running"]);
        assert!(!watchdog.liveness_failed().is_cancelled());
        watchdog.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn activity_defers_the_probe() {
        let channel = Arc::new(ScriptedChannel::new());
        let watchdog = KeepaliveWatchdog::start(
            "edge-1",
            Arc::clone(&channel) as Arc<dyn RpcChannel>,
            config(120, 60),
        );

        tokio::time::sleep(Duration::from_secs(100)).await;
        watchdog.record_activity();
        tokio::time::sleep(Duration::from_secs(100)).await;

        // 200s in, but only 100s quiet: no probe yet.
        assert!(channel.invocations().is_empty());

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(channel.invocations(), vec!["get-config running"]);
        watchdog.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn rpc_error_reply_keeps_the_session_alive() {
        let channel = Arc::new(ScriptedChannel::new());
        channel.script(
            "get-config",
            Ok(RpcReply::with_errors(vec![RpcError::operation_failed(
                "no running? unusual, but answered",
            )])),
        );
        let watchdog = KeepaliveWatchdog::start(
            "edge-1",
            Arc::clone(&channel) as Arc<dyn RpcChannel>,
            config(120, 60),
        );

        tokio::time::sleep(Duration::from_secs(250)).await;

        // First probe answered with errors, second probe sent on schedule.
        assert_eq!(
            channel.invocations(),
            vec!["get-config running", "get-config running"]
        );
        assert!(!watchdog.liveness_failed().is_cancelled());
        watchdog.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn hung_probe_declares_death_exactly_once() {
        let channel = Arc::new(HangingChannel::new());
        let watchdog = KeepaliveWatchdog::start(
            "edge-1",
            Arc::clone(&channel) as Arc<dyn RpcChannel>,
            config(120, 60),
        );
        let failed = watchdog.liveness_failed();

        tokio::time::sleep(Duration::from_secs(185)).await;
        assert!(failed.is_cancelled());

        // Long after death: no further probes, still the single signal.
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(channel.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_transport_failure_declares_death() {
        let channel = Arc::new(ScriptedChannel::new());
        channel.script("get-config", Err(ChannelError::SessionClosed));
        let watchdog = KeepaliveWatchdog::start(
            "edge-1",
            Arc::clone(&channel) as Arc<dyn RpcChannel>,
            config(120, 60),
        );

        tokio::time::sleep(Duration::from_secs(125)).await;
        assert!(watchdog.liveness_failed().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn instrumented_traffic_counts_as_activity() {
        let channel = Arc::new(ScriptedChannel::new());
        let watchdog = KeepaliveWatchdog::start(
            "edge-1",
            Arc::clone(&channel) as Arc<dyn RpcChannel>,
            config(120, 60),
        );
        let instrumented = watchdog.instrument(Arc::clone(&channel) as Arc<dyn RpcChannel>);

        tokio::time::sleep(Duration::from_secs(100)).await;
        instrumented
            .invoke(RpcOperation::GetConfig {
                source: Datastore::Running,
                filter: None,
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(100)).await;

        // 200s in, the only traffic is the user's own request.
        assert_eq!(channel.invocations().len(), 1);
        watchdog.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_user_request_does_not_kill_the_session() {
        let hanging = Arc::new(HangingChannel::new());
        // Probe horizon far away; only the user request is in play.
        let watchdog = KeepaliveWatchdog::start(
            "edge-1",
            Arc::clone(&hanging) as Arc<dyn RpcChannel>,
            config(3600, 60),
        );
        let instrumented = watchdog.instrument(Arc::clone(&hanging) as Arc<dyn RpcChannel>);

        let err = instrumented
            .invoke(RpcOperation::Commit)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ChannelError::Timeout {
                timeout_millis: 60_000
            }
        );
        assert!(!watchdog.liveness_failed().is_cancelled());
        watchdog.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_on_user_request_declares_death() {
        let channel = Arc::new(ScriptedChannel::new());
        channel.script("commit", Err(ChannelError::SessionClosed));
        let watchdog = KeepaliveWatchdog::start(
            "edge-1",
            Arc::clone(&channel) as Arc<dyn RpcChannel>,
            config(3600, 60),
        );
        let instrumented = watchdog.instrument(Arc::clone(&channel) as Arc<dyn RpcChannel>);

        let err = instrumented.invoke(RpcOperation::Commit).await.unwrap_err();

        assert_eq!(err, ChannelError::SessionClosed);
        assert!(watchdog.liveness_failed().is_cancelled());
        watchdog.stop();
    }
}
