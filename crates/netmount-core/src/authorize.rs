// ── Connection authorization ──
//
// Decides, for an incoming call-home connection, whether to proceed with
// authentication and under what device name and credentials. The decision
// is a pure function of the directory of configured devices, the current
// global policy snapshot, and the connection's (address, host identity)
// pair -- a policy swap mid-decision cannot produce a mixed outcome.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};

use netmount_api::HostIdentity;

use crate::config::{
    Credentials, DeviceRecord, DeviceStatus, GlobalConfigHandle, NamingStrategy,
};

/// Where a connection came from. Call-home listeners normally hand us a
/// socket address, but test harnesses and exotic transports may not; the
/// string form then stands in for name synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteAddr {
    Socket(std::net::SocketAddr),
    Other(String),
}

impl RemoteAddr {
    fn synthesize_name(&self, strategy: NamingStrategy) -> String {
        match self {
            Self::Socket(addr) => match strategy {
                NamingStrategy::IpOnly => addr.ip().to_string(),
                NamingStrategy::IpPort => addr.to_string(),
            },
            Self::Other(text) => text.clone(),
        }
    }
}

impl std::fmt::Display for RemoteAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Socket(addr) => addr.fmt(f),
            Self::Other(text) => text.fmt(f),
        }
    }
}

/// Sink for device status transitions. Implementations must not block;
/// anything slow belongs behind a channel or a spawned task on their side.
pub trait StatusReporter: Send + Sync + 'static {
    /// Status change of an already-known device.
    fn report_status(&self, device_id: &str, status: DeviceStatus);

    /// First sighting of a device that has no configured record.
    fn report_new_device(&self, device_id: &str, identity: &HostIdentity, status: DeviceStatus);
}

/// Outcome of an authorization decision.
#[derive(Debug, Clone)]
pub enum Authorization {
    /// Proceed with authentication under this name, trying these
    /// credentials in order.
    Accepted {
        session_name: String,
        credentials: Credentials,
    },
    /// Drop the connection.
    Rejected,
}

impl Authorization {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Configured devices indexed by their expected host identity.
///
/// A record without a parseable host key can never match an incoming
/// connection, so it is logged and skipped rather than stored.
#[derive(Default)]
pub struct DeviceDirectory {
    by_identity: DashMap<HostIdentity, Arc<DeviceRecord>>,
}

impl DeviceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: DeviceRecord) {
        let Some(identity) = Self::identity_of(&record) else {
            return;
        };
        self.by_identity.insert(identity, Arc::new(record));
    }

    pub fn remove(&self, record: &DeviceRecord) {
        if let Some(identity) = Self::identity_of(record) {
            self.by_identity.remove(&identity);
        }
    }

    pub fn find(&self, identity: &HostIdentity) -> Option<Arc<DeviceRecord>> {
        self.by_identity
            .get(identity)
            .map(|entry| Arc::clone(&entry))
    }

    pub fn len(&self) -> usize {
        self.by_identity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_identity.is_empty()
    }

    fn identity_of(record: &DeviceRecord) -> Option<HostIdentity> {
        let Some(ref host_key) = record.host_key else {
            warn!(device = %record.unique_id, "device record has no host key; it can never match");
            return None;
        };
        match HostIdentity::from_openssh(host_key) {
            Ok(identity) => Some(identity),
            Err(error) => {
                warn!(device = %record.unique_id, %error, "unparseable host key in device record");
                None
            }
        }
    }
}

pub struct AuthorizationDecider {
    directory: Arc<DeviceDirectory>,
    global: Arc<GlobalConfigHandle>,
    reporter: Arc<dyn StatusReporter>,
    /// Unknown keys already rejected once, so repeat connection attempts
    /// from the same unlisted device log quietly instead of re-reporting.
    rejected_keys: DashMap<String, ()>,
}

impl AuthorizationDecider {
    pub fn new(
        directory: Arc<DeviceDirectory>,
        global: Arc<GlobalConfigHandle>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        Self {
            directory,
            global,
            reporter,
            rejected_keys: DashMap::new(),
        }
    }

    /// Decide whether the connection proceeds. Never blocks and never
    /// errors: every malformed or unwelcome input maps to `Rejected`.
    pub fn authorize(&self, remote: &RemoteAddr, identity: &HostIdentity) -> Authorization {
        let global = self.global.snapshot();

        if let Some(record) = self.directory.find(identity) {
            let credentials = record
                .credentials
                .clone()
                .or_else(|| global.credentials.clone());
            return match credentials {
                Some(credentials) => Authorization::Accepted {
                    session_name: record.unique_id.clone(),
                    credentials,
                },
                None => {
                    warn!(
                        device = %record.unique_id,
                        %remote,
                        "no credentials configured for device or globally; rejecting"
                    );
                    Authorization::Rejected
                }
            };
        }

        let session_name = remote.synthesize_name(global.naming_strategy);

        if global.accept_all_unknown_keys {
            if let Some(credentials) = global.credentials.clone() {
                info!(device = %session_name, %remote, "accepting device with unknown host key");
                self.reporter
                    .report_new_device(&session_name, identity, DeviceStatus::Disconnected);
                return Authorization::Accepted {
                    session_name,
                    credentials,
                };
            }
            warn!(%remote, "unknown host key acceptable but no global credentials; rejecting");
            return Authorization::Rejected;
        }

        // Report an unlisted device once; repeat attempts only log.
        let encoded = identity.to_openssh();
        if self.rejected_keys.insert(encoded, ()).is_some() {
            info!(%remote, "repeating rejection of unlisted device");
        } else {
            warn!(device = %session_name, %remote, "rejecting device with unlisted host key");
            self.reporter
                .report_new_device(&session_name, identity, DeviceStatus::FailedNotAllowed);
        }
        Authorization::Rejected
    }

    /// Report a status transition for an established or failed device.
    pub fn report_status(&self, device_id: &str, status: DeviceStatus) {
        self.reporter.report_status(device_id, status);
    }
}
