// ── Configuration model ──
//
// Two layers of operator-supplied data: a global policy record that can be
// swapped at runtime without touching live sessions, and per-device
// records keyed by host key. Secrets ride in `SecretString` so a stray
// debug log can never leak a password.

use std::sync::Arc;

use arc_swap::ArcSwap;
use secrecy::SecretString;
use serde::Deserialize;

/// How to synthesize a name for a device connecting with an unknown but
/// accepted host key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, strum::Display)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum NamingStrategy {
    /// Name the device after its source IP only.
    IpOnly,
    /// Name the device `ip:port`, keeping concurrent connections from
    /// behind one NAT distinguishable.
    #[default]
    IpPort,
}

/// SSH credentials presented to a device, in trial order.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub passwords: Vec<SecretString>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, passwords: Vec<SecretString>) -> Self {
        Self {
            username: username.into(),
            passwords,
        }
    }
}

/// Global call-home policy. Applies wherever a per-device record does not
/// override it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Accept devices whose host key matches no configured record.
    pub accept_all_unknown_keys: bool,
    /// Credentials for devices without their own.
    pub credentials: Option<Credentials>,
    pub naming_strategy: NamingStrategy,
}

/// Shared handle to the current global policy. Readers take a cheap
/// point-in-time snapshot; a policy swap affects the *next* authorization
/// decision, never a decision already in flight.
#[derive(Debug, Default)]
pub struct GlobalConfigHandle {
    current: ArcSwap<GlobalConfig>,
}

impl GlobalConfigHandle {
    pub fn new(config: GlobalConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(config),
        }
    }

    pub fn snapshot(&self) -> Arc<GlobalConfig> {
        self.current.load_full()
    }

    pub fn replace(&self, config: GlobalConfig) {
        self.current.store(Arc::new(config));
    }
}

/// One operator-configured device.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceRecord {
    /// Stable identifier the device mounts under.
    pub unique_id: String,
    /// Device-specific credentials; falls back to [`GlobalConfig`] when
    /// absent.
    #[serde(default)]
    pub credentials: Option<Credentials>,
    /// Expected host key in authorized-keys string form. A record without
    /// one can never match an incoming connection.
    #[serde(default)]
    pub host_key: Option<String>,
}

/// Operational status of a configured or discovered device, as reported
/// through [`StatusReporter`](crate::authorize::StatusReporter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum DeviceStatus {
    Connected,
    Disconnected,
    /// Session died after being established.
    Failed,
    /// Device never authenticated.
    FailedAuthFailure,
    /// Device presented an unknown key and unknown keys are not accepted.
    FailedNotAllowed,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn snapshot_is_stable_across_replace() {
        let handle = GlobalConfigHandle::new(GlobalConfig {
            accept_all_unknown_keys: true,
            ..GlobalConfig::default()
        });
        let before = handle.snapshot();

        handle.replace(GlobalConfig::default());

        assert!(before.accept_all_unknown_keys);
        assert!(!handle.snapshot().accept_all_unknown_keys);
    }

    #[test]
    fn naming_strategy_defaults_to_ip_port() {
        assert_eq!(NamingStrategy::default(), NamingStrategy::IpPort);
        assert_eq!(NamingStrategy::IpPort.to_string(), "ip-port");
    }

    #[test]
    fn device_record_deserializes_with_defaults() {
        let record: DeviceRecord =
            serde_json::from_str(r#"{"unique_id": "edge-1"}"#).unwrap();
        assert_eq!(record.unique_id, "edge-1");
        assert!(record.credentials.is_none());
        assert!(record.host_key.is_none());
    }
}
