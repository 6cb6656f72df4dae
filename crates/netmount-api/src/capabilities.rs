// ── Advertised capability set ──
//
// Parsed once from the device's hello capability URNs at session
// establishment and fixed for the session's lifetime. The transaction
// strategy is derived from this and never re-selected.

/// Capability URNs examined at session establishment (RFC 6241 §8).
const CANDIDATE: &str = "urn:ietf:params:netconf:capability:candidate:1.0";
const WRITABLE_RUNNING: &str = "urn:ietf:params:netconf:capability:writable-running:1.0";
const ROLLBACK_ON_ERROR: &str = "urn:ietf:params:netconf:capability:rollback-on-error:1.0";

/// The subset of a device's advertised capabilities this engine acts on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub candidate: bool,
    pub writable_running: bool,
    pub rollback_on_error: bool,
}

impl Capabilities {
    /// Examine advertised capability URNs. Module capabilities carry query
    /// parameters after `?`; the base URN is what we match on.
    pub fn from_urns<S: AsRef<str>>(urns: impl IntoIterator<Item = S>) -> Self {
        let mut caps = Self::default();
        for urn in urns {
            let base = urn.as_ref().split('?').next().unwrap_or_default();
            match base {
                CANDIDATE => caps.candidate = true,
                WRITABLE_RUNNING => caps.writable_running = true,
                ROLLBACK_ON_ERROR => caps.rollback_on_error = true,
                _ => {}
            }
        }
        caps
    }
}
