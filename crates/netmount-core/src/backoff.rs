// ── Reconnection backoff ──

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Exponential backoff for re-dialing a device after its session dies.
/// The delay grows by `multiplier` per failed attempt, is clamped to
/// `max_delay`, and gets a small random jitter so a fleet of devices
/// lost to one outage does not re-dial in lockstep.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Fraction of the delay used as the jitter band, `0.0..1.0`.
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(2000),
            max_delay: Duration::from_millis(1_800_000),
            multiplier: 1.5,
            jitter: 0.1,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnection attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.min_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let clamped = base.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(clamped * self.jitter_factor())
    }

    fn jitter_factor(&self) -> f64 {
        // Clock noise, not an RNG: the factor only needs to spread
        // re-dials across the band, not be unpredictable.
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos();
        let unit = f64::from(nanos) / 1e9 * 2.0 - 1.0;
        (self.jitter.clamp(0.0, 1.0)).mul_add(unit, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> ReconnectPolicy {
        ReconnectPolicy {
            jitter: 0.0,
            ..ReconnectPolicy::default()
        }
    }

    #[test]
    fn delay_grows_geometrically() {
        let policy = no_jitter();
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(3));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4500));
    }

    #[test]
    fn delay_clamps_at_the_maximum() {
        let policy = no_jitter();
        assert_eq!(policy.delay_for(40), Duration::from_secs(1800));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(1800));
    }

    #[test]
    fn jitter_stays_within_its_band() {
        let policy = ReconnectPolicy::default();
        for attempt in 0..8 {
            let delay = policy.delay_for(attempt).as_secs_f64();
            let nominal = no_jitter().delay_for(attempt).as_secs_f64();
            assert!(delay >= nominal * 0.9 - f64::EPSILON);
            assert!(delay <= nominal * 1.1 + f64::EPSILON);
        }
    }
}
