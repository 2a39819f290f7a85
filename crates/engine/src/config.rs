//! Engine knobs, read from the environment like the rest of xfn.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Calls allowed per step before negotiation is declared stuck.
    pub max_rounds: u32,
    /// First requeue delay after a FATAL run; doubles per attempt.
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Poll interval after a run that surfaced a WARNING.
    pub warning_poll: Duration,
    /// Poll interval after a clean run.
    pub poll: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(300),
            warning_poll: Duration::from_secs(30),
            poll: Duration::from_secs(60),
        }
    }
}

fn env_u64(key: &str) -> Option<u64> { std::env::var(key).ok().and_then(|s| s.parse().ok()) }

impl EngineConfig {
    /// Defaults overridden by `XFN_MAX_ROUNDS`, `XFN_BACKOFF_BASE_SECS`,
    /// `XFN_BACKOFF_MAX_SECS`, `XFN_WARNING_POLL_SECS` and `XFN_POLL_SECS`.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_rounds: env_u64("XFN_MAX_ROUNDS").map(|v| v.clamp(1, u32::MAX as u64) as u32).unwrap_or(d.max_rounds),
            backoff_base: env_u64("XFN_BACKOFF_BASE_SECS").map(Duration::from_secs).unwrap_or(d.backoff_base),
            backoff_max: env_u64("XFN_BACKOFF_MAX_SECS").map(Duration::from_secs).unwrap_or(d.backoff_max),
            warning_poll: env_u64("XFN_WARNING_POLL_SECS").map(Duration::from_secs).unwrap_or(d.warning_poll),
            poll: env_u64("XFN_POLL_SECS").map(Duration::from_secs).unwrap_or(d.poll),
        }
    }

    /// Requeue delay for the `attempt`-th consecutive failure (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor).min(self.backoff_max)
    }
}
