//! Engine runtime configuration
//!
//! Defaults can be overridden through `LIFECYCLE_*` environment variables.
//! Unparseable or out-of-range values are ignored and the default kept.

use std::time::Duration;

/// Default bounded wait for a per-issue lock
pub const DEFAULT_LOCK_WAIT_MS: u64 = 3000;
/// Default ledger append attempts before surfacing `PartialEscalation`
pub const DEFAULT_LEDGER_ATTEMPTS: u32 = 3;
pub const DEFAULT_LEDGER_BACKOFF_MS: u64 = 25;
/// Default deadline extensions allowed per tier
pub const DEFAULT_MAX_EXTENSIONS: u32 = 2;
pub const DEFAULT_UNSTAFFED_RETRY_HOURS: i64 = 6;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Tunables for [`EscalationEngine`](crate::escalation::EscalationEngine)
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a request waits for the issue lock before failing with `Busy`
    pub lock_wait: Duration,

    /// Ledger append attempts after the state write succeeded
    pub ledger_append_attempts: u32,

    /// Base backoff between ledger attempts (multiplied by the attempt number)
    pub ledger_retry_backoff: Duration,

    pub max_pending_extensions: u32,

    /// Deadline deferral when the next tier has nobody to take the issue
    pub unstaffed_retry: chrono::Duration,

    /// Period of the background deadline sweep
    pub sweep_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_wait: Duration::from_millis(DEFAULT_LOCK_WAIT_MS),
            ledger_append_attempts: DEFAULT_LEDGER_ATTEMPTS,
            ledger_retry_backoff: Duration::from_millis(DEFAULT_LEDGER_BACKOFF_MS),
            max_pending_extensions: DEFAULT_MAX_EXTENSIONS,
            unstaffed_retry: chrono::Duration::hours(DEFAULT_UNSTAFFED_RETRY_HOURS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup (environment, CLI, tests)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let parse = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let parse_u32 = |key: &str| parse(key).and_then(|n| u32::try_from(n).ok());

        if let Some(ms) = parse("LIFECYCLE_LOCK_WAIT_MS") {
            config.lock_wait = Duration::from_millis(ms);
        }
        if let Some(n) = parse_u32("LIFECYCLE_LEDGER_ATTEMPTS") {
            // At least one attempt is always made
            config.ledger_append_attempts = n.max(1);
        }
        if let Some(ms) = parse("LIFECYCLE_LEDGER_BACKOFF_MS") {
            config.ledger_retry_backoff = Duration::from_millis(ms);
        }
        if let Some(n) = parse_u32("LIFECYCLE_MAX_EXTENSIONS") {
            config.max_pending_extensions = n;
        }
        if let Some(retry) = parse("LIFECYCLE_UNSTAFFED_RETRY_HOURS")
            .filter(|hours| *hours > 0)
            .and_then(|hours| i64::try_from(hours).ok())
            .and_then(chrono::Duration::try_hours)
        {
            config.unstaffed_retry = retry;
        }
        if let Some(secs) = parse("LIFECYCLE_SWEEP_INTERVAL_SECS") {
            if secs > 0 {
                config.sweep_interval = Duration::from_secs(secs);
            }
        }

        config
    }

    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    pub fn with_ledger_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.ledger_append_attempts = attempts.max(1);
        self.ledger_retry_backoff = backoff;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.lock_wait, Duration::from_secs(3));
        assert_eq!(config.ledger_append_attempts, 3);
        assert_eq!(config.max_pending_extensions, 2);
        assert_eq!(config.unstaffed_retry, chrono::Duration::hours(6));
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_from_lookup_overrides_and_ignores_garbage() {
        let vars: HashMap<&str, &str> = [
            ("LIFECYCLE_LOCK_WAIT_MS", "150"),
            ("LIFECYCLE_LEDGER_ATTEMPTS", "0"),
            ("LIFECYCLE_MAX_EXTENSIONS", "five"),
            ("LIFECYCLE_UNSTAFFED_RETRY_HOURS", "12"),
        ]
        .into_iter()
        .collect();

        let config = EngineConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.lock_wait, Duration::from_millis(150));
        assert_eq!(config.ledger_append_attempts, 1);
        assert_eq!(config.max_pending_extensions, DEFAULT_MAX_EXTENSIONS);
        assert_eq!(config.unstaffed_retry, chrono::Duration::hours(12));
        assert_eq!(
            config.ledger_retry_backoff,
            Duration::from_millis(DEFAULT_LEDGER_BACKOFF_MS)
        );
    }

    #[test]
    fn test_from_lookup_ignores_out_of_range() {
        let vars: HashMap<&str, String> = [
            ("LIFECYCLE_LEDGER_ATTEMPTS", (u64::from(u32::MAX) + 2).to_string()),
            ("LIFECYCLE_MAX_EXTENSIONS", (1u64 << 32).to_string()),
            ("LIFECYCLE_UNSTAFFED_RETRY_HOURS", u64::MAX.to_string()),
        ]
        .into_iter()
        .collect();

        let config = EngineConfig::from_lookup(|k| vars.get(k).cloned());
        assert_eq!(config.ledger_append_attempts, DEFAULT_LEDGER_ATTEMPTS);
        assert_eq!(config.max_pending_extensions, DEFAULT_MAX_EXTENSIONS);
        assert_eq!(
            config.unstaffed_retry,
            chrono::Duration::hours(DEFAULT_UNSTAFFED_RETRY_HOURS)
        );

        // Fits in i64 but not in a chrono duration
        let huge = (i64::MAX / 2).to_string();
        let config = EngineConfig::from_lookup(|k| {
            (k == "LIFECYCLE_UNSTAFFED_RETRY_HOURS").then(|| huge.clone())
        });
        assert_eq!(
            config.unstaffed_retry,
            chrono::Duration::hours(DEFAULT_UNSTAFFED_RETRY_HOURS)
        );
    }
}
