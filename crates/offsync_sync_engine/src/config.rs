//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use offsync_sync_protocol::ConflictPolicy;
use std::path::PathBuf;
use std::time::Duration;

/// Name of the engine's bookkeeping directory inside the data directory.
pub const DEFAULT_SYNC_DIR: &str = ".sync";

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the remote (e.g. "https://api.example.com").
    pub remote_url: String,
    /// Root directory of the local document store.
    pub data_dir: PathBuf,
    /// Directory for the change log, conflict history and backups.
    pub sync_dir: PathBuf,
    /// Device ID stamped on every change. Generated and persisted when unset.
    pub actor_id: Option<String>,
    /// Time between connectivity probes.
    pub probe_interval: Duration,
    /// Upper bound on a single connectivity probe.
    pub probe_timeout: Duration,
    /// Upper bound on a single change request.
    pub request_timeout: Duration,
    /// Backoff for failed changes.
    pub retry: RetryConfig,
    /// Policy applied when the remote reports a conflict.
    pub conflict_policy: ConflictPolicy,
    /// Whether a save made while online triggers an immediate sync.
    pub sync_on_save: bool,
}

impl SyncConfig {
    /// Creates a configuration with defaults.
    ///
    /// The sync directory defaults to `<data_dir>/.sync`.
    pub fn new(remote_url: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            remote_url: remote_url.into(),
            sync_dir: data_dir.join(DEFAULT_SYNC_DIR),
            data_dir,
            actor_id: None,
            probe_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            conflict_policy: ConflictPolicy::default(),
            sync_on_save: true,
        }
    }

    /// Sets the sync directory.
    pub fn with_sync_dir(mut self, sync_dir: impl Into<PathBuf>) -> Self {
        self.sync_dir = sync_dir.into();
        self
    }

    /// Sets a fixed actor ID.
    pub fn with_actor_id(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    /// Sets the probe interval.
    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    /// Sets the probe timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the conflict policy.
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Enables or disables the immediate sync after a save.
    pub fn with_sync_on_save(mut self, enabled: bool) -> Self {
        self.sync_on_save = enabled;
        self
    }

    /// Checks the configuration for values the engine cannot work with.
    pub fn validate(&self) -> SyncResult<()> {
        let url = reqwest::Url::parse(self.remote_url.trim()).map_err(|err| {
            SyncError::InvalidConfig(format!("remote URL {:?} is invalid: {err}", self.remote_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SyncError::InvalidConfig(format!(
                "remote URL must use http or https, got {:?}",
                self.remote_url
            )));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(SyncError::InvalidConfig("remote URL has no host".into()));
        }

        for (name, value) in [
            ("probe_interval", self.probe_interval),
            ("probe_timeout", self.probe_timeout),
            ("request_timeout", self.request_timeout),
        ] {
            if value.is_zero() {
                return Err(SyncError::InvalidConfig(format!("{name} must be non-zero")));
            }
        }

        if self.retry.backoff_multiplier < 1.0 {
            return Err(SyncError::InvalidConfig(
                "backoff multiplier must be at least 1.0".into(),
            ));
        }
        if self.retry.max_delay < self.retry.initial_delay {
            return Err(SyncError::InvalidConfig(
                "max retry delay is shorter than the initial delay".into(),
            ));
        }

        Ok(())
    }
}

/// Configuration for retry behavior.
///
/// Failed changes are retried indefinitely; this only controls how long a
/// change waits between attempts.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration that retries on the very next pass.
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Calculates the delay after the given number of failed attempts.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base_delay =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Add up to 25% jitter
            let jitter = delay_secs * 0.25 * rand_jitter();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(300))
    }
}

/// Cheap pseudo-random jitter from the clock (no RNG dependency).
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("https://sync.example.com", "/tmp/data")
            .with_actor_id("device-1")
            .with_probe_interval(Duration::from_secs(10))
            .with_request_timeout(Duration::from_secs(60))
            .with_conflict_policy(ConflictPolicy::Manual)
            .with_sync_on_save(false);

        assert_eq!(config.remote_url, "https://sync.example.com");
        assert_eq!(config.sync_dir, PathBuf::from("/tmp/data/.sync"));
        assert_eq!(config.actor_id.as_deref(), Some("device-1"));
        assert_eq!(config.probe_interval, Duration::from_secs(10));
        assert_eq!(config.probe_timeout, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.conflict_policy, ConflictPolicy::Manual);
        assert!(!config.sync_on_save);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let base = SyncConfig::new("https://sync.example.com", "/tmp/data");

        let bad_scheme = SyncConfig {
            remote_url: "ftp://sync.example.com".into(),
            ..base.clone()
        };
        assert!(matches!(bad_scheme.validate(), Err(SyncError::InvalidConfig(_))));

        for url in [
            "http://sync.example.com:99999",
            "http://",
            "https://exa mple.com",
            "sync.example.com",
        ] {
            let bad_url = SyncConfig {
                remote_url: url.into(),
                ..base.clone()
            };
            assert!(
                matches!(bad_url.validate(), Err(SyncError::InvalidConfig(_))),
                "{url} should be rejected"
            );
        }

        let with_port = SyncConfig {
            remote_url: "http://localhost:8080/".into(),
            ..base.clone()
        };
        assert!(with_port.validate().is_ok());

        let zero_probe = base.clone().with_probe_timeout(Duration::ZERO);
        assert!(matches!(zero_probe.validate(), Err(SyncError::InvalidConfig(_))));

        let shrinking = base.with_retry(RetryConfig::default().with_backoff_multiplier(0.5));
        assert!(matches!(shrinking.validate(), Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(Duration::from_millis(100), Duration::from_secs(30));

        // No failures, no delay
        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        // Jitter makes exact values unpredictable, but we can check bounds
        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(125));

        let delay3 = config.delay_for_attempt(3);
        assert!(delay3 >= Duration::from_millis(400));
        assert!(delay3 <= Duration::from_millis(500));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(Duration::from_secs(1), Duration::from_secs(5))
            .with_backoff_multiplier(10.0)
            .with_jitter(false);

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn immediate_retry_has_no_delay() {
        let config = RetryConfig::immediate();
        assert_eq!(config.delay_for_attempt(7), Duration::ZERO);
    }
}
