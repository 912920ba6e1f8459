//! Per-entity-type sync configuration.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Network condition a job needs before it may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkRequirement {
    /// Run regardless of connectivity.
    None,
    /// Any working connection.
    Connected,
    /// Wi-Fi or another unmetered link.
    Unmetered,
}

impl Default for NetworkRequirement {
    fn default() -> Self {
        NetworkRequirement::Connected
    }
}

/// Retry and classification policy for one entity type.
///
/// Created once per entity type and shared read-only between jobs.
/// `non_retryable_codes` and `conflict_codes` must not overlap; call
/// [`SyncConfig::validate`] (the runner does so on registration).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Business entity type (e.g. "Sale").
    pub entity_type: String,
    /// Prefix of unique job keys.
    pub worker_name_prefix: String,
    /// Network constraint for jobs of this type.
    pub network_requirement: NetworkRequirement,
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_retry_delay: Duration,
    /// Upper bound for any retry delay.
    pub max_retry_delay: Duration,
    /// Whether requests carry file attachments (multipart).
    pub has_attachments: bool,
    /// HTTP codes that end a job with a permanent error.
    pub non_retryable_codes: BTreeSet<u16>,
    /// HTTP codes that signal a business conflict.
    pub conflict_codes: BTreeSet<u16>,
    /// Whether attempt transitions are logged locally.
    pub logging_enabled: bool,
    /// Tag attached to local log events.
    pub log_tag: String,
}

impl SyncConfig {
    /// Creates a configuration with defaults derived from the entity type.
    pub fn new(entity_type: impl Into<String>) -> Self {
        let entity_type = entity_type.into();
        Self {
            worker_name_prefix: format!("sync_{}", entity_type.to_lowercase()),
            log_tag: format!("SYNC_{}", entity_type.to_uppercase()),
            entity_type,
            network_requirement: NetworkRequirement::Connected,
            max_retries: 3,
            initial_retry_delay: Duration::from_secs(30),
            max_retry_delay: Duration::from_secs(15 * 60),
            has_attachments: false,
            non_retryable_codes: [400, 401, 403, 404, 422].into_iter().collect(),
            conflict_codes: [409].into_iter().collect(),
            logging_enabled: true,
        }
    }

    /// Sets the job key prefix.
    pub fn with_worker_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.worker_name_prefix = prefix.into();
        self
    }

    /// Sets the network requirement.
    pub fn with_network_requirement(mut self, requirement: NetworkRequirement) -> Self {
        self.network_requirement = requirement;
        self
    }

    /// Sets the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the initial and maximum retry delays.
    pub fn with_retry_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_retry_delay = initial;
        self.max_retry_delay = max;
        self
    }

    /// Marks requests as carrying attachments.
    pub fn with_attachments(mut self, has_attachments: bool) -> Self {
        self.has_attachments = has_attachments;
        self
    }

    /// Replaces the non-retryable status codes.
    pub fn with_non_retryable_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.non_retryable_codes = codes.into_iter().collect();
        self
    }

    /// Replaces the conflict status codes.
    pub fn with_conflict_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.conflict_codes = codes.into_iter().collect();
        self
    }

    /// Enables or disables local logging.
    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.logging_enabled = enabled;
        self
    }

    /// Sets the log tag.
    pub fn with_log_tag(mut self, tag: impl Into<String>) -> Self {
        self.log_tag = tag.into();
        self
    }

    /// Checks the configuration invariants.
    pub fn validate(&self) -> SyncResult<()> {
        let invalid = |message: String| SyncError::InvalidConfig {
            entity_type: self.entity_type.clone(),
            message,
        };

        if self.entity_type.trim().is_empty() {
            return Err(invalid("entity type is empty".into()));
        }
        if self.worker_name_prefix.trim().is_empty() {
            return Err(invalid("worker name prefix is empty".into()));
        }
        if let Some(code) = self
            .non_retryable_codes
            .intersection(&self.conflict_codes)
            .next()
        {
            return Err(invalid(format!(
                "code {code} is both conflict and non-retryable"
            )));
        }
        if self.initial_retry_delay > self.max_retry_delay {
            return Err(invalid("initial retry delay exceeds max retry delay".into()));
        }
        Ok(())
    }

    /// Returns the unique job key for an entity. Surrounding whitespace
    /// in the ID is ignored.
    pub fn job_key(&self, entity_id: &str) -> String {
        format!("{}_{}", self.worker_name_prefix, entity_id.trim())
    }

    /// Returns the backoff policy of this configuration.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.initial_retry_delay, self.max_retry_delay)
    }
}

/// Exponential backoff: `min(max_delay, initial_delay * 2^attempt)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backoff {
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound.
    pub max_delay: Duration,
}

impl Backoff {
    /// Creates a backoff policy.
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
        }
    }

    /// Calculates the delay after the failed attempt `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // 2^31 already overflows any sane initial delay; clamp the shift.
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_entity_type() {
        let config = SyncConfig::new("Sale");
        assert_eq!(config.worker_name_prefix, "sync_sale");
        assert_eq!(config.log_tag, "SYNC_SALE");
        assert_eq!(config.network_requirement, NetworkRequirement::Connected);
        assert_eq!(config.max_retries, 3);
        assert!(config.conflict_codes.contains(&409));
        assert!(config.non_retryable_codes.contains(&422));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn job_key_format() {
        let config = SyncConfig::new("Payment");
        assert_eq!(config.job_key("p-42"), "sync_payment_p-42");

        let config = config.with_worker_name_prefix("pay");
        assert_eq!(config.job_key("p-42"), "pay_p-42");
        assert_eq!(config.job_key(" p-42\t"), "pay_p-42");
    }

    #[test]
    fn overlapping_codes_rejected() {
        let config = SyncConfig::new("Transfer")
            .with_conflict_codes([409, 422])
            .with_non_retryable_codes([400, 422]);

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("422"));
    }

    #[test]
    fn inverted_delays_rejected() {
        let config = SyncConfig::new("Sale")
            .with_retry_delays(Duration::from_secs(60), Duration::from_secs(10));
        assert!(config.validate().is_err());
    }

    #[test]
    fn backoff_doubles_until_max() {
        let backoff = Backoff::new(Duration::from_secs(10), Duration::from_secs(60));

        assert_eq!(backoff.delay_for_attempt(0), Duration::from_secs(10));
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_secs(20));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_secs(40));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_secs(60));
        assert_eq!(backoff.delay_for_attempt(40), Duration::from_secs(60));
    }

    #[test]
    fn backoff_huge_attempt_does_not_overflow() {
        let backoff = Backoff::new(Duration::from_secs(3600), Duration::from_secs(7200));
        assert_eq!(backoff.delay_for_attempt(u32::MAX), Duration::from_secs(7200));
    }
}
