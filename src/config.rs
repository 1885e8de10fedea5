use crate::core::{ClusterError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the consumer does with an action whose `apply` failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ActionFailurePolicy {
    /// Keep the action at the head of the queue and retry it once the member recovers.
    #[default]
    Retry,
    /// Drop the action; the member is still quarantined.
    Discard,
}

/// Cluster configuration
///
/// Controls quarantine escalation, retry pacing and the bounds used by
/// blocking waits. Durations are kept in milliseconds so the whole
/// configuration can round-trip through JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Cluster label used in diagnostics
    pub name: String,

    /// Consecutive quarantines (without reaching READY) that force DEAD
    pub quarantine_threshold: u32,

    /// Handling of a failed action
    #[serde(default)]
    pub failure_policy: ActionFailurePolicy,

    /// Pause before a quarantined member with pending work is retried
    pub quarantine_retry_delay_ms: u64,

    /// Upper bound a joining member waits for its source snapshot
    pub sync_timeout_ms: u64,

    /// Timeout used by `wait_until_synchronised(None)`; `None` waits indefinitely
    #[serde(default)]
    pub default_wait_timeout_ms: Option<u64>,
}

impl ClusterConfig {
    /// Create a configuration with defaults for the given cluster name
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            quarantine_threshold: 8,
            failure_policy: ActionFailurePolicy::Retry,
            quarantine_retry_delay_ms: 50,
            sync_timeout_ms: 30_000,
            default_wait_timeout_ms: None,
        }
    }

    /// Set the cluster name
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Set the quarantine threshold
    pub fn quarantine_threshold(mut self, threshold: u32) -> Self {
        self.quarantine_threshold = threshold;
        self
    }

    /// Set the failure policy
    pub fn failure_policy(mut self, policy: ActionFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Set the retry delay for quarantined members
    pub fn quarantine_retry_delay(mut self, delay: Duration) -> Self {
        self.quarantine_retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the join synchronisation timeout
    pub fn sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the default timeout for cluster-wide waits
    pub fn default_wait_timeout(mut self, timeout: Duration) -> Self {
        self.default_wait_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.quarantine_retry_delay_ms)
    }

    pub fn sync_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    pub fn default_wait_timeout_duration(&self) -> Option<Duration> {
        self.default_wait_timeout_ms.map(Duration::from_millis)
    }

    /// Parse a configuration from JSON
    ///
    /// # Examples
    ///
    /// ```
    /// # use dbcluster::ClusterConfig;
    /// let config = ClusterConfig::from_json(
    ///     r#"{"name":"orders","quarantine_threshold":3,"quarantine_retry_delay_ms":10,"sync_timeout_ms":1000}"#,
    /// ).unwrap();
    /// assert_eq!(config.quarantine_threshold, 3);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ClusterError::InvalidConfig(
                "cluster name cannot be empty".to_string(),
            ));
        }

        if self.quarantine_threshold == 0 {
            return Err(ClusterError::InvalidConfig(
                "quarantine_threshold must be > 0".to_string(),
            ));
        }

        if self.sync_timeout_ms == 0 {
            return Err(ClusterError::InvalidConfig(
                "sync_timeout_ms must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self::new("cluster")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClusterConfig::default();
        assert_eq!(config.name, "cluster");
        assert_eq!(config.quarantine_threshold, 8);
        assert_eq!(config.failure_policy, ActionFailurePolicy::Retry);
        assert!(config.default_wait_timeout_duration().is_none());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ClusterConfig::new("orders")
            .quarantine_threshold(3)
            .failure_policy(ActionFailurePolicy::Discard)
            .quarantine_retry_delay(Duration::from_millis(5))
            .sync_timeout(Duration::from_secs(2))
            .default_wait_timeout(Duration::from_millis(750));

        assert_eq!(config.name, "orders");
        assert_eq!(config.quarantine_threshold, 3);
        assert_eq!(config.failure_policy, ActionFailurePolicy::Discard);
        assert_eq!(config.retry_delay(), Duration::from_millis(5));
        assert_eq!(config.sync_timeout_duration(), Duration::from_secs(2));
        assert_eq!(
            config.default_wait_timeout_duration(),
            Some(Duration::from_millis(750))
        );
    }

    #[test]
    fn test_json_round_trip() {
        let config = ClusterConfig::new("billing").quarantine_threshold(4);
        let json = config.to_json().unwrap();
        assert_eq!(ClusterConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_from_json_defaults_optional_fields() {
        let config = ClusterConfig::from_json(
            r#"{"name":"a","quarantine_threshold":2,"quarantine_retry_delay_ms":1,"sync_timeout_ms":5}"#,
        )
        .unwrap();
        assert_eq!(config.failure_policy, ActionFailurePolicy::Retry);
        assert_eq!(config.default_wait_timeout_ms, None);
    }

    #[test]
    fn test_validate() {
        assert!(ClusterConfig::default().validate().is_ok());
        assert!(ClusterConfig::new("  ").validate().is_err());
        assert!(ClusterConfig::default().quarantine_threshold(0).validate().is_err());
        assert!(
            ClusterConfig::default()
                .sync_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(ClusterConfig::from_json("{not json").is_err());
    }
}
