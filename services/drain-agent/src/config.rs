//! Configuration for the drain agent.

use std::time::Duration;

use anyhow::Result;

/// Default tag prefix of service-owned workloads.
pub const DEFAULT_MANAGED_GROUP_PREFIX: &str = "service:";

/// Default reason attached to forced stops.
pub const DEFAULT_STOP_REASON: &str = "Drain container instance";

/// Default subject of resubmitted triggers.
pub const DEFAULT_RESUBMIT_SUBJECT: &str = "Resubmitting lifecycle hook to re-check drain";

/// Drain agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Region used to derive default endpoints.
    pub region: String,

    /// Cluster manager (ECS) endpoint.
    pub ecs_endpoint: String,

    /// Fleet manager (Auto Scaling) endpoint.
    pub autoscaling_endpoint: String,

    /// Resubmission channel (SNS) endpoint.
    pub sns_endpoint: String,

    /// Per-request HTTP timeout in seconds.
    pub http_timeout_secs: u64,

    /// Owning-group prefix that marks a workload as service-owned.
    pub managed_group_prefix: String,

    /// Reason attached to forced stops.
    pub stop_reason: String,

    /// Subject of resubmitted triggers.
    pub resubmit_subject: String,

    /// Pause before resubmitting, in milliseconds.
    pub resubmit_delay_ms: u64,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Defaults for a region, with endpoints derived from it.
    pub fn for_region(region: impl Into<String>) -> Self {
        let region = region.into();
        Self {
            ecs_endpoint: format!("https://ecs.{region}.amazonaws.com/"),
            autoscaling_endpoint: format!("https://autoscaling.{region}.amazonaws.com/"),
            sns_endpoint: format!("https://sns.{region}.amazonaws.com/"),
            region,
            http_timeout_secs: 30,
            managed_group_prefix: DEFAULT_MANAGED_GROUP_PREFIX.to_string(),
            stop_reason: DEFAULT_STOP_REASON.to_string(),
            resubmit_subject: DEFAULT_RESUBMIT_SUBJECT.to_string(),
            resubmit_delay_ms: 1000,
            log_level: "info".to_string(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let region = std::env::var("NODEEVAC_REGION")
            .or_else(|_| std::env::var("AWS_REGION"))
            .unwrap_or_else(|_| "us-east-1".to_string());

        let mut config = Self::for_region(region);

        if let Ok(endpoint) = std::env::var("NODEEVAC_ECS_ENDPOINT") {
            config.ecs_endpoint = endpoint;
        }
        if let Ok(endpoint) = std::env::var("NODEEVAC_AUTOSCALING_ENDPOINT") {
            config.autoscaling_endpoint = endpoint;
        }
        if let Ok(endpoint) = std::env::var("NODEEVAC_SNS_ENDPOINT") {
            config.sns_endpoint = endpoint;
        }

        if let Some(secs) = std::env::var("NODEEVAC_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.http_timeout_secs = secs;
        }

        if let Ok(prefix) = std::env::var("NODEEVAC_MANAGED_GROUP_PREFIX") {
            config.managed_group_prefix = prefix;
        }
        if let Ok(reason) = std::env::var("NODEEVAC_STOP_REASON") {
            config.stop_reason = reason;
        }
        if let Ok(subject) = std::env::var("NODEEVAC_RESUBMIT_SUBJECT") {
            config.resubmit_subject = subject;
        }

        if let Some(delay) = std::env::var("NODEEVAC_RESUBMIT_DELAY_MS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.resubmit_delay_ms = delay;
        }

        if let Ok(level) = std::env::var("NODEEVAC_LOG_LEVEL") {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make every invocation fail or misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.http_timeout_secs == 0 {
            anyhow::bail!("NODEEVAC_HTTP_TIMEOUT_SECS must be greater than zero");
        }
        if self.managed_group_prefix.is_empty() {
            anyhow::bail!("NODEEVAC_MANAGED_GROUP_PREFIX must not be empty");
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn resubmit_delay(&self) -> Duration {
        Duration::from_millis(self.resubmit_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_defaults() {
        let config = Config::for_region("eu-west-1");
        assert_eq!(config.ecs_endpoint, "https://ecs.eu-west-1.amazonaws.com/");
        assert_eq!(
            config.autoscaling_endpoint,
            "https://autoscaling.eu-west-1.amazonaws.com/"
        );
        assert_eq!(config.sns_endpoint, "https://sns.eu-west-1.amazonaws.com/");
        assert_eq!(config.managed_group_prefix, "service:");
        assert_eq!(config.resubmit_delay(), Duration::from_secs(1));
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::for_region("us-east-1");
        assert!(config.validate().is_ok());

        config.http_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("NODEEVAC_HTTP_TIMEOUT_SECS"));
    }

    #[test]
    fn test_validate_rejects_empty_prefix() {
        let mut config = Config::for_region("us-east-1");
        config.managed_group_prefix = String::new();
        assert!(config.validate().is_err());
    }
}
