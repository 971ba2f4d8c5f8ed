use crate::error::{IndexError, Result};
use config::{Config, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Namespace used when the caller does not name one
pub const DEFAULT_NAMESPACE: &str = "horizon-index";

/// Prefix for every environment variable read by [`StoreConfig::from_env`]
pub const ENV_PREFIX: &str = "INDEX_STORE";

/// Bounded retry policy for failed batch writes
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetryPolicy {
    /// Requeues allowed per batch after its first attempt
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff_base_ms: 50,
            backoff_max_ms: 2000,
        }
    }
}

impl RetryPolicy {
    /// Policy that retries immediately, mostly useful in tests
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff_base_ms: 0,
            backoff_max_ms: 0,
        }
    }

    /// Total attempts a batch may make, counting the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before requeueing a batch whose `attempt`-th write just failed
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self
            .backoff_base_ms
            .saturating_mul(1_u64 << exponent)
            .min(self.backoff_max_ms);
        Duration::from_millis(delay)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoreConfig {
    pub namespace: String,
    pub parallelism: usize,
    pub retry: RetryPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            parallelism: 8,
            retry: RetryPolicy::default(),
        }
    }
}

impl StoreConfig {
    pub fn with_parallelism(parallelism: usize) -> Self {
        Self {
            parallelism,
            ..Self::default()
        }
    }

    /// Load configuration from `INDEX_STORE_*` variables over the defaults.
    ///
    /// Nested retry settings use a double underscore, e.g.
    /// `INDEX_STORE_RETRY__MAX_RETRIES=3`.
    pub fn from_env() -> Result<Self> {
        Self::from_environment(Self::environment())
    }

    /// Load configuration from an explicit environment source
    pub fn from_environment(environment: Environment) -> Result<Self> {
        let defaults = Self::default();

        let settings = Config::builder()
            .set_default("namespace", defaults.namespace.as_str())?
            .set_default("parallelism", defaults.parallelism as i64)?
            .set_default("retry.max_retries", i64::from(defaults.retry.max_retries))?
            .set_default("retry.backoff_base_ms", defaults.retry.backoff_base_ms as i64)?
            .set_default("retry.backoff_max_ms", defaults.retry.backoff_max_ms as i64)?
            .add_source(environment)
            .build()?;

        let config: StoreConfig = settings.try_deserialize()?;
        config.validate()?;

        debug!(
            "Index store configuration loaded: {}",
            serde_json::to_string(&config).unwrap_or_else(|_| "[serialization error]".to_string())
        );

        Ok(config)
    }

    /// Environment source for the `INDEX_STORE` prefix
    pub fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    pub fn validate(&self) -> Result<()> {
        if self.parallelism == 0 {
            return Err(IndexError::configuration("parallelism must be at least 1"));
        }
        if self.namespace.trim().is_empty() {
            return Err(IndexError::configuration("namespace must not be empty"));
        }
        if self.retry.backoff_base_ms > self.retry.backoff_max_ms {
            return Err(IndexError::configuration(format!(
                "backoff_base_ms ({}) exceeds backoff_max_ms ({})",
                self.retry.backoff_base_ms, self.retry.backoff_max_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> Environment {
        let source: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        StoreConfig::environment().source(Some(source))
    }

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.namespace, "horizon-index");
        assert_eq!(config.parallelism, 8);
        assert_eq!(config.retry.max_retries, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_empty_environment_uses_defaults() {
        let config = StoreConfig::from_environment(env_from(&[])).unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn test_environment_overrides() {
        let config = StoreConfig::from_environment(env_from(&[
            ("INDEX_STORE_NAMESPACE", "ledger-indexes"),
            ("INDEX_STORE_PARALLELISM", "32"),
            ("INDEX_STORE_RETRY__MAX_RETRIES", "3"),
        ]))
        .unwrap();

        assert_eq!(config.namespace, "ledger-indexes");
        assert_eq!(config.parallelism, 32);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.backoff_base_ms, 50);
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let result = StoreConfig::from_environment(env_from(&[("INDEX_STORE_PARALLELISM", "0")]));
        assert!(matches!(result, Err(IndexError::Configuration { .. })));
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_retries: 5,
            backoff_base_ms: 100,
            backoff_max_ms: 500,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for(40), Duration::from_millis(500));
        assert_eq!(policy.max_attempts(), 6);
    }
}
