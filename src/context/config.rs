//! Client configuration loaded from JSON or environment variables.

use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::retry::{RetryPolicy, duration_from_millis};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// `declarest/<version>`.
pub fn default_user_agent() -> String {
    format!("declarest/{}", env!("CARGO_PKG_VERSION"))
}

/// Per-client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub default_headers: BTreeMap<String, String>,
    /// Bearer token sent when an operation declares no authorization.
    pub token: Option<String>,
    pub retry: Option<RetryConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: default_user_agent(),
            default_headers: BTreeMap::new(),
            token: None,
            retry: None,
        }
    }
}

impl ClientConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to parse client configuration")
    }

    /// Reads `{PREFIX}_BASE_URL`, `{PREFIX}_TOKEN`, `{PREFIX}_TIMEOUT_SECS`
    /// and `{PREFIX}_USER_AGENT` from the process environment.
    pub fn from_env(prefix: &str) -> Result<Self> {
        Self::from_lookup(prefix, |key| env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable lookup.
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}_{}", prefix, name));
        let mut config = Self::default();

        config.base_url = var("BASE_URL");
        config.token = var("TOKEN").filter(|t| !t.is_empty());
        if let Some(timeout) = var("TIMEOUT_SECS") {
            config.timeout_secs = timeout
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}_TIMEOUT_SECS: {}", prefix, timeout))?;
        }
        if let Some(user_agent) = var("USER_AGENT") {
            config.user_agent = user_agent;
        }
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Builds the configured retry policy, if any.
    pub fn retry_policy(&self) -> Result<Option<RetryPolicy>, PolicyError> {
        self.retry.as_ref().map(RetryConfig::to_policy).transpose()
    }
}

/// Retry settings in untyped form. Durations are signed milliseconds so that
/// negative values can be reported instead of silently wrapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub retry_limit: u32,
    pub initial_wait_ms: i64,
    pub max_wait_ms: i64,
    pub min_wait_ms: i64,
    pub wait_increment_ms: i64,
    pub double_wait_on_retry: bool,
    /// Jitter spread; `None` disables jitter.
    pub wait_variance_ms: Option<i64>,
    pub randomize_initial_wait: bool,
    pub status_codes: Vec<u16>,
    pub retry_transport_errors: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            initial_wait_ms: 100,
            max_wait_ms: 30_000,
            min_wait_ms: 0,
            wait_increment_ms: 0,
            double_wait_on_retry: false,
            wait_variance_ms: None,
            randomize_initial_wait: false,
            status_codes: Vec::new(),
            retry_transport_errors: true,
        }
    }
}

impl RetryConfig {
    /// Validates the settings and builds the policy.
    pub fn to_policy(&self) -> Result<RetryPolicy, PolicyError> {
        let mut builder = RetryPolicy::builder()
            .retry_limit(self.retry_limit)
            .initial_wait(duration_from_millis("initial_wait_ms", self.initial_wait_ms)?)
            .max_wait(duration_from_millis("max_wait_ms", self.max_wait_ms)?)
            .min_wait(duration_from_millis("min_wait_ms", self.min_wait_ms)?)
            .wait_increment(duration_from_millis(
                "wait_increment_ms",
                self.wait_increment_ms,
            )?)
            .double_wait_on_retry(self.double_wait_on_retry)
            .randomize_initial_wait(self.randomize_initial_wait);

        if let Some(variance) = self.wait_variance_ms {
            builder = builder.vary_wait(duration_from_millis("wait_variance_ms", variance)?);
        }
        if !self.status_codes.is_empty() {
            builder = builder.retry_on_status(self.status_codes.clone());
        }
        if self.retry_transport_errors {
            builder = builder.retry_on_transport_errors();
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_from_json_with_retry_section() {
        let config = ClientConfig::from_json(
            r#"{
                "base_url": "https://api.example.com/",
                "timeout_secs": 5,
                "default_headers": {"Accept": "application/json"},
                "retry": {"retry_limit": 3, "initial_wait_ms": 100, "double_wait_on_retry": true, "status_codes": [503]}
            }"#,
        )
        .unwrap();

        assert_eq!(config.base_url.as_deref(), Some("https://api.example.com/"));
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.user_agent, default_user_agent());
        assert_eq!(
            config.default_headers.get("Accept").map(String::as_str),
            Some("application/json")
        );

        let policy = config.retry_policy().unwrap().unwrap();
        assert_eq!(policy.retry_limit(), 3);
        assert!(policy.has_result_predicates());
        let waits: Vec<_> = policy.wait_schedule().take(3).collect();
        assert_eq!(
            waits,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400)
            ]
        );
    }

    #[test]
    fn test_negative_wait_rejected() {
        let config = RetryConfig {
            initial_wait_ms: -5,
            ..RetryConfig::default()
        };
        assert_eq!(
            config.to_policy().unwrap_err(),
            PolicyError::NegativeDuration {
                field: "initial_wait_ms",
                millis: -5
            }
        );

        let config = RetryConfig {
            wait_variance_ms: Some(-1),
            ..RetryConfig::default()
        };
        assert!(config.to_policy().is_err());
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("WIDGETS_BASE_URL", "http://localhost"),
            ("WIDGETS_TOKEN", "secret"),
            ("WIDGETS_TIMEOUT_SECS", "12"),
        ]
        .into_iter()
        .collect();

        let config =
            ClientConfig::from_lookup("WIDGETS", |k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.base_url.as_deref(), Some("http://localhost"));
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.timeout_secs, 12);
        assert_eq!(config.user_agent, default_user_agent());
        assert!(config.retry_policy().unwrap().is_none());
    }

    #[test]
    fn test_from_lookup_rejects_bad_timeout() {
        let result = ClientConfig::from_lookup("X", |k| {
            (k == "X_TIMEOUT_SECS").then(|| "soon".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_from_env() {
        unsafe {
            env::set_var("DECLAREST_CFG_TEST_BASE_URL", "http://env.example");
        }
        let config = ClientConfig::from_env("DECLAREST_CFG_TEST").unwrap();
        assert_eq!(config.base_url.as_deref(), Some("http://env.example"));
        assert_eq!(config.token, None);
        unsafe {
            env::remove_var("DECLAREST_CFG_TEST_BASE_URL");
        }
    }
}
