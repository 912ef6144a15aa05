//! Retry configuration.

use crate::backoff::{BackoffPolicy, ExponentialBackoff, LinearJitterBackoff};
use crate::handler::{ErrorHandler, GiveUpHandler, PassthroughHandler};
use crate::hooks::{LoggingHooks, RequestHook, RequestModifier, ResponseHook};
use crate::metrics::Metrics;
use crate::policy::{DefaultRetryPolicy, NeverRetry, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default maximum number of retries.
pub const DEFAULT_MAX_RETRIES: u32 = 4;
/// Default minimum wait between attempts.
pub const DEFAULT_MIN_WAIT: Duration = Duration::from_secs(1);
/// Default maximum wait between attempts.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(30);

/// Configuration for retry behavior.
///
/// Immutable once handed to a client; clones share policies and hooks.
#[derive(Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Lower wait bound passed to the backoff policy.
    pub min_wait: Duration,
    /// Upper wait bound passed to the backoff policy.
    pub max_wait: Duration,
    pub(crate) retry_policy: Arc<dyn RetryPolicy>,
    pub(crate) backoff: Arc<dyn BackoffPolicy>,
    pub(crate) error_handler: Arc<dyn ErrorHandler>,
    pub(crate) request_hook: Option<Arc<dyn RequestHook>>,
    pub(crate) response_hook: Option<Arc<dyn ResponseHook>>,
    pub(crate) request_modifier: Option<Arc<dyn RequestModifier>>,
    pub(crate) metrics: Option<Arc<dyn Metrics>>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            min_wait: DEFAULT_MIN_WAIT,
            max_wait: DEFAULT_MAX_WAIT,
            retry_policy: Arc::new(DefaultRetryPolicy),
            backoff: Arc::new(ExponentialBackoff),
            error_handler: Arc::new(GiveUpHandler),
            request_hook: None,
            response_hook: None,
            request_modifier: None,
            metrics: None,
        }
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("min_wait", &self.min_wait)
            .field("max_wait", &self.max_wait)
            .field("request_hook", &self.request_hook.is_some())
            .field("response_hook", &self.response_hook.is_some())
            .field("request_modifier", &self.request_modifier.is_some())
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}

impl RetryConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config from deserialized settings.
    pub fn from_settings(settings: &RetrySettings) -> Self {
        let mut config = Self::new();
        if let Some(n) = settings.max_retries {
            config.max_retries = n;
        }
        if let Some(ms) = settings.min_wait_ms {
            config.min_wait = Duration::from_millis(ms);
        }
        if let Some(ms) = settings.max_wait_ms {
            config.max_wait = Duration::from_millis(ms);
        }
        match settings.backoff {
            BackoffKind::Exponential => config,
            BackoffKind::LinearJitter => config.linear_jitter(),
        }
    }

    /// Set max retries.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the minimum wait.
    pub fn min_wait(mut self, wait: Duration) -> Self {
        self.min_wait = wait;
        self
    }

    /// Set the maximum wait.
    pub fn max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = wait;
        self
    }

    /// Set both wait bounds.
    pub fn wait(self, min: Duration, max: Duration) -> Self {
        self.min_wait(min).max_wait(max)
    }

    /// Set the retry policy.
    pub fn retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry_policy = Arc::new(policy);
        self
    }

    /// Set the backoff policy.
    pub fn backoff(mut self, backoff: impl BackoffPolicy + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    /// Use linear backoff with jitter.
    pub fn linear_jitter(self) -> Self {
        self.backoff(LinearJitterBackoff::new())
    }

    /// Set the handler for exhausted retries.
    pub fn error_handler(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.error_handler = Arc::new(handler);
        self
    }

    /// Return the last response or error unchanged when retries run out.
    pub fn passthrough_errors(self) -> Self {
        self.error_handler(PassthroughHandler)
    }

    /// Set the hook run before each attempt.
    pub fn request_hook(mut self, hook: impl RequestHook + 'static) -> Self {
        self.request_hook = Some(Arc::new(hook));
        self
    }

    /// Set the hook run on each response.
    pub fn response_hook(mut self, hook: impl ResponseHook + 'static) -> Self {
        self.response_hook = Some(Arc::new(hook));
        self
    }

    /// Log every attempt and response through `tracing`.
    pub fn logging(self) -> Self {
        self.request_hook(LoggingHooks).response_hook(LoggingHooks)
    }

    /// Set the modifier applied to each request before its first attempt.
    pub fn request_modifier(mut self, modifier: impl RequestModifier + 'static) -> Self {
        self.request_modifier = Some(Arc::new(modifier));
        self
    }

    /// Record call metrics into `metrics`.
    pub fn metrics(mut self, metrics: impl Metrics + 'static) -> Self {
        self.metrics = Some(Arc::new(metrics));
        self
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self::new().max_retries(0).retry_policy(NeverRetry)
    }
}

/// Backoff strategy selectable from settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// [`ExponentialBackoff`].
    #[default]
    Exponential,
    /// [`LinearJitterBackoff`].
    LinearJitter,
}

/// Serializable retry settings.
///
/// Absent fields fall back to the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Maximum number of retries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Minimum wait in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_wait_ms: Option<u64>,
    /// Maximum wait in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_wait_ms: Option<u64>,
    /// Backoff strategy.
    pub backoff: BackoffKind,
}

impl RetrySettings {
    /// Parse settings from JSON.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.min_wait, Duration::from_secs(1));
        assert_eq!(config.max_wait, Duration::from_secs(30));
        assert!(config.request_hook.is_none());
        assert!(config.metrics.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = RetryConfig::new()
            .max_retries(2)
            .wait(Duration::from_millis(10), Duration::from_millis(50))
            .logging();

        assert_eq!(config.max_retries, 2);
        assert_eq!(config.min_wait, Duration::from_millis(10));
        assert_eq!(config.max_wait, Duration::from_millis(50));
        assert!(config.request_hook.is_some());
        assert!(config.response_hook.is_some());
    }

    #[test]
    fn test_zero_retries_is_kept() {
        assert_eq!(RetryConfig::new().max_retries(0).max_retries, 0);
        assert_eq!(RetryConfig::no_retry().max_retries, 0);
    }

    #[test]
    fn test_settings_from_json() {
        let settings =
            RetrySettings::from_json(r#"{"max_retries": 2, "min_wait_ms": 250, "backoff": "linear_jitter"}"#)
                .unwrap();
        assert_eq!(
            settings,
            RetrySettings {
                max_retries: Some(2),
                min_wait_ms: Some(250),
                max_wait_ms: None,
                backoff: BackoffKind::LinearJitter,
            }
        );

        let config = RetryConfig::from_settings(&settings);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.min_wait, Duration::from_millis(250));
        assert_eq!(config.max_wait, DEFAULT_MAX_WAIT);
    }

    #[test]
    fn test_empty_settings_use_defaults() {
        let settings = RetrySettings::from_json("{}").unwrap();
        let config = RetryConfig::from_settings(&settings);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.min_wait, DEFAULT_MIN_WAIT);
        assert_eq!(settings.backoff, BackoffKind::Exponential);
    }

    #[test]
    fn test_debug_hides_policies() {
        let debug = format!("{:?}", RetryConfig::new());
        assert!(debug.contains("max_retries: 4"));
    }
}
