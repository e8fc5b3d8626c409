//! Mailman Configuration
//!
//! Settings are read from an optional TOML file and then overridden by
//! `MAILMAN__*` environment variables (`MAILMAN__DISPATCHER__IDLE_WAIT_MS=50`).
//! Every key has a default, so an empty file is a valid configuration.
//!
//! ```toml
//! default_route = "local"
//! log_level = "info"
//!
//! [dispatcher]
//! idle_wait_ms = 100
//!
//! [correlation]
//! poll_interval_ms = 1000
//! default_timeout_ms = 5000
//! ```

use crate::error::{MailmanError, Result};
use crate::message::ActorId;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Route used when a message or filter does not name one
pub const DEFAULT_ROUTE: &str = "local";

/// Process-wide messaging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailmanConfig {
    pub default_route: String,
    pub log_level: String,
    pub dispatcher: DispatcherConfig,
    pub correlation: CorrelationConfig,
}

/// Dispatcher loop settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Longest an idle dispatcher blocks on its mailbox before re-polling
    pub idle_wait_ms: u64,
}

/// Request/reply settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Upper bound of one dequeue attempt while waiting for a reply
    pub poll_interval_ms: u64,
    /// Timeout used when a wait does not give its own
    pub default_timeout_ms: u64,
}

impl Default for MailmanConfig {
    fn default() -> Self {
        Self {
            default_route: DEFAULT_ROUTE.to_string(),
            log_level: "info".to_string(),
            dispatcher: DispatcherConfig::default(),
            correlation: CorrelationConfig::default(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { idle_wait_ms: 100 }
    }
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            default_timeout_ms: 5000,
        }
    }
}

impl DispatcherConfig {
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    /// A zero idle wait would turn the dispatch loop into a busy spin
    pub fn validate(&self) -> Result<()> {
        if self.idle_wait_ms == 0 {
            return Err(MailmanError::config("dispatcher.idle_wait_ms must be positive"));
        }
        Ok(())
    }
}

impl CorrelationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(MailmanError::config(
                "correlation.poll_interval_ms must be positive",
            ));
        }
        if self.default_timeout_ms == 0 {
            return Err(MailmanError::config(
                "correlation.default_timeout_ms must be positive",
            ));
        }
        Ok(())
    }
}

/// Whole milliseconds, rounded up so a non-zero duration never becomes 0
fn millis_ceil(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

impl MailmanConfig {
    /// Load from `path` (if given) with environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading mailman config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("MAILMAN")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse an inline TOML document
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| MailmanError::config(format!("Failed to serialize config: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_route.is_empty() {
            return Err(MailmanError::config("default_route must not be empty"));
        }
        self.dispatcher.validate()?;
        self.correlation.validate()
    }

    /// Per-actor settings derived from this configuration
    pub fn actor(&self, name: impl Into<ActorId>) -> ActorConfig {
        ActorConfig {
            name: name.into(),
            default_route: self.default_route.clone(),
            dispatcher: self.dispatcher.clone(),
            correlation: self.correlation.clone(),
        }
    }
}

/// Settings fixed at actor creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorConfig {
    pub name: ActorId,
    pub default_route: String,
    pub dispatcher: DispatcherConfig,
    pub correlation: CorrelationConfig,
}

impl ActorConfig {
    /// Defaults for everything but the name
    pub fn new(name: impl Into<ActorId>) -> Self {
        MailmanConfig::default().actor(name)
    }

    pub fn with_idle_wait(mut self, idle_wait: Duration) -> Self {
        self.dispatcher.idle_wait_ms = millis_ceil(idle_wait);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.correlation.poll_interval_ms = millis_ceil(poll_interval);
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.correlation.default_timeout_ms = millis_ceil(timeout);
        self
    }

    /// Checked by [`crate::ActorContext::open`]
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(MailmanError::config("actor name must not be empty"));
        }
        if self.default_route.is_empty() {
            return Err(MailmanError::config("default_route must not be empty"));
        }
        self.dispatcher.validate()?;
        self.correlation.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = MailmanConfig::default();
        assert_eq!(config.default_route, "local");
        assert_eq!(config.dispatcher.idle_wait(), Duration::from_millis(100));
        assert_eq!(config.correlation.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.correlation.default_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = MailmanConfig::from_toml_str(
            r#"
            default_route = "mqtt"

            [correlation]
            poll_interval_ms = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.default_route, "mqtt");
        assert_eq!(config.correlation.poll_interval_ms, 50);
        assert_eq!(config.correlation.default_timeout_ms, 5000);
        assert_eq!(config.dispatcher.idle_wait_ms, 100);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = MailmanConfig::from_toml_str("default_route = \"\"").unwrap_err();
        assert!(matches!(err, MailmanError::Config { .. }));

        let err = MailmanConfig::from_toml_str("[dispatcher]\nidle_wait_ms = 0").unwrap_err();
        assert!(err.to_string().contains("idle_wait_ms"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "log_level = \"debug\"\n[dispatcher]\nidle_wait_ms = 25").unwrap();

        let config = MailmanConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.dispatcher.idle_wait_ms, 25);
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = MailmanConfig::load(Some(Path::new("/nonexistent/mailman.toml")));
        assert!(matches!(result, Err(MailmanError::Configuration(_))));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = MailmanConfig::default();
        let text = config.to_toml_string().unwrap();
        assert_eq!(MailmanConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_sub_millisecond_durations_round_up() {
        let actor = ActorConfig::new("a")
            .with_idle_wait(Duration::from_micros(1))
            .with_poll_interval(Duration::from_micros(500))
            .with_default_timeout(Duration::from_micros(1500));

        assert_eq!(actor.dispatcher.idle_wait_ms, 1);
        assert_eq!(actor.correlation.poll_interval_ms, 1);
        assert_eq!(actor.correlation.default_timeout_ms, 2);
        assert!(actor.validate().is_ok());

        let exact = ActorConfig::new("a").with_poll_interval(Duration::from_millis(10));
        assert_eq!(exact.correlation.poll_interval_ms, 10);
    }

    #[test]
    fn test_actor_config_rejects_zero_durations() {
        let zero_poll = ActorConfig::new("a").with_poll_interval(Duration::ZERO);
        let err = zero_poll.validate().unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms"));

        let zero_idle = ActorConfig::new("a").with_idle_wait(Duration::ZERO);
        assert!(matches!(zero_idle.validate(), Err(MailmanError::Config { .. })));

        let unnamed = ActorConfig::new("");
        assert!(unnamed.validate().is_err());
    }

    #[test]
    fn test_actor_config_inherits_settings() {
        let mut config = MailmanConfig::default();
        config.default_route = "unix".to_string();

        let actor = config.actor("worker").with_poll_interval(Duration::from_millis(10));
        assert_eq!(actor.name.as_str(), "worker");
        assert_eq!(actor.default_route, "unix");
        assert_eq!(actor.correlation.poll_interval_ms, 10);
    }
}
