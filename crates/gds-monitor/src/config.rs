//! Monitor configuration loading.

#![allow(missing_docs)]

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use smol_str::SmolStr;

use crate::error::MonitorError;
use crate::poll::PollSchedule;
use crate::remote::SubscriptionKind;

/// Publish interval handed to subscribe/resubscribe, in microseconds.
pub const DEFAULT_PUBLISH_INTERVAL_US: u64 = 100_000;

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub kind: SubscriptionKind,
    pub publish_interval_us: u64,
    pub poll: PollSchedule,
    pub log_level: SmolStr,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            kind: SubscriptionKind::DirectRead,
            publish_interval_us: DEFAULT_PUBLISH_INTERVAL_US,
            poll: PollSchedule::default(),
            log_level: SmolStr::new("info"),
        }
    }
}

impl MonitorConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            MonitorError::InvalidConfig(
                format!("{}: failed to read config: {err}", path.display()).into(),
            )
        })?;
        Self::from_toml_str(&text).map_err(|err| match err {
            MonitorError::InvalidConfig(message) => {
                MonitorError::InvalidConfig(format!("{}: {message}", path.display()).into())
            }
            other => other,
        })
    }

    pub fn load_optional(path: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, MonitorError> {
        let raw: MonitorToml = toml::from_str(text)
            .map_err(|err| MonitorError::InvalidConfig(err.to_string().into()))?;
        raw.into_config()
    }
}

/// Validates config text without building a manager.
pub fn validate_config_text(text: &str) -> Result<(), MonitorError> {
    MonitorConfig::from_toml_str(text).map(|_| ())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MonitorToml {
    subscription: Option<SubscriptionSection>,
    poll: Option<PollSection>,
    log: Option<LogSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SubscriptionSection {
    kind: Option<String>,
    publish_interval_us: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PollSection {
    initial_delay_ms: Option<u64>,
    interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LogSection {
    level: Option<String>,
}

impl MonitorToml {
    fn into_config(self) -> Result<MonitorConfig, MonitorError> {
        let defaults = MonitorConfig::default();
        let kind = match self.subscription.as_ref().and_then(|s| s.kind.as_deref()) {
            Some(text) => SubscriptionKind::parse(text).ok_or_else(|| {
                MonitorError::InvalidConfig(
                    format!("invalid subscription.kind '{text}'").into(),
                )
            })?,
            None => defaults.kind,
        };
        let publish_interval_us = self
            .subscription
            .as_ref()
            .and_then(|s| s.publish_interval_us)
            .unwrap_or(defaults.publish_interval_us);
        if publish_interval_us == 0 {
            return Err(MonitorError::InvalidConfig(
                "subscription.publish_interval_us must be >= 1".into(),
            ));
        }
        let initial_delay_ms = self.poll.as_ref().and_then(|p| p.initial_delay_ms);
        let interval_ms = self.poll.as_ref().and_then(|p| p.interval_ms);
        if interval_ms == Some(0) {
            return Err(MonitorError::InvalidConfig(
                "poll.interval_ms must be >= 1".into(),
            ));
        }
        let poll = PollSchedule {
            initial_delay: initial_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll.initial_delay),
            interval: interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll.interval),
        };
        let log_level = match self.log.and_then(|log| log.level) {
            Some(level) if level.trim().is_empty() => {
                return Err(MonitorError::InvalidConfig(
                    "log.level must not be empty".into(),
                ));
            }
            Some(level) => SmolStr::new(level.trim()),
            None => defaults.log_level,
        };
        Ok(MonitorConfig {
            kind,
            publish_interval_us,
            poll,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_toml() -> String {
        r#"
[subscription]
kind = "direct_read"
publish_interval_us = 100000

[poll]
initial_delay_ms = 50
interval_ms = 100

[log]
level = "info"
"#
        .to_string()
    }

    #[test]
    fn canonical_config_matches_defaults() {
        let config = MonitorConfig::from_toml_str(&config_toml()).expect("valid config");
        assert_eq!(config, MonitorConfig::default());
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = MonitorConfig::from_toml_str("").expect("empty config");
        assert_eq!(config.poll, PollSchedule::default());
        assert_eq!(config.publish_interval_us, DEFAULT_PUBLISH_INTERVAL_US);
    }

    #[test]
    fn config_rejects_unknown_keys() {
        let text = format!("{}\n[poll.extra]\nflag = true\n", config_toml());
        let err = validate_config_text(&text).expect_err("unknown key should fail");
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn config_rejects_zero_intervals() {
        let text = config_toml().replace("interval_ms = 100", "interval_ms = 0");
        let err = validate_config_text(&text).expect_err("zero interval should fail");
        assert!(err.to_string().contains("poll.interval_ms must be >= 1"));

        let text = config_toml().replace("publish_interval_us = 100000", "publish_interval_us = 0");
        let err = validate_config_text(&text).expect_err("zero publish interval should fail");
        assert!(err
            .to_string()
            .contains("subscription.publish_interval_us must be >= 1"));
    }

    #[test]
    fn config_parses_subscription_kind() {
        let text = config_toml().replace("direct_read", "high_performance");
        let config = MonitorConfig::from_toml_str(&text).expect("valid config");
        assert_eq!(config.kind, SubscriptionKind::HighPerformance);

        let text = config_toml().replace("direct_read", "bulk");
        let err = validate_config_text(&text).expect_err("bad kind should fail");
        assert!(err.to_string().contains("invalid subscription.kind 'bulk'"));
    }

    #[test]
    fn config_rejects_blank_log_level() {
        let text = config_toml().replace("level = \"info\"", "level = \"  \"");
        let err = validate_config_text(&text).expect_err("blank level should fail");
        assert!(err.to_string().contains("log.level must not be empty"));
    }
}
