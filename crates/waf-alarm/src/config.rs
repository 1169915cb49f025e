// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::consumer::DEFAULT_RETENTION_HOURS;
use crate::errors::ConfigError;
use crate::evaluator::{AlarmPolicy, DEFAULT_RECONCILE_THRESHOLD, DEFAULT_STREAM_THRESHOLD};
use crate::reconciler::DEFAULT_WINDOW_SECS;
use chrono::{FixedOffset, Offset, TimeDelta, Utc};
use std::env;
use std::time::Duration;

const DEFAULT_EVENT_TABLE: &str = "waf-alarm-events";
const DEFAULT_CLIENT_TABLE: &str = "waf-alarm-clients";
const DEFAULT_UTC_OFFSET: &str = "+08:00";
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 60;
const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 5;

/// Runtime configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Table holding one record per blocked request
    pub event_table: String,
    /// Table scanned for the client inventory
    pub client_table: String,
    /// Notification destination; alarms are only logged when unset
    pub topic: Option<String>,
    /// HTTPS proxy URL for the notifier
    pub https_proxy: Option<String>,
    pub policy: AlarmPolicy,
    /// Trailing window the reconciler evaluates
    pub window: TimeDelta,
    /// Time between reconciler sweeps
    pub reconcile_interval: Duration,
    /// Offset used for the human readable timestamp in alarms
    pub display_offset: FixedOffset,
    /// Added to the event time to produce the record's expiry marker
    pub retention: TimeDelta,
    pub publish_timeout: Duration,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            event_table: DEFAULT_EVENT_TABLE.to_string(),
            client_table: DEFAULT_CLIENT_TABLE.to_string(),
            topic: None,
            https_proxy: None,
            policy: AlarmPolicy::default(),
            window: TimeDelta::seconds(DEFAULT_WINDOW_SECS),
            reconcile_interval: Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS),
            display_offset: FixedOffset::east_opt(8 * 3600).unwrap_or(Utc.fix()),
            retention: TimeDelta::hours(DEFAULT_RETENTION_HOURS),
            publish_timeout: Duration::from_secs(DEFAULT_PUBLISH_TIMEOUT_SECS),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |key: &str| lookup(key).and_then(|val| val.trim().parse::<u64>().ok());

        let event_table = lookup("TABLENAME").unwrap_or_else(|| DEFAULT_EVENT_TABLE.to_string());
        let client_table =
            lookup("IPTABLENAME").unwrap_or_else(|| DEFAULT_CLIENT_TABLE.to_string());
        let topic = lookup("TOPIC").filter(|val| !val.trim().is_empty());
        let https_proxy = lookup("WAF_ALARM_PROXY_HTTPS").or_else(|| lookup("HTTPS_PROXY"));

        let stream_threshold = number("WAF_ALARM_STREAM_THRESHOLD")
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(DEFAULT_STREAM_THRESHOLD);
        let reconcile_threshold = number("WAF_ALARM_RECONCILE_THRESHOLD")
            .and_then(|v| usize::try_from(v).ok())
            .unwrap_or(DEFAULT_RECONCILE_THRESHOLD);
        let window_secs = number("WAF_ALARM_WINDOW_SECS")
            .and_then(|v| i64::try_from(v).ok())
            .unwrap_or(DEFAULT_WINDOW_SECS);
        let retention_hours = number("WAF_ALARM_EXPIRY_HOURS")
            .and_then(|v| i64::try_from(v).ok())
            .unwrap_or(DEFAULT_RETENTION_HOURS);
        let reconcile_interval = Duration::from_secs(
            number("WAF_ALARM_RECONCILE_INTERVAL_SECS").unwrap_or(DEFAULT_RECONCILE_INTERVAL_SECS),
        );
        let publish_timeout = Duration::from_secs(
            number("WAF_ALARM_PUBLISH_TIMEOUT_SECS").unwrap_or(DEFAULT_PUBLISH_TIMEOUT_SECS),
        );

        let offset = lookup("WAF_ALARM_UTC_OFFSET").unwrap_or_else(|| DEFAULT_UTC_OFFSET.to_string());
        let display_offset = parse_utc_offset(&offset)?;

        let log_level = lookup("WAF_ALARM_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|| "info".to_string());

        let config = Self {
            event_table,
            client_table,
            topic,
            https_proxy,
            policy: AlarmPolicy {
                stream_threshold,
                reconcile_threshold,
            },
            window: TimeDelta::try_seconds(window_secs).unwrap_or(TimeDelta::zero()),
            reconcile_interval,
            display_offset,
            retention: TimeDelta::try_hours(retention_hours).unwrap_or(TimeDelta::zero()),
            publish_timeout,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_table.trim().is_empty() {
            return Err(ConfigError::Invalid("TABLENAME cannot be empty".to_string()));
        }
        if self.client_table.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "IPTABLENAME cannot be empty".to_string(),
            ));
        }

        if let Some(topic) = &self.topic {
            if !(topic.starts_with("http://") || topic.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "TOPIC must be an http(s) URL, got '{topic}'"
                )));
            }
        }

        if self.policy.stream_threshold == 0 || self.policy.reconcile_threshold == 0 {
            return Err(ConfigError::Invalid(
                "Alarm thresholds must be at least 1".to_string(),
            ));
        }
        if self.window <= TimeDelta::zero() {
            return Err(ConfigError::Invalid(
                "Reconcile window must be greater than 0".to_string(),
            ));
        }
        if self.reconcile_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "Reconcile interval must be greater than 0".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }
}

/// Parses `+08:00`, `-05:30` or `Z`.
pub fn parse_utc_offset(value: &str) -> Result<FixedOffset, ConfigError> {
    let invalid = || ConfigError::Invalid(format!("Invalid UTC offset '{value}'"));
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") {
        return Ok(Utc.fix());
    }

    let (sign, rest) = if let Some(rest) = value.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = value.strip_prefix('-') {
        (-1, rest)
    } else {
        return Err(invalid());
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
    let hours: u8 = hours.parse().map_err(|_| invalid())?;
    let minutes: u8 = minutes.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }
    let seconds = i32::from(hours) * 3600 + i32::from(minutes) * 60;
    FixedOffset::east_opt(sign * seconds).ok_or_else(invalid)
}
