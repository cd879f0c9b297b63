// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! YAML configuration for the InfluxDB output.

use crate::coerce::{Coercion, PrefixTable, ValueType};
use crate::influx::SeriesGrouping;
use crate::template::TemplateError;
use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// InfluxDB connection settings.
    pub influxdb: InfluxDbConfig,

    /// Destination series name (template).
    #[serde(default = "default_series")]
    pub series: String,

    /// Output field name to template expression, in column order.
    #[serde(default)]
    pub data_points: FieldTemplates,

    /// Event field holding a nested mapping of extra data points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_data_points_key: Option<String>,

    /// Field name prefixes per coerced type.
    #[serde(default)]
    pub data_points_type_prefixes: PrefixTable,

    /// Explicit per-field types, checked before the prefix table.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub coerce_values: HashMap<String, ValueType>,

    /// Let a `time` data point replace the event timestamp.
    #[serde(default)]
    pub allow_time_override: bool,

    /// How a flush is split into series objects.
    #[serde(default)]
    pub series_grouping: SeriesGrouping,

    /// Batching thresholds.
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Delivery retry settings.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_series() -> String {
    "logstash".to_string()
}

impl SinkConfig {
    /// Create a configuration for a host and series with defaults elsewhere.
    pub fn new(host: impl Into<String>, series: impl Into<String>) -> Self {
        Self {
            influxdb: InfluxDbConfig::new(host),
            series: series.into(),
            data_points: FieldTemplates::default(),
            event_data_points_key: None,
            data_points_type_prefixes: PrefixTable::default(),
            coerce_values: HashMap::new(),
            allow_time_override: false,
            series_grouping: SeriesGrouping::default(),
            buffer: BufferConfig::default(),
            retry: RetryConfig::default(),
        }
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: SinkConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Serialize back to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.influxdb.host.is_empty() {
            return Err(ConfigError::Invalid("influxdb.host is empty".into()));
        }
        if self.influxdb.db.is_empty() {
            return Err(ConfigError::Invalid("influxdb.db is empty".into()));
        }
        if self.series.is_empty() {
            return Err(ConfigError::Invalid("series is empty".into()));
        }
        if self.data_points.is_empty() {
            return Err(ConfigError::Invalid("No data_points configured".into()));
        }
        if self.data_points.iter().any(|(name, _)| name.is_empty()) {
            return Err(ConfigError::Invalid("data_points has an empty field name".into()));
        }
        if self.data_points_type_prefixes.prefixes().any(str::is_empty) {
            return Err(ConfigError::Invalid(
                "data_points_type_prefixes has an empty prefix".into(),
            ));
        }
        if self.buffer.max_items == 0 {
            return Err(ConfigError::Invalid("buffer.max_items must be at least 1".into()));
        }
        if self.buffer.max_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "buffer.max_interval_ms must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == Some(0) {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1 (null for unbounded retry)".into(),
            ));
        }
        if self.retry.attempt_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "retry.attempt_timeout_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Coercion rules from the prefix table and explicit overrides.
    pub fn coercion(&self) -> Coercion {
        Coercion::new(
            self.data_points_type_prefixes.clone(),
            self.coerce_values.clone(),
        )
    }

    /// Add a data point template.
    pub fn data_point(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.data_points.insert(name.into(), template.into());
        self
    }

    /// Set the dynamic data points key.
    pub fn event_data_points_key(mut self, key: impl Into<String>) -> Self {
        self.event_data_points_key = Some(key.into());
        self
    }

    /// Add a type prefix.
    pub fn type_prefix(mut self, ty: ValueType, prefix: impl Into<String>) -> Self {
        self.data_points_type_prefixes = self.data_points_type_prefixes.with_prefix(ty, prefix);
        self
    }

    /// Set batching thresholds.
    pub fn buffer(mut self, max_items: usize, max_interval: Duration) -> Self {
        self.buffer = BufferConfig {
            max_items,
            max_interval_ms: u64::try_from(max_interval.as_millis()).unwrap_or(u64::MAX),
        };
        self
    }

    /// Set retry settings.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// InfluxDB connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxDbConfig {
    /// Server host name or address.
    pub host: String,
    /// HTTP API port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Use `https` instead of `http`.
    #[serde(default)]
    pub ssl: bool,
    /// Database user.
    #[serde(default = "default_credential")]
    pub user: String,
    /// Database password.
    #[serde(default = "default_credential")]
    pub password: String,
    /// Database name.
    #[serde(default = "default_db")]
    pub db: String,
    /// Precision of the time column.
    #[serde(default)]
    pub time_precision: TimePrecision,
}

fn default_port() -> u16 {
    8086
}

fn default_credential() -> String {
    "root".to_string()
}

fn default_db() -> String {
    "stats".to_string()
}

impl InfluxDbConfig {
    /// Connection settings for `host` with defaults elsewhere.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            ssl: false,
            user: default_credential(),
            password: default_credential(),
            db: default_db(),
            time_precision: TimePrecision::default(),
        }
    }
}

/// Time column precision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimePrecision {
    #[default]
    #[serde(rename = "s")]
    Seconds,
    #[serde(rename = "ms")]
    Milliseconds,
    #[serde(rename = "u")]
    Microseconds,
}

impl TimePrecision {
    /// Value of the `time_precision` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimePrecision::Seconds => "s",
            TimePrecision::Milliseconds => "ms",
            TimePrecision::Microseconds => "u",
        }
    }

    /// Timestamp in this precision, truncated.
    pub fn scale(&self, timestamp: DateTime<Utc>) -> i64 {
        match self {
            TimePrecision::Seconds => timestamp.timestamp(),
            TimePrecision::Milliseconds => timestamp.timestamp_millis(),
            TimePrecision::Microseconds => timestamp.timestamp_micros(),
        }
    }
}

/// Batching thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Points per flush.
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    /// Maximum time between flushes (milliseconds).
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
}

fn default_max_items() -> usize {
    100
}

fn default_max_interval_ms() -> u64 {
    1000
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            max_interval_ms: default_max_interval_ms(),
        }
    }
}

impl BufferConfig {
    /// Maximum time between flushes.
    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }
}

/// Backoff shape between delivery attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Always wait `initial_delay_ms`.
    Fixed,
    /// Double the delay after each failure, up to `max_delay_ms`.
    #[default]
    Exponential,
}

/// Delivery retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per flush, including the first. `None` retries forever.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: Option<u32>,
    /// Backoff shape.
    #[serde(default)]
    pub backoff: BackoffKind,
    /// Delay after the first failure (milliseconds).
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Delay cap (milliseconds).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Timeout of a single attempt (milliseconds).
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
}

fn default_max_attempts() -> Option<u32> {
    Some(5)
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_attempt_timeout_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: BackoffKind::default(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
        }
    }
}

/// Ordered `name: template` pairs.
///
/// YAML mappings deserialize in document order, which becomes the column
/// order of the template-derived fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldTemplates(Vec<(String, String)>);

impl FieldTemplates {
    /// Insert or replace a template, keeping the original position.
    pub fn insert(&mut self, name: String, template: String) {
        match self.0.iter_mut().find(|(k, _)| *k == name) {
            Some((_, t)) => *t = template,
            None => self.0.push((name, template)),
        }
    }

    /// Iterate in column order.
    pub fn iter(&self) -> std::slice::Iter<'_, (String, String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldTemplates {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut templates = FieldTemplates::default();
        for (k, v) in iter {
            templates.insert(k.into(), v.into());
        }
        templates
    }
}

impl Serialize for FieldTemplates {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldTemplates {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TemplatesVisitor;

        impl<'de> Visitor<'de> for TemplatesVisitor {
            type Value = FieldTemplates;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of field names to template strings")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut templates = FieldTemplates::default();
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    templates.insert(k, v);
                }
                Ok(templates)
            }
        }

        deserializer.deserialize_map(TemplatesVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_YAML: &str = r#"
influxdb:
  host: "localhost"
data_points:
  message: "%{@message}"
"#;

    const FULL_YAML: &str = r#"
influxdb:
  host: "influx.example.com"
  port: 8087
  ssl: true
  user: "writer"
  password: "test-password-placeholder"
  db: "telemetry"
  time_precision: ms
series: "logs.%{type}"
data_points:
  message: "%{@message}"
  source: "%{host}"
  kind: "event"
event_data_points_key: influxdb_data_points
data_points_type_prefixes:
  integer: [i_]
  float: [f_]
  boolean: [b_]
coerce_values:
  bytes: integer
allow_time_override: true
series_grouping: by_columns
buffer:
  max_items: 500
  max_interval_ms: 2000
retry:
  max_attempts: ~
  backoff: fixed
  initial_delay_ms: 250
  max_delay_ms: 1000
  attempt_timeout_ms: 3000
"#;

    #[test]
    fn test_config_parse_minimal() {
        let config = SinkConfig::from_yaml(MINIMAL_YAML).expect("parse minimal yaml");

        assert_eq!(config.influxdb.host, "localhost");
        assert_eq!(config.influxdb.port, 8086);
        assert!(!config.influxdb.ssl);
        assert_eq!(config.influxdb.user, "root");
        assert_eq!(config.influxdb.password, "root");
        assert_eq!(config.influxdb.db, "stats");
        assert_eq!(config.influxdb.time_precision, TimePrecision::Seconds);

        assert_eq!(config.series, "logstash");
        assert_eq!(config.data_points.len(), 1);
        assert!(config.event_data_points_key.is_none());
        assert_eq!(config.data_points_type_prefixes, PrefixTable::default());
        assert!(!config.allow_time_override);
        assert_eq!(config.series_grouping, SeriesGrouping::ByName);
        assert_eq!(config.buffer.max_items, 100);
        assert_eq!(config.buffer.max_interval(), Duration::from_secs(1));
        assert_eq!(config.retry.max_attempts, Some(5));
        assert_eq!(config.retry.backoff, BackoffKind::Exponential);
    }

    #[test]
    fn test_config_parse_all_fields() {
        let config = SinkConfig::from_yaml(FULL_YAML).expect("parse full yaml");

        assert_eq!(config.influxdb.host, "influx.example.com");
        assert_eq!(config.influxdb.port, 8087);
        assert!(config.influxdb.ssl);
        assert_eq!(config.influxdb.user, "writer");
        assert_eq!(config.influxdb.db, "telemetry");
        assert_eq!(config.influxdb.time_precision, TimePrecision::Milliseconds);

        assert_eq!(config.series, "logs.%{type}");
        let names: Vec<_> = config.data_points.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["message", "source", "kind"]);
        assert_eq!(
            config.event_data_points_key.as_deref(),
            Some("influxdb_data_points")
        );
        assert_eq!(config.data_points_type_prefixes.integer, vec!["i_"]);
        assert_eq!(config.data_points_type_prefixes.float, vec!["f_"]);
        assert_eq!(config.data_points_type_prefixes.boolean, vec!["b_"]);
        assert_eq!(config.coerce_values.get("bytes"), Some(&ValueType::Integer));
        assert!(config.allow_time_override);
        assert_eq!(config.series_grouping, SeriesGrouping::ByColumns);

        assert_eq!(config.buffer.max_items, 500);
        assert_eq!(config.buffer.max_interval_ms, 2000);

        assert_eq!(config.retry.max_attempts, None);
        assert_eq!(config.retry.backoff, BackoffKind::Fixed);
        assert_eq!(config.retry.initial_delay_ms, 250);
        assert_eq!(config.retry.max_delay_ms, 1000);
        assert_eq!(config.retry.attempt_timeout_ms, 3000);
    }

    #[test]
    fn test_config_validation() {
        assert!(matches!(
            SinkConfig::new("localhost", "s").validate(),
            Err(ConfigError::Invalid(_))
        )); // No data points

        let config = SinkConfig::new("localhost", "s").data_point("v", "%{v}");
        assert!(config.validate().is_ok());

        let mut bad = config.clone();
        bad.influxdb.host.clear();
        assert!(bad.validate().is_err());

        let bad = config.clone().buffer(0, Duration::from_secs(1));
        assert!(bad.validate().is_err());

        let bad = config.clone().buffer(10, Duration::ZERO);
        assert!(bad.validate().is_err());

        let bad = config.clone().retry(RetryConfig {
            max_attempts: Some(0),
            ..Default::default()
        });
        assert!(bad.validate().is_err());

        let bad = config.clone().type_prefix(ValueType::Integer, "");
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_buffer_interval_saturates() {
        let config = SinkConfig::new("localhost", "s").buffer(10, Duration::MAX);
        assert_eq!(config.buffer.max_interval_ms, u64::MAX);

        let config = SinkConfig::new("localhost", "s").buffer(10, Duration::from_millis(1500));
        assert_eq!(config.buffer.max_interval_ms, 1500);
    }

    #[test]
    fn test_config_rejects_unknown_precision() {
        let yaml = MINIMAL_YAML.replace("host: \"localhost\"", "host: \"h\"\n  time_precision: h");
        assert!(matches!(SinkConfig::from_yaml(&yaml), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_config_yaml_roundtrip_keeps_column_order() {
        let config = SinkConfig::new("localhost", "s")
            .data_point("z", "1")
            .data_point("a", "2")
            .data_point("z", "3");
        let yaml = config.to_yaml().expect("serialize");
        let parsed = SinkConfig::from_yaml(&yaml).expect("parse");

        let pairs: Vec<_> = parsed.data_points.iter().cloned().collect();
        assert_eq!(
            pairs,
            vec![("z".to_string(), "3".to_string()), ("a".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sink.yaml");
        std::fs::write(&path, FULL_YAML).expect("write");

        let config = SinkConfig::from_file(&path).expect("load");
        assert_eq!(config.influxdb.host, "influx.example.com");

        assert!(matches!(
            SinkConfig::from_file(&dir.path().join("missing.yaml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_precision_scale() {
        let ts = DateTime::parse_from_rfc3339("2015-03-25T04:45:12.345678Z")
            .expect("ts")
            .with_timezone(&Utc);
        assert_eq!(TimePrecision::Seconds.scale(ts), 1427258712);
        assert_eq!(TimePrecision::Milliseconds.scale(ts), 1427258712345);
        assert_eq!(TimePrecision::Microseconds.scale(ts), 1427258712345678);
        assert_eq!(TimePrecision::Microseconds.as_str(), "u");
    }
}
