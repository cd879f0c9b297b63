// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Event to data point mapping.
//!
//! A data point is built in three steps:
//!
//! 1. render the configured `data_points` templates against the event
//! 2. merge the nested mapping found under `event_data_points_key`,
//!    overriding same-named template fields
//! 3. coerce every field by name
//!
//! Each call starts from an empty field list, so nothing carries over from
//! one event to the next.

use crate::coerce::Coercion;
use crate::config::{ConfigError, SinkConfig, TimePrecision};
use crate::event::{scalar_to_string, Event};
use crate::influx::{FieldValue, TIME_COLUMN};
use crate::template::Template;
use serde_json::Value;

/// A typed, merged record derived from one event.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    /// Destination series name.
    pub series: String,
    /// Fields in insertion order.
    pub fields: Vec<(String, FieldValue)>,
    /// Time column value, in the configured precision.
    pub time: i64,
}

impl DataPoint {
    /// Look up a field value by name.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }
}

/// Builds data points from events.
#[derive(Debug, Clone)]
pub struct PointBuilder {
    series: Template,
    data_points: Vec<(String, Template)>,
    dynamic_key: Option<String>,
    coercion: Coercion,
    allow_time_override: bool,
    precision: TimePrecision,
}

impl PointBuilder {
    /// Create a builder for a series template and field templates.
    pub fn new(series: Template, data_points: Vec<(String, Template)>, coercion: Coercion) -> Self {
        Self {
            series,
            data_points,
            dynamic_key: None,
            coercion,
            allow_time_override: false,
            precision: TimePrecision::default(),
        }
    }

    /// Compile all templates of a sink configuration.
    pub fn from_config(config: &SinkConfig) -> Result<Self, ConfigError> {
        let series = Template::compile(&config.series)?;
        let data_points = config
            .data_points
            .iter()
            .map(|(name, expr)| Ok((name.clone(), Template::compile(expr)?)))
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            series,
            data_points,
            dynamic_key: config.event_data_points_key.clone(),
            coercion: config.coercion(),
            allow_time_override: config.allow_time_override,
            precision: config.influxdb.time_precision,
        })
    }

    /// Merge the nested mapping under `key` into every point.
    pub fn with_dynamic_key(mut self, key: impl Into<String>) -> Self {
        self.dynamic_key = Some(key.into());
        self
    }

    /// Let a `time` field replace the event timestamp.
    pub fn with_time_override(mut self, allow: bool) -> Self {
        self.allow_time_override = allow;
        self
    }

    /// Set the precision of the time column.
    pub fn with_precision(mut self, precision: TimePrecision) -> Self {
        self.precision = precision;
        self
    }

    /// Build the data point for one event.
    pub fn build(&self, event: &Event) -> DataPoint {
        let mut raw: Vec<(String, String)> = self
            .data_points
            .iter()
            .map(|(name, template)| (name.clone(), template.render(event)))
            .collect();

        if let Some(key) = &self.dynamic_key {
            match event.get(key) {
                Some(Value::Object(dynamic)) => {
                    for (name, value) in dynamic {
                        if let Some(s) = scalar_to_string(value) {
                            upsert(&mut raw, name, s);
                        }
                    }
                }
                Some(other) => {
                    tracing::debug!(
                        "Ignoring '{}': expected an object, got {}",
                        key,
                        json_kind(other)
                    );
                }
                None => {}
            }
        }

        let mut time = self.precision.scale(event.timestamp());
        let mut fields = Vec::with_capacity(raw.len());
        for (name, value) in raw {
            if name == TIME_COLUMN {
                match (self.allow_time_override, value.parse::<i64>()) {
                    (true, Ok(t)) => time = t,
                    (true, Err(_)) => {
                        tracing::warn!("Ignoring non-integer time override '{}'", value);
                    }
                    (false, _) => {
                        tracing::error!(
                            "Cannot override 'time' without allow_time_override, using event time"
                        );
                    }
                }
                continue;
            }
            let value = self.coercion.coerce(&name, value);
            fields.push((name, value));
        }

        DataPoint {
            series: self.series.render(event),
            fields,
            time,
        }
    }
}

/// Replace the value of `name` in place, or append it.
fn upsert(fields: &mut Vec<(String, String)>, name: &str, value: String) {
    match fields.iter_mut().find(|(k, _)| k == name) {
        Some((_, v)) => *v = value,
        None => fields.push((name.to_string(), value)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::{PrefixTable, ValueType};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::collections::HashMap;

    fn builder() -> PointBuilder {
        let prefixes = PrefixTable::new()
            .with_prefix(ValueType::Integer, "i_")
            .with_prefix(ValueType::Float, "f_")
            .with_prefix(ValueType::Boolean, "b_");
        PointBuilder::new(
            Template::compile("my_series").expect("series"),
            vec![("message".into(), Template::compile("%{@message}").expect("tpl"))],
            Coercion::new(prefixes, HashMap::new()),
        )
        .with_dynamic_key("influxdb_data_points")
    }

    fn event(message: &str, dynamic: Value) -> Event {
        Event::at(Utc.with_ymd_and_hms(2015, 3, 25, 4, 45, 12).unwrap())
            .with_field("@message", message)
            .with_field("host", "localhost")
            .with_field("influxdb_data_points", dynamic)
    }

    #[test]
    fn test_build_merges_template_and_dynamic_fields() {
        let point = builder().build(&event(
            "Hello world!",
            json!({"user": "fprefect", "i_account": "1000", "f_timing": "1.23", "host": "host1"}),
        ));

        assert_eq!(point.series, "my_series");
        assert_eq!(point.time, 1427258712);
        assert_eq!(
            point.field_names().collect::<Vec<_>>(),
            vec!["message", "user", "i_account", "f_timing", "host"]
        );
        assert_eq!(point.field("message"), Some(&FieldValue::String("Hello world!".into())));
        assert_eq!(point.field("i_account"), Some(&FieldValue::Integer(1000)));
        assert_eq!(point.field("f_timing"), Some(&FieldValue::Float(1.23)));
        assert_eq!(point.field("host"), Some(&FieldValue::String("host1".into())));
    }

    #[test]
    fn test_dynamic_field_overrides_template_in_place() {
        let point = builder().build(&event(
            "ignored",
            json!({"user": "adent", "message": "from dynamic"}),
        ));

        assert_eq!(
            point.field_names().collect::<Vec<_>>(),
            vec!["message", "user"]
        );
        assert_eq!(point.field("message"), Some(&FieldValue::String("from dynamic".into())));
    }

    #[test]
    fn test_points_do_not_share_fields() {
        let builder = builder();
        let first = builder.build(&event("a", json!({"f_timing": "1.5", "i_foo": "1"})));
        let second = builder.build(&event("b", json!({"i_foo": "2"})));

        assert!(first.field("f_timing").is_some());
        assert!(second.field("f_timing").is_none());
        assert_eq!(second.field("i_foo"), Some(&FieldValue::Integer(2)));
        assert_eq!(second.field("message"), Some(&FieldValue::String("b".into())));
    }

    #[test]
    fn test_missing_or_non_object_dynamic_key() {
        let builder = builder();
        let base = Event::at(Utc::now()).with_field("@message", "m");
        assert_eq!(builder.build(&base).fields.len(), 1);

        let scalar = base.clone().with_field("influxdb_data_points", "oops");
        assert_eq!(builder.build(&scalar).fields.len(), 1);
    }

    #[test]
    fn test_dynamic_non_scalar_values_skipped() {
        let point = builder().build(&event(
            "m",
            json!({"i_n": 5, "b_ok": true, "nested": {"x": 1}, "list": [1], "none": null}),
        ));

        assert_eq!(point.field_names().collect::<Vec<_>>(), vec!["message", "i_n", "b_ok"]);
        assert_eq!(point.field("i_n"), Some(&FieldValue::Integer(5)));
        assert_eq!(point.field("b_ok"), Some(&FieldValue::Boolean(true)));
    }

    #[test]
    fn test_time_field_dropped_without_override() {
        let point = builder().build(&event("m", json!({"time": "42"})));
        assert_eq!(point.time, 1427258712);
        assert!(point.field("time").is_none());
    }

    #[test]
    fn test_time_override() {
        let builder = builder().with_time_override(true);

        let point = builder.build(&event("m", json!({"time": "42"})));
        assert_eq!(point.time, 42);
        assert!(point.field("time").is_none());

        let point = builder.build(&event("m", json!({"time": "soon"})));
        assert_eq!(point.time, 1427258712);
    }

    #[test]
    fn test_precision_scales_event_time() {
        let point = builder()
            .with_precision(TimePrecision::Milliseconds)
            .build(&event("m", json!({})));
        assert_eq!(point.time, 1427258712000);
    }

    #[test]
    fn test_templated_series() {
        let builder = PointBuilder::new(
            Template::compile("logs.%{type}").expect("series"),
            vec![("v".into(), Template::compile("1").expect("tpl"))],
            Coercion::default(),
        );
        let point = builder.build(&Event::at(Utc::now()).with_field("type", "nginx"));
        assert_eq!(point.series, "logs.nginx");
    }
}
