// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound event records.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

/// Field holding the event timestamp in JSON input.
pub const TIMESTAMP_FIELD: &str = "@timestamp";

/// Event decoding errors.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event must be a JSON object")]
    NotAnObject,

    #[error("invalid @timestamp value '{0}': {1}")]
    Timestamp(String, chrono::ParseError),
}

/// One structured record handed to the sink.
///
/// Field order is preserved. Top-level values are usually strings; the
/// value under the dynamic data points key is a nested object.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    timestamp: DateTime<Utc>,
    fields: Map<String, Value>,
}

impl Event {
    /// Create an event from a timestamp and its fields.
    pub fn new(timestamp: DateTime<Utc>, fields: Map<String, Value>) -> Self {
        Self { timestamp, fields }
    }

    /// Create an empty event.
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self::new(timestamp, Map::new())
    }

    /// Add a field (builder style).
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Build an event from a decoded JSON object.
    ///
    /// `@timestamp` (RFC 3339) becomes the event time; events without one
    /// are stamped with the current time.
    pub fn from_json(value: Value) -> Result<Self, EventError> {
        let Value::Object(fields) = value else {
            return Err(EventError::NotAnObject);
        };

        let timestamp = match fields.get(TIMESTAMP_FIELD) {
            Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
                .map_err(|e| EventError::Timestamp(s.clone(), e))?
                .with_timezone(&Utc),
            _ => Utc::now(),
        };

        Ok(Self { timestamp, fields })
    }

    /// Parse a single JSON line.
    pub fn from_json_str(line: &str) -> Result<Self, EventError> {
        Self::from_json(serde_json::from_str(line)?)
    }

    /// Event timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// All fields, in insertion order.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Look up a top-level field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Resolve a nested path such as `["a", "b"]` (`event[a][b]`).
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.fields.get(first.as_ref())?;
        for part in rest {
            current = current.get(part.as_ref())?;
        }
        Some(current)
    }
}

/// String form of a scalar JSON value.
///
/// Null, arrays and objects have no scalar form.
pub(crate) fn scalar_to_string(val: &Value) -> Option<String> {
    match val {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
