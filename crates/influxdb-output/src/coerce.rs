// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Field value coercion.
//!
//! Events carry string values. Before a data point is written, each field is
//! turned into a typed [`FieldValue`] using two configured tables:
//!
//! - explicit per-field overrides (`coerce_values`)
//! - field-name prefixes per type (`data_points_type_prefixes`)
//!
//! Coercion is lenient: a value that does not parse as its target type is
//! kept as the original string rather than dropping the point.

use crate::influx::FieldValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Target type of a coerced field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// 64-bit signed integer.
    Integer,
    /// 64-bit floating point.
    Float,
    /// `true` / `false`.
    Boolean,
    /// Leave the value as a string.
    String,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::Boolean => "boolean",
            ValueType::String => "string",
        };
        f.write_str(name)
    }
}

/// Prefix-based type table.
///
/// A field whose name starts with one of the prefixes of a type is coerced
/// to that type. Matching is case-sensitive. When a name matches several
/// types, integer wins over float, and float over boolean.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixTable {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub integer: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub float: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub boolean: Vec<String>,
}

impl PrefixTable {
    /// Create an empty table (every field stays a string).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prefix for a type. `ValueType::String` is a no-op.
    pub fn with_prefix(mut self, ty: ValueType, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        match ty {
            ValueType::Integer => self.integer.push(prefix),
            ValueType::Float => self.float.push(prefix),
            ValueType::Boolean => self.boolean.push(prefix),
            ValueType::String => {}
        }
        self
    }

    /// Resolve the type a field name maps to, if any.
    pub fn lookup(&self, field_name: &str) -> Option<ValueType> {
        let matches = |prefixes: &[String]| prefixes.iter().any(|p| field_name.starts_with(p.as_str()));

        if matches(&self.integer) {
            Some(ValueType::Integer)
        } else if matches(&self.float) {
            Some(ValueType::Float)
        } else if matches(&self.boolean) {
            Some(ValueType::Boolean)
        } else {
            None
        }
    }

    /// Iterate over every configured prefix.
    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.integer
            .iter()
            .chain(&self.float)
            .chain(&self.boolean)
            .map(String::as_str)
    }
}

/// Coercion rules: explicit overrides first, then the prefix table.
#[derive(Debug, Clone, Default)]
pub struct Coercion {
    overrides: HashMap<String, ValueType>,
    prefixes: PrefixTable,
}

impl Coercion {
    /// Create coercion rules from a prefix table and explicit overrides.
    pub fn new(prefixes: PrefixTable, overrides: HashMap<String, ValueType>) -> Self {
        Self {
            overrides,
            prefixes,
        }
    }

    /// Type a field name resolves to, `None` when it stays a string.
    pub fn target(&self, field_name: &str) -> Option<ValueType> {
        self.overrides
            .get(field_name)
            .copied()
            .or_else(|| self.prefixes.lookup(field_name))
    }

    /// Coerce one field value by name.
    pub fn coerce(&self, field_name: &str, value: String) -> FieldValue {
        match self.target(field_name) {
            Some(ty) => coerce_as(ty, value),
            None => FieldValue::String(value),
        }
    }
}

/// Coerce a field value using only a prefix table.
pub fn coerce(field_name: &str, value: String, table: &PrefixTable) -> FieldValue {
    match table.lookup(field_name) {
        Some(ty) => coerce_as(ty, value),
        None => FieldValue::String(value),
    }
}

/// Parse `value` as `ty`, falling back to the raw string on failure.
pub fn coerce_as(ty: ValueType, value: String) -> FieldValue {
    match ty {
        ValueType::Integer => match value.parse::<i64>() {
            Ok(i) => FieldValue::Integer(i),
            Err(_) => FieldValue::String(value),
        },
        ValueType::Float => match value.parse::<f64>() {
            // NaN and infinities have no JSON representation
            Ok(f) if f.is_finite() => FieldValue::Float(f),
            _ => FieldValue::String(value),
        },
        ValueType::Boolean => {
            if value.eq_ignore_ascii_case("true") {
                FieldValue::Boolean(true)
            } else if value.eq_ignore_ascii_case("false") {
                FieldValue::Boolean(false)
            } else {
                FieldValue::String(value)
            }
        }
        ValueType::String => FieldValue::String(value),
    }
}
