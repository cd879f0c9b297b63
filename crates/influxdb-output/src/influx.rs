// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB JSON series writer.
//!
//! Wire format (InfluxDB 0.8 `/db/<db>/series` API):
//! ```text
//! [{"name":"my_series","columns":["message","i_count","time"],"points":[["hi",1,1427258712]]}]
//! ```
//!
//! Every flush serializes into one body. Points are grouped into one series
//! object per destination series; the column list is the first-seen union of
//! the group's field names followed by `time`.

use crate::point::DataPoint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Name of the implicit trailing time column.
pub const TIME_COLUMN: &str = "time";

/// A value that can be stored in an InfluxDB column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// 64-bit floating point.
    Float(f64),
    /// 64-bit signed integer.
    Integer(i64),
    /// UTF-8 string.
    String(String),
    /// Boolean value.
    Boolean(bool),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::String(v) => write!(f, "{:?}", v),
            FieldValue::Boolean(v) => write!(f, "{}", v),
        }
    }
}

/// How points of one flush are split into series objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesGrouping {
    /// One object per series name; columns are the union of all fields.
    /// A point lacking a column simply has no value for it.
    #[default]
    ByName,
    /// One object per series name and exact field list, so every row has
    /// a value for every column.
    ByColumns,
}

/// One cell of a serialized row.
#[derive(Serialize)]
#[serde(untagged)]
enum Cell<'a> {
    Value(&'a FieldValue),
    Time(i64),
}

/// One series object of the wire body.
#[derive(Serialize)]
struct Series<'a> {
    name: &'a str,
    columns: Vec<&'a str>,
    points: Vec<Vec<Cell<'a>>>,
}

/// Flush group under construction.
struct Group<'a> {
    name: &'a str,
    members: Vec<&'a DataPoint>,
}

impl<'a> Group<'a> {
    /// First-seen ordered union of field names.
    fn schema(&self) -> Vec<&'a str> {
        let mut columns: Vec<&'a str> = Vec::new();
        for point in self.members.iter().copied() {
            for (name, _) in &point.fields {
                if !columns.contains(&name.as_str()) {
                    columns.push(name.as_str());
                }
            }
        }
        columns
    }

    fn into_series(self) -> Series<'a> {
        let schema = self.schema();
        let points = self
            .members
            .into_iter()
            .map(|point| {
                let mut row: Vec<Cell<'a>> = schema
                    .iter()
                    .filter_map(|column| point.field(column).map(Cell::Value))
                    .collect();
                row.push(Cell::Time(point.time));
                row
            })
            .collect();

        let mut columns = schema;
        columns.push(TIME_COLUMN);

        Series {
            name: self.name,
            columns,
            points,
        }
    }
}

/// Serializes flushed points into the JSON series wire format.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeriesWriter {
    grouping: SeriesGrouping,
}

impl SeriesWriter {
    /// Create a writer with the given grouping policy.
    pub fn new(grouping: SeriesGrouping) -> Self {
        Self { grouping }
    }

    /// Grouping policy in use.
    pub fn grouping(&self) -> SeriesGrouping {
        self.grouping
    }

    /// Number of series objects `points` would serialize into.
    pub fn group_count(&self, points: &[DataPoint]) -> usize {
        self.group(points).len()
    }

    /// Serialize one flush into a wire body.
    pub fn serialize(&self, points: &[DataPoint]) -> Result<Vec<u8>, serde_json::Error> {
        let series: Vec<Series<'_>> = self
            .group(points)
            .into_iter()
            .map(Group::into_series)
            .collect();
        serde_json::to_vec(&series)
    }

    fn group<'a>(&self, points: &'a [DataPoint]) -> Vec<Group<'a>> {
        let mut groups: Vec<Group<'a>> = Vec::new();
        let mut index: HashMap<(&'a str, Vec<&'a str>), usize> = HashMap::new();

        for point in points {
            let columns = match self.grouping {
                SeriesGrouping::ByName => Vec::new(),
                SeriesGrouping::ByColumns => point.field_names().collect(),
            };
            let key = (point.series.as_str(), columns);

            match index.get(&key) {
                Some(&i) => groups[i].members.push(point),
                None => {
                    index.insert(key, groups.len());
                    groups.push(Group {
                        name: point.series.as_str(),
                        members: vec![point],
                    });
                }
            }
        }

        groups
    }
}
