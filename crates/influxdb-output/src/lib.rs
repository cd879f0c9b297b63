// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB Output
//!
//! Turns structured log events into typed data points and delivers them in
//! batches to InfluxDB over its HTTP JSON series API.
//!
//! This crate provides:
//! - YAML-based configuration of fields, series and batching
//! - `%{field}` templates for data point values and series names
//! - Type coercion of field values by name prefix or explicit override
//! - Batching with size and time-based flushing
//! - Delivery with bounded or unbounded retry and backoff
//!
//! # Overview
//!
//! ```text
//! Event --> PointBuilder --> BatchBuffer --> SeriesWriter --> deliver() --> InfluxDB
//! ```
//!
//! # Example
//!
//! ```no_run
//! use influxdb_output::{Event, InfluxSink, SinkConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SinkConfig::new("localhost", "my_series")
//!     .data_point("message", "%{@message}")
//!     .event_data_points_key("influxdb_data_points");
//!
//! let sink = InfluxSink::connect(&config)?;
//! let event = Event::from_json_str(r#"{"@message":"Hello world!"}"#)?;
//! sink.receive(&event)?;
//! sink.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod coerce;
pub mod config;
pub mod delivery;
pub mod event;
pub mod influx;
pub mod point;
pub mod sink;
pub mod stats;
pub mod template;

pub use coerce::{Coercion, PrefixTable, ValueType};
pub use config::{ConfigError, SinkConfig};
pub use delivery::{Backoff, DeliveryError, HttpTransport, RetryPolicy, Transport, TransportError};
pub use event::{Event, EventError};
pub use influx::{FieldValue, SeriesGrouping, SeriesWriter};
pub use point::{DataPoint, PointBuilder};
pub use sink::{InfluxSink, SinkError};
pub use stats::SinkStatsSnapshot;
pub use template::{Template, TemplateError};
