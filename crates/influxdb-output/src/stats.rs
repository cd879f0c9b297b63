// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sink statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters shared by the sink, its timer and its delivery worker.
#[derive(Debug)]
pub struct SinkStats {
    /// Points admitted into the buffer.
    pub points_admitted: AtomicU64,

    /// Points confirmed delivered.
    pub points_flushed: AtomicU64,

    /// Points handed to delivery and not yet settled.
    pub points_in_flight: AtomicU64,

    /// Points dropped after retries were exhausted.
    pub points_dropped: AtomicU64,

    /// Batches handed to delivery.
    pub flushes: AtomicU64,

    /// Batches that could not be delivered.
    pub failed_flushes: AtomicU64,

    /// Send attempts, successful or not.
    pub delivery_attempts: AtomicU64,

    /// Send attempts beyond the first one of each batch.
    pub delivery_retries: AtomicU64,

    /// Sink creation time.
    pub created: Instant,
}

impl SinkStats {
    /// Create zeroed stats.
    pub fn new() -> Self {
        Self {
            points_admitted: AtomicU64::new(0),
            points_flushed: AtomicU64::new(0),
            points_in_flight: AtomicU64::new(0),
            points_dropped: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            failed_flushes: AtomicU64::new(0),
            delivery_attempts: AtomicU64::new(0),
            delivery_retries: AtomicU64::new(0),
            created: Instant::now(),
        }
    }

    /// Record an admitted point.
    pub fn record_admitted(&self) {
        self.points_admitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a batch handed to delivery.
    pub fn record_enqueued(&self, points: usize) {
        self.points_in_flight
            .fetch_add(points as u64, Ordering::Relaxed);
    }

    /// Record a delivered batch.
    pub fn record_delivered(&self, points: usize, attempts: u32) {
        self.settle(points, attempts);
        self.points_flushed
            .fetch_add(points as u64, Ordering::Relaxed);
    }

    /// Record a batch that could not be delivered.
    pub fn record_failed(&self, points: usize, attempts: u32) {
        self.settle(points, attempts);
        self.failed_flushes.fetch_add(1, Ordering::Relaxed);
        self.points_dropped
            .fetch_add(points as u64, Ordering::Relaxed);
    }

    fn settle(&self, points: usize, attempts: u32) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.points_in_flight
            .fetch_sub(points as u64, Ordering::Relaxed);
        self.delivery_attempts
            .fetch_add(attempts as u64, Ordering::Relaxed);
        self.delivery_retries
            .fetch_add(attempts.saturating_sub(1) as u64, Ordering::Relaxed);
    }

    /// Get snapshot of current stats.
    pub fn snapshot(&self) -> SinkStatsSnapshot {
        SinkStatsSnapshot {
            points_admitted: self.points_admitted.load(Ordering::Relaxed),
            points_flushed: self.points_flushed.load(Ordering::Relaxed),
            points_in_flight: self.points_in_flight.load(Ordering::Relaxed),
            points_dropped: self.points_dropped.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            failed_flushes: self.failed_flushes.load(Ordering::Relaxed),
            delivery_attempts: self.delivery_attempts.load(Ordering::Relaxed),
            delivery_retries: self.delivery_retries.load(Ordering::Relaxed),
            uptime_secs: self.created.elapsed().as_secs(),
        }
    }
}

impl Default for SinkStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of sink statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkStatsSnapshot {
    pub points_admitted: u64,
    pub points_flushed: u64,
    pub points_in_flight: u64,
    pub points_dropped: u64,
    pub flushes: u64,
    pub failed_flushes: u64,
    pub delivery_attempts: u64,
    pub delivery_retries: u64,
    pub uptime_secs: u64,
}

impl SinkStatsSnapshot {
    /// Delivered points per second.
    pub fn points_per_second(&self) -> f64 {
        if self.uptime_secs > 0 {
            self.points_flushed as f64 / self.uptime_secs as f64
        } else {
            0.0
        }
    }

    /// Points admitted but not yet handed to delivery.
    pub fn points_pending(&self) -> u64 {
        self.points_admitted
            .saturating_sub(self.points_flushed)
            .saturating_sub(self.points_dropped)
            .saturating_sub(self.points_in_flight)
    }
}
