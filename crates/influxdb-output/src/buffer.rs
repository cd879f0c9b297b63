// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Batching buffer for pending data points.
//!
//! Accumulates items and reports when a flush is due, either because the
//! batch is full or because the configured interval has elapsed since the
//! last flush. Taking a batch drains the buffer and restarts the interval.

use std::time::{Duration, Instant};

/// Upper bound on the capacity reserved up front. Large thresholds grow
/// the batch on demand instead.
const MAX_PREALLOC: usize = 1024;

/// A batching buffer.
///
/// Items are accumulated until either:
/// - The buffer reaches `max_items` (size-based flush)
/// - `max_interval` has elapsed since the last flush (time-based flush)
pub struct BatchBuffer<T> {
    items: Vec<T>,
    max_items: usize,
    max_interval: Duration,
    last_flush: Instant,
}

impl<T> BatchBuffer<T> {
    /// Create an empty buffer. The interval starts now.
    pub fn new(max_items: usize, max_interval: Duration) -> Self {
        Self {
            items: Vec::with_capacity(max_items.min(MAX_PREALLOC)),
            max_items,
            max_interval,
            last_flush: Instant::now(),
        }
    }

    /// Append an item. Reaching `max_items` drains the buffer and returns
    /// the batch.
    pub fn add(&mut self, item: T) -> Option<Vec<T>> {
        self.items.push(item);
        if self.is_full() {
            Some(self.take())
        } else {
            None
        }
    }

    /// True once `max_items` items are pending.
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.max_items
    }

    /// True once `max_interval` has elapsed since the last flush.
    pub fn is_stale(&self) -> bool {
        self.last_flush.elapsed() >= self.max_interval
    }

    /// Check if a non-forced flush is due.
    pub fn should_flush(&self) -> bool {
        !self.items.is_empty() && (self.is_full() || self.is_stale())
    }

    /// Time left until the interval threshold is reached.
    pub fn time_until_due(&self) -> Duration {
        self.max_interval.saturating_sub(self.last_flush.elapsed())
    }

    /// Drain the buffer, returning all pending items and resetting the timer.
    pub fn take(&mut self) -> Vec<T> {
        self.last_flush = Instant::now();
        let capacity = self.max_items.min(MAX_PREALLOC);
        std::mem::replace(&mut self.items, Vec::with_capacity(capacity))
    }

    /// Items waiting.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Configured item threshold.
    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Configured interval threshold.
    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_below_threshold_keeps_items() {
        let mut pending = BatchBuffer::new(3, Duration::from_secs(60));

        assert!(pending.add('a').is_none());
        assert!(pending.add('b').is_none());
        assert_eq!(pending.len(), 2);
        assert!(!pending.is_full());
        assert!(!pending.should_flush());
    }

    #[test]
    fn test_add_at_threshold_drains_in_order() {
        let mut pending = BatchBuffer::new(3, Duration::from_secs(60));
        pending.add(10);
        pending.add(20);

        assert_eq!(pending.add(30), Some(vec![10, 20, 30]));
        assert!(pending.is_empty());
        assert!(pending.add(40).is_none());
        assert_eq!(pending.take(), vec![40]);
    }

    #[test]
    fn test_stale_buffer_is_due() {
        let mut pending = BatchBuffer::new(1000, Duration::ZERO);
        assert!(pending.is_stale());
        // Stale but empty: nothing to send
        assert!(!pending.should_flush());

        pending.add("point");
        assert!(pending.should_flush());
        assert_eq!(pending.time_until_due(), Duration::ZERO);
        assert_eq!(pending.take(), vec!["point"]);
    }

    #[test]
    fn test_take_restarts_interval() {
        let mut pending = BatchBuffer::new(100, Duration::from_secs(60));
        pending.add(1u8);

        assert_eq!(pending.take().len(), 1);
        assert!(pending.take().is_empty());
        assert!(!pending.is_stale());
        assert!(pending.time_until_due() > Duration::from_secs(59));
        assert_eq!(pending.max_items(), 100);
        assert_eq!(pending.max_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_huge_threshold_reserves_bounded_capacity() {
        let mut pending = BatchBuffer::new(usize::MAX / 2, Duration::from_secs(60));
        assert!(pending.items.capacity() <= MAX_PREALLOC);

        assert!(pending.add(1u64).is_none());
        assert_eq!(pending.take(), vec![1]);
        assert!(pending.items.capacity() <= MAX_PREALLOC);
    }
}
