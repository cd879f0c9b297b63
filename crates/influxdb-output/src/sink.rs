// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Output sink orchestrator.
//!
//! Connects point building, batching, serialization and delivery:
//!
//! ```text
//! Event --> PointBuilder --> BatchBuffer --> SeriesWriter --> deliver() --> Transport
//! ```
//!
//! A batch leaves the buffer exactly once. Size-triggered, interval-triggered
//! and forced flushes all hand their batch to a single delivery worker, in
//! the order the batches were taken, so a slow or retrying delivery never
//! blocks `receive` and never reorders or duplicates points.

use crate::buffer::BatchBuffer;
use crate::config::{ConfigError, SinkConfig};
use crate::delivery::{deliver, DeliveryError, HttpTransport, RetryPolicy, Transport};
use crate::event::Event;
use crate::influx::SeriesWriter;
use crate::point::{DataPoint, PointBuilder};
use crate::stats::{SinkStats, SinkStatsSnapshot};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Shortest sleep of the interval timer.
const MIN_TIMER_WAIT: Duration = Duration::from_millis(1);

/// Errors that can occur during sink operations.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("flush of {points} points failed: {source}")]
    Delivery {
        points: usize,
        #[source]
        source: DeliveryError,
    },

    #[error("sink is shut down")]
    Closed,

    #[error("delivery worker stopped")]
    WorkerStopped,

    #[error("shutdown abandoned {points} undelivered points")]
    Abandoned { points: u64 },
}

type FlushReply = oneshot::Sender<Result<usize, SinkError>>;

/// One batch on its way to the delivery worker.
struct FlushJob {
    points: Vec<DataPoint>,
    reply: Option<FlushReply>,
}

struct Pending {
    buffer: BatchBuffer<DataPoint>,
    /// `None` once the sink is shut down.
    jobs: Option<mpsc::UnboundedSender<FlushJob>>,
}

impl Pending {
    /// Hand a batch to the worker. Called with the lock held so the worker
    /// sees batches in the order they left the buffer.
    fn dispatch(
        &self,
        points: Vec<DataPoint>,
        reply: Option<FlushReply>,
        stats: &SinkStats,
    ) -> Result<(), SinkError> {
        let jobs = self.jobs.as_ref().ok_or(SinkError::Closed)?;
        let count = points.len();
        stats.record_enqueued(count);
        jobs.send(FlushJob { points, reply }).map_err(|_| {
            stats.record_failed(count, 0);
            SinkError::WorkerStopped
        })
    }
}

struct Shared {
    builder: PointBuilder,
    pending: Mutex<Pending>,
    stats: Arc<SinkStats>,
}

impl Shared {
    fn admit(&self, point: DataPoint) -> Result<(), SinkError> {
        let mut pending = self.pending.lock();
        if pending.jobs.is_none() {
            return Err(SinkError::Closed);
        }
        self.stats.record_admitted();
        if let Some(batch) = pending.buffer.add(point) {
            tracing::debug!("Buffer full, flushing {} points", batch.len());
            pending.dispatch(batch, None, &self.stats)?;
        }
        Ok(())
    }

    async fn flush(&self, force: bool) -> Result<usize, SinkError> {
        let (count, reply) = {
            let mut pending = self.pending.lock();
            if pending.jobs.is_none() {
                return Err(SinkError::Closed);
            }
            if pending.buffer.is_empty() || !(force || pending.buffer.should_flush()) {
                return Ok(0);
            }
            let batch = pending.buffer.take();
            let count = batch.len();
            let (tx, rx) = oneshot::channel();
            pending.dispatch(batch, Some(tx), &self.stats)?;
            (count, rx)
        };

        tracing::debug!("Flushing {} points (force: {})", count, force);
        reply.await.map_err(|_| SinkError::WorkerStopped)?
    }

    fn next_wait(&self) -> Duration {
        let pending = self.pending.lock();
        if pending.buffer.is_empty() {
            pending.buffer.max_interval()
        } else {
            pending.buffer.time_until_due().max(MIN_TIMER_WAIT)
        }
    }
}

/// InfluxDB output sink.
///
/// Must be started inside a Tokio runtime: it spawns an interval timer and
/// a delivery worker.
pub struct InfluxSink {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
}

impl InfluxSink {
    /// Start a sink posting to the configured InfluxDB server.
    pub fn connect(config: &SinkConfig) -> Result<Self, SinkError> {
        let transport = HttpTransport::new(&config.influxdb)?;
        tracing::info!("InfluxDB output posting to {}", transport.url().path());
        Self::start(config, transport)
    }

    /// Start a sink delivering through `transport`.
    pub fn start<T: Transport>(config: &SinkConfig, transport: T) -> Result<Self, SinkError> {
        config.validate()?;

        let builder = PointBuilder::from_config(config)?;
        let writer = SeriesWriter::new(config.series_grouping);
        let policy = RetryPolicy::from_config(&config.retry);
        let stats = Arc::new(SinkStats::new());

        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            builder,
            pending: Mutex::new(Pending {
                buffer: BatchBuffer::new(config.buffer.max_items, config.buffer.max_interval()),
                jobs: Some(jobs_tx),
            }),
            stats: Arc::clone(&stats),
        });

        let worker = tokio::spawn(run_worker(transport, writer, policy, stats, jobs_rx));
        let timer = tokio::spawn(run_timer(Arc::clone(&shared)));

        tracing::info!(
            "InfluxDB output started (max_items: {}, max_interval: {:?})",
            config.buffer.max_items,
            config.buffer.max_interval()
        );

        Ok(Self {
            shared,
            worker: Some(worker),
            timer: Some(timer),
        })
    }

    /// Build a data point from `event` and admit it.
    ///
    /// Never waits for delivery. A full buffer hands its batch to the
    /// delivery worker and starts a new one.
    pub fn receive(&self, event: &Event) -> Result<(), SinkError> {
        let point = self.shared.builder.build(event);
        self.admit(point)
    }

    /// Admit an already built data point.
    pub fn admit(&self, point: DataPoint) -> Result<(), SinkError> {
        self.shared.admit(point)
    }

    /// Flush pending points.
    ///
    /// Without `force`, only flushes when a threshold is reached. Returns
    /// the number of points in the flushed batch once it is delivered, or
    /// `Ok(0)` when nothing was due.
    pub async fn flush(&self, force: bool) -> Result<usize, SinkError> {
        self.shared.flush(force).await
    }

    /// Points waiting in the buffer.
    pub fn pending(&self) -> usize {
        self.shared.pending.lock().buffer.len()
    }

    /// Get a snapshot of the sink counters.
    pub fn stats(&self) -> SinkStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Force a final flush and wait for every queued batch to settle.
    ///
    /// Returns the size of the final batch.
    pub async fn shutdown(mut self) -> Result<usize, SinkError> {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }

        let result = self.shared.flush(true).await;
        self.shared.pending.lock().jobs = None;

        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                tracing::error!("Delivery worker failed: {}", e);
                return Err(SinkError::WorkerStopped);
            }
        }

        let stats = self.shared.stats.snapshot();
        tracing::info!(
            "InfluxDB output stopped: {} points delivered, {} dropped",
            stats.points_flushed,
            stats.points_dropped
        );
        result
    }

    /// Like [`shutdown`](Self::shutdown), but abandons delivery after `limit`.
    ///
    /// Returns [`SinkError::Abandoned`] with the number of points that were
    /// still undelivered when the limit expired.
    pub async fn shutdown_timeout(self, limit: Duration) -> Result<usize, SinkError> {
        let stats = Arc::clone(&self.shared.stats);
        let worker = self.worker.as_ref().map(|w| w.abort_handle());

        match tokio::time::timeout(limit, self.shutdown()).await {
            Ok(result) => result,
            Err(_) => {
                if let Some(worker) = worker {
                    worker.abort();
                }
                let snapshot = stats.snapshot();
                let points = snapshot.points_in_flight + snapshot.points_pending();
                tracing::warn!(
                    "Shutdown timed out after {:?}, abandoning {} points",
                    limit,
                    points
                );
                Err(SinkError::Abandoned { points })
            }
        }
    }
}

impl Drop for InfluxSink {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if self.worker.is_some() {
            let pending = self.pending();
            if pending > 0 {
                tracing::warn!("InfluxDB output dropped with {} unflushed points", pending);
            }
        }
    }
}

async fn run_timer(shared: Arc<Shared>) {
    loop {
        tokio::time::sleep(shared.next_wait()).await;
        match shared.flush(false).await {
            Ok(_) => {}
            Err(SinkError::Closed) => break,
            // The worker already logged and counted the failure.
            Err(SinkError::Delivery { .. }) => {}
            Err(e) => {
                tracing::error!("Interval flush failed: {}", e);
                break;
            }
        }
    }
}

async fn run_worker<T: Transport>(
    transport: T,
    writer: SeriesWriter,
    policy: RetryPolicy,
    stats: Arc<SinkStats>,
    mut jobs: mpsc::UnboundedReceiver<FlushJob>,
) {
    while let Some(job) = jobs.recv().await {
        let result = deliver_batch(&transport, &writer, &policy, &stats, &job.points).await;
        if let Some(reply) = job.reply {
            // The caller may have stopped waiting.
            let _ = reply.send(result);
        }
    }
    tracing::debug!("Delivery worker stopped");
}

async fn deliver_batch<T: Transport>(
    transport: &T,
    writer: &SeriesWriter,
    policy: &RetryPolicy,
    stats: &SinkStats,
    batch: &[DataPoint],
) -> Result<usize, SinkError> {
    let points = batch.len();

    let outcome = match writer.serialize(batch) {
        Ok(body) => {
            tracing::debug!(
                "Posting {} points in {} series: {}",
                points,
                writer.group_count(batch),
                String::from_utf8_lossy(&body)
            );
            deliver(transport, &body, policy).await
        }
        Err(e) => Err(DeliveryError::Encode(e)),
    };

    match outcome {
        Ok(attempts) => {
            stats.record_delivered(points, attempts);
            Ok(points)
        }
        Err(source) => {
            stats.record_failed(points, source.attempts());
            tracing::error!("Dropping {} points: {}", points, source);
            Err(SinkError::Delivery { points, source })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::TransportError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct CountingTransport {
        sends: Arc<AtomicUsize>,
    }

    impl Transport for CountingTransport {
        async fn send(&self, _body: &[u8]) -> Result<(), TransportError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config(max_items: usize) -> SinkConfig {
        SinkConfig::new("localhost", "s")
            .data_point("v", "%{v}")
            .buffer(max_items, Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let result = InfluxSink::start(
            &SinkConfig::new("localhost", "s"),
            CountingTransport::default(),
        );
        assert!(matches!(result, Err(SinkError::Config(_))));
    }

    #[tokio::test]
    async fn test_flush_empty_sends_nothing() {
        let transport = CountingTransport::default();
        let sink = InfluxSink::start(&config(10), transport.clone()).expect("start");

        assert_eq!(sink.flush(true).await.expect("flush"), 0);
        assert_eq!(sink.flush(false).await.expect("flush"), 0);
        assert_eq!(transport.sends.load(Ordering::SeqCst), 0);

        sink.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn test_unforced_flush_waits_for_threshold() {
        let transport = CountingTransport::default();
        let sink = InfluxSink::start(&config(10), transport.clone()).expect("start");

        sink.receive(&Event::at(chrono::Utc::now()).with_field("v", 1))
            .expect("receive");
        assert_eq!(sink.flush(false).await.expect("flush"), 0);
        assert_eq!(sink.pending(), 1);

        assert_eq!(sink.flush(true).await.expect("flush"), 1);
        assert_eq!(sink.pending(), 0);
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);

        sink.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn test_size_threshold_dispatches_without_waiting() {
        let transport = CountingTransport::default();
        let sink = InfluxSink::start(&config(2), transport.clone()).expect("start");

        for v in 0..5 {
            sink.receive(&Event::at(chrono::Utc::now()).with_field("v", v))
                .expect("receive");
        }
        assert_eq!(sink.pending(), 1);

        assert_eq!(sink.shutdown().await.expect("shutdown"), 1);
        assert_eq!(transport.sends.load(Ordering::SeqCst), 3);
    }
}
