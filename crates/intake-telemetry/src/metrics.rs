//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Each `Metrics` owns its own registry so tests never collide on names.
//! - Exposes the counters and gauges the ingest pipeline reports on.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Status label recorded for successful pipeline steps.
pub const STATUS_OK: &str = "ok";
/// Status label recorded for failed pipeline steps.
pub const STATUS_ERROR: &str = "error";

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    files_discovered_total: IntCounter,
    duplicate_events_total: IntCounter,
    moves_total: IntCounterVec,
    records_total: IntCounterVec,
    active_watches: IntGauge,
    inflight_moves: IntGauge,
    events_emitted_total: IntCounterVec,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Files dispatched to a move task for the first time.
    pub files_discovered_total: u64,
    /// Discovery events dropped because the path was already seen.
    pub duplicate_events_total: u64,
    /// Moves that completed successfully.
    pub moves_succeeded: u64,
    /// Moves that failed.
    pub moves_failed: u64,
    /// Metadata records written.
    pub records_succeeded: u64,
    /// Metadata record writes that failed.
    pub records_failed: u64,
    /// Currently registered watches.
    pub active_watches: i64,
    /// Move tasks currently running.
    pub inflight_moves: i64,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let files_discovered_total = counter(
            "files_discovered_total",
            "Files dispatched to a move task for the first time",
        )?;
        let duplicate_events_total = counter(
            "duplicate_events_total",
            "Discovery events dropped because the path was already seen",
        )?;
        let moves_total = counter_vec("moves_total", "File moves by status", &["status"])?;
        let records_total = counter_vec(
            "records_total",
            "Metadata record writes by status",
            &["status"],
        )?;
        let active_watches = gauge("active_watches", "Registered watch directories")?;
        let inflight_moves = gauge("inflight_moves", "Move tasks currently running")?;
        let events_emitted_total = counter_vec(
            "events_emitted_total",
            "Domain events emitted by type",
            &["type"],
        )?;

        register(&registry, "files_discovered_total", &files_discovered_total)?;
        register(&registry, "duplicate_events_total", &duplicate_events_total)?;
        register(&registry, "moves_total", &moves_total)?;
        register(&registry, "records_total", &records_total)?;
        register(&registry, "active_watches", &active_watches)?;
        register(&registry, "inflight_moves", &inflight_moves)?;
        register(&registry, "events_emitted_total", &events_emitted_total)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                files_discovered_total,
                duplicate_events_total,
                moves_total,
                records_total,
                active_watches,
                inflight_moves,
                events_emitted_total,
            }),
        })
    }

    /// Count a file dispatched for the first time.
    pub fn inc_discovered(&self) {
        self.inner.files_discovered_total.inc();
    }

    /// Count a discovery event dropped as a duplicate.
    pub fn inc_duplicate(&self) {
        self.inner.duplicate_events_total.inc();
    }

    /// Count a finished move attempt.
    pub fn inc_move(&self, status: &str) {
        self.inner.moves_total.with_label_values(&[status]).inc();
    }

    /// Count a finished metadata write.
    pub fn inc_record(&self, status: &str) {
        self.inner.records_total.with_label_values(&[status]).inc();
    }

    /// Track a newly registered watch.
    pub fn inc_active_watches(&self) {
        self.inner.active_watches.inc();
    }

    /// Release `count` watches from the gauge.
    pub fn sub_active_watches(&self, count: i64) {
        self.inner.active_watches.sub(count);
    }

    /// Track a move task starting.
    pub fn inc_inflight_moves(&self) {
        self.inner.inflight_moves.inc();
    }

    /// Track a move task finishing.
    pub fn dec_inflight_moves(&self) {
        self.inner.inflight_moves.dec();
    }

    /// Increment the emitted event counter for the specific event type.
    pub fn inc_event(&self, event_type: &str) {
        self.inner
            .events_emitted_total
            .with_label_values(&[event_type])
            .inc();
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot of the pipeline gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = &self.inner;
        MetricsSnapshot {
            files_discovered_total: inner.files_discovered_total.get(),
            duplicate_events_total: inner.duplicate_events_total.get(),
            moves_succeeded: inner.moves_total.with_label_values(&[STATUS_OK]).get(),
            moves_failed: inner.moves_total.with_label_values(&[STATUS_ERROR]).get(),
            records_succeeded: inner.records_total.with_label_values(&[STATUS_OK]).get(),
            records_failed: inner.records_total.with_label_values(&[STATUS_ERROR]).get(),
            active_watches: inner.active_watches.get(),
            inflight_moves: inner.inflight_moves.get(),
        }
    }
}

fn counter(name: &'static str, help: &str) -> Result<IntCounter> {
    IntCounter::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn counter_vec(name: &'static str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn gauge(name: &'static str, help: &str) -> Result<IntGauge> {
    IntGauge::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}
