#![forbid(unsafe_code)]
#![warn(
    unused,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Telemetry primitives shared across the intake workspace.
//!
//! Layout: `init.rs` (tracing subscriber setup), `metrics.rs` (Prometheus
//! registry), `error.rs` (error types).

pub mod error;
pub mod init;
pub mod metrics;

pub use error::{Result as TelemetryResult, TelemetryError};
pub use init::{
    DEFAULT_LOG_LEVEL, LogFormat, LogTarget, LoggingConfig, build_sha, init_logging,
    log_format_from_str,
};
pub use metrics::{Metrics, MetricsSnapshot, STATUS_ERROR, STATUS_OK};
