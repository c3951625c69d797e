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

//! File-backed configuration for the intake pipeline.
//!
//! Layout: `model.rs` (typed configuration), `loader.rs` (YAML loading),
//! `validate.rs` (field checks), `defaults.rs` (fallback values),
//! `error.rs` (error types).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_from_path, load_optional, parse_str};
pub use model::{IntakeConfig, SeenPolicy, WatchPair};
