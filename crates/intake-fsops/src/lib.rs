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

//! Watch, deduplicate, and move pipeline for dropped-in files.
//!
//! Layout: `registry.rs` (shared watch table), `poller.rs` (directory walks),
//! `coordinator.rs` (seen-set and move dispatch), `mover.rs` (rename and
//! record), `manager.rs` (lifecycle), `model/` (shared types), `error.rs`.

mod coordinator;
pub mod error;
pub mod manager;
pub mod model;
mod mover;
mod poller;
pub mod registry;
mod reporter;

pub use error::{FsOpsError, FsOpsResult};
pub use manager::{FileManager, ManagerDeps};
pub use model::{FileEvent, ManagerSettings, MoveOutcome, WatchEntry};
pub use registry::WatchRegistry;
