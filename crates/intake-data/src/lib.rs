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

//! Metadata persistence for ingested files: record model, store contract,
//! and the Postgres implementation with its migrations.

pub mod error;
pub mod records;

pub use error::{DataError, Result as DataResult};
pub use records::{FileRecord, FileStatus, MetadataStore, PgMetadataStore};
