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

//! Shared test helpers used across integration suites.
//! Layout: fixtures.rs (filesystem and polling helpers), postgres.rs
//! (disposable databases), mocks.rs (in-memory metadata stores).

pub mod fixtures;
pub mod mocks;
pub mod postgres;
