#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! SQLite persistence for EDGAR ingestion.
//!
//! This crate provides [`SqliteStore`], the implementation of the
//! [`IngestStore`] trait from `edgar-core`: single-row, conflict-safe
//! upserts keyed by natural identifiers.

/// Table definitions.
pub mod schema;
/// SQLite-backed store implementation.
pub mod sqlite;

// Re-export the trait for convenience
pub use edgar_core::IngestStore;

pub use sqlite::{SqliteStore, TableCounts};
