#![doc(issue_tracker_base_url = "https://github.com/factordynamics/edgar-ingest/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! SEC EDGAR ingestion.
//!
//! This crate ties the fetch client and the store together. It provides:
//!
//! - [`IngestConfig`] - Run configuration from the environment
//! - [`IdentifierSource`] - CSV, bulk JSON, explicit or stored identifiers
//! - [`Pipeline`] - Fetch, normalize and write with bounded concurrency
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use edgar_ingest::{Dataset, EdgarClient, IdentifierSource, IngestConfig, Pipeline, SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> edgar_ingest::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let client = EdgarClient::with_options(config.client_options())?;
//!     let store = Arc::new(SqliteStore::open(&config.database)?);
//!     store.initialize_schema()?;
//!
//!     let identifiers = IdentifierSource::Stored.load(store.as_ref()).await?;
//!     let pipeline = Pipeline::new(Arc::new(client), store, config.pipeline_options());
//!     let summary = pipeline.ingest(&identifiers, Dataset::All).await?;
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```

// Core types and traits
pub use edgar_core::*;

pub use edgar_api::{BackoffPolicy, ClientOptions, EDGAR_BASE_URL, EdgarClient};
pub use edgar_store::{SqliteStore, TableCounts};

/// Run configuration.
pub mod config;
/// Ingestion orchestrator.
pub mod pipeline;
/// Identifier sources.
pub mod source;

pub use config::IngestConfig;
pub use pipeline::{
    Dataset, Outcome, Pipeline, PipelineOptions, RecordCounts, RunSummary, SkipReason, Stage,
    seed_companies,
};
pub use source::IdentifierSource;
