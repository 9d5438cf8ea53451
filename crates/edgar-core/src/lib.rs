#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for EDGAR ingestion.
//!
//! This crate provides the foundational abstractions shared by the fetch
//! client, the store and the pipeline:
//!
//! - [`EdgarApi`](api::EdgarApi) - Read access to the EDGAR data API
//! - [`IngestStore`](store::IngestStore) - Idempotent relational writes
//! - [`IngestError`](error::IngestError) - Error taxonomy
//! - [`Cik`](types::Cik) and the normalized record types

/// Fetch client trait.
pub mod api;
/// Error types for ingestion operations.
pub mod error;
/// Raw API response types.
pub mod payload;
/// Persistence trait.
pub mod store;
/// Core data types (Cik, Company, Filing, FinancialFact, ...).
pub mod types;

// Re-export commonly used items at crate root
pub use api::EdgarApi;
pub use error::{IngestError, Result};
pub use payload::{
    CompanyFactsPayload, ConceptFacts, FactEntry, FrameEntry, FramePayload, FrameQuery,
    RecentFilings, SubmissionsPayload,
};
pub use store::{IngestStore, MAX_SEARCH_RESULTS};
pub use types::{
    Cik, Company, CompanyConflictPolicy, CompanyMatch, Filing, FinancialFact, FrameFact,
    IdentifierRecord,
};
