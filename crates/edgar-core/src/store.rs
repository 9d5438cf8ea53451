//! Persistence trait for normalized records.
//!
//! This module defines the [`IngestStore`] trait: idempotent, conflict-safe
//! writes keyed by natural identifiers, plus the lookups the pipeline needs
//! to attach child records to their parent company.

use async_trait::async_trait;

use crate::{
    error::Result,
    types::{Cik, Company, CompanyConflictPolicy, CompanyMatch, Filing, FinancialFact},
};

/// Most rows a company search returns, whatever limit the caller asks for.
pub const MAX_SEARCH_RESULTS: usize = 10;

/// Relational store for companies, filings and financial facts.
///
/// Each write touches exactly one row. Implementations must rely on the
/// backing database's conflict resolution so that concurrent writers racing
/// on the same natural key cannot produce duplicates.
#[async_trait]
pub trait IngestStore: Send + Sync {
    /// Fails with a fatal error if the expected tables are missing.
    async fn verify_schema(&self) -> Result<()>;

    /// Inserts or updates a company keyed by CIK and returns its row id.
    async fn upsert_company(&self, company: &Company, policy: CompanyConflictPolicy)
    -> Result<i64>;

    /// Inserts a filing unless `(company_id, accession_number)` already exists.
    ///
    /// Returns `true` if a row was inserted.
    async fn insert_filing(&self, company_id: i64, filing: &Filing) -> Result<bool>;

    /// Inserts a fact unless `(company_id, year, line_item, unit, period)` already exists.
    ///
    /// Returns `true` if a row was inserted.
    async fn insert_fact(&self, company_id: i64, fact: &FinancialFact) -> Result<bool>;

    /// Looks up a company's row id by CIK.
    async fn company_id(&self, cik: &Cik) -> Result<Option<i64>>;

    /// Resolves a frame entity: ticker first, then exact name, both case-insensitive.
    async fn resolve_entity(&self, entity: &str) -> Result<Option<i64>>;

    /// Lists every stored CIK in ascending order.
    async fn list_ciks(&self) -> Result<Vec<Cik>>;

    /// Case-insensitive substring search over name and ticker.
    ///
    /// Returns at most `limit` rows, never more than [`MAX_SEARCH_RESULTS`].
    async fn search_companies(&self, query: &str, limit: usize) -> Result<Vec<CompanyMatch>>;
}
