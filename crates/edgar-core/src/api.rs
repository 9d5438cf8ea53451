//! Fetch client trait.
//!
//! [`EdgarApi`] is the seam between the pipeline and the network. The
//! production implementation lives in `edgar-api`; tests substitute canned
//! payloads.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Debug;

use crate::{
    error::{IngestError, Result},
    payload::{
        CompanyFactsPayload, FramePayload, FrameQuery, SubmissionsPayload, company_facts_path,
        submissions_path,
    },
    types::Cik,
};

/// Read access to the EDGAR data API.
///
/// Every method distinguishes three outcomes:
///
/// - `Ok(Some(payload))` - the resource was fetched and parsed
/// - `Ok(None)` - the resource is absent (non-success, non-retryable status)
/// - `Err(_)` - transient failure, malformed body, or fatal rejection
#[async_trait]
pub trait EdgarApi: Send + Sync + Debug {
    /// Fetches `path` (relative to the API base) as untyped JSON.
    async fn fetch_json(&self, path: &str) -> Result<Option<Value>>;

    /// Fetches a company's submissions payload.
    async fn submissions(&self, cik: &Cik) -> Result<Option<SubmissionsPayload>> {
        let path = submissions_path(cik);
        decode(&path, self.fetch_json(&path).await?)
    }

    /// Fetches a company's XBRL facts payload.
    async fn company_facts(&self, cik: &Cik) -> Result<Option<CompanyFactsPayload>> {
        let path = company_facts_path(cik);
        decode(&path, self.fetch_json(&path).await?)
    }

    /// Fetches one cross-entity frame.
    async fn frame(&self, query: &FrameQuery) -> Result<Option<FramePayload>> {
        let path = query.path();
        decode(&path, self.fetch_json(&path).await?)
    }
}

/// Converts fetched JSON into a typed payload.
///
/// # Errors
/// Returns [`IngestError::MalformedSource`] if the JSON does not match `T`.
pub fn decode<T: DeserializeOwned>(path: &str, value: Option<Value>) -> Result<Option<T>> {
    value
        .map(|v| {
            serde_json::from_value(v)
                .map_err(|e| IngestError::MalformedSource(format!("{path}: {e}")))
        })
        .transpose()
}
