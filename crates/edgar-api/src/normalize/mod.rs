//! Pure transforms from EDGAR payloads to relational records.
//!
//! - [`submissions`] - submissions → one company plus its filings
//! - [`facts`] - company facts → financial facts
//! - [`frames`] - frame → financial facts keyed by entity name

pub mod facts;
pub mod frames;
pub mod submissions;

pub use facts::{fact_period, normalize_company_facts};
pub use frames::{frame_year, normalize_frame};
pub use submissions::{
    NormalizedSubmission, company_from_submissions, filing_url, filings_from_submissions,
    normalize_submissions,
};
