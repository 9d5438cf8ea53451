#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! SEC EDGAR fetch client and payload normalizers.
//!
//! This crate provides:
//!
//! - [`EdgarClient`] - rate-limited, retrying client for `data.sec.gov`
//! - [`normalize`] - pure transforms from submissions, company facts and
//!   frames into relational records
//!
//! # Example
//!
//! ```no_run
//! use edgar_api::{EdgarClient, normalize::normalize_submissions};
//! use edgar_core::{Cik, EdgarApi};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = EdgarClient::new("MyApp/1.0 (contact@example.com)")?;
//!     let cik = Cik::parse("320193")?;
//!
//!     if let Some(payload) = client.submissions(&cik).await? {
//!         let normalized = normalize_submissions(&cik, &payload, None)?;
//!         println!("{}: {} filings", normalized.company.name, normalized.filings.len());
//!     }
//!
//!     Ok(())
//! }
//! ```

/// HTTP client for the EDGAR data API.
pub mod client;
pub mod normalize;

pub use client::{BackoffPolicy, ClientOptions, EDGAR_BASE_URL, EdgarClient};
