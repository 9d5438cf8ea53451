//! Core data types for EDGAR ingestion.
//!
//! This module defines the records the pipeline moves between stages:
//!
//! - [`Cik`] - Canonical 10-digit company identifier
//! - [`Company`] - Root entity, keyed by CIK
//! - [`Filing`] - A filing owned by a company
//! - [`FinancialFact`] - A reported value for one concept, owned by a company
//! - [`FrameFact`] - A frame observation not yet resolved to a company
//! - [`IdentifierRecord`] - One row from an identifier source
//! - [`CompanyMatch`] - One row of the company search surface

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{IngestError, Result};

/// Width of a canonical CIK.
pub const CIK_WIDTH: usize = 10;

/// A Central Index Key, always stored as a 10-character zero-padded string.
///
/// The EDGAR API only accepts the padded form in resource paths, so every
/// identifier is normalized on construction.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cik(String);

impl Cik {
    /// Parses and zero-pads a CIK.
    ///
    /// Accepts surrounding whitespace and an optional `CIK` prefix. Anything
    /// other than 1 to 10 ASCII digits is rejected.
    ///
    /// # Errors
    /// Returns [`IngestError::MalformedSource`] for empty, non-numeric or
    /// over-long input.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("CIK")
            .or_else(|| trimmed.strip_prefix("cik"))
            .unwrap_or(trimmed);

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IngestError::MalformedSource(format!("invalid CIK {raw:?}")));
        }
        if digits.len() > CIK_WIDTH {
            return Err(IngestError::MalformedSource(format!(
                "CIK {raw:?} is longer than {CIK_WIDTH} digits"
            )));
        }

        Ok(Self(format!("{digits:0>width$}", width = CIK_WIDTH)))
    }

    /// Builds a CIK from its numeric value.
    ///
    /// # Errors
    /// Returns [`IngestError::MalformedSource`] if the value needs more than 10 digits.
    pub fn from_u64(value: u64) -> Result<Self> {
        Self::parse(&value.to_string())
    }

    /// Returns the padded 10-character form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the numeric value, as used in archive URLs.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        // Construction guarantees at most 10 ASCII digits.
        self.0.parse().unwrap_or_default()
    }
}

impl fmt::Display for Cik {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Cik {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Cik {
    type Error = IngestError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Cik> for String {
    fn from(cik: Cik) -> Self {
        cik.0
    }
}

/// A company, the root entity of the relational model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Company {
    /// Canonical identifier; unique and immutable.
    pub cik: Cik,
    /// Display name.
    pub name: String,
    /// First ticker symbol, if the company has any.
    pub ticker: Option<String>,
    /// Standard Industrial Classification code.
    pub sic: Option<String>,
    /// Human-readable industry label.
    pub industry: Option<String>,
    /// Raw source payload.
    pub metadata: Value,
}

impl Company {
    /// Creates a company with no optional attributes and empty metadata.
    #[must_use]
    pub fn new(cik: Cik, name: impl Into<String>) -> Self {
        Self {
            cik,
            name: name.into(),
            ticker: None,
            sic: None,
            industry: None,
            metadata: Value::Object(serde_json::Map::new()),
        }
    }

    /// Sets the ticker symbol (uppercased).
    #[must_use]
    pub fn with_ticker(mut self, ticker: impl Into<String>) -> Self {
        self.ticker = Some(ticker.into().to_uppercase());
        self
    }

    /// Sets the SIC code.
    #[must_use]
    pub fn with_sic(mut self, sic: impl Into<String>) -> Self {
        self.sic = Some(sic.into());
        self
    }

    /// Sets the industry label.
    #[must_use]
    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    /// Sets the metadata payload.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A filing observed in a submissions payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filing {
    /// Date the filing was accepted.
    pub filing_date: NaiveDate,
    /// Form code, e.g. `10-K`.
    pub filing_type: String,
    /// Accession number as reported, e.g. `0000320193-23-000106`.
    pub accession_number: String,
    /// Archive index URL derived from the CIK and accession number.
    pub filing_url: String,
    /// Every column of the source row.
    pub metadata: Value,
}

/// A single reported value for one concept.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinancialFact {
    /// Fiscal year the value was reported in.
    pub year: i32,
    /// Taxonomy concept name, e.g. `Revenues`.
    pub line_item: String,
    /// Unit of measure, e.g. `USD` or `shares`.
    pub unit: String,
    /// Period discriminator: fiscal period and end date, or a frame period.
    pub period: String,
    /// Reported value.
    pub value: f64,
    /// Taxonomy, unit, label and the source fact object.
    pub metadata: Value,
}

/// A frame observation, identified by entity name rather than CIK.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameFact {
    /// Entity name as reported by the frame endpoint.
    pub entity_name: String,
    /// The fact to write once the entity is resolved.
    pub fact: FinancialFact,
}

/// One entry from an identifier source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierRecord {
    /// Normalized identifier.
    pub cik: Cik,
    /// Company name, when the source carries one.
    pub name: Option<String>,
    /// Ticker, when the source carries one.
    pub ticker: Option<String>,
    /// SIC code, when the source carries one.
    pub sic: Option<String>,
    /// Industry label, when the source carries one.
    pub industry: Option<String>,
}

impl IdentifierRecord {
    /// Creates a record holding only an identifier.
    #[must_use]
    pub const fn new(cik: Cik) -> Self {
        Self {
            cik,
            name: None,
            ticker: None,
            sic: None,
            industry: None,
        }
    }

    /// Converts this record into a company, if it carries a name.
    #[must_use]
    pub fn to_company(&self) -> Option<Company> {
        let name = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())?;
        let mut company = Company::new(self.cik.clone(), name);
        if let Some(ticker) = self.ticker.as_deref().filter(|t| !t.trim().is_empty()) {
            company = company.with_ticker(ticker.trim());
        }
        company.sic = self.sic.clone();
        company.industry = self.industry.clone();
        company.metadata = serde_json::to_value(self).unwrap_or(Value::Null);
        Some(company)
    }
}

/// One row of the company search surface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyMatch {
    /// Company name.
    pub name: String,
    /// Ticker symbol, if any.
    pub ticker: Option<String>,
    /// Canonical identifier.
    pub cik: String,
}

/// How a company upsert treats an existing row with the same CIK.
///
/// One policy is chosen per run and applied to every company write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompanyConflictPolicy {
    /// Keep the stored row untouched.
    Ignore,
    /// Refresh name, ticker, classification and metadata.
    #[default]
    Overwrite,
}

impl fmt::Display for CompanyConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ignore => f.write_str("ignore"),
            Self::Overwrite => f.write_str("overwrite"),
        }
    }
}

impl FromStr for CompanyConflictPolicy {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" | "nothing" => Ok(Self::Ignore),
            "overwrite" | "update" => Ok(Self::Overwrite),
            other => Err(IngestError::FatalConfig(format!(
                "unknown company conflict policy {other:?}"
            ))),
        }
    }
}
