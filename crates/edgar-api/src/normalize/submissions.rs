//! Submissions payload → company and filings.
//!
//! The filing history arrives column-oriented: `filings.recent` holds one
//! array per attribute and a filing is the set of values sharing an index.
//! Rows are rebuilt lazily by index. A row that cannot be rebuilt (an
//! index missing from one column, no accession number, an unparseable
//! date) is skipped on its own and never fails the payload.

use chrono::NaiveDate;
use edgar_core::{Cik, Company, Filing, IngestError, RecentFilings, Result, SubmissionsPayload};
use serde_json::Value;
use tracing::{debug, warn};

/// Filing archive root on www.sec.gov.
const ARCHIVE_BASE_URL: &str = "https://www.sec.gov/Archives/edgar/data";

const FORM_COLUMN: &str = "form";
const DATE_COLUMNS: [&str; 2] = ["filingDate", "date"];
const ACCESSION_COLUMN: &str = "accessionNumber";

/// A submissions payload split into its relational records.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSubmission {
    /// The company described by the payload.
    pub company: Company,
    /// Every filing row that survived normalization.
    pub filings: Vec<Filing>,
}

/// Normalizes a submissions payload into one company and its filings.
///
/// `fallback_name` is used when the payload carries no entity name, e.g.
/// the name from the identifier source.
///
/// # Errors
/// Returns [`IngestError::MalformedSource`] if no company name is available.
pub fn normalize_submissions(
    cik: &Cik,
    payload: &SubmissionsPayload,
    fallback_name: Option<&str>,
) -> Result<NormalizedSubmission> {
    let company = company_from_submissions(cik, payload, fallback_name)?;
    let filings = filings_from_submissions(cik, payload).collect();
    Ok(NormalizedSubmission { company, filings })
}

/// Builds the company record of a submissions payload.
///
/// # Errors
/// Returns [`IngestError::MalformedSource`] if no company name is available.
pub fn company_from_submissions(
    cik: &Cik,
    payload: &SubmissionsPayload,
    fallback_name: Option<&str>,
) -> Result<Company> {
    let name = non_empty(payload.name.as_deref())
        .or_else(|| non_empty(fallback_name))
        .ok_or_else(|| {
            IngestError::MalformedSource(format!("submissions for CIK {cik} carry no entity name"))
        })?;

    let mut company = Company::new(cik.clone(), name);
    if let Some(ticker) = non_empty(payload.tickers.first().and_then(|t| t.as_deref())) {
        company = company.with_ticker(ticker);
    }
    company.sic = payload.sic.clone();
    company.industry = non_empty(payload.sic_description.as_deref()).map(str::to_string);
    company.metadata = serde_json::to_value(payload)
        .map_err(|e| IngestError::MalformedSource(format!("CIK {cik}: {e}")))?;

    Ok(company)
}

/// Lazily rebuilds filing rows from the parallel arrays of `filings.recent`.
///
/// Rows with a null form or date are dropped silently.
pub fn filings_from_submissions<'a>(
    cik: &'a Cik,
    payload: &'a SubmissionsPayload,
) -> impl Iterator<Item = Filing> + 'a {
    let recent = payload.filings.as_ref().map(|block| &block.recent);
    let rows = recent.map_or(0, row_count);
    recent
        .into_iter()
        .flat_map(move |recent| (0..rows).filter_map(move |index| filing_at(cik, recent, index)))
}

/// Archive index URL for a filing.
#[must_use]
pub fn filing_url(cik: &Cik, accession_number: &str) -> String {
    format!(
        "{ARCHIVE_BASE_URL}/{}/{}/index.html",
        cik.as_u64(),
        accession_number.replace('-', "")
    )
}

fn row_count(recent: &RecentFilings) -> usize {
    [
        recent.column(FORM_COLUMN).len(),
        recent.column_any(&DATE_COLUMNS).len(),
        recent.column(ACCESSION_COLUMN).len(),
    ]
    .into_iter()
    .max()
    .unwrap_or(0)
}

fn filing_at(cik: &Cik, recent: &RecentFilings, index: usize) -> Option<Filing> {
    let forms = recent.column(FORM_COLUMN);
    let dates = recent.column_any(&DATE_COLUMNS);
    let accessions = recent.column(ACCESSION_COLUMN);

    let (Some(form), Some(date)) = (forms.get(index), dates.get(index)) else {
        warn!(cik = %cik, index, "Filing columns have mismatched lengths, skipping row");
        return None;
    };

    let (Some(form), Some(date)) = (non_empty(form.as_str()), non_empty(date.as_str())) else {
        debug!(cik = %cik, index, "Filing without date or type, dropping");
        return None;
    };

    let Some(accession) = non_empty(accessions.get(index).and_then(Value::as_str)) else {
        warn!(cik = %cik, index, form, "Filing without accession number, skipping row");
        return None;
    };

    let filing_date = match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Ok(d) => d,
        Err(e) => {
            warn!(cik = %cik, index, date, error = %e, "Unparseable filing date, skipping row");
            return None;
        }
    };

    Some(Filing {
        filing_date,
        filing_type: form.to_string(),
        accession_number: accession.to_string(),
        filing_url: filing_url(cik, accession),
        metadata: recent.row(index),
    })
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}
