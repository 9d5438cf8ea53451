//! Identifier sources.
//!
//! A source yields a finite, de-duplicated list of [`IdentifierRecord`]s.
//! A source that cannot be read at all (missing file, missing `cik` column,
//! unrecognized JSON shape) fails as a whole with
//! [`IngestError::MalformedSource`]; a single bad row is skipped with a
//! warning.

use edgar_core::{Cik, IdentifierRecord, IngestError, IngestStore, Result};
use polars::prelude::*;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const CIK_COLUMN: &str = "cik";
const NAME_COLUMN: &str = "name";
const TICKER_COLUMN: &str = "ticker";
const SIC_COLUMN: &str = "sic";
const INDUSTRY_COLUMN: &str = "industry";

/// Where the identifiers of a run come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierSource {
    /// CSV file with a `cik` column and optional `name`, `ticker`, `sic`, `industry`.
    Csv(PathBuf),
    /// Bulk JSON file, either SEC's `company_tickers.json` or a list of records.
    Json(PathBuf),
    /// Identifiers given directly.
    Explicit(Vec<Cik>),
    /// Every company already in the store.
    Stored,
}

impl IdentifierSource {
    /// Load the records of this source.
    ///
    /// # Errors
    /// Returns [`IngestError::MalformedSource`] if the source cannot be read,
    /// or the store's error for [`IdentifierSource::Stored`].
    pub async fn load(&self, store: &dyn IngestStore) -> Result<Vec<IdentifierRecord>> {
        let records = match self {
            Self::Csv(path) => read_csv(path)?,
            Self::Json(path) => read_json(path)?,
            Self::Explicit(ciks) => ciks.iter().cloned().map(IdentifierRecord::new).collect(),
            Self::Stored => store
                .list_ciks()
                .await?
                .into_iter()
                .map(IdentifierRecord::new)
                .collect(),
        };
        let records = dedup(records);
        debug!(source = ?self, count = records.len(), "Loaded identifiers");
        Ok(records)
    }
}

fn polars_error(path: &Path, e: PolarsError) -> IngestError {
    IngestError::MalformedSource(format!("{}: {e}", path.display()))
}

/// Read identifier records from a CSV file.
///
/// Every column is read as text so identifiers keep their leading zeros.
///
/// # Errors
/// Returns [`IngestError::MalformedSource`] if the file cannot be parsed or
/// has no `cik` column.
pub fn read_csv(path: &Path) -> Result<Vec<IdentifierRecord>> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(|e| polars_error(path, e))?
        .finish()
        .map_err(|e| polars_error(path, e))?;

    let column = |wanted: &str| -> Result<Option<StringChunked>> {
        let Some(name) = df
            .get_column_names()
            .into_iter()
            .find(|name| name.trim().eq_ignore_ascii_case(wanted))
            .map(|name| name.to_string())
        else {
            return Ok(None);
        };
        let values = df
            .column(&name)
            .and_then(|c| c.str().cloned())
            .map_err(|e| polars_error(path, e))?;
        Ok(Some(values))
    };

    let ciks = column(CIK_COLUMN)?.ok_or_else(|| {
        IngestError::MalformedSource(format!(
            "{}: missing required column {CIK_COLUMN:?}",
            path.display()
        ))
    })?;
    let names = column(NAME_COLUMN)?;
    let tickers = column(TICKER_COLUMN)?;
    let sics = column(SIC_COLUMN)?;
    let industries = column(INDUSTRY_COLUMN)?;

    let text = |values: &Option<StringChunked>, row: usize| -> Option<String> {
        values
            .as_ref()
            .and_then(|v| v.get(row))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let mut records = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let raw = ciks.get(row).unwrap_or_default();
        let cik = match Cik::parse(raw) {
            Ok(cik) => cik,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    row,
                    cik = raw,
                    error = %e,
                    "Skipping row with invalid CIK"
                );
                continue;
            }
        };
        records.push(IdentifierRecord {
            cik,
            name: text(&names, row),
            ticker: text(&tickers, row),
            sic: text(&sics, row),
            industry: text(&industries, row),
        });
    }
    Ok(records)
}

/// Entry of SEC's `company_tickers.json`.
#[derive(Debug, Deserialize)]
struct TickerEntry {
    cik_str: Option<Value>,
    ticker: Option<String>,
    title: Option<String>,
}

/// Entry of a plain record list.
#[derive(Debug, Deserialize)]
struct ListEntry {
    cik: Option<Value>,
    name: Option<String>,
    ticker: Option<String>,
    sic: Option<Value>,
    industry: Option<String>,
}

/// Read identifier records from a bulk JSON file.
///
/// # Errors
/// Returns [`IngestError::MalformedSource`] if the file cannot be read or is
/// neither a ticker mapping nor a record list.
pub fn read_json(path: &Path) -> Result<Vec<IdentifierRecord>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| IngestError::MalformedSource(format!("{}: {e}", path.display())))?;
    parse_json(&text)
        .map_err(|e| IngestError::MalformedSource(format!("{}: {e}", path.display())))
}

/// Parse identifier records from bulk JSON text.
///
/// Accepts `{"0": {"cik_str": 320193, "ticker": "AAPL", "title": "Apple Inc."}, ...}`
/// (kept in numeric key order) or `[{"cik": "320193", "name": ..., ...}, ...]`.
/// Entries that do not fit the record shape are skipped with a warning.
///
/// # Errors
/// Returns [`IngestError::MalformedSource`] if the text has neither shape.
pub fn parse_json(text: &str) -> Result<Vec<IdentifierRecord>> {
    let bulk: Value = serde_json::from_str(text)
        .map_err(|e| IngestError::MalformedSource(format!("invalid JSON: {e}")))?;

    let records = match bulk {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by_key(|(key, _)| (key.parse::<u64>().unwrap_or(u64::MAX), key.clone()));
            entries
                .into_iter()
                .filter_map(|(key, value)| {
                    let entry: TickerEntry = entry_from_value(&key, value)?;
                    let cik = cik_from_value(&key, entry.cik_str.as_ref())?;
                    Some(IdentifierRecord {
                        cik,
                        name: clean(entry.title),
                        ticker: clean(entry.ticker),
                        sic: None,
                        industry: None,
                    })
                })
                .collect()
        }
        Value::Array(list) => list
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| {
                let key = index.to_string();
                let entry: ListEntry = entry_from_value(&key, value)?;
                let cik = cik_from_value(&key, entry.cik.as_ref())?;
                Some(IdentifierRecord {
                    cik,
                    name: clean(entry.name),
                    ticker: clean(entry.ticker),
                    sic: entry.sic.as_ref().and_then(scalar_text),
                    industry: clean(entry.industry),
                })
            })
            .collect(),
        _ => {
            return Err(IngestError::MalformedSource(
                "expected a ticker mapping or a list of company records".to_string(),
            ));
        }
    };
    Ok(records)
}

fn entry_from_value<T: DeserializeOwned>(entry: &str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(entry, error = %e, "Skipping malformed identifier entry");
            None
        }
    }
}

fn cik_from_value(entry: &str, value: Option<&Value>) -> Option<Cik> {
    let parsed = match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| IngestError::MalformedSource(format!("invalid CIK {n}")))
            .and_then(Cik::from_u64),
        Some(Value::String(s)) => Cik::parse(s),
        Some(other) => Err(IngestError::MalformedSource(format!("invalid CIK {other}"))),
        None => Err(IngestError::MalformedSource("missing CIK".to_string())),
    };
    match parsed {
        Ok(cik) => Some(cik),
        Err(e) => {
            warn!(entry, error = %e, "Skipping identifier entry");
            None
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => clean(Some(s.clone())),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Drop repeated identifiers, keeping the first occurrence.
#[must_use]
pub fn dedup(records: Vec<IdentifierRecord>) -> Vec<IdentifierRecord> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|record| seen.insert(record.cik.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgar_core::{Company, CompanyConflictPolicy};
    use edgar_store::SqliteStore;
    use std::io::Write;

    fn write_temp(contents: &str, suffix: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_read_csv() {
        let file = write_temp(
            "name,ticker,cik\n\
             Apple Inc.,AAPL,320193\n\
             Microsoft Corp,MSFT,0000789019\n\
             Broken Row,BRK,N/A\n\
             Apple Inc.,AAPL,0000320193\n",
            ".csv",
        );
        let records = dedup(read_csv(file.path()).unwrap());

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].cik.as_str(), "0000320193");
        assert_eq!(records[0].name.as_deref(), Some("Apple Inc."));
        assert_eq!(records[0].ticker.as_deref(), Some("AAPL"));
        assert_eq!(records[1].cik.as_str(), "0000789019");
        assert!(records[1].sic.is_none());
    }

    #[test]
    fn test_csv_only_cik_required() {
        let file = write_temp("cik,extra\n320193,x\n\n", ".csv");
        let records = read_csv(file.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].name.is_none());
    }

    #[test]
    fn test_csv_missing_cik_column() {
        let file = write_temp("name,ticker\nApple Inc.,AAPL\n", ".csv");
        let err = read_csv(file.path()).unwrap_err();
        assert!(matches!(err, IngestError::MalformedSource(_)));
    }

    #[test]
    fn test_parse_company_tickers_mapping() {
        let records = parse_json(
            r#"{
                "0": {"cik_str": 320193, "ticker": "AAPL", "title": "Apple Inc."},
                "10": {"cik_str": "1045810", "ticker": "NVDA", "title": "NVIDIA CORP"},
                "2": {"cik_str": 789019, "ticker": "MSFT", "title": "MICROSOFT CORP"},
                "3": {"cik_str": null, "ticker": "???", "title": "Nobody"}
            }"#,
        )
        .unwrap();

        let ciks: Vec<&str> = records.iter().map(|r| r.cik.as_str()).collect();
        assert_eq!(ciks, ["0000320193", "0000789019", "0001045810"]);
        assert_eq!(records[0].name.as_deref(), Some("Apple Inc."));
    }

    #[test]
    fn test_parse_record_list() {
        let records = parse_json(
            r#"[
                {"name": "Apple Inc.", "ticker": "AAPL", "cik": "320193", "sic": 3571, "industry": "Electronic Computers"},
                {"name": "No Identifier"},
                {"name": "Apple again", "cik": 320193}
            ]"#,
        )
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sic.as_deref(), Some("3571"));
        assert_eq!(dedup(records).len(), 1);
    }

    #[test]
    fn test_parse_skips_mistyped_entries() {
        let records = parse_json(
            r#"[{"cik": "320193"}, {"cik": "789019", "ticker": 42}, {"cik": "1045810", "name": "NVIDIA CORP"}]"#,
        )
        .unwrap();
        let ciks: Vec<&str> = records.iter().map(|r| r.cik.as_str()).collect();
        assert_eq!(ciks, ["0000320193", "0001045810"]);

        let records = parse_json(
            r#"{"0": {"cik_str": 320193, "ticker": "AAPL", "title": "Apple Inc."}, "1": "MSFT"}"#,
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ticker.as_deref(), Some("AAPL"));
    }

    #[test]
    fn test_parse_unrecognized_json() {
        assert!(matches!(
            parse_json(r#""just a string""#),
            Err(IngestError::MalformedSource(_))
        ));
    }

    #[tokio::test]
    async fn test_load_stored_and_explicit() {
        let store = SqliteStore::in_memory().unwrap();
        for raw in ["789019", "320193"] {
            store
                .upsert_company(
                    &Company::new(Cik::parse(raw).unwrap(), raw),
                    CompanyConflictPolicy::Overwrite,
                )
                .await
                .unwrap();
        }

        let stored = IdentifierSource::Stored.load(&store).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].cik.as_str(), "0000320193");

        let explicit = IdentifierSource::Explicit(vec![
            Cik::parse("1").unwrap(),
            Cik::parse("0000000001").unwrap(),
        ])
        .load(&store)
        .await
        .unwrap();
        assert_eq!(explicit.len(), 1);
    }
}
