//! SEC EDGAR API response types.
//!
//! These mirror the JSON served by `data.sec.gov` closely enough to survive
//! missing fields: everything a normalizer can live without is optional or
//! defaulted. Unknown fields are retained where they end up in metadata.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::Cik;

/// Response from `/submissions/CIK##########.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionsPayload {
    /// Entity name.
    #[serde(default, alias = "entityName")]
    pub name: Option<String>,
    /// Ticker symbols, most prominent first.
    #[serde(default, deserialize_with = "null_as_default")]
    pub tickers: Vec<Option<String>>,
    /// SIC code.
    #[serde(default, deserialize_with = "string_or_number")]
    pub sic: Option<String>,
    /// SIC description.
    #[serde(default)]
    pub sic_description: Option<String>,
    /// Filing history. Kept out of company metadata.
    #[serde(default, skip_serializing)]
    pub filings: Option<FilingsBlock>,
    /// Remaining top-level fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `filings` object of a submissions payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilingsBlock {
    /// The most recent filings as parallel arrays.
    #[serde(default)]
    pub recent: RecentFilings,
}

/// Column-oriented filing history: one array per attribute, joined by index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecentFilings {
    /// Columns keyed by attribute name (`form`, `filingDate`, `accessionNumber`, ...).
    #[serde(flatten)]
    pub columns: BTreeMap<String, Value>,
}

impl RecentFilings {
    /// Returns the array stored under `name`, or an empty slice.
    #[must_use]
    pub fn column(&self, name: &str) -> &[Value] {
        self.columns
            .get(name)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns the first of `names` that is present as an array.
    #[must_use]
    pub fn column_any(&self, names: &[&str]) -> &[Value] {
        names
            .iter()
            .find_map(|name| self.columns.get(*name).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Builds the `{column: value[index]}` object for one row.
    ///
    /// Columns shorter than `index` contribute `null`.
    #[must_use]
    pub fn row(&self, index: usize) -> Value {
        let row: Map<String, Value> = self
            .columns
            .iter()
            .filter_map(|(name, column)| {
                let values = column.as_array()?;
                Some((name.clone(), values.get(index).cloned().unwrap_or(Value::Null)))
            })
            .collect();
        Value::Object(row)
    }
}

/// Response from `/api/xbrl/companyfacts/CIK##########.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyFactsPayload {
    /// CIK number.
    #[serde(default, deserialize_with = "string_or_number")]
    pub cik: Option<String>,
    /// Entity name.
    #[serde(default)]
    pub entity_name: Option<String>,
    /// Facts organized by taxonomy, then concept.
    #[serde(default)]
    pub facts: BTreeMap<String, BTreeMap<String, ConceptFacts>>,
}

/// Facts for a single taxonomy concept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConceptFacts {
    /// Label.
    #[serde(default)]
    pub label: Option<String>,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Fact lists keyed by unit of measure.
    #[serde(default)]
    pub units: BTreeMap<String, Vec<FactEntry>>,
}

/// A single reported fact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactEntry {
    /// Period start, for duration facts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    /// Period end.
    #[serde(default)]
    pub end: Option<String>,
    /// Value.
    #[serde(default)]
    pub val: Option<f64>,
    /// Accession number of the reporting filing.
    #[serde(default)]
    pub accn: Option<String>,
    /// Fiscal year.
    #[serde(default)]
    pub fy: Option<i32>,
    /// Fiscal period (`FY`, `Q1`, ...).
    #[serde(default)]
    pub fp: Option<String>,
    /// Form type.
    #[serde(default)]
    pub form: Option<String>,
    /// Filed date.
    #[serde(default)]
    pub filed: Option<String>,
    /// Calendar frame, when the fact was chosen for one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<String>,
}

/// Response from `/api/xbrl/frames/{taxonomy}/{tag}/{unit}/{period}.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FramePayload {
    /// Taxonomy, e.g. `us-gaap`.
    #[serde(default)]
    pub taxonomy: Option<String>,
    /// Concept tag.
    #[serde(default)]
    pub tag: Option<String>,
    /// Calendar period, e.g. `CY2023Q1I`.
    #[serde(default)]
    pub ccp: Option<String>,
    /// Unit of measure.
    #[serde(default)]
    pub uom: Option<String>,
    /// Label.
    #[serde(default)]
    pub label: Option<String>,
    /// One observation per reporting entity.
    #[serde(default)]
    pub data: Vec<FrameEntry>,
}

/// One entity's observation within a frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameEntry {
    /// Accession number.
    #[serde(default)]
    pub accn: Option<String>,
    /// Entity name.
    #[serde(default)]
    pub entity_name: Option<String>,
    /// Location code.
    #[serde(default)]
    pub loc: Option<String>,
    /// Period start, for duration frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    /// Period end.
    #[serde(default)]
    pub end: Option<String>,
    /// Value.
    #[serde(default)]
    pub val: Option<f64>,
}

/// Coordinates of a frame resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameQuery {
    /// Taxonomy, e.g. `us-gaap`.
    pub taxonomy: String,
    /// Concept tag, e.g. `AccountsPayableCurrent`.
    pub tag: String,
    /// Unit, e.g. `USD` or `USD-per-shares`.
    pub unit: String,
    /// Calendar period, e.g. `CY2023Q1I`.
    pub period: String,
}

impl FrameQuery {
    /// Creates a frame query.
    #[must_use]
    pub fn new(
        taxonomy: impl Into<String>,
        tag: impl Into<String>,
        unit: impl Into<String>,
        period: impl Into<String>,
    ) -> Self {
        Self {
            taxonomy: taxonomy.into(),
            tag: tag.into(),
            unit: unit.into(),
            period: period.into(),
        }
    }

    /// Resource path relative to the API base.
    #[must_use]
    pub fn path(&self) -> String {
        format!(
            "/api/xbrl/frames/{}/{}/{}/{}.json",
            self.taxonomy, self.tag, self.unit, self.period
        )
    }
}

impl fmt::Display for FrameQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.taxonomy, self.tag, self.unit, self.period)
    }
}

/// Resource path of a company's submissions.
#[must_use]
pub fn submissions_path(cik: &Cik) -> String {
    format!("/submissions/CIK{cik}.json")
}

/// Resource path of a company's XBRL facts.
#[must_use]
pub fn company_facts_path(cik: &Cik) -> String {
    format!("/api/xbrl/companyfacts/CIK{cik}.json")
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts `"3571"`, `3571` or `null`.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_submissions_tolerates_missing_fields() {
        let payload: SubmissionsPayload = serde_json::from_value(json!({})).unwrap();
        assert!(payload.name.is_none());
        assert!(payload.tickers.is_empty());
        assert!(payload.filings.is_none());

        let raw = json!({"entityName": "Apple Inc.", "tickers": null, "sic": 3571});
        let payload: SubmissionsPayload = serde_json::from_value(raw).unwrap();
        assert_eq!(payload.name.as_deref(), Some("Apple Inc."));
        assert!(payload.tickers.is_empty());
        assert_eq!(payload.sic.as_deref(), Some("3571"));
    }

    #[test]
    fn test_submissions_metadata_excludes_filings() {
        let payload: SubmissionsPayload = serde_json::from_value(json!({
            "name": "Apple Inc.",
            "exchanges": ["Nasdaq"],
            "filings": {"recent": {"form": ["10-K"]}}
        }))
        .unwrap();
        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("filings").is_none());
        assert_eq!(value["exchanges"][0], "Nasdaq");
        assert_eq!(payload.filings.unwrap().recent.column("form").len(), 1);
    }

    #[test]
    fn test_recent_row_pads_short_columns() {
        let recent: RecentFilings = serde_json::from_value(json!({
            "form": ["10-K", "10-Q"],
            "filingDate": ["2023-11-03"],
            "size": 12
        }))
        .unwrap();
        let row = recent.row(1);
        assert_eq!(row["form"], "10-Q");
        assert!(row["filingDate"].is_null());
        assert!(row.get("size").is_none());
        assert_eq!(recent.column_any(&["date", "filingDate"]).len(), 1);
        assert!(recent.column("missing").is_empty());
    }

    #[test]
    fn test_fact_entry_with_null_fiscal_year() {
        let entry: FactEntry =
            serde_json::from_value(json!({"end": "2023-09-30", "val": 1.5, "fy": null})).unwrap();
        assert_eq!(entry.fy, None);
        assert_eq!(entry.val, Some(1.5));
    }

    #[test]
    fn test_paths() {
        let cik = Cik::parse("320193").unwrap();
        assert_eq!(submissions_path(&cik), "/submissions/CIK0000320193.json");
        assert_eq!(
            company_facts_path(&cik),
            "/api/xbrl/companyfacts/CIK0000320193.json"
        );
        let query = FrameQuery::new("us-gaap", "AccountsPayableCurrent", "USD", "CY2019Q1I");
        assert_eq!(
            query.path(),
            "/api/xbrl/frames/us-gaap/AccountsPayableCurrent/USD/CY2019Q1I.json"
        );
    }
}
