//! Frame payload → financial facts keyed by entity name.
//!
//! The frame endpoint does not return the canonical identifier the store is
//! keyed by, so each observation carries the reporting entity's name and is
//! resolved to a company at write time.

use edgar_core::{FinancialFact, FrameEntry, FramePayload, FrameQuery, FrameFact};
use serde_json::json;
use tracing::{debug, warn};

/// Lazily converts a frame into one [`FrameFact`] per observation.
///
/// Tag, unit and period come from the payload, falling back to the query.
/// If no fiscal year can be read from the period, the frame yields nothing.
pub fn normalize_frame<'a>(
    query: &'a FrameQuery,
    payload: &'a FramePayload,
) -> impl Iterator<Item = FrameFact> + 'a {
    let period = payload.ccp.as_deref().unwrap_or(&query.period);
    let year = frame_year(period);
    if year.is_none() {
        warn!(frame = %query, period, "Cannot derive a year from frame period, skipping frame");
    }

    let tag = payload.tag.as_deref().unwrap_or(&query.tag);
    let unit = payload.uom.as_deref().unwrap_or(&query.unit);
    let taxonomy = payload.taxonomy.as_deref().unwrap_or(&query.taxonomy);

    year.into_iter().flat_map(move |year| {
        payload
            .data
            .iter()
            .filter_map(move |entry| frame_fact(taxonomy, tag, unit, period, year, entry))
    })
}

/// Reads the calendar year from a frame period such as `CY2023`, `CY2023Q1` or `CY2023Q1I`.
#[must_use]
pub fn frame_year(period: &str) -> Option<i32> {
    let digits = period.trim().strip_prefix("CY")?.get(..4)?;
    if digits.bytes().all(|b| b.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

fn frame_fact(
    taxonomy: &str,
    tag: &str,
    unit: &str,
    period: &str,
    year: i32,
    entry: &FrameEntry,
) -> Option<FrameFact> {
    let entity = entry.entity_name.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let (Some(entity_name), Some(value)) = (entity, entry.val) else {
        debug!(tag, period, "Frame entry without entity name or value, skipping");
        return None;
    };

    Some(FrameFact {
        entity_name: entity_name.to_string(),
        fact: FinancialFact {
            year,
            line_item: tag.to_string(),
            unit: unit.to_string(),
            period: period.to_string(),
            value,
            metadata: json!({
                "taxonomy": taxonomy,
                "unit": unit,
                "frame": period,
                "entry": entry,
            }),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn payload(value: Value) -> FramePayload {
        serde_json::from_value(value).unwrap()
    }

    fn query() -> FrameQuery {
        FrameQuery::new("us-gaap", "AccountsPayableCurrent", "USD", "CY2019Q1I")
    }

    #[test]
    fn test_frame_year() {
        assert_eq!(frame_year("CY2019Q1I"), Some(2019));
        assert_eq!(frame_year("CY2023"), Some(2023));
        assert_eq!(frame_year("FY2023"), None);
        assert_eq!(frame_year("CY20"), None);
        assert_eq!(frame_year("CYabcd"), None);
    }

    #[test]
    fn test_one_fact_per_entry() {
        let p = payload(json!({
            "taxonomy": "us-gaap",
            "tag": "AccountsPayableCurrent",
            "ccp": "CY2019Q1I",
            "uom": "USD",
            "label": "Accounts Payable, Current",
            "pts": 3,
            "data": [
                {"accn": "0001104659-19-016320", "cik": 1750, "entityName": "AAR CORP.", "loc": "US-IL", "end": "2019-02-28", "val": 218_600_000},
                {"accn": "0001264931-19-000023", "cik": 1800, "entityName": "ABBOTT LABORATORIES", "loc": "US-IL", "end": "2019-03-31", "val": 3_078_000_000_u64},
                {"accn": "x", "cik": 1, "entityName": "  ", "val": 1}
            ]
        }));

        let facts: Vec<_> = normalize_frame(&query(), &p).collect();
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].entity_name, "AAR CORP.");
        assert_eq!(facts[0].fact.year, 2019);
        assert_eq!(facts[0].fact.line_item, "AccountsPayableCurrent");
        assert_eq!(facts[0].fact.unit, "USD");
        assert_eq!(facts[0].fact.period, "CY2019Q1I");
        assert_eq!(facts[0].fact.value, 218_600_000.0);
        assert_eq!(facts[0].fact.metadata["entry"]["loc"], "US-IL");
    }

    #[test]
    fn test_falls_back_to_query_coordinates() {
        let p = payload(json!({"data": [{"entityName": "AAR CORP.", "val": 5}]}));
        let facts: Vec<_> = normalize_frame(&query(), &p).collect();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].fact.period, "CY2019Q1I");
        assert_eq!(facts[0].fact.metadata["taxonomy"], "us-gaap");
    }

    #[test]
    fn test_unreadable_period_yields_nothing() {
        let q = FrameQuery::new("us-gaap", "Revenues", "USD", "latest");
        let p = payload(json!({"data": [{"entityName": "AAR CORP.", "val": 5}]}));
        assert_eq!(normalize_frame(&q, &p).count(), 0);
    }
}
