//! Company-facts payload → financial facts.

use edgar_core::{CompanyFactsPayload, ConceptFacts, FactEntry, FinancialFact};
use serde_json::json;
use tracing::debug;

/// Lazily flattens taxonomy → concept → unit → fact into [`FinancialFact`]s.
///
/// Every taxonomy in the payload is visited (`us-gaap`, `dei`, `ifrs-full`,
/// ...). Concepts or units with empty fact lists contribute nothing. Facts
/// without a fiscal year or a value are skipped.
pub fn normalize_company_facts(
    payload: &CompanyFactsPayload,
) -> impl Iterator<Item = FinancialFact> + '_ {
    payload.facts.iter().flat_map(|(taxonomy, concepts)| {
        concepts.iter().flat_map(move |(concept, details)| {
            details.units.iter().flat_map(move |(unit, entries)| {
                entries
                    .iter()
                    .filter_map(move |entry| {
                        fact_from_entry(taxonomy, concept, details, unit, entry)
                    })
            })
        })
    })
}

/// Period discriminator for a fact: fiscal period plus the covered dates.
///
/// A 10-K reports the current and prior years under the same fiscal year,
/// so the year alone does not identify a value.
#[must_use]
pub fn fact_period(entry: &FactEntry) -> String {
    let fp = entry.fp.as_deref().unwrap_or("NA");
    let end = entry.end.as_deref().unwrap_or("");
    match entry.start.as_deref() {
        Some(start) => format!("{fp} {start}..{end}"),
        None => format!("{fp} {end}"),
    }
}

fn fact_from_entry(
    taxonomy: &str,
    concept: &str,
    details: &ConceptFacts,
    unit: &str,
    entry: &FactEntry,
) -> Option<FinancialFact> {
    let (Some(year), Some(value)) = (entry.fy, entry.val) else {
        debug!(taxonomy, concept, unit, "Fact without fiscal year or value, skipping");
        return None;
    };

    let period = fact_period(entry);
    Some(FinancialFact {
        year,
        line_item: concept.to_string(),
        unit: unit.to_string(),
        metadata: json!({
            "taxonomy": taxonomy,
            "unit": unit,
            "label": details.label,
            "period": period,
            "fact": entry,
        }),
        period,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn payload(value: Value) -> CompanyFactsPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_flattens_every_fact() {
        let p = payload(json!({
            "cik": 320193,
            "entityName": "Apple Inc.",
            "facts": {
                "dei": {
                    "EntityCommonStockSharesOutstanding": {
                        "label": "Entity Common Stock, Shares Outstanding",
                        "units": {"shares": [
                            {"end": "2023-10-20", "val": 15_552_752_000_u64, "fy": 2023, "fp": "FY", "form": "10-K"}
                        ]}
                    }
                },
                "us-gaap": {
                    "Revenues": {
                        "label": "Revenues",
                        "units": {"USD": [
                            {"start": "2022-09-25", "end": "2023-09-30", "val": 383_285_000_000_u64, "fy": 2023, "fp": "FY", "form": "10-K", "accn": "0000320193-23-000106"},
                            {"start": "2022-12-25", "end": "2023-04-01", "val": 94_836_000_000_u64, "fy": 2023, "fp": "Q2", "form": "10-Q"}
                        ]}
                    }
                }
            }
        }));

        let facts: Vec<_> = normalize_company_facts(&p).collect();
        assert_eq!(facts.len(), 3);

        let annual = facts
            .iter()
            .find(|f| f.line_item == "Revenues" && f.period.starts_with("FY"))
            .unwrap();
        assert_eq!(annual.year, 2023);
        assert_eq!(annual.unit, "USD");
        assert_eq!(annual.value, 383_285_000_000.0);
        assert_eq!(annual.period, "FY 2022-09-25..2023-09-30");
        assert_eq!(annual.metadata["taxonomy"], "us-gaap");
        assert_eq!(annual.metadata["fact"]["accn"], "0000320193-23-000106");

        let shares = facts.iter().find(|f| f.unit == "shares").unwrap();
        assert_eq!(shares.metadata["taxonomy"], "dei");
        assert_eq!(shares.period, "FY 2023-10-20");
    }

    #[test]
    fn test_empty_fact_list_yields_nothing() {
        let p = payload(json!({
            "facts": {"us-gaap": {
                "Revenues": {"label": "Revenues", "units": {"USD": []}},
                "Assets": {"label": "Assets", "units": {}},
                "Liabilities": {"label": "Liabilities"}
            }}
        }));
        assert_eq!(normalize_company_facts(&p).count(), 0);
    }

    #[test]
    fn test_skips_facts_without_year_or_value() {
        let p = payload(json!({
            "facts": {"us-gaap": {"Assets": {"units": {"USD": [
                {"end": "2009-06-27", "val": 1.0, "fy": null},
                {"end": "2010-06-26", "fy": 2010},
                {"end": "2011-06-25", "val": 3.0, "fy": 2011, "fp": "Q3"}
            ]}}}}
        }));
        let facts: Vec<_> = normalize_company_facts(&p).collect();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].year, 2011);
        assert_eq!(facts[0].period, "Q3 2011-06-25");
    }

    #[test]
    fn test_missing_facts_object() {
        let p = payload(json!({"cik": "320193"}));
        assert_eq!(normalize_company_facts(&p).count(), 0);
    }
}
