//! SQLite-based store implementation.

use async_trait::async_trait;
use edgar_core::{
    Cik, Company, CompanyConflictPolicy, CompanyMatch, Filing, FinancialFact, IngestError,
    IngestStore, MAX_SEARCH_RESULTS, Result,
};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, instrument, warn};

use crate::schema::{STATEMENTS, TABLES};

/// Maps a SQLite error onto the ingestion taxonomy.
///
/// A missing table means the schema was never applied, which no retry or
/// skip can fix.
fn db_error(e: rusqlite::Error) -> IngestError {
    let message = e.to_string();
    if message.contains("no such table") {
        IngestError::FatalConfig(format!("database schema not present: {message}"))
    } else {
        IngestError::Persistence(message)
    }
}

fn json_text(value: &serde_json::Value) -> Result<String> {
    serde_json::to_string(value).map_err(|e| IngestError::Persistence(e.to_string()))
}

/// Escapes `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    /// Rows in `companies`.
    pub companies: u64,
    /// Rows in `filings`.
    pub filings: u64,
    /// Rows in `financials`.
    pub financials: u64,
}

/// SQLite-backed store for companies, filings and financial facts.
///
/// Writes are serialized through a single connection; conflict clauses on
/// the natural keys make every write idempotent.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open the database at the given path.
    ///
    /// The schema is not created; call [`SqliteStore::initialize_schema`] or
    /// check it with [`IngestStore::verify_schema`].
    ///
    /// # Errors
    /// Returns [`IngestError::FatalConfig`] if the database cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            IngestError::FatalConfig(format!("cannot open database {}: {e}", path.display()))
        })?;
        Self::from_connection(conn)
    }

    /// Create an in-memory store with the schema applied.
    ///
    /// Useful for testing; data is lost when the store is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| IngestError::FatalConfig(e.to_string()))?;
        let store = Self::from_connection(conn)?;
        store.initialize_schema()?;
        Ok(store)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| IngestError::FatalConfig(e.to_string()))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| IngestError::FatalConfig(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| IngestError::Persistence(e.to_string()))
    }

    /// Create the tables and indexes if they do not exist.
    ///
    /// # Errors
    /// Returns [`IngestError::FatalConfig`] if a statement fails.
    pub fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        for statement in STATEMENTS {
            conn.execute(statement, [])
                .map_err(|e| IngestError::FatalConfig(e.to_string()))?;
        }
        debug!("SQLite schema initialized");
        Ok(())
    }

    /// Count rows in each table.
    ///
    /// # Errors
    /// Returns an error if a table is missing.
    pub fn table_counts(&self) -> Result<TableCounts> {
        let conn = self.lock()?;
        let count = |table: &str| -> Result<u64> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n.max(0) as u64)
            .map_err(db_error)
        };
        Ok(TableCounts {
            companies: count("companies")?,
            filings: count("filings")?,
            financials: count("financials")?,
        })
    }
}

#[async_trait]
impl IngestStore for SqliteStore {
    #[instrument(skip(self))]
    async fn verify_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        for table in TABLES {
            let present = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    params![table],
                    |_| Ok(()),
                )
                .optional()
                .map_err(db_error)?
                .is_some();
            if !present {
                return Err(IngestError::FatalConfig(format!(
                    "database schema not present: missing table {table}"
                )));
            }
        }
        Ok(())
    }

    #[instrument(skip(self, company, policy), fields(cik = %company.cik, policy = %policy))]
    async fn upsert_company(
        &self,
        company: &Company,
        policy: CompanyConflictPolicy,
    ) -> Result<i64> {
        let sql = match policy {
            CompanyConflictPolicy::Ignore => {
                "INSERT INTO companies (name, ticker, cik, sic, industry, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (cik) DO NOTHING"
            }
            CompanyConflictPolicy::Overwrite => {
                "INSERT INTO companies (name, ticker, cik, sic, industry, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (cik) DO UPDATE SET
                     name = excluded.name,
                     ticker = COALESCE(excluded.ticker, companies.ticker),
                     sic = COALESCE(excluded.sic, companies.sic),
                     industry = COALESCE(excluded.industry, companies.industry),
                     metadata = excluded.metadata"
            }
        };
        let metadata = json_text(&company.metadata)?;

        let conn = self.lock()?;
        let changed = conn
            .execute(
                sql,
                params![
                    company.name,
                    company.ticker,
                    company.cik.as_str(),
                    company.sic,
                    company.industry,
                    metadata
                ],
            )
            .map_err(db_error)?;

        let id = conn
            .query_row(
                "SELECT id FROM companies WHERE cik = ?1",
                params![company.cik.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .map_err(db_error)?;

        debug!(id, changed, "Upserted company");
        Ok(id)
    }

    #[instrument(skip(self, filing), fields(accession = %filing.accession_number))]
    async fn insert_filing(&self, company_id: i64, filing: &Filing) -> Result<bool> {
        let metadata = json_text(&filing.metadata)?;
        let conn = self.lock()?;
        let inserted = conn
            .execute(
                "INSERT INTO filings
                 (company_id, filing_date, filing_type, accession_number, filing_url, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (company_id, accession_number) DO NOTHING",
                params![
                    company_id,
                    filing.filing_date.format("%Y-%m-%d").to_string(),
                    filing.filing_type,
                    filing.accession_number,
                    filing.filing_url,
                    metadata
                ],
            )
            .map_err(db_error)?;
        Ok(inserted > 0)
    }

    #[instrument(skip(self, fact), fields(line_item = %fact.line_item, year = fact.year))]
    async fn insert_fact(&self, company_id: i64, fact: &FinancialFact) -> Result<bool> {
        let metadata = json_text(&fact.metadata)?;
        let conn = self.lock()?;
        let inserted = conn
            .execute(
                "INSERT INTO financials
                 (company_id, year, line_item, unit, period, value, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (company_id, year, line_item, unit, period) DO NOTHING",
                params![
                    company_id,
                    fact.year,
                    fact.line_item,
                    fact.unit,
                    fact.period,
                    fact.value,
                    metadata
                ],
            )
            .map_err(db_error)?;
        Ok(inserted > 0)
    }

    async fn company_id(&self, cik: &Cik) -> Result<Option<i64>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id FROM companies WHERE cik = ?1",
            params![cik.as_str()],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .map_err(db_error)
    }

    async fn resolve_entity(&self, entity: &str) -> Result<Option<i64>> {
        let entity = entity.trim();
        if entity.is_empty() {
            return Ok(None);
        }

        let conn = self.lock()?;
        let by_ticker = conn
            .query_row(
                "SELECT id FROM companies WHERE UPPER(ticker) = UPPER(?1) ORDER BY id LIMIT 1",
                params![entity],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map_err(db_error)?;
        if by_ticker.is_some() {
            return Ok(by_ticker);
        }

        conn.query_row(
            "SELECT id FROM companies WHERE LOWER(name) = LOWER(?1) ORDER BY id LIMIT 1",
            params![entity],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .map_err(db_error)
    }

    async fn list_ciks(&self) -> Result<Vec<Cik>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT cik FROM companies ORDER BY cik ASC")
            .map_err(db_error)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_error)?;

        let mut ciks = Vec::new();
        for row in rows {
            let raw = row.map_err(db_error)?;
            match Cik::parse(&raw) {
                Ok(cik) => ciks.push(cik),
                Err(e) => {
                    warn!(cik = %raw, error = %e, "Stored company has an invalid CIK, skipping");
                }
            }
        }
        debug!("Found {} stored companies", ciks.len());
        Ok(ciks)
    }

    #[instrument(skip(self))]
    async fn search_companies(&self, query: &str, limit: usize) -> Result<Vec<CompanyMatch>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(IngestError::MalformedSource("empty search query".to_string()));
        }

        let limit = i64::try_from(limit.min(MAX_SEARCH_RESULTS)).unwrap_or_default();
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT name, ticker, cik FROM companies
                 WHERE LOWER(name) LIKE ?1 ESCAPE '\\' OR LOWER(ticker) LIKE ?1 ESCAPE '\\'
                 ORDER BY name ASC
                 LIMIT ?2",
            )
            .map_err(db_error)?;
        let rows = stmt
            .query_map(
                params![like_pattern(query), limit],
                |row| {
                    Ok(CompanyMatch {
                        name: row.get(0)?,
                        ticker: row.get(1)?,
                        cik: row.get(2)?,
                    })
                },
            )
            .map_err(db_error)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn apple() -> Company {
        Company::new(Cik::parse("0000320193").unwrap(), "Apple Inc.")
            .with_ticker("AAPL")
            .with_metadata(json!({"source": "csv"}))
    }

    fn filing(accession: &str) -> Filing {
        Filing {
            filing_date: NaiveDate::from_ymd_opt(2023, 11, 3).unwrap(),
            filing_type: "10-K".to_string(),
            accession_number: accession.to_string(),
            filing_url: format!(
                "https://www.sec.gov/Archives/edgar/data/320193/{accession}/index.html"
            ),
            metadata: json!({"form": "10-K"}),
        }
    }

    fn fact(period: &str, value: f64) -> FinancialFact {
        FinancialFact {
            year: 2023,
            line_item: "Revenues".to_string(),
            unit: "USD".to_string(),
            period: period.to_string(),
            value,
            metadata: json!({"taxonomy": "us-gaap"}),
        }
    }

    #[tokio::test]
    async fn test_sqlite_store_initialization() {
        let store = SqliteStore::in_memory().unwrap();
        store.verify_schema().await.unwrap();
        assert_eq!(store.table_counts().unwrap(), TableCounts::default());
    }

    #[tokio::test]
    async fn test_missing_schema_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("empty.db")).unwrap();

        assert!(store.verify_schema().await.unwrap_err().is_fatal());
        let err = store
            .upsert_company(&apple(), CompanyConflictPolicy::Overwrite)
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_company_upsert_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();

        let first = store
            .upsert_company(&apple(), CompanyConflictPolicy::Ignore)
            .await
            .unwrap();
        let second = store
            .upsert_company(&apple(), CompanyConflictPolicy::Ignore)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.table_counts().unwrap().companies, 1);
        assert_eq!(
            store.company_id(&Cik::parse("320193").unwrap()).await.unwrap(),
            Some(first)
        );
    }

    #[tokio::test]
    async fn test_conflict_policies() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .upsert_company(&apple(), CompanyConflictPolicy::Overwrite)
            .await
            .unwrap();

        let renamed = Company::new(Cik::parse("320193").unwrap(), "Apple Computer, Inc.")
            .with_sic("3571");
        store
            .upsert_company(&renamed, CompanyConflictPolicy::Ignore)
            .await
            .unwrap();
        let hits = store.search_companies("apple", 10).await.unwrap();
        assert_eq!(hits[0].name, "Apple Inc.");

        store
            .upsert_company(&renamed, CompanyConflictPolicy::Overwrite)
            .await
            .unwrap();
        let hits = store.search_companies("apple", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Apple Computer, Inc.");
        // A payload without a ticker does not erase the stored one.
        assert_eq!(hits[0].ticker.as_deref(), Some("AAPL"));
    }

    #[tokio::test]
    async fn test_filing_insert_or_ignore() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store
            .upsert_company(&apple(), CompanyConflictPolicy::Overwrite)
            .await
            .unwrap();

        assert!(store.insert_filing(id, &filing("0000320193-23-000106")).await.unwrap());
        assert!(!store.insert_filing(id, &filing("0000320193-23-000106")).await.unwrap());
        assert!(store.insert_filing(id, &filing("0000320193-23-000077")).await.unwrap());
        assert_eq!(store.table_counts().unwrap().filings, 2);
    }

    #[tokio::test]
    async fn test_fact_natural_key() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store
            .upsert_company(&apple(), CompanyConflictPolicy::Overwrite)
            .await
            .unwrap();

        assert!(store.insert_fact(id, &fact("FY 2022-09-25..2023-09-30", 383.0)).await.unwrap());
        assert!(!store.insert_fact(id, &fact("FY 2022-09-25..2023-09-30", 383.0)).await.unwrap());
        // Quarterly components of the same year and concept are kept apart.
        assert!(store.insert_fact(id, &fact("Q1 2022-09-25..2022-12-31", 117.0)).await.unwrap());
        assert!(store.insert_fact(id, &fact("Q2 2023-01-01..2023-04-01", 94.0)).await.unwrap());
        assert_eq!(store.table_counts().unwrap().financials, 3);
    }

    #[tokio::test]
    async fn test_foreign_key_violation_is_persistence_error() {
        let store = SqliteStore::in_memory().unwrap();

        let err = store.insert_filing(999, &filing("a-1")).await.unwrap_err();
        assert!(matches!(err, IngestError::Persistence(_)));
        let err = store.insert_fact(999, &fact("FY", 1.0)).await.unwrap_err();
        assert!(matches!(err, IngestError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_resolve_entity() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store
            .upsert_company(&apple(), CompanyConflictPolicy::Overwrite)
            .await
            .unwrap();

        assert_eq!(store.resolve_entity("aapl").await.unwrap(), Some(id));
        assert_eq!(store.resolve_entity("APPLE INC.").await.unwrap(), Some(id));
        assert_eq!(store.resolve_entity("AAR CORP.").await.unwrap(), None);
        assert_eq!(store.resolve_entity("  ").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_search_companies() {
        let store = SqliteStore::in_memory().unwrap();
        for i in 0..12 {
            let company = Company::new(Cik::from_u64(1000 + i).unwrap(), format!("Acme {i:02}"))
                .with_ticker(format!("ACM{i}"));
            store
                .upsert_company(&company, CompanyConflictPolicy::Overwrite)
                .await
                .unwrap();
        }
        store
            .upsert_company(&apple(), CompanyConflictPolicy::Overwrite)
            .await
            .unwrap();

        assert_eq!(store.search_companies("ACME", 10).await.unwrap().len(), 10);
        assert_eq!(store.search_companies("ACME", 50).await.unwrap().len(), 10);
        assert_eq!(store.search_companies("ACME", 3).await.unwrap().len(), 3);
        let by_ticker = store.search_companies("aap", 10).await.unwrap();
        assert_eq!(by_ticker.len(), 1);
        assert_eq!(by_ticker[0].cik, "0000320193");
        assert!(store.search_companies("100%", 10).await.unwrap().is_empty());
        assert!(store.search_companies(" ", 10).await.is_err());
    }

    #[tokio::test]
    async fn test_list_ciks_sorted() {
        let store = SqliteStore::in_memory().unwrap();
        for raw in ["789019", "320193", "21344"] {
            let company = Company::new(Cik::parse(raw).unwrap(), raw);
            store
                .upsert_company(&company, CompanyConflictPolicy::Ignore)
                .await
                .unwrap();
        }
        let ciks: Vec<String> = store
            .list_ciks()
            .await
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(ciks, ["0000021344", "0000320193", "0000789019"]);
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("Apple"), "%apple%");
        assert_eq!(like_pattern("100%_"), "%100\\%\\_%");
    }
}
