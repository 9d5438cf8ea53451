//! Relational schema for ingested EDGAR data.
//!
//! `companies` is the root table; `filings` and `financials` reference it
//! and each carries a natural-key unique constraint that the upserts rely
//! on for idempotence.

/// Tables the pipeline writes to, parents first.
pub const TABLES: [&str; 3] = ["companies", "filings", "financials"];

pub(crate) const CREATE_COMPANIES: &str = "CREATE TABLE IF NOT EXISTS companies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    ticker TEXT,
    cik TEXT NOT NULL UNIQUE,
    sic TEXT,
    industry TEXT,
    metadata TEXT NOT NULL DEFAULT '{}'
)";

pub(crate) const CREATE_COMPANIES_TICKER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_companies_ticker ON companies(ticker)";

pub(crate) const CREATE_FILINGS: &str = "CREATE TABLE IF NOT EXISTS filings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id INTEGER NOT NULL REFERENCES companies(id),
    filing_date TEXT NOT NULL,
    filing_type TEXT NOT NULL,
    accession_number TEXT NOT NULL,
    filing_url TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    UNIQUE (company_id, accession_number)
)";

pub(crate) const CREATE_FINANCIALS: &str = "CREATE TABLE IF NOT EXISTS financials (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id INTEGER NOT NULL REFERENCES companies(id),
    year INTEGER NOT NULL,
    line_item TEXT NOT NULL,
    unit TEXT NOT NULL,
    period TEXT NOT NULL,
    value NUMERIC NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    UNIQUE (company_id, year, line_item, unit, period)
)";

pub(crate) const CREATE_FINANCIALS_LOOKUP_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_financials_company_year
     ON financials(company_id, year, line_item)";

/// Schema statements in dependency order.
pub(crate) const STATEMENTS: [&str; 5] = [
    CREATE_COMPANIES,
    CREATE_COMPANIES_TICKER_INDEX,
    CREATE_FILINGS,
    CREATE_FINANCIALS,
    CREATE_FINANCIALS_LOOKUP_INDEX,
];
