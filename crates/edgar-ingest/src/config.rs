//! Run configuration.
//!
//! Built once at startup and passed by reference; library code never reads
//! the environment on its own.

use edgar_api::{BackoffPolicy, ClientOptions, EDGAR_BASE_URL};
use edgar_core::{CompanyConflictPolicy, IngestError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::pipeline::PipelineOptions;

/// Environment variable holding the client identification.
pub const ENV_USER_AGENT: &str = "EDGAR_USER_AGENT";
/// Environment variable overriding the API base URL.
pub const ENV_BASE_URL: &str = "EDGAR_BASE_URL";
/// Environment variable holding the SQLite database path.
pub const ENV_DATABASE: &str = "EDGAR_DATABASE";
/// Environment variable holding the request timeout in seconds.
pub const ENV_TIMEOUT_SECS: &str = "EDGAR_TIMEOUT_SECS";
/// Environment variable holding the retry count.
pub const ENV_MAX_RETRIES: &str = "EDGAR_MAX_RETRIES";
/// Environment variable holding the number of identifiers processed at once.
pub const ENV_CONCURRENCY: &str = "EDGAR_CONCURRENCY";
/// Environment variable holding the minimum spacing between requests in milliseconds.
pub const ENV_RATE_LIMIT_MS: &str = "EDGAR_RATE_LIMIT_MS";
/// Environment variable holding the company conflict policy.
pub const ENV_COMPANY_POLICY: &str = "EDGAR_COMPANY_POLICY";

const DEFAULT_DATABASE: &str = "edgar.db";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RATE_LIMIT_MS: u64 = 100;

/// Everything a run needs to know before it starts.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Client identification sent with every request. Required.
    pub user_agent: String,
    /// API base URL.
    pub base_url: String,
    /// SQLite database path.
    pub database: PathBuf,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries for transient failures.
    pub max_retries: u32,
    /// Identifiers processed at once.
    pub concurrency: usize,
    /// Minimum spacing between requests.
    pub rate_limit: Duration,
    /// What a company upsert does when the CIK already exists.
    pub company_policy: CompanyConflictPolicy,
}

impl IngestConfig {
    /// Defaults with the given user agent.
    #[must_use]
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            base_url: EDGAR_BASE_URL.to_string(),
            database: PathBuf::from(DEFAULT_DATABASE),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: BackoffPolicy::default().max_retries,
            concurrency: PipelineOptions::default().concurrency,
            rate_limit: Duration::from_millis(DEFAULT_RATE_LIMIT_MS),
            company_policy: CompanyConflictPolicy::default(),
        }
    }

    /// Load from the process environment, after reading a `.env` file if present.
    ///
    /// # Errors
    /// Returns [`IngestError::FatalConfig`] if the user agent is missing or a
    /// value cannot be parsed.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    ///
    /// Unset and blank values fall back to the defaults.
    ///
    /// # Errors
    /// Returns [`IngestError::FatalConfig`] if the user agent is missing or a
    /// value cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let user_agent = get(ENV_USER_AGENT).ok_or_else(|| {
            IngestError::FatalConfig(format!(
                "{ENV_USER_AGENT} is not set; SEC requires a client identification such as \"Company admin@example.com\""
            ))
        })?;

        let mut config = Self::new(user_agent);
        if let Some(base_url) = get(ENV_BASE_URL) {
            config.base_url = base_url;
        }
        config.database = Self::database_from_lookup(&lookup);
        if let Some(secs) = parse_var::<u64>(ENV_TIMEOUT_SECS, get(ENV_TIMEOUT_SECS))? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = parse_var(ENV_MAX_RETRIES, get(ENV_MAX_RETRIES))? {
            config.max_retries = retries;
        }
        if let Some(concurrency) = parse_var(ENV_CONCURRENCY, get(ENV_CONCURRENCY))? {
            config.concurrency = concurrency;
        }
        if let Some(ms) = parse_var::<u64>(ENV_RATE_LIMIT_MS, get(ENV_RATE_LIMIT_MS))? {
            config.rate_limit = Duration::from_millis(ms);
        }
        config.company_policy = Self::company_policy_from_lookup(&lookup)?;

        config.validate()?;
        Ok(config)
    }

    /// Database path alone, for commands that never reach the network.
    #[must_use]
    pub fn database_from_lookup<F>(lookup: &F) -> PathBuf
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup(ENV_DATABASE)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_DATABASE), PathBuf::from)
    }

    /// Company conflict policy alone, for commands that never reach the network.
    ///
    /// # Errors
    /// Returns [`IngestError::FatalConfig`] if the value is not a known policy.
    pub fn company_policy_from_lookup<F>(lookup: &F) -> Result<CompanyConflictPolicy>
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup(ENV_COMPANY_POLICY)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map_or_else(|| Ok(CompanyConflictPolicy::default()), |v| v.parse())
    }

    /// Reject values no run can work with.
    ///
    /// # Errors
    /// Returns [`IngestError::FatalConfig`] describing the first bad value.
    pub fn validate(&self) -> Result<()> {
        if self.user_agent.trim().is_empty() {
            return Err(IngestError::FatalConfig("user agent must not be empty".to_string()));
        }
        if self.concurrency == 0 {
            return Err(IngestError::FatalConfig("concurrency must be at least 1".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(IngestError::FatalConfig("timeout must be positive".to_string()));
        }
        Ok(())
    }

    /// Fetch client settings derived from this configuration.
    #[must_use]
    pub fn client_options(&self) -> ClientOptions {
        let mut options = ClientOptions::new(self.user_agent.clone());
        options.base_url = self.base_url.clone();
        options.timeout = self.timeout;
        options.rate_limit = self.rate_limit;
        options.backoff.max_retries = self.max_retries;
        options
    }

    /// Pipeline settings derived from this configuration.
    #[must_use]
    pub const fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            concurrency: self.concurrency,
            company_policy: self.company_policy,
        }
    }
}

fn parse_var<T: FromStr>(key: &str, value: Option<String>) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    value
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| IngestError::FatalConfig(format!("{key}={raw:?}: {e}")))
        })
        .transpose()
}
