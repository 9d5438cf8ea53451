//! `edgar-ingest` command-line binary.
//!
//! Configuration comes from `EDGAR_*` environment variables (a `.env` file
//! is read first); flags given on the command line take precedence.
//!
//! ```text
//! edgar-ingest init
//! edgar-ingest seed --csv companies.csv
//! edgar-ingest all --cik 320193 --cik 789019
//! edgar-ingest frame us-gaap AccountsPayableCurrent USD CY2019Q1I
//! edgar-ingest search apple
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use edgar_ingest::config::{ENV_COMPANY_POLICY, ENV_CONCURRENCY, ENV_DATABASE, ENV_USER_AGENT};
use edgar_ingest::{
    Cik, CompanyConflictPolicy, Dataset, EdgarClient, FrameQuery, IdentifierSource, IngestConfig,
    IngestStore, MAX_SEARCH_RESULTS, Pipeline, RunSummary, SqliteStore, seed_companies,
};
use tracing::level_filters::LevelFilter;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "edgar-ingest", author, version, about = "Ingest SEC EDGAR data into SQLite")]
struct Cli {
    /// SQLite database path [env: EDGAR_DATABASE].
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Client identification sent to SEC, e.g. "Company admin@example.com" [env: EDGAR_USER_AGENT].
    #[arg(long, global = true)]
    user_agent: Option<String>,

    /// Identifiers processed at once [env: EDGAR_CONCURRENCY].
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Existing company rows: `ignore` or `overwrite` [env: EDGAR_COMPANY_POLICY].
    #[arg(long, global = true)]
    company_policy: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the database schema.
    Init,
    /// Upsert companies from a file without fetching anything.
    Seed(SeedArgs),
    /// Ingest company records and filing histories.
    Submissions(TargetArgs),
    /// Ingest XBRL financial facts for stored companies.
    Facts(TargetArgs),
    /// Ingest submissions, then financial facts.
    All(TargetArgs),
    /// Ingest one cross-entity frame.
    Frame {
        /// Taxonomy, e.g. `us-gaap`.
        taxonomy: String,
        /// Concept, e.g. `AccountsPayableCurrent`.
        tag: String,
        /// Unit of measure, e.g. `USD`.
        unit: String,
        /// Frame period, e.g. `CY2019Q1I`.
        period: String,
    },
    /// Find companies by name or ticker.
    Search {
        /// Case-insensitive substring.
        query: String,
        /// Maximum rows to print; capped at 10.
        #[arg(long, default_value_t = MAX_SEARCH_RESULTS)]
        limit: usize,
    },
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct SeedArgs {
    /// CSV file with a `cik` column and optional `name`, `ticker`.
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Bulk JSON file (`company_tickers.json` or a list of records).
    #[arg(long)]
    json: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct TargetArgs {
    /// Read identifiers from a CSV file.
    #[arg(long, conflicts_with_all = ["json", "ciks"])]
    csv: Option<PathBuf>,
    /// Read identifiers from a bulk JSON file.
    #[arg(long, conflicts_with = "ciks")]
    json: Option<PathBuf>,
    /// Identifier to ingest; may be repeated. Defaults to every stored company.
    #[arg(long = "cik", value_name = "CIK")]
    ciks: Vec<String>,
}

impl TargetArgs {
    fn source(&self) -> anyhow::Result<IdentifierSource> {
        if !self.ciks.is_empty() {
            let ciks = self
                .ciks
                .iter()
                .map(|raw| Cik::parse(raw))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(IdentifierSource::Explicit(ciks));
        }
        Ok(match (&self.csv, &self.json) {
            (Some(path), _) => IdentifierSource::Csv(path.clone()),
            (None, Some(path)) => IdentifierSource::Json(path.clone()),
            (None, None) => IdentifierSource::Stored,
        })
    }
}

impl Cli {
    /// Flag value for a configuration key, falling back to the environment.
    fn lookup(&self, key: &str) -> Option<String> {
        let flag = match key {
            ENV_DATABASE => self.database.as_ref().map(|p| p.display().to_string()),
            ENV_USER_AGENT => self.user_agent.clone(),
            ENV_CONCURRENCY => self.concurrency.map(|n| n.to_string()),
            ENV_COMPANY_POLICY => self.company_policy.clone(),
            _ => None,
        };
        flag.or_else(|| std::env::var(key).ok())
    }

    fn config(&self) -> anyhow::Result<IngestConfig> {
        IngestConfig::from_lookup(|key| self.lookup(key)).context("invalid configuration")
    }

    fn database(&self) -> PathBuf {
        IngestConfig::database_from_lookup(&|key: &str| self.lookup(key))
    }

    fn company_policy(&self) -> anyhow::Result<CompanyConflictPolicy> {
        IngestConfig::company_policy_from_lookup(&|key: &str| self.lookup(key))
            .context("invalid configuration")
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn open_store(path: &Path) -> anyhow::Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    Ok(Arc::new(store))
}

fn pipeline(config: &IngestConfig, store: Arc<SqliteStore>) -> anyhow::Result<Pipeline> {
    let client = EdgarClient::with_options(config.client_options())?;
    Ok(Pipeline::new(Arc::new(client), store, config.pipeline_options()))
}

fn print_summary(summary: &RunSummary) {
    println!("{summary}");
}

async fn ingest(cli: &Cli, target: &TargetArgs, dataset: Dataset) -> anyhow::Result<()> {
    let config = cli.config()?;
    let store = open_store(&config.database)?;
    let identifiers = target.source()?.load(store.as_ref()).await?;
    info!(count = identifiers.len(), dataset = %dataset, "Starting ingestion");

    let summary = pipeline(&config, store)?
        .ingest(&identifiers, dataset)
        .await
        .context("ingestion aborted (run `edgar-ingest init` if the schema is missing)")?;
    print_summary(&summary);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);
    if let Ok(path) = dotenv {
        debug!(path = %path.display(), "Loaded .env file");
    }
    debug!(?cli, "Parsed arguments");

    match &cli.command {
        Command::Init => {
            let path = cli.database();
            let store = open_store(&path)?;
            store.initialize_schema()?;
            info!(database = %path.display(), "Schema ready");
        }
        Command::Seed(args) => {
            let policy = cli.company_policy()?;
            let store = open_store(&cli.database())?;
            let source = match (&args.csv, &args.json) {
                (Some(path), _) => IdentifierSource::Csv(path.clone()),
                (None, Some(path)) => IdentifierSource::Json(path.clone()),
                (None, None) => anyhow::bail!("seed needs --csv or --json"),
            };
            let records = source.load(store.as_ref()).await?;
            let summary = seed_companies(store.as_ref(), &records, policy).await?;
            print_summary(&summary);
        }
        Command::Submissions(target) => ingest(&cli, target, Dataset::Submissions).await?,
        Command::Facts(target) => ingest(&cli, target, Dataset::CompanyFacts).await?,
        Command::All(target) => ingest(&cli, target, Dataset::All).await?,
        Command::Frame {
            taxonomy,
            tag,
            unit,
            period,
        } => {
            let config = cli.config()?;
            let store = open_store(&config.database)?;
            let query = FrameQuery::new(taxonomy, tag, unit, period);
            let summary = pipeline(&config, store)?.ingest_frame(&query).await?;
            print_summary(&summary);
        }
        Command::Search { query, limit } => {
            let store = open_store(&cli.database())?;
            for hit in store.search_companies(query, (*limit).min(MAX_SEARCH_RESULTS)).await? {
                println!("{}  {:<8}  {}", hit.cik, hit.ticker.as_deref().unwrap_or("-"), hit.name);
            }
        }
    }

    Ok(())
}
