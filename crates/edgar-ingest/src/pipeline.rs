//! Ingestion orchestrator.
//!
//! The [`Pipeline`] drives identifiers through fetch, normalize and write.
//! Every identifier moves through `Pending -> Fetched -> Normalized ->
//! Written` or stops as skipped at the stage it reached. Failures are
//! scoped: a bad record does not stop its siblings, a bad identifier does
//! not stop the run. Only [`IngestError::FatalConfig`] stops the run, after
//! which identifiers that have not started are reported as cancelled.

use edgar_api::normalize::{
    company_from_submissions, filings_from_submissions, normalize_company_facts, normalize_frame,
};
use edgar_core::{
    CompanyConflictPolicy, EdgarApi, FrameQuery, IdentifierRecord, IngestError, IngestStore,
    Result,
};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, instrument, warn};

/// Default number of identifiers processed at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Which per-company resources to ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    /// Company record and filing history.
    Submissions,
    /// XBRL financial facts.
    CompanyFacts,
    /// Submissions, then company facts.
    All,
}

impl Dataset {
    fn parts(self) -> &'static [Self] {
        match self {
            Self::Submissions => &[Self::Submissions],
            Self::CompanyFacts => &[Self::CompanyFacts],
            Self::All => &[Self::Submissions, Self::CompanyFacts],
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submissions => f.write_str("submissions"),
            Self::CompanyFacts => f.write_str("companyfacts"),
            Self::All => f.write_str("all"),
        }
    }
}

/// Progress of one identifier through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Not fetched yet.
    Pending,
    /// Raw payload retrieved.
    Fetched,
    /// Payload converted into records.
    Normalized,
    /// Records handed to the store.
    Written,
}

/// Why an identifier or record produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SkipReason {
    /// The source or the store has no such entity.
    NotFound,
    /// The payload or source row is missing required data.
    MalformedSource,
    /// The fetch failed after every retry.
    TransientFetch,
    /// The store rejected the write.
    Persistence,
}

impl SkipReason {
    /// The skip reason for a non-fatal error; `None` for a fatal one.
    #[must_use]
    pub const fn for_error(error: &IngestError) -> Option<Self> {
        match error {
            IngestError::NotFound(_) => Some(Self::NotFound),
            IngestError::MalformedSource(_) => Some(Self::MalformedSource),
            IngestError::TransientFetch { .. } => Some(Self::TransientFetch),
            IngestError::Persistence(_) => Some(Self::Persistence),
            IngestError::FatalConfig(_) => None,
        }
    }

    /// Short label used in logs and summaries.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::MalformedSource => "malformed_source",
            Self::TransientFetch => "transient_fetch",
            Self::Persistence => "persistence",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-record write counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounts {
    /// Company rows upserted.
    pub companies: usize,
    /// Rows newly written.
    pub inserted: usize,
    /// Rows whose natural key already existed.
    pub unchanged: usize,
    /// Rows the store rejected.
    pub failed: usize,
    /// Frame observations that matched no stored company.
    pub unresolved: usize,
}

impl RecordCounts {
    fn add(&mut self, other: Self) {
        self.companies += other.companies;
        self.inserted += other.inserted;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
        self.unresolved += other.unresolved;
    }

    fn track(&mut self, written: Result<bool>) -> Result<()> {
        match written {
            Ok(true) => self.inserted += 1,
            Ok(false) => self.unchanged += 1,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Record write failed");
                self.failed += 1;
            }
        }
        Ok(())
    }
}

/// Final state of one unit of work (an identifier and dataset, or a frame).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Every record was written or already present.
    Written(RecordCounts),
    /// Some records were written and some were rejected.
    Partial(RecordCounts),
    /// Nothing was written, including a unit whose every record was rejected.
    Skipped {
        /// Last stage reached.
        stage: Stage,
        /// Why processing stopped.
        reason: SkipReason,
    },
    /// Not started because the run was stopped.
    Cancelled,
}

impl Outcome {
    /// Last stage this unit reached.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Written(_) | Self::Partial(_) => Stage::Written,
            Self::Skipped { stage, .. } => *stage,
            Self::Cancelled => Stage::Pending,
        }
    }

    fn from_counts(counts: RecordCounts) -> Self {
        let landed = counts.companies + counts.inserted + counts.unchanged;
        match (counts.failed, landed) {
            (0, _) => Self::Written(counts),
            (_, 0) => Self::Skipped {
                stage: Stage::Written,
                reason: SkipReason::Persistence,
            },
            _ => Self::Partial(counts),
        }
    }
}

/// Counts for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Fully written units.
    pub written: usize,
    /// Units with at least one rejected record.
    pub partial: usize,
    /// Skipped units by reason.
    pub skipped: BTreeMap<SkipReason, usize>,
    /// Units never started.
    pub cancelled: usize,
    /// Record counters over every written unit.
    pub records: RecordCounts,
}

impl RunSummary {
    /// Fold one outcome into the summary.
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Written(counts) => {
                self.written += 1;
                self.records.add(*counts);
            }
            Outcome::Partial(counts) => {
                self.partial += 1;
                self.records.add(*counts);
            }
            Outcome::Skipped { reason, .. } => *self.skipped.entry(*reason).or_default() += 1,
            Outcome::Cancelled => self.cancelled += 1,
        }
    }

    /// Total skipped units.
    #[must_use]
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }

    /// Total units seen.
    #[must_use]
    pub fn total(&self) -> usize {
        self.written + self.partial + self.skipped_total() + self.cancelled
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "written={} partial={} skipped={} cancelled={} companies={} inserted={} unchanged={} failed={} unresolved={}",
            self.written,
            self.partial,
            self.skipped_total(),
            self.cancelled,
            self.records.companies,
            self.records.inserted,
            self.records.unchanged,
            self.records.failed,
            self.records.unresolved,
        )?;
        for (reason, count) in &self.skipped {
            write!(f, " skipped.{reason}={count}")?;
        }
        Ok(())
    }
}

/// Pipeline settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Identifiers processed at once.
    pub concurrency: usize,
    /// Company conflict policy, used for every company write of the run.
    pub company_policy: CompanyConflictPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            company_policy: CompanyConflictPolicy::default(),
        }
    }
}

/// Converts a non-fatal error into a skip at `stage`; passes fatal errors through.
fn skip(stage: Stage, error: IngestError) -> Result<Outcome> {
    match SkipReason::for_error(&error) {
        Some(reason) => {
            warn!(stage = ?stage, reason = %reason, error = %error, "Skipping");
            Ok(Outcome::Skipped { stage, reason })
        }
        None => Err(error),
    }
}

/// Upsert identifier records that carry a name as company rows.
///
/// No network access. Records without a name are skipped.
///
/// # Errors
/// Returns [`IngestError::FatalConfig`] if the schema is missing.
#[instrument(skip(store, records), fields(count = records.len()))]
pub async fn seed_companies(
    store: &dyn IngestStore,
    records: &[IdentifierRecord],
    policy: CompanyConflictPolicy,
) -> Result<RunSummary> {
    store.verify_schema().await?;

    let mut summary = RunSummary::default();
    for record in records {
        let outcome = match record.to_company() {
            Some(company) => match store.upsert_company(&company, policy).await {
                Ok(_) => Outcome::Written(RecordCounts {
                    companies: 1,
                    ..RecordCounts::default()
                }),
                Err(e) => skip(Stage::Normalized, e)?,
            },
            None => {
                warn!(cik = %record.cik, "Identifier has no company name, not seeding");
                Outcome::Skipped {
                    stage: Stage::Fetched,
                    reason: SkipReason::MalformedSource,
                }
            }
        };
        summary.record(&outcome);
    }

    info!(%summary, "Seeding finished");
    Ok(summary)
}

/// Drives identifiers from an [`EdgarApi`] into an [`IngestStore`].
#[derive(Clone)]
pub struct Pipeline {
    api: Arc<dyn EdgarApi>,
    store: Arc<dyn IngestStore>,
    options: PipelineOptions,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("api", &self.api)
            .field("store", &"configured")
            .field("options", &self.options)
            .finish()
    }
}

impl Pipeline {
    /// Create a pipeline over the given client and store.
    #[must_use]
    pub fn new(
        api: Arc<dyn EdgarApi>,
        store: Arc<dyn IngestStore>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            api,
            store,
            options,
        }
    }

    /// The options this pipeline runs with.
    #[must_use]
    pub const fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Upsert identifier records that carry a name as company rows.
    ///
    /// Same as [`seed_companies`] with this pipeline's store and policy.
    ///
    /// # Errors
    /// Returns [`IngestError::FatalConfig`] if the schema is missing.
    pub async fn seed_companies(&self, records: &[IdentifierRecord]) -> Result<RunSummary> {
        seed_companies(self.store.as_ref(), records, self.options.company_policy).await
    }

    /// Ingest `dataset` for every identifier.
    ///
    /// Produces one outcome per identifier and dataset part; with
    /// [`Dataset::All`] submissions are written before company facts.
    ///
    /// # Errors
    /// Returns [`IngestError::FatalConfig`] if the schema is missing or any
    /// identifier hits a fatal error. Identifiers already running finish
    /// first; the rest are not started.
    #[instrument(
        skip(self, identifiers, dataset),
        fields(count = identifiers.len(), dataset = %dataset)
    )]
    pub async fn ingest(
        &self,
        identifiers: &[IdentifierRecord],
        dataset: Dataset,
    ) -> Result<RunSummary> {
        self.store.verify_schema().await?;

        let stop = AtomicBool::new(false);
        let mut fatal = None;
        let mut summary = RunSummary::default();

        let mut results = stream::iter(identifiers)
            .map(|record| {
                let stop = &stop;
                async move {
                    if stop.load(Ordering::SeqCst) {
                        debug!(cik = %record.cik, "Run stopped, not starting identifier");
                        return Ok(vec![Outcome::Cancelled; dataset.parts().len()]);
                    }
                    self.process(record, dataset).await
                }
            })
            .buffer_unordered(self.options.concurrency.max(1));

        while let Some(result) = results.next().await {
            match result {
                Ok(outcomes) => outcomes.iter().for_each(|outcome| summary.record(outcome)),
                Err(e) => {
                    error!(error = %e, "Fatal error, cancelling remaining identifiers");
                    stop.store(true, Ordering::SeqCst);
                    fatal.get_or_insert(e);
                }
            }
        }

        if let Some(e) = fatal {
            error!(%summary, "Run aborted");
            return Err(e);
        }
        info!(%summary, "Run finished");
        Ok(summary)
    }

    async fn process(&self, record: &IdentifierRecord, dataset: Dataset) -> Result<Vec<Outcome>> {
        let mut outcomes = Vec::with_capacity(dataset.parts().len());
        for part in dataset.parts() {
            let outcome = match part {
                Dataset::CompanyFacts => self.process_facts(record).await?,
                _ => self.process_submissions(record).await?,
            };
            debug!(
                cik = %record.cik,
                dataset = %part,
                stage = ?outcome.stage(),
                "Identifier done"
            );
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn process_submissions(&self, record: &IdentifierRecord) -> Result<Outcome> {
        let cik = &record.cik;
        let payload = match self.api.submissions(cik).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                let error = IngestError::NotFound(format!("submissions for CIK {cik}"));
                return skip(Stage::Pending, error);
            }
            Err(e) => return skip(Stage::Pending, e),
        };

        let company = match company_from_submissions(cik, &payload, record.name.as_deref()) {
            Ok(company) => company,
            Err(e) => return skip(Stage::Fetched, e),
        };

        let company_id = match self
            .store
            .upsert_company(&company, self.options.company_policy)
            .await
        {
            Ok(id) => id,
            Err(e) => return skip(Stage::Normalized, e),
        };

        let mut counts = RecordCounts {
            companies: 1,
            ..RecordCounts::default()
        };
        for filing in filings_from_submissions(cik, &payload) {
            counts.track(self.store.insert_filing(company_id, &filing).await)?;
        }

        info!(
            cik = %cik,
            company_id,
            inserted = counts.inserted,
            unchanged = counts.unchanged,
            failed = counts.failed,
            "Submissions written"
        );
        Ok(Outcome::from_counts(counts))
    }

    async fn process_facts(&self, record: &IdentifierRecord) -> Result<Outcome> {
        let cik = &record.cik;
        let company_id = match self.store.company_id(cik).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                return skip(
                    Stage::Pending,
                    IngestError::NotFound(format!("no stored company for CIK {cik}")),
                );
            }
            Err(e) => return skip(Stage::Pending, e),
        };

        let payload = match self.api.company_facts(cik).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                let error = IngestError::NotFound(format!("company facts for CIK {cik}"));
                return skip(Stage::Pending, error);
            }
            Err(e) => return skip(Stage::Pending, e),
        };

        let mut counts = RecordCounts::default();
        for fact in normalize_company_facts(&payload) {
            counts.track(self.store.insert_fact(company_id, &fact).await)?;
        }

        info!(
            cik = %cik,
            company_id,
            inserted = counts.inserted,
            unchanged = counts.unchanged,
            failed = counts.failed,
            "Company facts written"
        );
        Ok(Outcome::from_counts(counts))
    }

    /// Ingest one cross-entity frame.
    ///
    /// Each observation is attached to the company whose ticker, or failing
    /// that whose name, matches the reported entity. Observations with no
    /// match are counted as unresolved and not written.
    ///
    /// # Errors
    /// Returns [`IngestError::FatalConfig`] if the schema is missing.
    #[instrument(skip(self, query), fields(frame = %query))]
    pub async fn ingest_frame(&self, query: &FrameQuery) -> Result<RunSummary> {
        self.store.verify_schema().await?;

        let mut summary = RunSummary::default();
        let outcome = self.process_frame(query).await?;
        summary.record(&outcome);

        info!(%summary, "Frame finished");
        Ok(summary)
    }

    async fn process_frame(&self, query: &FrameQuery) -> Result<Outcome> {
        let payload = match self.api.frame(query).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                return skip(Stage::Pending, IngestError::NotFound(format!("frame {query}")));
            }
            Err(e) => return skip(Stage::Pending, e),
        };

        let mut counts = RecordCounts::default();
        for observation in normalize_frame(query, &payload) {
            let company_id = match self.store.resolve_entity(&observation.entity_name).await {
                Ok(Some(id)) => id,
                Ok(None) => {
                    debug!(
                        entity = %observation.entity_name,
                        "No stored company for frame entity"
                    );
                    counts.unresolved += 1;
                    continue;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        entity = %observation.entity_name,
                        error = %e,
                        "Entity lookup failed"
                    );
                    counts.failed += 1;
                    continue;
                }
            };
            counts.track(self.store.insert_fact(company_id, &observation.fact).await)?;
        }

        Ok(Outcome::from_counts(counts))
    }
}
