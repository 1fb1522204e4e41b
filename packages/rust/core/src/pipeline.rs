//! The pipeline orchestrator: a state machine over named stages.
//!
//! A stage starts only once its dependencies completed (fully or with
//! acceptable partial failure, or with a usable prior snapshot); a stage
//! that errors is marked failed and the run proceeds to the next
//! independent stage — forward progress beats all-or-nothing completion.
//! Every run ends with a [`RunSummary`], failures included.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use fightsync_identity::{Matcher, OverrideTable};
use fightsync_ledger::Ledger;
use fightsync_reconcile::{IngestPolicy, Reconciler, resolve_bouts, resolve_rankings};
use fightsync_shared::config::OverrideEntryConfig;
use fightsync_shared::{
    AppConfig, CanonicalFighter, ConflictRecord, FailureKind, FetchConfig, FightSyncError,
    LedgerRecord, RankingEntry, RawRecord, Result, SourceKind, Stage, UpcomingBout,
};
use fightsync_sources::cache::DEFAULT_CACHE_CAPACITY;
use fightsync_sources::{
    Extractor, FetchEngine, FetchTarget, RateLimitedClient, RateLimits, SharedRecordCache,
    shared_record_cache,
};
use fightsync_storage::Storage;
use tracing::{error, info, instrument, warn};

use crate::command::{RunCommand, RunMode};
use crate::snapshots::SnapshotStore;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Everything a run needs beyond the command itself.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Worker pools, rate limits, timeout.
    pub fetch: FetchConfig,
    /// Fuzzy-match acceptance threshold.
    pub similarity_threshold: f64,
    /// Override-table entries layered over the built-ins.
    pub overrides: Vec<OverrideEntryConfig>,
    /// Root for snapshots, ledgers, and reports.
    pub data_dir: PathBuf,
    /// libSQL database file.
    pub db_path: PathBuf,
    /// Rows per insert transaction.
    pub batch_size: usize,
    /// Memo-cache entries shared across fetch workers.
    pub cache_capacity: usize,
}

impl PipelineConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            fetch: FetchConfig::from(config),
            similarity_threshold: config.matching.similarity_threshold,
            overrides: config.matching.overrides.clone(),
            data_dir: config.data_dir(),
            db_path: config.db_path(),
            batch_size: config.database.batch_size,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// The per-source extractors injected into a run. A missing extractor
/// fails its stage only if that stage is planned.
#[derive(Default, Clone)]
pub struct Extractors {
    pub roster: Option<Arc<dyn Extractor>>,
    pub details: Option<Arc<dyn Extractor>>,
    pub secondary: Option<Arc<dyn Extractor>>,
    pub rankings: Option<Arc<dyn Extractor>>,
    pub bouts: Option<Arc<dyn Extractor>>,
}

impl Extractors {
    fn for_stage(&self, stage: Stage) -> Option<Arc<dyn Extractor>> {
        match stage {
            Stage::FetchRoster => self.roster.clone(),
            Stage::FetchDetails => self.details.clone(),
            Stage::FetchSecondary => self.secondary.clone(),
            Stage::FetchRankings => self.rankings.clone(),
            Stage::FetchMatchups => self.bouts.clone(),
            Stage::Reconcile | Stage::Load => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Status & summary
// ---------------------------------------------------------------------------

/// Terminal state of one stage within a run.
#[derive(Debug, Clone, PartialEq)]
pub enum StageStatus {
    Completed { records: usize },
    Failed { reason: String },
    Skipped { reason: String },
}

impl StageStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Completed { records } => format!("completed ({records} records)"),
            Self::Failed { reason } => format!("failed: {reason}"),
            Self::Skipped { reason } => format!("skipped: {reason}"),
        }
    }
}

/// One stage's outcome plus its remaining backlog.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub stage: Stage,
    pub status: StageStatus,
    pub ledger_after: usize,
}

/// Terminal run summary — produced even when stages failed.
#[derive(Debug)]
pub struct RunSummary {
    pub mode: RunMode,
    pub stages: Vec<StageOutcome>,
    pub fighters: usize,
    pub conflicts: usize,
    pub rankings: usize,
    pub bouts: usize,
    pub orphans: usize,
    /// Canonical-set fingerprint, when reconcile ran.
    pub fingerprint: Option<String>,
    /// Outstanding backlog per stage at run end.
    pub ledger_sizes: BTreeMap<Stage, usize>,
    pub elapsed: Duration,
}

impl RunSummary {
    /// True when no planned stage failed.
    pub fn succeeded(&self) -> bool {
        !self
            .stages
            .iter()
            .any(|s| matches!(s.status, StageStatus::Failed { .. }))
    }
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a stage begins.
    fn stage_started(&self, stage: Stage);
    /// Called when a stage reaches its terminal status.
    fn stage_finished(&self, stage: Stage, status: &StageStatus);
    /// Called once with the terminal summary.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage_started(&self, _stage: Stage) {}
    fn stage_finished(&self, _stage: Stage, _status: &StageStatus) {}
    fn done(&self, _summary: &RunSummary) {}
}

// ---------------------------------------------------------------------------
// Run entry point
// ---------------------------------------------------------------------------

/// Execute one pipeline run.
#[instrument(skip_all, fields(mode = %command.mode))]
pub async fn run(
    config: &PipelineConfig,
    command: &RunCommand,
    extractors: &Extractors,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let started = Instant::now();

    let ledger = Ledger::open(config.data_dir.join("errors"))?;
    let snapshots = SnapshotStore::open(config.data_dir.join("snapshots"))?;
    let plan = command.plan(&ledger)?;

    info!(stages = ?plan.iter().map(Stage::as_str).collect::<Vec<_>>(), "run planned");

    // Full refresh rebuilds from empty and ignores prior backlog.
    if command.mode == RunMode::FullRefresh {
        for stage in Stage::fetch_stages() {
            ledger.clear(stage)?;
        }
    }

    let client = RateLimitedClient::new(RateLimits::from(&config.fetch))?;
    let mut state = Run {
        config,
        command,
        extractors,
        ledger,
        snapshots,
        client,
        cache: shared_record_cache(config.cache_capacity),
        statuses: BTreeMap::new(),
        records: HashMap::new(),
        canonical: Vec::new(),
        rankings: Vec::new(),
        bouts: Vec::new(),
        conflicts: 0,
        fingerprint: None,
        orphans: 0,
    };

    for stage in &plan {
        progress.stage_started(*stage);

        let status = match state.dependency_block(*stage) {
            Some(reason) => {
                warn!(stage = %stage, reason, "stage skipped");
                StageStatus::Skipped { reason }
            }
            None => match state.execute(*stage).await {
                Ok(status) => status,
                Err(e) => {
                    error!(stage = %stage, error = %e, "stage failed, continuing");
                    StageStatus::Failed {
                        reason: e.to_string(),
                    }
                }
            },
        };

        progress.stage_finished(*stage, &status);
        state.statuses.insert(*stage, status);
    }

    let mut stages = Vec::with_capacity(plan.len());
    for stage in &plan {
        stages.push(StageOutcome {
            stage: *stage,
            status: state.statuses[stage].clone(),
            ledger_after: state.ledger.len(*stage)?,
        });
    }

    let summary = RunSummary {
        mode: command.mode,
        stages,
        fighters: state.canonical.len(),
        conflicts: state.conflicts,
        rankings: state.rankings.len(),
        bouts: state.bouts.len(),
        orphans: state.orphans,
        fingerprint: state.fingerprint.take(),
        ledger_sizes: state.ledger.sizes()?,
        elapsed: started.elapsed(),
    };

    info!(
        succeeded = summary.succeeded(),
        fighters = summary.fighters,
        conflicts = summary.conflicts,
        orphans = summary.orphans,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "run complete"
    );
    progress.done(&summary);

    Ok(summary)
}

// ---------------------------------------------------------------------------
// Per-run state
// ---------------------------------------------------------------------------

struct Run<'a> {
    config: &'a PipelineConfig,
    command: &'a RunCommand,
    extractors: &'a Extractors,
    ledger: Ledger,
    snapshots: SnapshotStore,
    client: RateLimitedClient,
    cache: SharedRecordCache,
    statuses: BTreeMap<Stage, StageStatus>,
    records: HashMap<SourceKind, Vec<RawRecord>>,
    canonical: Vec<CanonicalFighter>,
    rankings: Vec<RankingEntry>,
    bouts: Vec<UpcomingBout>,
    conflicts: usize,
    fingerprint: Option<String>,
    orphans: usize,
}

impl Run<'_> {
    /// Why `stage` cannot start, if anything blocks it.
    ///
    /// A failed or skipped fetch dependency is acceptable when a prior
    /// snapshot of its source exists. Reconcile hard-requires only the
    /// roster — it proceeds with whatever other snapshots exist — and
    /// load strictly requires a completed reconcile, which has no
    /// snapshot fallback.
    fn dependency_block(&mut self, stage: Stage) -> Option<String> {
        let hard: &[Stage] = match stage {
            Stage::Reconcile => &[Stage::FetchRoster],
            _ => stage.dependencies(),
        };
        for dep in hard {
            let dep_status = self.statuses.get(dep).cloned();
            match dep_status {
                Some(StageStatus::Failed { .. } | StageStatus::Skipped { .. }) => {
                    match dep.source() {
                        Some(source) => {
                            let available = self
                                .source_records(source)
                                .map(|r| !r.is_empty())
                                .unwrap_or(false);
                            if !available {
                                return Some(format!(
                                    "dependency {dep} did not complete and no snapshot exists"
                                ));
                            }
                        }
                        None => return Some(format!("dependency {dep} did not complete")),
                    }
                }
                Some(StageStatus::Completed { .. }) => {}
                // Not planned this run: fetch stages fall back to their
                // snapshots; reconcile must have run for load to make sense.
                None => {
                    if dep.source().is_none() {
                        return Some(format!("dependency {dep} was not planned this run"));
                    }
                }
            }
        }
        None
    }

    async fn execute(&mut self, stage: Stage) -> Result<StageStatus> {
        match stage {
            Stage::Reconcile => self.execute_reconcile(),
            Stage::Load => self.execute_load().await,
            fetch => self.execute_fetch(fetch).await,
        }
    }

    // -- fetch stages -------------------------------------------------------

    async fn execute_fetch(&mut self, stage: Stage) -> Result<StageStatus> {
        let source = stage.source().expect("fetch stage has a source");
        let Some(extractor) = self.extractors.for_stage(stage) else {
            return Err(FightSyncError::config(format!(
                "no extractor configured for {stage}"
            )));
        };

        let backlog = self.ledger.load(stage)?;
        // In incremental mode, roster-family stages are planned only for
        // their backlog; the retry pass sheds load with the smaller pool.
        let retry_pass = self.command.mode == RunMode::Incremental
            && matches!(
                stage,
                Stage::FetchRoster | Stage::FetchDetails | Stage::FetchSecondary
            )
            && !backlog.is_empty();

        let (targets, pool_size) = if retry_pass {
            info!(stage = %stage, backlog = backlog.len(), "retry pass over outstanding backlog");
            let targets = backlog.iter().map(retry_target).collect();
            (targets, self.config.fetch.retry_workers)
        } else {
            let seed = if stage.dependencies().contains(&Stage::FetchRoster) {
                self.source_records(SourceKind::Roster)?.to_vec()
            } else {
                Vec::new()
            };
            let targets = extractor.targets(&self.client, &seed).await?;
            let workers = self.command.workers.unwrap_or(self.config.fetch.workers);
            (targets, workers)
        };

        let engine = FetchEngine::new(self.client.clone(), pool_size);
        let outcome = engine.run(extractor, stage, targets, &self.cache).await;
        let fetched = outcome.records.len();

        // Repeated failures are re-queued with bumped attempt counts; a
        // successful retry simply no longer appears in the queue.
        let mut failures = outcome.failures;
        if retry_pass {
            for failure in &mut failures {
                if let Some(prior) = backlog
                    .iter()
                    .find(|r| r.subject_name == failure.subject_name)
                {
                    failure.attempts = prior.attempts + 1;
                }
            }
        }
        self.ledger.replace(stage, &failures)?;

        let records = if retry_pass {
            self.snapshots.merge(source, &outcome.records)?
        } else {
            self.snapshots.save(source, &outcome.records)?;
            outcome.records
        };
        self.records.insert(source, records);

        Ok(StageStatus::Completed { records: fetched })
    }

    // -- reconcile ----------------------------------------------------------

    fn execute_reconcile(&mut self) -> Result<StageStatus> {
        let roster = self.source_records(SourceKind::Roster)?.to_vec();
        if roster.is_empty() {
            return Err(FightSyncError::validation(
                "no roster snapshot available for reconciliation",
            ));
        }
        let details = self.source_records(SourceKind::Details)?.to_vec();
        let sherdog = self.source_records(SourceKind::Sherdog)?.to_vec();
        let rankings_raw = self.source_records(SourceKind::Rankings)?.to_vec();
        let bouts_raw = self.source_records(SourceKind::Bouts)?.to_vec();

        let matcher = Matcher::new(self.config.similarity_threshold);
        let overrides = OverrideTable::from_config(&self.config.overrides);
        let mut reconciler = Reconciler::new(matcher, overrides, Utc::now());

        // Priority order: the roster introduces identities, everything
        // else merges into them.
        let roster_report = reconciler.ingest(
            SourceKind::Roster,
            Stage::FetchRoster,
            IngestPolicy::CreateMissing,
            &roster,
        );
        self.queue_match_failures(Stage::FetchRoster, roster_report.unmatched)?;

        let details_report = reconciler.ingest(
            SourceKind::Details,
            Stage::FetchDetails,
            IngestPolicy::MatchOnly,
            &details,
        );
        self.queue_match_failures(Stage::FetchDetails, details_report.unmatched)?;

        let sherdog_report = reconciler.ingest(
            SourceKind::Sherdog,
            Stage::FetchSecondary,
            IngestPolicy::MatchOnly,
            &sherdog,
        );
        self.queue_match_failures(Stage::FetchSecondary, sherdog_report.unmatched)?;

        let (rankings, ranking_failures) = resolve_rankings(&reconciler, &rankings_raw);
        self.queue_match_failures(Stage::FetchRankings, ranking_failures)?;

        let (bouts, bout_failures) = resolve_bouts(&reconciler, &bouts_raw);
        self.queue_match_failures(Stage::FetchMatchups, bout_failures)?;

        self.write_conflict_report(reconciler.conflicts())?;
        self.conflicts = reconciler.conflicts().len();
        self.fingerprint = Some(reconciler.fingerprint());
        self.canonical = reconciler.canonical_set();
        self.rankings = rankings;
        self.bouts = bouts;

        info!(
            fighters = self.canonical.len(),
            conflicts = self.conflicts,
            rankings = self.rankings.len(),
            bouts = self.bouts.len(),
            "reconciliation complete"
        );
        Ok(StageStatus::Completed {
            records: self.canonical.len(),
        })
    }

    /// Match failures are recomputed from snapshots on every reconcile:
    /// replace the queue's match-kind entries, keep its fetch-kind ones.
    fn queue_match_failures(&self, stage: Stage, failures: Vec<LedgerRecord>) -> Result<()> {
        let mut queue: Vec<LedgerRecord> = self
            .ledger
            .load(stage)?
            .into_iter()
            .filter(|r| r.kind == FailureKind::Fetch)
            .collect();
        queue.extend(failures);
        self.ledger.replace(stage, &queue)
    }

    fn write_conflict_report(&self, conflicts: &[ConflictRecord]) -> Result<()> {
        let path = self.config.data_dir.join("conflicts.json");
        let report = serde_json::json!({
            "generated_at": Utc::now().to_rfc3339(),
            "conflicts": conflicts,
        });
        let content = serde_json::to_string_pretty(&report)
            .map_err(|e| FightSyncError::validation(format!("serialize conflict report: {e}")))?;
        std::fs::write(&path, content).map_err(|e| FightSyncError::io(&path, e))?;

        if !conflicts.is_empty() {
            warn!(
                conflicts = conflicts.len(),
                path = %path.display(),
                "identifier conflicts written for manual review"
            );
        }
        Ok(())
    }

    // -- load ---------------------------------------------------------------

    async fn execute_load(&mut self) -> Result<StageStatus> {
        let storage = Storage::open(&self.config.db_path).await?;
        let report = storage
            .load_all(
                &self.canonical,
                &self.rankings,
                &self.bouts,
                self.config.batch_size,
            )
            .await?;

        self.orphans = report.orphans.total();
        info!(
            fighters = report.fighters,
            history_rows = report.history_rows,
            ranking_rows = report.ranking_rows,
            bout_rows = report.bout_rows,
            orphans = self.orphans,
            "load complete"
        );
        Ok(StageStatus::Completed {
            records: report.fighters,
        })
    }

    // -- shared helpers -----------------------------------------------------

    /// This run's records for a source: fetched this run, or loaded from
    /// the prior snapshot.
    fn source_records(&mut self, source: SourceKind) -> Result<&[RawRecord]> {
        if !self.records.contains_key(&source) {
            let loaded = self.snapshots.load(source)?;
            self.records.insert(source, loaded);
        }
        Ok(self.records.get(&source).expect("just inserted"))
    }
}

/// Rebuild a fetch target from a ledger record.
fn retry_target(record: &LedgerRecord) -> FetchTarget {
    let mut target = FetchTarget::named(record.subject_name.clone());
    target.locator = record.locator.clone();
    target.fighter_id = record.subject_id;
    target
}
