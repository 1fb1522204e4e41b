//! Typed run commands.
//!
//! "What to run" is decided once, up front, from the mode and the ledger
//! state — stages never peek at files mid-run to decide their own fate.

use fightsync_ledger::Ledger;
use fightsync_shared::{FightSyncError, Result, Stage};

/// Run modes, selecting a stage subset and ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// All stages in dependency order, ignoring prior ledgers.
    FullRefresh,
    /// Rankings and matchups, plus any fetch stage with an outstanding
    /// backlog (run as a retry pass), then reconcile and load.
    Incremental,
    /// Exactly the externally flagged stages.
    Targeted,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullRefresh => "full-refresh",
            Self::Incremental => "incremental",
            Self::Targeted => "targeted",
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "full-refresh" | "full" => Ok(Self::FullRefresh),
            "incremental" => Ok(Self::Incremental),
            "targeted" => Ok(Self::Targeted),
            other => Err(format!("unknown run mode '{other}'")),
        }
    }
}

/// One run's worth of intent, constructed once by the entry point.
#[derive(Debug, Clone)]
pub struct RunCommand {
    pub mode: RunMode,
    /// Stages for targeted mode; ignored otherwise.
    pub targets: Vec<Stage>,
    /// Skip the load stage entirely.
    pub skip_load: bool,
    /// Override the configured worker-pool size for first passes.
    pub workers: Option<usize>,
}

impl RunCommand {
    pub fn full_refresh() -> Self {
        Self {
            mode: RunMode::FullRefresh,
            targets: Vec::new(),
            skip_load: false,
            workers: None,
        }
    }

    pub fn incremental() -> Self {
        Self {
            mode: RunMode::Incremental,
            ..Self::full_refresh()
        }
    }

    pub fn targeted(targets: Vec<Stage>) -> Self {
        Self {
            mode: RunMode::Targeted,
            targets,
            ..Self::full_refresh()
        }
    }

    /// Decide the stage list for this run. Incremental planning consults
    /// the ledger exactly once, here.
    pub fn plan(&self, ledger: &Ledger) -> Result<Vec<Stage>> {
        let selected: Vec<Stage> = match self.mode {
            RunMode::FullRefresh => Stage::all().to_vec(),
            RunMode::Incremental => {
                let mut stages = vec![Stage::FetchRankings, Stage::FetchMatchups];
                for stage in Stage::fetch_stages() {
                    if !stages.contains(&stage) && !ledger.is_empty(stage)? {
                        stages.push(stage);
                    }
                }
                stages.push(Stage::Reconcile);
                stages.push(Stage::Load);
                stages
            }
            RunMode::Targeted => {
                if self.targets.is_empty() {
                    return Err(FightSyncError::validation(
                        "targeted mode requires at least one stage",
                    ));
                }
                self.targets.clone()
            }
        };

        // Canonical order, deduplicated, load honoring skip_load.
        let mut plan: Vec<Stage> = Stage::all()
            .into_iter()
            .filter(|s| selected.contains(s))
            .collect();
        if self.skip_load {
            plan.retain(|s| *s != Stage::Load);
        }
        Ok(plan)
    }
}
