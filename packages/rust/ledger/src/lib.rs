//! Durable per-stage retry queues.
//!
//! One JSON array file per pipeline stage under the errors directory.
//! Files are overwritten atomically at stage end (temp file + rename), so
//! a crashed run never leaves a half-written queue. The ledger persists
//! across runs: a scheduled re-run processes exactly the outstanding
//! backlog, which substitutes for a real message queue in a
//! single-machine batch context.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use fightsync_shared::{FightSyncError, LedgerRecord, Result, Stage};
use tracing::debug;

/// Handle to the on-disk ledger directory.
#[derive(Debug, Clone)]
pub struct Ledger {
    root: PathBuf,
}

impl Ledger {
    /// Open (creating if needed) the ledger directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| FightSyncError::io(&root, e))?;
        Ok(Self { root })
    }

    /// Path of one stage's queue file.
    fn stage_path(&self, stage: Stage) -> PathBuf {
        self.root.join(format!("{}.json", stage.as_str()))
    }

    /// Load a stage's queue. A missing file reads as an empty queue.
    pub fn load(&self, stage: Stage) -> Result<Vec<LedgerRecord>> {
        let path = self.stage_path(stage);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| FightSyncError::io(&path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            FightSyncError::validation(format!("corrupt ledger file {}: {e}", path.display()))
        })
    }

    /// Atomically replace a stage's queue with `records`.
    pub fn replace(&self, stage: Stage, records: &[LedgerRecord]) -> Result<()> {
        let path = self.stage_path(stage);
        let tmp = path.with_extension("json.tmp");

        let content = serde_json::to_string_pretty(records)
            .map_err(|e| FightSyncError::validation(format!("serialize ledger: {e}")))?;

        std::fs::write(&tmp, content).map_err(|e| FightSyncError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| FightSyncError::io(&path, e))?;

        debug!(stage = %stage, count = records.len(), "ledger replaced");
        Ok(())
    }

    /// Append records to a stage's queue, preserving existing entries.
    pub fn append(&self, stage: Stage, records: &[LedgerRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut existing = self.load(stage)?;
        existing.extend_from_slice(records);
        self.replace(stage, &existing)
    }

    /// Number of outstanding records for a stage.
    pub fn len(&self, stage: Stage) -> Result<usize> {
        Ok(self.load(stage)?.len())
    }

    pub fn is_empty(&self, stage: Stage) -> Result<bool> {
        Ok(self.len(stage)? == 0)
    }

    /// Drop a stage's queue entirely.
    pub fn clear(&self, stage: Stage) -> Result<()> {
        let path = self.stage_path(stage);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| FightSyncError::io(&path, e))?;
        }
        Ok(())
    }

    /// Outstanding queue sizes for every stage, for run summaries.
    pub fn sizes(&self) -> Result<BTreeMap<Stage, usize>> {
        let mut sizes = BTreeMap::new();
        for stage in Stage::all() {
            sizes.insert(stage, self.len(stage)?);
        }
        Ok(sizes)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
