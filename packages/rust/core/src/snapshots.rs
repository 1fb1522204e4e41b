//! Per-source raw-record snapshots.
//!
//! Each fetch stage writes its complete output to one JSON file. The
//! reconcile stage always merges from these stable snapshots, so an
//! incremental run that skips a fetch stage still reconciles against that
//! source's last-known records, and reconciliation never interleaves with
//! concurrent mutation.

use std::path::{Path, PathBuf};

use fightsync_identity::normalize_name;
use fightsync_shared::{FightSyncError, RawRecord, Result, SourceKind};
use tracing::debug;

/// Handle to the on-disk snapshot directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    /// Open (creating if needed) the snapshot directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| FightSyncError::io(&root, e))?;
        Ok(Self { root })
    }

    fn path(&self, source: SourceKind) -> PathBuf {
        self.root.join(format!("{}.json", source.as_str()))
    }

    /// Load a source's snapshot. A missing file reads as empty.
    pub fn load(&self, source: SourceKind) -> Result<Vec<RawRecord>> {
        let path = self.path(source);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| FightSyncError::io(&path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            FightSyncError::validation(format!("corrupt snapshot {}: {e}", path.display()))
        })
    }

    /// Atomically replace a source's snapshot.
    pub fn save(&self, source: SourceKind, records: &[RawRecord]) -> Result<()> {
        let path = self.path(source);
        let tmp = path.with_extension("json.tmp");

        let content = serde_json::to_string_pretty(records)
            .map_err(|e| FightSyncError::validation(format!("serialize snapshot: {e}")))?;

        std::fs::write(&tmp, content).map_err(|e| FightSyncError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| FightSyncError::io(&path, e))?;

        debug!(source = %source, count = records.len(), "snapshot saved");
        Ok(())
    }

    /// Merge freshly fetched records into an existing snapshot, keyed by
    /// normalized name: a re-fetched subject replaces its old record,
    /// everything else is preserved. Used by retry passes, which only
    /// re-fetch the backlog. Returns the merged set.
    pub fn merge(&self, source: SourceKind, fresh: &[RawRecord]) -> Result<Vec<RawRecord>> {
        let mut merged = self.load(source)?;

        for record in fresh {
            let key = normalize_name(&record.display_name);
            match merged
                .iter_mut()
                .find(|r| normalize_name(&r.display_name) == key)
            {
                Some(existing) => *existing = record.clone(),
                None => merged.push(record.clone()),
            }
        }

        self.save(source, &merged)?;
        Ok(merged)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> SnapshotStore {
        let dir = std::env::temp_dir().join(format!("fs_snap_{}", uuid::Uuid::now_v7()));
        SnapshotStore::open(dir).expect("open snapshot store")
    }

    #[test]
    fn missing_snapshot_reads_empty() {
        let store = temp_store();
        assert!(store.load(SourceKind::Roster).unwrap().is_empty());
    }

    #[test]
    fn save_and_reload() {
        let store = temp_store();
        let records = vec![RawRecord::new("Movsar Evloev"), RawRecord::new("Paulo Costa")];
        store.save(SourceKind::Roster, &records).unwrap();

        let loaded = store.load(SourceKind::Roster).unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn merge_replaces_by_normalized_name() {
        let store = temp_store();
        let mut old = RawRecord::new("Movsar Evloev");
        old.fields
            .insert("country".into(), serde_json::json!("Unknown"));
        store
            .save(SourceKind::Sherdog, &[old, RawRecord::new("Paulo Costa")])
            .unwrap();

        // Retry re-fetches Evloev (different case) and finds one new name.
        let mut fresh = RawRecord::new("MOVSAR EVLOEV");
        fresh
            .fields
            .insert("country".into(), serde_json::json!("Russia"));
        let merged = store
            .merge(SourceKind::Sherdog, &[fresh, RawRecord::new("Dan Ige")])
            .unwrap();

        assert_eq!(merged.len(), 3);
        let evloev = merged
            .iter()
            .find(|r| r.display_name.eq_ignore_ascii_case("Movsar Evloev"))
            .unwrap();
        assert_eq!(evloev.str_field("country"), Some("Russia"));

        // The merge persisted.
        assert_eq!(store.load(SourceKind::Sherdog).unwrap().len(), 3);
    }

    #[test]
    fn snapshots_are_per_source() {
        let store = temp_store();
        store
            .save(SourceKind::Roster, &[RawRecord::new("A")])
            .unwrap();
        assert!(store.load(SourceKind::Sherdog).unwrap().is_empty());
    }
}
