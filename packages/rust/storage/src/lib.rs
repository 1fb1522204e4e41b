//! libSQL storage layer for the canonical record set.
//!
//! The [`Storage`] struct wraps a local libSQL database holding the
//! canonical fighters table and the fact tables (fight history, rankings,
//! upcoming bouts). Loading uses replace-in-full semantics — see the
//! `loader` module.

mod loader;
mod migrations;

use std::path::Path;

use fightsync_shared::{
    CanonicalFighter, FightRecord, FightSyncError, FighterId, RecordBreakdown, Result,
};
use libsql::{Connection, Database, params};

pub use loader::{LoadReport, OrphanReport};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path`, applying pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FightSyncError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| FightSyncError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| FightSyncError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    FightSyncError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    pub async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Get one fighter by id (history not included; see [`Self::history_of`]).
    pub async fn get_fighter(&self, id: FighterId) -> Result<Option<CanonicalFighter>> {
        let mut rows = self
            .conn
            .query(
                &format!("{FIGHTER_SELECT} WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| FightSyncError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_fighter(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(FightSyncError::Storage(e.to_string())),
        }
    }

    /// All fighters, ordered by id for stable output.
    pub async fn list_fighters(&self) -> Result<Vec<CanonicalFighter>> {
        let mut rows = self
            .conn
            .query(&format!("{FIGHTER_SELECT} ORDER BY id"), params![])
            .await
            .map_err(|e| FightSyncError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_fighter(&row)?);
        }
        Ok(results)
    }

    /// Ordered fight history for one fighter.
    pub async fn history_of(&self, id: FighterId) -> Result<Vec<FightRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT opponent, result, method, round, time, fight_date
                 FROM fight_history WHERE fighter_id = ?1 ORDER BY id",
                params![id.to_string()],
            )
            .await
            .map_err(|e| FightSyncError::Storage(e.to_string()))?;

        let mut history = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            history.push(FightRecord {
                opponent: row
                    .get::<String>(0)
                    .map_err(|e| FightSyncError::Storage(e.to_string()))?,
                result: row
                    .get::<String>(1)
                    .map_err(|e| FightSyncError::Storage(e.to_string()))?,
                method: row.get::<String>(2).ok(),
                round: row.get::<i64>(3).ok().map(|v| v as u32),
                time: row.get::<String>(4).ok(),
                date: row
                    .get::<String>(5)
                    .ok()
                    .and_then(|s| s.parse().ok()),
            });
        }
        Ok(history)
    }

    /// Row count for one of the managed tables.
    pub async fn count(&self, table: Table) -> Result<usize> {
        let mut rows = self
            .conn
            .query(&format!("SELECT COUNT(*) FROM {}", table.name()), params![])
            .await
            .map_err(|e| FightSyncError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row
                .get::<i64>(0)
                .map_err(|e| FightSyncError::Storage(e.to_string()))? as usize),
            _ => Ok(0),
        }
    }
}

/// The tables managed by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Fighters,
    FightHistory,
    Rankings,
    UpcomingBouts,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fighters => "fighters",
            Self::FightHistory => "fight_history",
            Self::Rankings => "rankings",
            Self::UpcomingBouts => "upcoming_bouts",
        }
    }
}

const FIGHTER_SELECT: &str = "SELECT id, name, nickname, profile_url_ufc, profile_url_sherdog, \
     image_url, height, weight, reach, country, age, gender, weight_class, \
     wins_total, losses_total, wins_ko, wins_sub, wins_dec, losses_ko, losses_sub, losses_dec, \
     updated_at FROM fighters";

/// Convert a database row to a [`CanonicalFighter`] (history excluded).
fn row_to_fighter(row: &libsql::Row) -> Result<CanonicalFighter> {
    let id: String = row
        .get(0)
        .map_err(|e| FightSyncError::Storage(e.to_string()))?;
    let id: FighterId = id
        .parse()
        .map_err(|e| FightSyncError::Storage(format!("invalid fighter id: {e}")))?;

    let count = |idx: i32| row.get::<i64>(idx).ok().map(|v| v as u32);

    Ok(CanonicalFighter {
        id,
        name: row
            .get::<String>(1)
            .map_err(|e| FightSyncError::Storage(e.to_string()))?,
        nickname: row.get::<String>(2).ok(),
        profile_url_ufc: row.get::<String>(3).ok(),
        profile_url_sherdog: row.get::<String>(4).ok(),
        image_url: row.get::<String>(5).ok(),
        height: row.get::<f64>(6).ok(),
        weight: row.get::<f64>(7).ok(),
        reach: row.get::<f64>(8).ok(),
        country: row.get::<String>(9).ok(),
        age: count(10),
        gender: row.get::<String>(11).ok(),
        weight_class: row.get::<String>(12).ok(),
        record: RecordBreakdown {
            wins_total: count(13),
            losses_total: count(14),
            wins_ko: count(15),
            wins_sub: count(16),
            wins_dec: count(17),
            losses_ko: count(18),
            losses_sub: count(19),
            losses_dec: count(20),
        },
        history: Vec::new(),
        updated_at: {
            let s: String = row
                .get(21)
                .map_err(|e| FightSyncError::Storage(e.to_string()))?;
            chrono::DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .map_err(|e| FightSyncError::Storage(format!("invalid date: {e}")))?
        },
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    pub(crate) async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("fs_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    pub(crate) fn fighter(name: &str) -> CanonicalFighter {
        let as_of = Utc.with_ymd_and_hms(2025, 6, 1, 3, 0, 0).unwrap();
        let id = FighterId::derived(&name.to_uppercase());
        CanonicalFighter::new(id, name, as_of)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("fs_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.schema_version().await, 1);
    }

    #[tokio::test]
    async fn empty_tables_count_zero() {
        let storage = test_storage().await;
        for table in [
            Table::Fighters,
            Table::FightHistory,
            Table::Rankings,
            Table::UpcomingBouts,
        ] {
            assert_eq!(storage.count(table).await.unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn fighter_roundtrips_through_rows() {
        let storage = test_storage().await;
        let mut f = fighter("Movsar Evloev");
        f.country = Some("Russia".into());
        f.height = Some(67.0);
        f.record.wins_total = Some(19);

        storage.load_canonical_set(&[f.clone()], 500).await.unwrap();

        let loaded = storage.get_fighter(f.id).await.unwrap().expect("present");
        assert_eq!(loaded.name, "Movsar Evloev");
        assert_eq!(loaded.country.as_deref(), Some("Russia"));
        assert_eq!(loaded.height, Some(67.0));
        assert_eq!(loaded.record.wins_total, Some(19));
        assert_eq!(loaded.updated_at, f.updated_at);
    }
}
