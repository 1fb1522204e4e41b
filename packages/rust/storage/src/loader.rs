//! Batch loading with replace-in-full semantics.
//!
//! Each table is cleared and bulk-inserted from scratch, favoring
//! reproducibility over write-minimization. Inserts run in bounded
//! batches, one transaction per batch: a failing batch rolls back alone,
//! leaving earlier batches and other tables' committed loads intact.
//! After loading, an integrity pass reports fact rows whose fighter
//! reference does not resolve — reported, never deleted.

use fightsync_shared::{
    CanonicalFighter, FightSyncError, RankingEntry, Result, UpcomingBout,
};
use libsql::params;
use tracing::{info, instrument, warn};

use crate::{Storage, Table};

/// Fact rows whose fighter reference does not resolve to a loaded
/// canonical id, by table.
#[derive(Debug, Default, Clone)]
pub struct OrphanReport {
    pub fight_history: Vec<String>,
    pub rankings: Vec<String>,
    pub upcoming_bouts: Vec<String>,
}

impl OrphanReport {
    pub fn total(&self) -> usize {
        self.fight_history.len() + self.rankings.len() + self.upcoming_bouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Row counts and integrity findings from one full load.
#[derive(Debug)]
pub struct LoadReport {
    pub fighters: usize,
    pub history_rows: usize,
    pub ranking_rows: usize,
    pub bout_rows: usize,
    pub orphans: OrphanReport,
}

impl Storage {
    /// Replace the fighters and fight_history tables with the canonical
    /// set. Returns `(fighters, history_rows)` inserted.
    #[instrument(skip_all, fields(fighters = fighters.len(), batch_size))]
    pub async fn load_canonical_set(
        &self,
        fighters: &[CanonicalFighter],
        batch_size: usize,
    ) -> Result<(usize, usize)> {
        self.clear_table(Table::Fighters).await?;
        self.clear_table(Table::FightHistory).await?;

        let mut inserted = 0usize;
        for batch in chunks(fighters, batch_size) {
            let tx = self.begin().await?;
            let mut failed = None;
            for fighter in batch {
                let r = &fighter.record;
                let result = tx
                    .execute(
                        "INSERT INTO fighters (
                            id, name, nickname, profile_url_ufc, profile_url_sherdog,
                            image_url, height, weight, reach, country, age, gender,
                            weight_class, wins_total, losses_total, wins_ko, wins_sub,
                            wins_dec, losses_ko, losses_sub, losses_dec, updated_at
                         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                                   ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
                        params![
                            fighter.id.to_string(),
                            fighter.name.as_str(),
                            fighter.nickname.as_deref(),
                            fighter.profile_url_ufc.as_deref(),
                            fighter.profile_url_sherdog.as_deref(),
                            fighter.image_url.as_deref(),
                            fighter.height,
                            fighter.weight,
                            fighter.reach,
                            fighter.country.as_deref(),
                            fighter.age.map(i64::from),
                            fighter.gender.as_deref(),
                            fighter.weight_class.as_deref(),
                            r.wins_total.map(i64::from),
                            r.losses_total.map(i64::from),
                            r.wins_ko.map(i64::from),
                            r.wins_sub.map(i64::from),
                            r.wins_dec.map(i64::from),
                            r.losses_ko.map(i64::from),
                            r.losses_sub.map(i64::from),
                            r.losses_dec.map(i64::from),
                            fighter.updated_at.to_rfc3339(),
                        ],
                    )
                    .await;
                if let Err(e) = result {
                    failed = Some(e);
                    break;
                }
            }

            match failed {
                None => {
                    commit(tx).await?;
                    inserted += batch.len();
                }
                Some(e) => {
                    let _ = tx.rollback().await;
                    return Err(FightSyncError::Storage(format!(
                        "fighters batch rolled back: {e}"
                    )));
                }
            }
        }

        // History rows, flattened from the canonical set.
        let history: Vec<(String, &fightsync_shared::FightRecord)> = fighters
            .iter()
            .flat_map(|f| f.history.iter().map(move |h| (f.id.to_string(), h)))
            .collect();

        let mut history_rows = 0usize;
        for batch in chunks(&history, batch_size) {
            let tx = self.begin().await?;
            let mut failed = None;
            for (fighter_id, fight) in batch {
                let result = tx
                    .execute(
                        "INSERT INTO fight_history
                            (fighter_id, opponent, result, method, round, time, fight_date)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        params![
                            fighter_id.as_str(),
                            fight.opponent.as_str(),
                            fight.result.as_str(),
                            fight.method.as_deref(),
                            fight.round.map(i64::from),
                            fight.time.as_deref(),
                            fight.date.map(|d| d.to_string()),
                        ],
                    )
                    .await;
                if let Err(e) = result {
                    failed = Some(e);
                    break;
                }
            }

            match failed {
                None => {
                    commit(tx).await?;
                    history_rows += batch.len();
                }
                Some(e) => {
                    let _ = tx.rollback().await;
                    return Err(FightSyncError::Storage(format!(
                        "fight_history batch rolled back: {e}"
                    )));
                }
            }
        }

        info!(fighters = inserted, history_rows, "canonical set loaded");
        Ok((inserted, history_rows))
    }

    /// Replace the rankings table.
    #[instrument(skip_all, fields(rows = entries.len()))]
    pub async fn load_rankings(
        &self,
        entries: &[RankingEntry],
        batch_size: usize,
    ) -> Result<usize> {
        self.clear_table(Table::Rankings).await?;

        let mut inserted = 0usize;
        for batch in chunks(entries, batch_size) {
            let tx = self.begin().await?;
            let mut failed = None;
            for entry in batch {
                let result = tx
                    .execute(
                        "INSERT INTO rankings
                            (division, position, fighter_id, fighter_name, change_indicator)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            entry.division.as_str(),
                            entry.position.to_string(),
                            entry.fighter.map(|id| id.to_string()),
                            entry.fighter_name.as_str(),
                            entry.change.as_deref(),
                        ],
                    )
                    .await;
                if let Err(e) = result {
                    failed = Some(e);
                    break;
                }
            }

            match failed {
                None => {
                    commit(tx).await?;
                    inserted += batch.len();
                }
                Some(e) => {
                    let _ = tx.rollback().await;
                    return Err(FightSyncError::Storage(format!(
                        "rankings batch rolled back: {e}"
                    )));
                }
            }
        }
        Ok(inserted)
    }

    /// Replace the upcoming_bouts table.
    #[instrument(skip_all, fields(rows = bouts.len()))]
    pub async fn load_bouts(&self, bouts: &[UpcomingBout], batch_size: usize) -> Result<usize> {
        self.clear_table(Table::UpcomingBouts).await?;

        let mut inserted = 0usize;
        for batch in chunks(bouts, batch_size) {
            let tx = self.begin().await?;
            let mut failed = None;
            for bout in batch {
                let result = tx
                    .execute(
                        "INSERT INTO upcoming_bouts
                            (event, event_date, event_time, venue, location, card_section,
                             bout_order, weight_class,
                             fighter1_id, fighter1_name, fighter2_id, fighter2_name)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                        params![
                            bout.event.as_str(),
                            bout.event_date.map(|d| d.to_string()),
                            bout.event_time.as_deref(),
                            bout.venue.as_deref(),
                            bout.location.as_deref(),
                            bout.card_section.as_deref(),
                            bout.bout_order.map(i64::from),
                            bout.weight_class.as_deref(),
                            bout.fighter1.fighter_id().map(|id| id.to_string()),
                            bout.fighter1.name(),
                            bout.fighter2.fighter_id().map(|id| id.to_string()),
                            bout.fighter2.name(),
                        ],
                    )
                    .await;
                if let Err(e) = result {
                    failed = Some(e);
                    break;
                }
            }

            match failed {
                None => {
                    commit(tx).await?;
                    inserted += batch.len();
                }
                Some(e) => {
                    let _ = tx.rollback().await;
                    return Err(FightSyncError::Storage(format!(
                        "upcoming_bouts batch rolled back: {e}"
                    )));
                }
            }
        }
        Ok(inserted)
    }

    /// Full load: canonical set plus both fact tables, then the
    /// integrity pass. Per-table isolation: a failure in one table's
    /// load leaves prior tables' committed data intact.
    pub async fn load_all(
        &self,
        fighters: &[CanonicalFighter],
        rankings: &[RankingEntry],
        bouts: &[UpcomingBout],
        batch_size: usize,
    ) -> Result<LoadReport> {
        let (fighter_rows, history_rows) =
            self.load_canonical_set(fighters, batch_size).await?;
        let ranking_rows = self.load_rankings(rankings, batch_size).await?;
        let bout_rows = self.load_bouts(bouts, batch_size).await?;
        let orphans = self.check_integrity().await?;

        if !orphans.is_empty() {
            warn!(orphans = orphans.total(), "integrity pass found orphan fact rows");
        }

        Ok(LoadReport {
            fighters: fighter_rows,
            history_rows,
            ranking_rows,
            bout_rows,
            orphans,
        })
    }

    /// Scan fact tables for references that do not resolve to a loaded
    /// fighter. Orphans are reported, never deleted.
    pub async fn check_integrity(&self) -> Result<OrphanReport> {
        let mut report = OrphanReport::default();
        report.fight_history = self
            .orphan_ids(
                "SELECT DISTINCT fighter_id FROM fight_history
                 WHERE fighter_id NOT IN (SELECT id FROM fighters)",
            )
            .await?;
        report.rankings = self
            .orphan_ids(
                "SELECT DISTINCT fighter_id FROM rankings
                 WHERE fighter_id IS NOT NULL
                   AND fighter_id NOT IN (SELECT id FROM fighters)",
            )
            .await?;
        report.upcoming_bouts = self
            .orphan_ids(
                "SELECT DISTINCT fighter1_id FROM upcoming_bouts
                 WHERE fighter1_id IS NOT NULL
                   AND fighter1_id NOT IN (SELECT id FROM fighters)
                 UNION
                 SELECT DISTINCT fighter2_id FROM upcoming_bouts
                 WHERE fighter2_id IS NOT NULL
                   AND fighter2_id NOT IN (SELECT id FROM fighters)",
            )
            .await?;
        Ok(report)
    }

    async fn orphan_ids(&self, sql: &str) -> Result<Vec<String>> {
        let mut rows = self
            .conn()
            .query(sql, params![])
            .await
            .map_err(|e| FightSyncError::Storage(e.to_string()))?;

        let mut ids = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            ids.push(
                row.get::<String>(0)
                    .map_err(|e| FightSyncError::Storage(e.to_string()))?,
            );
        }
        Ok(ids)
    }

    async fn clear_table(&self, table: Table) -> Result<()> {
        self.conn()
            .execute(&format!("DELETE FROM {}", table.name()), params![])
            .await
            .map_err(|e| FightSyncError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn begin(&self) -> Result<libsql::Transaction> {
        self.conn()
            .transaction()
            .await
            .map_err(|e| FightSyncError::Storage(e.to_string()))
    }
}

async fn commit(tx: libsql::Transaction) -> Result<()> {
    tx.commit()
        .await
        .map_err(|e| FightSyncError::Storage(format!("commit failed: {e}")))
}

/// Non-empty chunks of at most `size` items.
fn chunks<T>(items: &[T], size: usize) -> impl Iterator<Item = &[T]> {
    items.chunks(size.max(1))
}
