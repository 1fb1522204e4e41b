//! Fact-row resolution and raw field coercion.
//!
//! Rankings and upcoming bouts reference fighters by name; this module
//! resolves those names against the canonical set. An entry that fails to
//! resolve is kept with an explicit unresolved marker *and* queued to its
//! stage's ledger — it is never silently dropped.

use chrono::NaiveDate;
use fightsync_shared::{
    BoutSlot, LedgerRecord, RankPosition, RankingEntry, RawRecord, Stage, UpcomingBout,
};
use tracing::warn;

use crate::merger::Reconciler;

// ---------------------------------------------------------------------------
// Field coercion
// ---------------------------------------------------------------------------

/// Placeholder strings sources use for "no data".
const PLACEHOLDERS: [&str; 4] = ["unknown", "n/a", "-", ""];

/// Coerce a raw field into a count. Accepts JSON numbers and numeric
/// strings; placeholder strings read as absent.
pub fn clean_count(value: Option<&serde_json::Value>) -> Option<u32> {
    match value? {
        serde_json::Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        serde_json::Value::String(s) => {
            let s = s.trim();
            if PLACEHOLDERS.contains(&s.to_lowercase().as_str()) {
                return None;
            }
            s.parse().ok()
        }
        _ => None,
    }
}

/// Coerce a raw field into a measurement. Accepts JSON numbers and
/// strings with a leading number, e.g. `"70.5"` or `"1409 (87%)"`.
pub fn clean_measure(value: Option<&serde_json::Value>) -> Option<f64> {
    match value? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => {
            let s = s.trim();
            if PLACEHOLDERS.contains(&s.to_lowercase().as_str()) {
                return None;
            }
            let re = regex::Regex::new(r"^([0-9]+(?:\.[0-9]+)?)").expect("static regex");
            re.captures(s)?.get(1)?.as_str().parse().ok()
        }
        _ => None,
    }
}

/// Date formats seen across sources: ISO, and the secondary source's
/// `Mar / 02 / 2024`.
fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%b / %d / %Y"))
        .ok()
}

/// Parse a `fight_history` field into ordered fight records. Rows
/// missing an opponent or result are dropped with a warning.
pub fn parse_history(value: &serde_json::Value) -> Vec<fightsync_shared::FightRecord> {
    let Some(rows) = value.as_array() else {
        return Vec::new();
    };

    let mut history = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(obj) = row.as_object() else {
            continue;
        };
        let get = |key: &str| {
            obj.get(key)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        let (Some(opponent), Some(result)) = (get("opponent"), get("result")) else {
            warn!("fight history row without opponent/result dropped");
            continue;
        };

        history.push(fightsync_shared::FightRecord {
            opponent: opponent.to_string(),
            result: result.to_string(),
            method: get("method").map(String::from),
            round: clean_count(obj.get("round")),
            time: get("time").map(String::from),
            date: get("date")
                .or_else(|| get("fight_date"))
                .and_then(parse_date),
        });
    }
    history
}

// ---------------------------------------------------------------------------
// Rankings
// ---------------------------------------------------------------------------

/// Resolve raw ranking rows against the canonical set.
pub fn resolve_rankings(
    reconciler: &Reconciler,
    records: &[RawRecord],
) -> (Vec<RankingEntry>, Vec<LedgerRecord>) {
    let stage = Stage::FetchRankings;
    let mut entries = Vec::with_capacity(records.len());
    let mut failures = Vec::new();

    for record in records {
        let name = record.display_name.trim();
        let Some(division) = record.str_field("division") else {
            warn!(name, "ranking row without division");
            failures.push(LedgerRecord::match_failure(stage, name, "missing division"));
            continue;
        };

        let raw_position = record
            .str_field("rank")
            .or_else(|| record.str_field("position"))
            .unwrap_or_default();
        let position = match RankPosition::try_from(raw_position.to_string()) {
            Ok(p) => p,
            Err(e) => {
                warn!(name, raw_position, "unparseable rank position");
                failures.push(LedgerRecord::match_failure(stage, name, e));
                continue;
            }
        };

        let outcome = reconciler.resolve(name);
        let fighter = outcome.id();
        if let fightsync_identity::MatchOutcome::NoMatch { reason } = outcome {
            let mut failure = LedgerRecord::match_failure(stage, name, reason);
            failure.locator = record.source_ref.clone();
            failures.push(failure);
        }

        entries.push(RankingEntry {
            division: division.to_string(),
            position,
            fighter,
            fighter_name: name.to_string(),
            change: record.str_field("change").map(String::from),
        });
    }

    (entries, failures)
}

// ---------------------------------------------------------------------------
// Upcoming bouts
// ---------------------------------------------------------------------------

/// Resolve raw bout rows against the canonical set. Each slot resolves
/// independently; an unresolved slot keeps its raw name and is ledgered.
pub fn resolve_bouts(
    reconciler: &Reconciler,
    records: &[RawRecord],
) -> (Vec<UpcomingBout>, Vec<LedgerRecord>) {
    let stage = Stage::FetchMatchups;
    let mut bouts = Vec::with_capacity(records.len());
    let mut failures = Vec::new();

    for record in records {
        let (Some(name1), Some(name2)) =
            (record.str_field("fighter1"), record.str_field("fighter2"))
        else {
            warn!(bout = %record.display_name, "bout row missing a fighter name");
            failures.push(LedgerRecord::match_failure(
                stage,
                record.display_name.trim(),
                "missing fighter name",
            ));
            continue;
        };

        let mut slot = |name: &str| -> BoutSlot {
            match reconciler.resolve(name).id() {
                Some(id) => BoutSlot::Resolved {
                    id,
                    name: name.to_string(),
                },
                None => {
                    failures.push(LedgerRecord::match_failure(stage, name, "unresolved bout slot"));
                    BoutSlot::Unresolved {
                        name: name.to_string(),
                    }
                }
            }
        };
        let fighter1 = slot(name1);
        let fighter2 = slot(name2);

        bouts.push(UpcomingBout {
            event: record
                .str_field("event")
                .unwrap_or(record.display_name.trim())
                .to_string(),
            event_date: record.str_field("event_date").and_then(parse_date),
            event_time: record.str_field("event_time").map(String::from),
            venue: record.str_field("venue").map(String::from),
            location: record.str_field("location").map(String::from),
            card_section: record.str_field("card_section").map(String::from),
            bout_order: clean_count(record.field("bout_order")),
            weight_class: record.str_field("weight_class").map(String::from),
            fighter1,
            fighter2,
        });
    }

    (bouts, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merger::{IngestPolicy, Reconciler};
    use chrono::{TimeZone, Utc};
    use fightsync_identity::{Matcher, OverrideTable};
    use fightsync_shared::SourceKind;
    use serde_json::json;

    fn record(name: &str, fields: serde_json::Value) -> RawRecord {
        let mut rec = RawRecord::new(name);
        if let serde_json::Value::Object(map) = fields {
            rec.fields = map;
        }
        rec
    }

    fn seeded_reconciler(names: &[&str]) -> Reconciler {
        let as_of = Utc.with_ymd_and_hms(2025, 6, 1, 3, 0, 0).unwrap();
        let mut rec = Reconciler::new(Matcher::default(), OverrideTable::empty(), as_of);
        let records: Vec<_> = names.iter().map(|n| RawRecord::new(*n)).collect();
        rec.ingest(
            SourceKind::Roster,
            Stage::FetchRoster,
            IngestPolicy::CreateMissing,
            &records,
        );
        rec
    }

    #[test]
    fn clean_count_handles_placeholders_and_numbers() {
        assert_eq!(clean_count(Some(&json!(19))), Some(19));
        assert_eq!(clean_count(Some(&json!("19"))), Some(19));
        assert_eq!(clean_count(Some(&json!(" 19 "))), Some(19));
        assert_eq!(clean_count(Some(&json!("Unknown"))), None);
        assert_eq!(clean_count(Some(&json!("N/A"))), None);
        assert_eq!(clean_count(Some(&json!("-"))), None);
        assert_eq!(clean_count(Some(&json!(null))), None);
        assert_eq!(clean_count(None), None);
    }

    #[test]
    fn clean_measure_extracts_leading_number() {
        assert_eq!(clean_measure(Some(&json!(70.5))), Some(70.5));
        assert_eq!(clean_measure(Some(&json!("70.5"))), Some(70.5));
        assert_eq!(clean_measure(Some(&json!("1409 (87%)"))), Some(1409.0));
        assert_eq!(clean_measure(Some(&json!("n/a"))), None);
        assert_eq!(clean_measure(Some(&json!("tall"))), None);
    }

    #[test]
    fn parse_history_tolerates_bad_rows() {
        let value = json!([
            { "opponent": "Dan Ige", "result": "win", "date": "Mar / 02 / 2024" },
            { "result": "loss" },
            "garbage"
        ]);
        let history = parse_history(&value);
        assert_eq!(history.len(), 1);
        assert_eq!(
            history[0].date,
            NaiveDate::from_ymd_opt(2024, 3, 2)
        );
    }

    #[test]
    fn rankings_resolve_or_flag_unresolved() {
        let rec = seeded_reconciler(&["Movsar Evloev"]);
        let raw = vec![
            record(
                "Movsar Evloev",
                json!({ "division": "Featherweight", "rank": "1", "change": "NEW" }),
            ),
            record(
                "Nobody Known",
                json!({ "division": "Featherweight", "rank": "2" }),
            ),
        ];

        let (entries, failures) = resolve_rankings(&rec, &raw);

        // Both entries survive; the unresolved one is flagged and ledgered.
        assert_eq!(entries.len(), 2);
        assert!(entries[0].fighter.is_some());
        assert_eq!(entries[0].position, RankPosition::Numbered(1));
        assert_eq!(entries[0].change.as_deref(), Some("NEW"));
        assert!(entries[1].fighter.is_none());
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].stage, Stage::FetchRankings);
    }

    #[test]
    fn champion_marker_parses() {
        let rec = seeded_reconciler(&["Movsar Evloev"]);
        let raw = vec![record(
            "Movsar Evloev",
            json!({ "division": "Featherweight", "rank": "C" }),
        )];

        let (entries, failures) = resolve_rankings(&rec, &raw);
        assert_eq!(entries[0].position, RankPosition::Champion);
        assert!(failures.is_empty());
    }

    #[test]
    fn invalid_rank_is_ledgered_not_silently_dropped() {
        let rec = seeded_reconciler(&["Movsar Evloev"]);
        let raw = vec![record(
            "Movsar Evloev",
            json!({ "division": "Featherweight", "rank": "??" }),
        )];

        let (entries, failures) = resolve_rankings(&rec, &raw);
        assert!(entries.is_empty());
        assert_eq!(failures.len(), 1);
    }

    #[test]
    fn bout_slots_resolve_independently() {
        let rec = seeded_reconciler(&["Movsar Evloev", "Merab Dvalishvili"]);
        let raw = vec![record(
            "UFC 316",
            json!({
                "event": "UFC 316",
                "event_date": "2025-06-07",
                "fighter1": "Movsar Evloev",
                "fighter2": "Somebody Unheard",
                "card_section": "Main Card",
                "bout_order": 2
            }),
        )];

        let (bouts, failures) = resolve_bouts(&rec, &raw);
        assert_eq!(bouts.len(), 1);
        let bout = &bouts[0];
        assert!(bout.fighter1.is_resolved());
        assert!(!bout.fighter2.is_resolved());
        assert_eq!(bout.fighter2.name(), "Somebody Unheard");
        assert_eq!(bout.event_date, NaiveDate::from_ymd_opt(2025, 6, 7));
        assert_eq!(bout.bout_order, Some(2));

        // One ledger record for the one unresolved slot.
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].subject_name, "Somebody Unheard");
        assert_eq!(failures[0].stage, Stage::FetchMatchups);
    }

    #[test]
    fn bout_missing_names_is_ledgered() {
        let rec = seeded_reconciler(&[]);
        let raw = vec![record("Broken Bout", json!({ "fighter1": "Solo" }))];

        let (bouts, failures) = resolve_bouts(&rec, &raw);
        assert!(bouts.is_empty());
        assert_eq!(failures.len(), 1);
        assert!(failures[0].reason.contains("missing fighter name"));
    }
}
