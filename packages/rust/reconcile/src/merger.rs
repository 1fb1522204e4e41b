//! The Reconciler: priority-ordered merge of per-source records into the
//! canonical fighter set.
//!
//! The in-memory merge map is keyed by the immutable canonical id, which
//! is what makes reconciliation idempotent: the same input snapshot
//! produces the same canonical set no matter how record arrival is
//! permuted. Locally minted ids are derived from the normalized name, so
//! even identity creation is order-independent.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use fightsync_identity::{IdentityIndex, MatchOutcome, Matcher, OverrideTable, normalize_name};
use fightsync_shared::{
    CanonicalFighter, ConflictRecord, FighterId, LedgerRecord, RawRecord, SourceKind, Stage,
};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::facts;

// ---------------------------------------------------------------------------
// Ingest policy & report
// ---------------------------------------------------------------------------

/// Whether a source may introduce previously-unseen identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestPolicy {
    /// Unseen normalized names create new canonical identities (the
    /// primary roster).
    CreateMissing,
    /// Unseen names are match failures, queued for retry.
    MatchOnly,
}

/// Counters and failures from one source's ingestion.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Records merged into an existing identity.
    pub matched: usize,
    /// New identities introduced.
    pub created: usize,
    /// Of `matched`, resolved through the override table.
    pub overridden: usize,
    /// Of `matched`, resolved by containment similarity.
    pub fuzzy: usize,
    /// Records with no acceptable identity, ready for the stage ledger.
    pub unmatched: Vec<LedgerRecord>,
    /// Records skipped outright (empty name, unusable shape).
    pub skipped: usize,
}

impl IngestReport {
    /// Total records that contributed to the canonical set.
    pub fn absorbed(&self) -> usize {
        self.matched + self.created
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Merges matched per-source records into one canonical entity per
/// fighter, detecting identifier conflicts along the way.
pub struct Reconciler {
    matcher: Matcher,
    overrides: OverrideTable,
    index: IdentityIndex,
    fighters: BTreeMap<FighterId, CanonicalFighter>,
    conflicts: Vec<ConflictRecord>,
    as_of: DateTime<Utc>,
}

impl Reconciler {
    /// `as_of` stamps every produced entity; it is an explicit input so
    /// reconciliation stays a pure function of its inputs.
    pub fn new(matcher: Matcher, overrides: OverrideTable, as_of: DateTime<Utc>) -> Self {
        Self {
            matcher,
            overrides,
            index: IdentityIndex::new(),
            fighters: BTreeMap::new(),
            conflicts: Vec::new(),
            as_of,
        }
    }

    /// Ingest one source's records in order. Sources are ingested in
    /// priority order by the caller; within a source, merge results are
    /// order-independent.
    #[instrument(skip_all, fields(source = %source, records = records.len()))]
    pub fn ingest(
        &mut self,
        source: SourceKind,
        stage: Stage,
        policy: IngestPolicy,
        records: &[RawRecord],
    ) -> IngestReport {
        let mut report = IngestReport::default();

        for record in records {
            let name = record.display_name.trim();
            let key = normalize_name(name);
            if key.is_empty() {
                warn!(%source, "record with empty name skipped");
                report.skipped += 1;
                continue;
            }

            match self.matcher.resolve(name, &self.index, &self.overrides) {
                outcome @ (MatchOutcome::Exact { .. }
                | MatchOutcome::Override { .. }
                | MatchOutcome::Fuzzy { .. }) => {
                    let id = outcome.id().unwrap();
                    self.check_conflict(id, &key, name, source, record);
                    self.merge_record(id, source, record);
                    report.matched += 1;
                    match outcome {
                        MatchOutcome::Override { .. } => report.overridden += 1,
                        MatchOutcome::Fuzzy { score, .. } => {
                            debug!(name, score, "fuzzy absorption");
                            report.fuzzy += 1;
                        }
                        _ => {}
                    }
                }
                MatchOutcome::NoMatch { reason } => match policy {
                    IngestPolicy::CreateMissing => {
                        if let Some(failure) = self.create_identity(&key, name, source, record) {
                            report.unmatched.push(failure.stamp(stage));
                        } else {
                            report.created += 1;
                        }
                    }
                    IngestPolicy::MatchOnly => {
                        let mut failure = LedgerRecord::match_failure(stage, name, reason);
                        failure.locator = record.source_ref.clone();
                        report.unmatched.push(failure);
                    }
                },
            }
        }

        info!(
            %source,
            matched = report.matched,
            created = report.created,
            fuzzy = report.fuzzy,
            overridden = report.overridden,
            unmatched = report.unmatched.len(),
            skipped = report.skipped,
            "source ingested"
        );
        report
    }

    /// Create a new canonical identity for an unseen normalized name.
    /// Returns a failure instead when the record's external id is already
    /// bound to a different name — an id is never reassigned.
    fn create_identity(
        &mut self,
        key: &str,
        name: &str,
        source: SourceKind,
        record: &RawRecord,
    ) -> Option<UnstampedFailure> {
        let id = match record.external_id() {
            Some(external) => FighterId::from_external(external),
            None => FighterId::derived(key),
        };

        if self.fighters.contains_key(&id) {
            warn!(name, %id, "external id already bound to another identity");
            return Some(UnstampedFailure {
                subject_name: name.to_string(),
                locator: record.source_ref.clone(),
                reason: format!("id {id} already bound to another identity"),
            });
        }

        self.index.insert(key.to_string(), id);
        self.fighters
            .insert(id, CanonicalFighter::new(id, name, self.as_of));
        self.merge_record(id, source, record);
        None
    }

    /// Surface a `ConflictRecord` when a record carries an external id
    /// that disagrees with the identity it matched. Never auto-resolved:
    /// the entity keeps its first-assigned id and is still produced.
    fn check_conflict(
        &mut self,
        matched: FighterId,
        key: &str,
        name: &str,
        source: SourceKind,
        record: &RawRecord,
    ) {
        let Some(external) = record.external_id() else {
            return;
        };
        let external = FighterId::from_external(external);
        if external == matched {
            return;
        }

        let already_flagged = self
            .conflicts
            .iter()
            .any(|c| c.normalized_name == key && c.rejected_id == external);
        if already_flagged {
            return;
        }

        warn!(
            name,
            kept = %matched,
            rejected = %external,
            %source,
            "identifier conflict detected"
        );
        self.conflicts.push(ConflictRecord {
            normalized_name: key.to_string(),
            display_name: name.to_string(),
            kept_id: matched,
            rejected_id: external,
            source,
        });
    }

    /// Merge one record's fields into an existing entity.
    ///
    /// Field policy: a non-null value overwrites a prior null and a later
    /// non-null wins; a non-null is never clobbered by a null; per-source
    /// locators are write-once and kept alongside each other.
    fn merge_record(&mut self, id: FighterId, source: SourceKind, record: &RawRecord) {
        let fighter = self
            .fighters
            .get_mut(&id)
            .expect("merge target must exist in the canonical map");

        // Locators.
        let locator = |field: &str| {
            record
                .source_ref
                .clone()
                .or_else(|| record.str_field("profile_url").map(String::from))
                .or_else(|| record.str_field(field).map(String::from))
        };
        match source {
            SourceKind::Roster | SourceKind::Details => {
                write_once(&mut fighter.profile_url_ufc, locator("profile_url_ufc"));
            }
            SourceKind::Sherdog => {
                write_once(&mut fighter.profile_url_sherdog, locator("profile_url_sherdog"));
            }
            SourceKind::Rankings | SourceKind::Bouts => {}
        }
        write_once(
            &mut fighter.image_url,
            record.str_field("image_url").map(String::from),
        );

        // Biographical attributes.
        merge(&mut fighter.nickname, record.str_field("nickname").map(String::from));
        merge(&mut fighter.country, record.str_field("country").map(String::from));
        merge(&mut fighter.gender, record.str_field("gender").map(String::from));
        merge(
            &mut fighter.weight_class,
            record.str_field("weight_class").map(String::from),
        );
        merge(&mut fighter.height, facts::clean_measure(record.field("height")));
        merge(&mut fighter.weight, facts::clean_measure(record.field("weight")));
        merge(&mut fighter.reach, facts::clean_measure(record.field("reach")));
        merge(&mut fighter.age, facts::clean_count(record.field("age")));

        // Outcome counters.
        let rec = &mut fighter.record;
        merge(&mut rec.wins_total, facts::clean_count(record.field("wins_total")));
        merge(&mut rec.losses_total, facts::clean_count(record.field("losses_total")));
        merge(&mut rec.wins_ko, facts::clean_count(record.field("wins_ko")));
        merge(&mut rec.wins_sub, facts::clean_count(record.field("wins_sub")));
        merge(&mut rec.wins_dec, facts::clean_count(record.field("wins_dec")));
        merge(&mut rec.losses_ko, facts::clean_count(record.field("losses_ko")));
        merge(&mut rec.losses_sub, facts::clean_count(record.field("losses_sub")));
        merge(&mut rec.losses_dec, facts::clean_count(record.field("losses_dec")));

        // Fight history: the secondary source owns it wholesale.
        if let Some(value) = record.field("fight_history") {
            let history = facts::parse_history(value);
            if !history.is_empty() {
                fighter.history = history;
            }
        }
    }

    /// Resolve a raw name against the current canonical set.
    pub fn resolve(&self, name: &str) -> MatchOutcome {
        self.matcher.resolve(name, &self.index, &self.overrides)
    }

    /// The canonical set, ordered by id — stable across runs.
    pub fn canonical_set(&self) -> Vec<CanonicalFighter> {
        self.fighters.values().cloned().collect()
    }

    pub fn fighter(&self, id: FighterId) -> Option<&CanonicalFighter> {
        self.fighters.get(&id)
    }

    pub fn conflicts(&self) -> &[ConflictRecord] {
        &self.conflicts
    }

    pub fn len(&self) -> usize {
        self.fighters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fighters.is_empty()
    }

    /// SHA-256 over the serialized canonical set. Two reconciliations of
    /// the same inputs produce the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_vec(&self.canonical_set()).expect("canonical set serializes");
        let mut hasher = Sha256::new();
        hasher.update(&json);
        format!("{:x}", hasher.finalize())
    }
}

/// A creation failure before its stage is known.
struct UnstampedFailure {
    subject_name: String,
    locator: Option<String>,
    reason: String,
}

impl UnstampedFailure {
    fn stamp(self, stage: Stage) -> LedgerRecord {
        let mut record = LedgerRecord::match_failure(stage, self.subject_name, self.reason);
        record.locator = self.locator;
        record
    }
}

/// Later non-null wins; null never clobbers.
fn merge<T>(dst: &mut Option<T>, src: Option<T>) {
    if src.is_some() {
        *dst = src;
    }
}

/// Locator policy: first writer wins, kept thereafter.
fn write_once<T>(dst: &mut Option<T>, src: Option<T>) {
    if dst.is_none() {
        *dst = src;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    const U1: &str = "018f4d9e-0000-7000-8000-0000000000a1";
    const U2: &str = "018f4d9e-0000-7000-8000-0000000000b2";

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 3, 0, 0).unwrap()
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(Matcher::default(), OverrideTable::empty(), as_of())
    }

    fn record(name: &str, fields: serde_json::Value) -> RawRecord {
        let mut rec = RawRecord::new(name);
        if let serde_json::Value::Object(map) = fields {
            rec.fields = map;
        }
        rec
    }

    fn ingest_roster(rec: &mut Reconciler, records: &[RawRecord]) -> IngestReport {
        rec.ingest(
            SourceKind::Roster,
            Stage::FetchRoster,
            IngestPolicy::CreateMissing,
            records,
        )
    }

    fn ingest_sherdog(rec: &mut Reconciler, records: &[RawRecord]) -> IngestReport {
        rec.ingest(
            SourceKind::Sherdog,
            Stage::FetchSecondary,
            IngestPolicy::MatchOnly,
            records,
        )
    }

    #[test]
    fn roster_creates_identities_with_external_ids() {
        let mut rec = reconciler();
        let report = ingest_roster(
            &mut rec,
            &[record("Movsar Evloev", json!({ "id": U1, "country": "Russia" }))],
        );

        assert_eq!(report.created, 1);
        assert_eq!(rec.len(), 1);

        let fighter = &rec.canonical_set()[0];
        assert_eq!(fighter.id.to_string(), U1);
        assert_eq!(fighter.name, "Movsar Evloev");
        assert_eq!(fighter.country.as_deref(), Some("Russia"));
        assert_eq!(fighter.updated_at, as_of());
    }

    #[test]
    fn minted_ids_are_stable_without_external_ids() {
        let mut a = reconciler();
        ingest_roster(&mut a, &[record("Paulo Costa", json!({}))]);
        let mut b = reconciler();
        ingest_roster(&mut b, &[record("PAULO  COSTA", json!({}))]);

        // Same normalized name, same minted id, both times.
        assert_eq!(a.canonical_set()[0].id, b.canonical_set()[0].id);
    }

    #[test]
    fn non_null_overwrites_null_and_null_never_overwrites() {
        let mut rec = reconciler();
        ingest_roster(
            &mut rec,
            &[record(
                "Movsar Evloev",
                json!({ "id": U1, "height": 67.0, "age": "25" }),
            )],
        );
        // Secondary supplies country, omits height, and sends an explicit
        // null age plus a placeholder reach.
        ingest_sherdog(
            &mut rec,
            &[record(
                "Movsar Evloev",
                json!({ "country": "Russia", "age": null, "reach": "Unknown", "wins_total": "19" }),
            )],
        );

        let fighter = &rec.canonical_set()[0];
        assert_eq!(fighter.height, Some(67.0));
        assert_eq!(fighter.country.as_deref(), Some("Russia"));
        // Null and placeholder values never clobber earlier data.
        assert_eq!(fighter.age, Some(25));
        assert_eq!(fighter.reach, None);
        assert_eq!(fighter.record.wins_total, Some(19));
    }

    #[test]
    fn later_non_null_wins_for_scalar_fields() {
        let mut rec = reconciler();
        ingest_roster(
            &mut rec,
            &[record("Movsar Evloev", json!({ "id": U1, "age": "25" }))],
        );
        ingest_sherdog(&mut rec, &[record("Movsar Evloev", json!({ "age": "26" }))]);

        assert_eq!(rec.canonical_set()[0].age, Some(26));
    }

    #[test]
    fn locators_are_additive_and_write_once() {
        let mut rec = reconciler();

        let mut roster = record("Movsar Evloev", json!({ "id": U1 }));
        roster.source_ref = Some("https://ufc.example/athlete/movsar-evloev".into());
        ingest_roster(&mut rec, &[roster]);

        let mut sherdog = record("Movsar Evloev", json!({}));
        sherdog.source_ref = Some("https://sherdog.example/fighter/Movsar-Evloev".into());
        ingest_sherdog(&mut rec, &[sherdog.clone()]);

        // A second secondary record with a different locator does not
        // displace the first.
        sherdog.source_ref = Some("https://sherdog.example/fighter/Other".into());
        ingest_sherdog(&mut rec, &[sherdog]);

        let fighter = &rec.canonical_set()[0];
        assert_eq!(
            fighter.profile_url_ufc.as_deref(),
            Some("https://ufc.example/athlete/movsar-evloev")
        );
        assert_eq!(
            fighter.profile_url_sherdog.as_deref(),
            Some("https://sherdog.example/fighter/Movsar-Evloev")
        );
    }

    #[test]
    fn conflict_is_surfaced_once_and_entity_survives() {
        let mut rec = reconciler();
        ingest_roster(&mut rec, &[record("Movsar Evloev", json!({ "id": U1 }))]);

        // A second source matches the same normalized name but carries a
        // different externally-assigned id — twice.
        let conflicting = record("MOVSAR EVLOEV", json!({ "id": U2, "country": "Russia" }));
        ingest_sherdog(&mut rec, &[conflicting.clone()]);
        ingest_sherdog(&mut rec, &[conflicting]);

        assert_eq!(rec.conflicts().len(), 1);
        let conflict = &rec.conflicts()[0];
        assert_eq!(conflict.kept_id.to_string(), U1);
        assert_eq!(conflict.rejected_id.to_string(), U2);

        // The merged entity is still produced, keyed by the first id.
        let set = rec.canonical_set();
        assert_eq!(set.len(), 1);
        assert_eq!(set[0].id.to_string(), U1);
        assert_eq!(set[0].country.as_deref(), Some("Russia"));
    }

    #[test]
    fn match_only_misses_are_ledgered_not_created() {
        let mut rec = reconciler();
        ingest_roster(&mut rec, &[record("Movsar Evloev", json!({ "id": U1 }))]);

        let report = ingest_sherdog(&mut rec, &[record("Completely Unknown", json!({}))]);
        assert_eq!(report.unmatched.len(), 1);
        assert_eq!(report.unmatched[0].stage, Stage::FetchSecondary);
        assert_eq!(rec.len(), 1);
    }

    #[test]
    fn duplicate_roster_names_collapse_to_one_identity() {
        let mut rec = reconciler();
        let report = ingest_roster(
            &mut rec,
            &[
                record("José Aldo Jr.", json!({ "id": U1 })),
                record("JOSE ALDO", json!({ "country": "Brazil" })),
            ],
        );

        // The matcher never creates two identities for one normalized name.
        assert_eq!(report.created, 1);
        assert_eq!(report.matched, 1);
        assert_eq!(rec.len(), 1);
        assert_eq!(rec.canonical_set()[0].country.as_deref(), Some("Brazil"));
    }

    #[test]
    fn history_replaces_wholesale() {
        let mut rec = reconciler();
        ingest_roster(&mut rec, &[record("Movsar Evloev", json!({ "id": U1 }))]);
        ingest_sherdog(
            &mut rec,
            &[record(
                "Movsar Evloev",
                json!({
                    "fight_history": [
                        { "opponent": "Aljamain Sterling", "result": "win",
                          "method": "Decision (unanimous)", "round": 3,
                          "time": "5:00", "date": "2024-12-07" },
                        { "opponent": "Dan Ige", "result": "win" }
                    ]
                }),
            )],
        );

        let fighter = &rec.canonical_set()[0];
        assert_eq!(fighter.history.len(), 2);
        assert_eq!(fighter.history[0].opponent, "Aljamain Sterling");
        assert_eq!(fighter.history[0].round, Some(3));
        assert!(fighter.history[0].date.is_some());
    }

    #[test]
    fn reconciliation_is_permutation_invariant() {
        let roster = vec![
            record("Movsar Evloev", json!({ "id": U1, "height": 67.0 })),
            record("Merab Dvalishvili", json!({ "id": U2 })),
            record("Paulo Costa", json!({})),
        ];
        let sherdog = vec![
            record("Movsar Evloev", json!({ "country": "Russia", "wins_total": "19" })),
            record("Paulo Costa", json!({ "country": "Brazil" })),
        ];

        let fingerprint = |roster: &[RawRecord], sherdog: &[RawRecord]| {
            let mut rec = reconciler();
            ingest_roster(&mut rec, roster);
            ingest_sherdog(&mut rec, sherdog);
            rec.fingerprint()
        };

        let baseline = fingerprint(&roster, &sherdog);

        // Re-running on the unchanged snapshot is byte-identical.
        assert_eq!(baseline, fingerprint(&roster, &sherdog));

        // Permuting record arrival within each source changes nothing.
        let mut roster_rev = roster.clone();
        roster_rev.reverse();
        let mut sherdog_rev = sherdog.clone();
        sherdog_rev.reverse();
        assert_eq!(baseline, fingerprint(&roster_rev, &sherdog_rev));
    }

    #[test]
    fn end_to_end_three_source_scenario() {
        // Source A yields {"MOVSAR EVLOEV", id=u1}; source B yields
        // {"Movsar Evloev"} with no id; source C yields {"M. EVLOEV"},
        // which scores below threshold.
        let mut rec = reconciler();

        ingest_roster(&mut rec, &[record("MOVSAR EVLOEV", json!({ "id": U1 }))]);

        let b = ingest_sherdog(
            &mut rec,
            &[record("Movsar Evloev", json!({ "country": "Russia" }))],
        );
        assert!(b.unmatched.is_empty());

        let c = ingest_sherdog(&mut rec, &[record("M. EVLOEV", json!({}))]);
        assert_eq!(c.unmatched.len(), 1);
        assert_eq!(c.unmatched[0].subject_name, "M. EVLOEV");

        let set = rec.canonical_set();
        assert_eq!(set.len(), 1);
        assert_eq!(set[0].id.to_string(), U1);
        assert_eq!(set[0].country.as_deref(), Some("Russia"));
    }

    #[test]
    fn external_id_never_reassigned_to_a_second_name() {
        let mut rec = reconciler();
        let report = ingest_roster(
            &mut rec,
            &[
                record("Movsar Evloev", json!({ "id": U1 })),
                record("Totally Different Name", json!({ "id": U1 })),
            ],
        );

        assert_eq!(report.created, 1);
        assert_eq!(report.unmatched.len(), 1);
        assert!(report.unmatched[0].reason.contains("already bound"));
        assert_eq!(rec.canonical_set()[0].name, "Movsar Evloev");
    }
}
