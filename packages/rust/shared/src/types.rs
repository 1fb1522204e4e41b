//! Core domain types for FightSync canonical records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current schema version for the persistent store.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// FighterId
// ---------------------------------------------------------------------------

/// Stable identifier for one canonical fighter.
///
/// Immutable once assigned: either carried verbatim from the source that
/// introduced the fighter, or minted deterministically from the normalized
/// name so that reconciliation of the same inputs always yields the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FighterId(pub Uuid);

impl FighterId {
    /// Adopt an externally-assigned identifier verbatim.
    pub fn from_external(id: Uuid) -> Self {
        Self(id)
    }

    /// Mint a deterministic identifier from a normalized name (UUID v5).
    pub fn derived(normalized_name: &str) -> Self {
        let label = format!("fightsync/fighter/{normalized_name}");
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, label.as_bytes()))
    }
}

impl std::fmt::Display for FighterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for FighterId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Sources & stages
// ---------------------------------------------------------------------------

/// The external sources records are aggregated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Primary roster — introduces identities and externally-assigned ids.
    Roster,
    /// Per-fighter detail pages from the primary site.
    Details,
    /// Secondary statistics site (record breakdown, fight history).
    Sherdog,
    /// Divisional rankings.
    Rankings,
    /// Upcoming bout listings.
    Bouts,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Roster => "roster",
            Self::Details => "details",
            Self::Sherdog => "sherdog",
            Self::Rankings => "rankings",
            Self::Bouts => "bouts",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named pipeline stages, in canonical dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    FetchRoster,
    FetchDetails,
    FetchSecondary,
    FetchRankings,
    FetchMatchups,
    Reconcile,
    Load,
}

impl Stage {
    /// All stages in dependency order.
    pub fn all() -> [Stage; 7] {
        [
            Self::FetchRoster,
            Self::FetchDetails,
            Self::FetchSecondary,
            Self::FetchRankings,
            Self::FetchMatchups,
            Self::Reconcile,
            Self::Load,
        ]
    }

    /// The fetch-type stages (those that talk to the network and own a
    /// retry queue).
    pub fn fetch_stages() -> [Stage; 5] {
        [
            Self::FetchRoster,
            Self::FetchDetails,
            Self::FetchSecondary,
            Self::FetchRankings,
            Self::FetchMatchups,
        ]
    }

    /// Stages that must have completed (fully or partially) before this
    /// one may start.
    pub fn dependencies(&self) -> &'static [Stage] {
        match self {
            Self::FetchRoster | Self::FetchRankings | Self::FetchMatchups => &[],
            Self::FetchDetails | Self::FetchSecondary => &[Self::FetchRoster],
            Self::Reconcile => &[
                Self::FetchRoster,
                Self::FetchDetails,
                Self::FetchSecondary,
                Self::FetchRankings,
                Self::FetchMatchups,
            ],
            Self::Load => &[Self::Reconcile],
        }
    }

    /// The source a fetch stage pulls from, if any.
    pub fn source(&self) -> Option<SourceKind> {
        match self {
            Self::FetchRoster => Some(SourceKind::Roster),
            Self::FetchDetails => Some(SourceKind::Details),
            Self::FetchSecondary => Some(SourceKind::Sherdog),
            Self::FetchRankings => Some(SourceKind::Rankings),
            Self::FetchMatchups => Some(SourceKind::Bouts),
            Self::Reconcile | Self::Load => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchRoster => "fetch-roster",
            Self::FetchDetails => "fetch-details",
            Self::FetchSecondary => "fetch-secondary",
            Self::FetchRankings => "fetch-rankings",
            Self::FetchMatchups => "fetch-matchups",
            Self::Reconcile => "reconcile",
            Self::Load => "load",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fetch-roster" => Ok(Self::FetchRoster),
            "fetch-details" => Ok(Self::FetchDetails),
            "fetch-secondary" => Ok(Self::FetchSecondary),
            "fetch-rankings" => Ok(Self::FetchRankings),
            "fetch-matchups" => Ok(Self::FetchMatchups),
            "reconcile" => Ok(Self::Reconcile),
            "load" => Ok(Self::Load),
            other => Err(format!("unknown stage '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// RawRecord
// ---------------------------------------------------------------------------

/// One raw entity record as yielded by an extractor: a display name, an
/// optional source-local locator, and an opaque field map. All
/// site-specific knowledge stops at this boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Display name as the source renders it.
    pub display_name: String,
    /// Source-local reference (profile URL or path), if the source has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    /// Remaining extracted fields, keyed by source-agnostic field names.
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl RawRecord {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            source_ref: None,
            fields: serde_json::Map::new(),
        }
    }

    /// Raw field access.
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }

    /// String field access (trimmed; empty strings read as absent).
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// The externally-assigned identifier this record carries, if any.
    pub fn external_id(&self) -> Option<Uuid> {
        self.str_field("id")
            .or_else(|| self.str_field("uuid"))
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}

// ---------------------------------------------------------------------------
// CanonicalFighter
// ---------------------------------------------------------------------------

/// Aggregated win/loss counters, split by method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordBreakdown {
    pub wins_total: Option<u32>,
    pub losses_total: Option<u32>,
    pub wins_ko: Option<u32>,
    pub wins_sub: Option<u32>,
    pub wins_dec: Option<u32>,
    pub losses_ko: Option<u32>,
    pub losses_sub: Option<u32>,
    pub losses_dec: Option<u32>,
}

/// One past bout, owned by exactly one fighter. The opponent is a
/// denormalized display string, never a foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FightRecord {
    pub opponent: String,
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

/// The single canonical representation of one fighter across all sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalFighter {
    /// Opaque identifier; never reassigned once created.
    pub id: FighterId,
    /// Display name from the source that introduced the fighter.
    pub name: String,
    /// Per-source locators. Additive: each is written once and kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url_ufc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url_sherdog: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    // Biographical attributes, all optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reach: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_class: Option<String>,
    #[serde(default)]
    pub record: RecordBreakdown,
    /// Ordered fight history, as reported by the secondary source.
    #[serde(default)]
    pub history: Vec<FightRecord>,
    /// Freshness timestamp for this reconciliation.
    pub updated_at: DateTime<Utc>,
}

impl CanonicalFighter {
    pub fn new(id: FighterId, name: impl Into<String>, as_of: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            profile_url_ufc: None,
            profile_url_sherdog: None,
            image_url: None,
            nickname: None,
            height: None,
            weight: None,
            reach: None,
            country: None,
            age: None,
            gender: None,
            weight_class: None,
            record: RecordBreakdown::default(),
            history: Vec::new(),
            updated_at: as_of,
        }
    }
}

// ---------------------------------------------------------------------------
// Rankings & upcoming bouts
// ---------------------------------------------------------------------------

/// Position within a division: the champion slot or a numbered rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum RankPosition {
    Champion,
    Numbered(u32),
}

impl From<RankPosition> for String {
    fn from(p: RankPosition) -> String {
        match p {
            RankPosition::Champion => "C".to_string(),
            RankPosition::Numbered(n) => n.to_string(),
        }
    }
}

impl TryFrom<String> for RankPosition {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("c") {
            return Ok(Self::Champion);
        }
        s.parse::<u32>()
            .map(Self::Numbered)
            .map_err(|_| format!("invalid rank position '{s}'"))
    }
}

impl std::fmt::Display for RankPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Champion => f.write_str("C"),
            Self::Numbered(n) => write!(f, "{n}"),
        }
    }
}

/// One divisional ranking row. Carries either a resolved fighter
/// reference or an explicit unresolved name — never silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub division: String,
    pub position: RankPosition,
    /// Resolved canonical reference, if matching succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fighter: Option<FighterId>,
    /// The name as the rankings source renders it.
    pub fighter_name: String,
    /// Movement indicator from the source (NEW, INTERIM, up/down).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<String>,
}

/// One side of an upcoming bout: resolved to a canonical fighter, or an
/// explicitly unresolved raw name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "status")]
pub enum BoutSlot {
    Resolved { id: FighterId, name: String },
    Unresolved { name: String },
}

impl BoutSlot {
    pub fn fighter_id(&self) -> Option<FighterId> {
        match self {
            Self::Resolved { id, .. } => Some(*id),
            Self::Unresolved { .. } => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Resolved { name, .. } | Self::Unresolved { name } => name,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }
}

/// A scheduled matchup with event metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpcomingBout {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bout_order: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_class: Option<String>,
    pub fighter1: BoutSlot,
    pub fighter2: BoutSlot,
}

// ---------------------------------------------------------------------------
// Ledger & conflicts
// ---------------------------------------------------------------------------

/// Why a ledger record exists. Fetch failures are re-fetched verbatim;
/// match failures are recomputed from snapshots on every reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    #[default]
    Fetch,
    Match,
}

/// One failed or unmatched item awaiting retry, with enough context to
/// reprocess it without re-deriving it from the original extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub stage: Stage,
    #[serde(default)]
    pub kind: FailureKind,
    pub subject_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<FighterId>,
    /// Last-known source locator for the subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    pub reason: String,
    /// How many retry passes have already failed on this record.
    #[serde(default)]
    pub attempts: u32,
    /// Opaque extra context for reprocessing.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub retry_context: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerRecord {
    pub fn new(stage: Stage, subject_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stage,
            kind: FailureKind::Fetch,
            subject_name: subject_name.into(),
            subject_id: None,
            locator: None,
            reason: reason.into(),
            attempts: 0,
            retry_context: serde_json::Value::Null,
            recorded_at: Utc::now(),
        }
    }

    pub fn match_failure(
        stage: Stage,
        subject_name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind: FailureKind::Match,
            ..Self::new(stage, subject_name, reason)
        }
    }
}

/// Two sources matched the same normalized name but disagree on its
/// externally-assigned identifier. Never auto-resolved: the merged entity
/// keeps the first-assigned id and this record goes to a review report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub normalized_name: String,
    pub display_name: String,
    pub kept_id: FighterId,
    pub rejected_id: FighterId,
    pub source: SourceKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fighter_id_roundtrip() {
        let id = FighterId::derived("MOVSAR EVLOEV");
        let s = id.to_string();
        let parsed: FighterId = s.parse().expect("parse FighterId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn derived_ids_are_deterministic() {
        assert_eq!(
            FighterId::derived("JOSE ALDO"),
            FighterId::derived("JOSE ALDO")
        );
        assert_ne!(
            FighterId::derived("JOSE ALDO"),
            FighterId::derived("JOSE ALDO JR")
        );
    }

    #[test]
    fn stage_names_roundtrip() {
        for stage in Stage::all() {
            let parsed: Stage = stage.as_str().parse().expect("parse stage");
            assert_eq!(parsed, stage);
        }
        assert!("fetch-everything".parse::<Stage>().is_err());
    }

    #[test]
    fn stage_dependencies_are_acyclic() {
        // Every dependency must appear earlier in canonical order.
        let order = Stage::all();
        for (i, stage) in order.iter().enumerate() {
            for dep in stage.dependencies() {
                let dep_pos = order.iter().position(|s| s == dep).unwrap();
                assert!(dep_pos < i, "{dep} must precede {stage}");
            }
        }
    }

    #[test]
    fn raw_record_field_access() {
        let mut rec = RawRecord::new("Movsar Evloev");
        rec.fields
            .insert("country".into(), serde_json::json!("Russia"));
        rec.fields.insert("empty".into(), serde_json::json!("  "));
        rec.fields.insert(
            "id".into(),
            serde_json::json!("018f4d9e-0000-7000-8000-000000000001"),
        );

        assert_eq!(rec.str_field("country"), Some("Russia"));
        assert_eq!(rec.str_field("empty"), None);
        assert_eq!(rec.str_field("missing"), None);
        assert!(rec.external_id().is_some());
    }

    #[test]
    fn rank_position_serde() {
        let champ: RankPosition = serde_json::from_str("\"C\"").unwrap();
        assert_eq!(champ, RankPosition::Champion);

        let five: RankPosition = serde_json::from_str("\"5\"").unwrap();
        assert_eq!(five, RankPosition::Numbered(5));

        assert_eq!(serde_json::to_string(&champ).unwrap(), "\"C\"");
        assert!(serde_json::from_str::<RankPosition>("\"champ\"").is_err());
    }

    #[test]
    fn bout_slot_accessors() {
        let resolved = BoutSlot::Resolved {
            id: FighterId::derived("MOVSAR EVLOEV"),
            name: "Movsar Evloev".into(),
        };
        let unresolved = BoutSlot::Unresolved {
            name: "M. Evloev".into(),
        };

        assert!(resolved.is_resolved());
        assert!(resolved.fighter_id().is_some());
        assert!(!unresolved.is_resolved());
        assert_eq!(unresolved.fighter_id(), None);
        assert_eq!(unresolved.name(), "M. Evloev");
    }

    #[test]
    fn ledger_record_serialization() {
        let rec = LedgerRecord::new(Stage::FetchSecondary, "M. Evloev", "no acceptable match");
        let json = serde_json::to_string(&rec).expect("serialize");
        let parsed: LedgerRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.stage, Stage::FetchSecondary);
        assert_eq!(parsed.attempts, 0);
        assert!(parsed.retry_context.is_null());
    }
}
