//! Resolution of a raw display name to at most one canonical identity.
//!
//! Outcomes are tagged by provenance so callers and tests branch on how
//! a match was made instead of re-deriving it from raw scores.

use std::collections::HashMap;

use fightsync_shared::FighterId;
use fightsync_shared::config::DEFAULT_SIMILARITY_THRESHOLD;
use tracing::debug;

use crate::normalize::normalize_name;
use crate::overrides::OverrideTable;

// ---------------------------------------------------------------------------
// MatchOutcome
// ---------------------------------------------------------------------------

/// How (or whether) a raw name resolved against the identity index.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// Normalized key was present in the index.
    Exact { id: FighterId },
    /// An override-corrected name was present in the index.
    Override { id: FighterId },
    /// Containment similarity at or above the configured threshold.
    Fuzzy { id: FighterId, score: f64 },
    /// No acceptable identity found.
    NoMatch { reason: String },
}

impl MatchOutcome {
    /// The matched identity, if any.
    pub fn id(&self) -> Option<FighterId> {
        match self {
            Self::Exact { id } | Self::Override { id } | Self::Fuzzy { id, .. } => Some(*id),
            Self::NoMatch { .. } => None,
        }
    }

    pub fn is_match(&self) -> bool {
        !matches!(self, Self::NoMatch { .. })
    }
}

// ---------------------------------------------------------------------------
// IdentityIndex
// ---------------------------------------------------------------------------

/// Canonical identities keyed by normalized name, preserving first-seen
/// order so fuzzy tie-breaking is deterministic.
#[derive(Debug, Clone, Default)]
pub struct IdentityIndex {
    by_key: HashMap<String, FighterId>,
    order: Vec<String>,
}

impl IdentityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an identity under an already-normalized key. Returns false
    /// (and leaves the index untouched) if the key is already present —
    /// one canonical identity per normalized name.
    pub fn insert(&mut self, normalized_key: impl Into<String>, id: FighterId) -> bool {
        let key = normalized_key.into();
        if self.by_key.contains_key(&key) {
            return false;
        }
        self.by_key.insert(key.clone(), id);
        self.order.push(key);
        true
    }

    pub fn get(&self, normalized_key: &str) -> Option<FighterId> {
        self.by_key.get(normalized_key).copied()
    }

    pub fn contains(&self, normalized_key: &str) -> bool {
        self.by_key.contains_key(normalized_key)
    }

    /// Keys in first-seen order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

/// Name matcher with a configurable fuzzy-acceptance threshold.
#[derive(Debug, Clone)]
pub struct Matcher {
    threshold: f64,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl Matcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Resolve `name` against `index`, consulting `overrides` before any
    /// similarity fallback. Returns at most one match.
    pub fn resolve(
        &self,
        name: &str,
        index: &IdentityIndex,
        overrides: &OverrideTable,
    ) -> MatchOutcome {
        let key = normalize_name(name);
        if key.is_empty() {
            return MatchOutcome::NoMatch {
                reason: "empty name after normalization".into(),
            };
        }

        // 1. Exact.
        if let Some(id) = index.get(&key) {
            return MatchOutcome::Exact { id };
        }

        // 2. Override — authoritative over any computed similarity.
        if let Some(correction) = overrides.lookup(&key) {
            if let Some(alias) = &correction.alias {
                let alias_key = normalize_name(alias);
                if let Some(id) = index.get(&alias_key) {
                    return MatchOutcome::Override { id };
                }
            }
        }

        // 3. Fuzzy containment. Strictly-greater comparison keeps the
        // first candidate above threshold on score ties.
        let mut best: Option<(FighterId, f64)> = None;
        for candidate in index.keys() {
            if let Some(score) = containment_score(&key, candidate) {
                if best.is_none_or(|(_, s)| score > s) {
                    best = Some((index.get(candidate).unwrap(), score));
                }
            }
        }

        match best {
            Some((id, score)) if score >= self.threshold => {
                debug!(name, score, "fuzzy match accepted");
                MatchOutcome::Fuzzy { id, score }
            }
            Some((_, score)) => MatchOutcome::NoMatch {
                reason: format!(
                    "best similarity {score:.2} below threshold {:.2}",
                    self.threshold
                ),
            },
            None => MatchOutcome::NoMatch {
                reason: "no candidate shares a containment relation".into(),
            },
        }
    }
}

/// Containment similarity: defined only when the shorter normalized name
/// is a substring of the longer, as `min(len) / max(len)`.
fn containment_score(a: &str, b: &str) -> Option<f64> {
    if a.is_empty() || b.is_empty() {
        return None;
    }
    if !(a.contains(b) || b.contains(a)) {
        return None;
    }
    let (min, max) = if a.len() <= b.len() {
        (a.len(), b.len())
    } else {
        (b.len(), a.len())
    };
    Some(min as f64 / max as f64)
}
