//! The extractor seam.
//!
//! One extractor per source. All site-specific DOM/selector knowledge
//! lives behind this trait; the core only ever sees raw records.

use async_trait::async_trait;
use fightsync_shared::{FighterId, RawRecord, Result, SourceKind};

use crate::client::RateLimitedClient;

/// One unit of fetch work: a named subject and (optionally) where to
/// find it. Retried targets are rebuilt from ledger records without
/// re-deriving them from the original extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTarget {
    /// Subject display name (or a page label for listing targets).
    pub name: String,
    /// Source-local locator, when already known.
    pub locator: Option<String>,
    /// Canonical id, when already known (retries, seeded stages).
    pub fighter_id: Option<FighterId>,
}

impl FetchTarget {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locator: None,
            fighter_id: None,
        }
    }

    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = Some(locator.into());
        self
    }

    pub fn with_fighter_id(mut self, id: FighterId) -> Self {
        self.fighter_id = Some(id);
        self
    }

    /// Memo-cache key: locator when present (it is the stable part),
    /// otherwise the name.
    pub fn cache_key(&self) -> String {
        match &self.locator {
            Some(locator) => format!("{}#{locator}", self.name),
            None => self.name.clone(),
        }
    }
}

/// A source of raw entity records.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Which source this extractor speaks for.
    fn source(&self) -> SourceKind;

    /// Enumerate this source's fetch targets. `seed` carries the roster
    /// snapshot for sources keyed off another source's output (details,
    /// secondary lookups); self-rooted sources ignore it.
    async fn targets(
        &self,
        client: &RateLimitedClient,
        seed: &[RawRecord],
    ) -> Result<Vec<FetchTarget>>;

    /// Fetch one target and extract its records. A listing target may
    /// yield many records; a per-subject target yields one.
    async fn extract(
        &self,
        client: &RateLimitedClient,
        target: &FetchTarget,
    ) -> Result<Vec<RawRecord>>;
}
