//! Static corrections for known aliasing and transliteration mismatches.
//!
//! Normalization cannot repair true aliasing — nicknames, name-order
//! divergence, transliteration drift between sources. The override table
//! is the controlled escape hatch for those cases: looked up before fuzzy
//! matching, and authoritative when it hits.

use std::collections::HashMap;

use fightsync_shared::config::OverrideEntryConfig;

use crate::normalize::normalize_name;

/// One correction: an alternate name, a direct source locator, or both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    /// Corrected name as the target source renders it.
    pub alias: Option<String>,
    /// Direct locator on the target source, bypassing search entirely.
    pub locator: Option<String>,
}

impl Override {
    pub fn alias(alias: impl Into<String>) -> Self {
        Self {
            alias: Some(alias.into()),
            locator: None,
        }
    }

    pub fn locator(locator: impl Into<String>) -> Self {
        Self {
            alias: None,
            locator: Some(locator.into()),
        }
    }
}

/// Map from a normalized key to its correction.
#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    entries: HashMap<String, Override>,
}

impl OverrideTable {
    /// An empty table (tests, threshold experiments).
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in corrections accumulated from production runs.
    pub fn builtin() -> Self {
        let mut table = Self::default();
        table.insert("Weili Zhang", Override::alias("Zhang Weili"));
        table.insert("Dooho Choi", Override::alias("Choi Doo-ho"));
        table.insert("Alexey Oleynik", Override::alias("Aleksei Oleinik"));
        table.insert("Marco Polo Reyes", Override::alias("Polo Reyes"));
        table.insert(
            "Joanderson Brito",
            Override::locator("https://www.sherdog.com/fighter/Joanderson-Brito-80849"),
        );
        table
    }

    /// Build from config entries, layered on top of the built-ins.
    pub fn from_config(entries: &[OverrideEntryConfig]) -> Self {
        let mut table = Self::builtin();
        for entry in entries {
            table.insert(
                &entry.name,
                Override {
                    alias: entry.alias.clone(),
                    locator: entry.locator.clone(),
                },
            );
        }
        table
    }

    /// Insert a correction, keyed by the normalized form of `name`.
    pub fn insert(&mut self, name: &str, correction: Override) {
        self.entries.insert(normalize_name(name), correction);
    }

    /// Look up a correction by an already-normalized key.
    pub fn lookup(&self, normalized_key: &str) -> Option<&Override> {
        self.entries.get(normalized_key)
    }

    /// Look up a correction for a raw display name.
    pub fn lookup_name(&self, name: &str) -> Option<&Override> {
        self.lookup(&normalize_name(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
