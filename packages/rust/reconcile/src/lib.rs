//! Cross-source reconciliation: merging matched per-source field maps
//! into one canonical entity per fighter, surfacing identifier conflicts,
//! and resolving ranking/bout fact rows against the canonical set.

pub mod facts;
pub mod merger;

pub use facts::{resolve_bouts, resolve_rankings};
pub use merger::{IngestPolicy, IngestReport, Reconciler};
