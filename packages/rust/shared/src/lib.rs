//! Shared domain types, errors, and configuration for FightSync.
//!
//! Every other crate in the workspace depends on this one; it has no
//! knowledge of matching, fetching, or storage internals.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    AppConfig, DatabaseConfig, DefaultsConfig, FetchConfig, MatchingConfig, OverrideEntryConfig,
    RateLimitConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    DEFAULT_SIMILARITY_THRESHOLD,
};
pub use error::{FightSyncError, Result};
pub use types::{
    BoutSlot, CanonicalFighter, ConflictRecord, FailureKind, FightRecord, FighterId,
    LedgerRecord, RankPosition, RankingEntry, RawRecord, RecordBreakdown, SourceKind, Stage,
    UpcomingBout,
};
