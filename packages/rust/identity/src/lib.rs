//! Identity resolution for FightSync: name normalization, the override
//! table for known aliasing cases, and the matcher that resolves a raw
//! display name to at most one canonical identity.

pub mod matcher;
pub mod normalize;
pub mod overrides;

pub use matcher::{IdentityIndex, MatchOutcome, Matcher};
pub use normalize::normalize_name;
pub use overrides::{Override, OverrideTable};
