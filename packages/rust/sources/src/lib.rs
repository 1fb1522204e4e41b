//! Source access for FightSync: the extractor seam, the shared
//! rate-limited HTTP client, the bounded lookup cache, and the concurrent
//! fetch engine that drives extractors through a bounded worker pool.
//!
//! Site-specific extraction (selectors, DOM walking) lives behind the
//! [`Extractor`] trait, outside this workspace's core.

pub mod cache;
pub mod client;
pub mod engine;
pub mod extractor;
pub mod feed;

pub use cache::{BoundedCache, SharedRecordCache, shared_record_cache};
pub use client::{RateLimitedClient, RateLimits};
pub use engine::{FetchEngine, FetchOutcome};
pub use extractor::{Extractor, FetchTarget};
pub use feed::JsonFeedExtractor;
