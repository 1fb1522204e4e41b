//! Generic JSON feed extractor.
//!
//! The production extractors run outside this workspace and hand over
//! their results as JSON arrays of raw records (one feed per source).
//! This extractor reads such a feed from a URL or a local file. It is the
//! only extractor shipped here; anything that knows about a site's DOM
//! belongs in the extractor's own repository.

use std::path::PathBuf;

use async_trait::async_trait;
use fightsync_shared::{FightSyncError, RawRecord, Result, SourceKind};
use tracing::warn;
use url::Url;

use crate::client::RateLimitedClient;
use crate::extractor::{Extractor, FetchTarget};

/// Where a feed lives.
#[derive(Debug, Clone)]
enum FeedLocation {
    Url(Url),
    File(PathBuf),
}

impl std::fmt::Display for FeedLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{url}"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Extractor over a single JSON feed of raw records.
#[derive(Debug, Clone)]
pub struct JsonFeedExtractor {
    source: SourceKind,
    location: FeedLocation,
}

impl JsonFeedExtractor {
    /// Build from a location string: `http(s)://` URLs are fetched via
    /// the shared client, anything else is treated as a file path.
    pub fn new(source: SourceKind, location: &str) -> Self {
        let location = match Url::parse(location) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => FeedLocation::Url(url),
            _ => FeedLocation::File(PathBuf::from(location)),
        };
        Self { source, location }
    }

    async fn read_body(&self, client: &RateLimitedClient) -> Result<String> {
        match &self.location {
            FeedLocation::Url(url) => client.get_text(url).await,
            FeedLocation::File(path) => {
                std::fs::read_to_string(path).map_err(|e| FightSyncError::io(path, e))
            }
        }
    }
}

#[async_trait]
impl Extractor for JsonFeedExtractor {
    fn source(&self) -> SourceKind {
        self.source
    }

    async fn targets(
        &self,
        _client: &RateLimitedClient,
        _seed: &[RawRecord],
    ) -> Result<Vec<FetchTarget>> {
        Ok(vec![
            FetchTarget::named(format!("{} feed", self.source))
                .with_locator(self.location.to_string()),
        ])
    }

    async fn extract(
        &self,
        client: &RateLimitedClient,
        _target: &FetchTarget,
    ) -> Result<Vec<RawRecord>> {
        let body = self.read_body(client).await?;
        parse_feed(&body, self.source)
    }
}

/// Parse a feed body into raw records. Individual malformed entries are
/// skipped with a warning; a feed that is not a JSON array at all is a
/// parse failure.
fn parse_feed(body: &str, source: SourceKind) -> Result<Vec<RawRecord>> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| FightSyncError::parse(format!("{source} feed is not valid JSON: {e}")))?;

    let items = value
        .as_array()
        .ok_or_else(|| FightSyncError::parse(format!("{source} feed is not a JSON array")))?;

    let mut records = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            warn!(%source, index = i, "feed entry is not an object, skipping");
            continue;
        };

        let name = obj
            .get("display_name")
            .or_else(|| obj.get("name"))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let Some(name) = name else {
            warn!(%source, index = i, "feed entry has no name, skipping");
            continue;
        };

        let mut record = RawRecord::new(name);
        record.source_ref = obj
            .get("source_ref")
            .and_then(|v| v.as_str())
            .map(String::from);

        for (key, value) in obj {
            if matches!(key.as_str(), "display_name" | "name" | "source_ref") {
                continue;
            }
            record.fields.insert(key.clone(), value.clone());
        }

        records.push(record);
    }

    Ok(records)
}
