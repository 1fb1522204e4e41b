//! Concurrent fetch engine.
//!
//! Drives one extractor over a list of targets through a bounded worker
//! pool. Workers share the rate-limited client and the injected memo
//! cache; a failed target becomes a ledger record carrying enough context
//! to retry it later, and a parse failure skips the one record without
//! aborting the batch.

use std::sync::Arc;
use std::time::Duration;

use fightsync_shared::{FightSyncError, LedgerRecord, RawRecord, Stage};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::cache::SharedRecordCache;
use crate::client::RateLimitedClient;
use crate::extractor::{Extractor, FetchTarget};

/// Summary of one fetch pass.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Records extracted, in target order.
    pub records: Vec<RawRecord>,
    /// Targets that failed and were queued for retry.
    pub failures: Vec<LedgerRecord>,
    /// Records skipped because the extractor found no usable structure.
    pub parse_skipped: usize,
    /// Targets served from the memo cache.
    pub cache_hits: usize,
    /// Wall-clock time for the pass.
    pub duration: Duration,
}

enum TaskResult {
    Extracted { records: Vec<RawRecord>, cached: bool },
    ParseSkipped { name: String, reason: String },
    Failed(Box<LedgerRecord>),
}

/// Bounded-concurrency driver for one extractor.
pub struct FetchEngine {
    client: RateLimitedClient,
    workers: usize,
}

impl FetchEngine {
    pub fn new(client: RateLimitedClient, workers: usize) -> Self {
        Self {
            client,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `extractor` over `targets`, collecting records and failures.
    #[instrument(skip_all, fields(stage = %stage, targets = targets.len(), workers = self.workers))]
    pub async fn run(
        &self,
        extractor: Arc<dyn Extractor>,
        stage: Stage,
        targets: Vec<FetchTarget>,
        cache: &SharedRecordCache,
    ) -> FetchOutcome {
        let start = std::time::Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.workers));

        let mut handles = Vec::with_capacity(targets.len());
        for target in targets {
            let extractor = Arc::clone(&extractor);
            let client = self.client.clone();
            let cache = Arc::clone(cache);
            let sem = Arc::clone(&semaphore);

            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire().await.expect("semaphore closed");

                let key = target.cache_key();
                if let Some(hit) = cache.lock().await.get(&key).cloned() {
                    debug!(target = %target.name, "cache hit");
                    return TaskResult::Extracted {
                        records: hit,
                        cached: true,
                    };
                }

                match extractor.extract(&client, &target).await {
                    Ok(records) => {
                        cache.lock().await.insert(key, records.clone());
                        TaskResult::Extracted {
                            records,
                            cached: false,
                        }
                    }
                    Err(FightSyncError::Parse { message }) => TaskResult::ParseSkipped {
                        name: target.name.clone(),
                        reason: message,
                    },
                    Err(e) => {
                        let mut record =
                            LedgerRecord::new(stage, target.name.clone(), e.to_string());
                        record.subject_id = target.fighter_id;
                        record.locator = target.locator.clone();
                        TaskResult::Failed(Box::new(record))
                    }
                }
            }));
        }

        let mut outcome = FetchOutcome::default();
        for handle in handles {
            match handle.await {
                Ok(TaskResult::Extracted { records, cached }) => {
                    if cached {
                        outcome.cache_hits += 1;
                    }
                    outcome.records.extend(records);
                }
                Ok(TaskResult::ParseSkipped { name, reason }) => {
                    warn!(subject = %name, reason, "parse failure, record skipped");
                    outcome.parse_skipped += 1;
                }
                Ok(TaskResult::Failed(record)) => {
                    warn!(subject = %record.subject_name, reason = %record.reason, "fetch failed");
                    outcome.failures.push(*record);
                }
                Err(e) => {
                    warn!(error = %e, "fetch task aborted");
                    outcome
                        .failures
                        .push(LedgerRecord::new(stage, "unknown", format!("task aborted: {e}")));
                }
            }
        }

        outcome.duration = start.elapsed();
        info!(
            records = outcome.records.len(),
            failures = outcome.failures.len(),
            parse_skipped = outcome.parse_skipped,
            cache_hits = outcome.cache_hits,
            duration_ms = outcome.duration.as_millis() as u64,
            "fetch pass complete"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::shared_record_cache;
    use crate::client::RateLimits;
    use async_trait::async_trait;
    use fightsync_shared::{Result, SourceKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Extractor that fails for configured names, parse-skips others,
    /// and counts every call.
    struct ScriptedExtractor {
        fail: Vec<&'static str>,
        parse_skip: Vec<&'static str>,
        calls: AtomicUsize,
    }

    impl ScriptedExtractor {
        fn new() -> Self {
            Self {
                fail: Vec::new(),
                parse_skip: Vec::new(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Extractor for ScriptedExtractor {
        fn source(&self) -> SourceKind {
            SourceKind::Sherdog
        }

        async fn targets(
            &self,
            _client: &RateLimitedClient,
            _seed: &[RawRecord],
        ) -> Result<Vec<FetchTarget>> {
            Ok(Vec::new())
        }

        async fn extract(
            &self,
            _client: &RateLimitedClient,
            target: &FetchTarget,
        ) -> Result<Vec<RawRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.contains(&target.name.as_str()) {
                return Err(FightSyncError::fetch(format!("{}: HTTP 500", target.name)));
            }
            if self.parse_skip.contains(&target.name.as_str()) {
                return Err(FightSyncError::parse("no record block"));
            }
            Ok(vec![RawRecord::new(target.name.clone())])
        }
    }

    fn engine(workers: usize) -> FetchEngine {
        let client = RateLimitedClient::new(RateLimits::unlimited()).unwrap();
        FetchEngine::new(client, workers)
    }

    fn targets(names: &[&str]) -> Vec<FetchTarget> {
        names.iter().map(|n| FetchTarget::named(*n)).collect()
    }

    #[tokio::test]
    async fn collects_records_in_target_order() {
        let extractor = Arc::new(ScriptedExtractor::new());
        let cache = shared_record_cache(16);

        let outcome = engine(4)
            .run(
                extractor,
                Stage::FetchSecondary,
                targets(&["A", "B", "C"]),
                &cache,
            )
            .await;

        let names: Vec<_> = outcome.records.iter().map(|r| r.display_name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn failures_become_ledger_records() {
        let mut scripted = ScriptedExtractor::new();
        scripted.fail = vec!["B"];
        let cache = shared_record_cache(16);

        let outcome = engine(2)
            .run(
                Arc::new(scripted),
                Stage::FetchSecondary,
                targets(&["A", "B", "C"]),
                &cache,
            )
            .await;

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        let failure = &outcome.failures[0];
        assert_eq!(failure.subject_name, "B");
        assert_eq!(failure.stage, Stage::FetchSecondary);
        assert!(failure.reason.contains("HTTP 500"));
    }

    #[tokio::test]
    async fn parse_failures_are_skipped_and_counted() {
        let mut scripted = ScriptedExtractor::new();
        scripted.parse_skip = vec!["B"];
        let cache = shared_record_cache(16);

        let outcome = engine(2)
            .run(
                Arc::new(scripted),
                Stage::FetchDetails,
                targets(&["A", "B", "C"]),
                &cache,
            )
            .await;

        // Skipped, counted — and not ledgered.
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.parse_skipped, 1);
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn cache_short_circuits_repeat_targets() {
        let extractor = Arc::new(ScriptedExtractor::new());
        let cache = shared_record_cache(16);
        let eng = engine(1);

        let first = eng
            .run(
                Arc::clone(&extractor) as Arc<dyn Extractor>,
                Stage::FetchSecondary,
                targets(&["A"]),
                &cache,
            )
            .await;
        assert_eq!(first.cache_hits, 0);

        let second = eng
            .run(
                extractor.clone() as Arc<dyn Extractor>,
                Stage::FetchSecondary,
                targets(&["A"]),
                &cache,
            )
            .await;
        assert_eq!(second.cache_hits, 1);
        assert_eq!(second.records.len(), 1);
        // The extractor itself was only consulted once.
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_targets_are_not_cached() {
        let mut scripted = ScriptedExtractor::new();
        scripted.fail = vec!["A"];
        let extractor = Arc::new(scripted);
        let cache = shared_record_cache(16);

        engine(1)
            .run(
                Arc::clone(&extractor) as Arc<dyn Extractor>,
                Stage::FetchSecondary,
                targets(&["A"]),
                &cache,
            )
            .await;

        assert!(cache.lock().await.is_empty());
    }
}
