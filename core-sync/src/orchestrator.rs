//! # Concurrency Orchestrator
//!
//! Fans processing out over a bounded pool once the listing barrier is done.
//!
//! ## Limits
//!
//! - In-flight units: `workerConcurrency`, or `workerCount × workerConcurrency`
//!   in cluster mode.
//! - Concurrent downloads: enforced separately by [`AssetProcessor`].
//! - Per-unit timeout: an expired unit is aborted (its worker process, if
//!   any, is killed) and reported as failed. Other units keep running.
//!
//! Units run unordered; outcomes come back sorted by key.

use std::sync::Arc;

use core_async::sync::{Mutex, Semaphore};
use core_async::task::JoinSet;
use core_async::time::timeout;
use core_library::AssetManifest;
use core_runtime::config::WorkerConfig;
use core_runtime::logging::TaggedLogger;
use tracing::{error, instrument};

use crate::change_set::WorkUnit;
use crate::error::{Result, SyncError};
use crate::isolation::ProcessIsolation;
use crate::processor::AssetProcessor;

/// Result of one unit.
#[derive(Debug)]
pub struct UnitOutcome {
    pub unit: WorkUnit,
    pub result: Result<AssetManifest>,
}

pub struct Orchestrator {
    processor: Arc<AssetProcessor>,
    worker: WorkerConfig,
    isolation: Option<ProcessIsolation>,
    logger: TaggedLogger,
}

impl Orchestrator {
    /// In-process orchestrator.
    pub fn new(processor: Arc<AssetProcessor>, worker: WorkerConfig) -> Self {
        Self {
            processor,
            worker,
            isolation: None,
            logger: TaggedLogger::component("Orchestrator"),
        }
    }

    /// Parent logger; worker slots log under `<tag>/Worker-N`.
    pub fn with_logger(mut self, logger: TaggedLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn logger(&self) -> &TaggedLogger {
        &self.logger
    }

    /// Run every unit through `isolation` instead of in-process.
    pub fn with_isolation(mut self, isolation: ProcessIsolation) -> Self {
        self.isolation = Some(isolation);
        self
    }

    pub fn is_isolated(&self) -> bool {
        self.isolation.is_some()
    }

    pub fn max_in_flight(&self) -> usize {
        self.worker.max_in_flight().max(1)
    }

    /// Process `units` and return one outcome per unit.
    #[instrument(skip(self, units), fields(units = units.len(), isolated = self.is_isolated()))]
    pub async fn run(&self, units: Vec<WorkUnit>) -> Vec<UnitOutcome> {
        let max_in_flight = self.max_in_flight();
        let limit = self.worker.timeout();
        let timeout_ms = self.worker.timeout;

        self.logger.info(format_args!(
            "Dispatching {} units ({} in flight, {} ms timeout)",
            units.len(),
            max_in_flight,
            timeout_ms
        ));

        let in_flight = Arc::new(Semaphore::new(max_in_flight));
        let free_slots = Arc::new(Mutex::new((0..max_in_flight).rev().collect::<Vec<_>>()));
        let mut tasks = JoinSet::new();

        for unit in units {
            let processor = Arc::clone(&self.processor);
            let isolation = self.isolation.clone();
            let in_flight = Arc::clone(&in_flight);
            let free_slots = Arc::clone(&free_slots);
            let parent = self.logger.clone();

            tasks.spawn(async move {
                let _permit = match in_flight.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return UnitOutcome {
                            unit,
                            result: Err(SyncError::Worker(e.to_string())),
                        }
                    }
                };
                let slot = free_slots.lock().await.pop().unwrap_or_default();
                let logger = worker_logger(&parent, slot);

                let task = {
                    let unit = unit.clone();
                    let logger = logger.clone();
                    core_async::spawn(async move {
                        run_unit(&processor, isolation.as_ref(), &unit, &logger).await
                    })
                };
                let abort = task.abort_handle();

                let result = match timeout(limit, task).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(join_error)) => Err(SyncError::Worker(format!(
                        "Unit task failed: {}",
                        join_error
                    ))),
                    Err(_) => {
                        abort.abort();
                        Err(SyncError::Timeout(timeout_ms))
                    }
                };

                match &result {
                    Ok(_) => logger.debug(format_args!("Processed {}", unit.key())),
                    Err(e) => logger.warn(format_args!("Failed {}: {}", unit.key(), e)),
                }
                free_slots.lock().await.push(slot);

                UnitOutcome { unit, result }
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!("Orchestrator task lost: {}", e),
            }
        }

        outcomes.sort_by(|a, b| a.unit.key().cmp(b.unit.key()));
        outcomes
    }
}

fn worker_logger(parent: &TaggedLogger, slot: usize) -> TaggedLogger {
    parent.child(format!("Worker-{}", slot))
}

async fn run_unit(
    processor: &AssetProcessor,
    isolation: Option<&ProcessIsolation>,
    unit: &WorkUnit,
    logger: &TaggedLogger,
) -> Result<AssetManifest> {
    match isolation {
        None => processor.process(unit, logger).await,
        Some(isolation) => {
            let data = processor.fetch(unit, logger).await?;
            isolation
                .run(
                    unit.key(),
                    &data,
                    unit.live_photo_key(),
                    processor.extractor().options(),
                    processor.artifacts(),
                    logger,
                )
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{ArtifactGenerator, ArtifactOutput, NoopArtifactGenerator};
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::storage::{StorageBackend, StorageObject, UploadOptions};
    use bridge_traits::FixedClock;
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};
    use core_async::time::{sleep, Duration};
    use core_metadata::MetadataExtractor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves every key; tracks peak concurrent `get_file` calls.
    #[derive(Default)]
    struct SlowBackend {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl StorageBackend for SlowBackend {
        fn provider(&self) -> &str {
            "slow"
        }

        async fn list_all_files(&self) -> BridgeResult<Vec<StorageObject>> {
            Ok(Vec::new())
        }

        async fn get_file(&self, key: &str) -> BridgeResult<Option<Bytes>> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            if key.starts_with("missing") {
                return Ok(None);
            }
            Ok(Some(Bytes::from(key.to_string())))
        }

        async fn upload_file(
            &self,
            key: &str,
            data: Bytes,
            _options: UploadOptions,
        ) -> BridgeResult<StorageObject> {
            Ok(StorageObject::new(key, data.len() as u64))
        }

        async fn move_file(&self, _from: &str, to: &str) -> BridgeResult<StorageObject> {
            Ok(StorageObject::new(to, 0))
        }

        async fn delete_file(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }

        fn generate_public_url(&self, key: &str) -> String {
            key.to_string()
        }
    }

    struct StallingGenerator;

    #[async_trait]
    impl ArtifactGenerator for StallingGenerator {
        async fn generate(&self, key: &str, _data: &Bytes) -> Result<ArtifactOutput> {
            if key.starts_with("stall") {
                sleep(Duration::from_secs(30)).await;
            }
            Ok(ArtifactOutput::default())
        }
    }

    fn processor(
        backend: Arc<SlowBackend>,
        artifacts: Arc<dyn ArtifactGenerator>,
        max_downloads: usize,
    ) -> Arc<AssetProcessor> {
        let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()));
        Arc::new(AssetProcessor::new(
            backend,
            MetadataExtractor::new(clock),
            artifacts,
            max_downloads,
        ))
    }

    fn units(keys: &[&str]) -> Vec<WorkUnit> {
        keys.iter()
            .map(|k| WorkUnit {
                object: StorageObject::new(*k, 1),
                live_photo: None,
                existing: None,
            })
            .collect()
    }

    fn worker(concurrency: usize, timeout_ms: u64) -> WorkerConfig {
        WorkerConfig {
            timeout: timeout_ms,
            use_cluster_mode: false,
            worker_concurrency: concurrency,
            worker_count: 1,
        }
    }

    #[core_async::test]
    async fn test_outcomes_sorted_and_failures_isolated() {
        let backend = Arc::new(SlowBackend::default());
        let orchestrator = Orchestrator::new(
            processor(backend, Arc::new(NoopArtifactGenerator), 8),
            worker(4, 5_000),
        );

        let outcomes = orchestrator
            .run(units(&["c.jpg", "missing.jpg", "a.jpg", "b.jpg"]))
            .await;

        let keys: Vec<&str> = outcomes.iter().map(|o| o.unit.key()).collect();
        assert_eq!(keys, vec!["a.jpg", "b.jpg", "c.jpg", "missing.jpg"]);
        assert!(outcomes[..3].iter().all(|o| o.result.is_ok()));
        assert!(matches!(
            outcomes[3].result,
            Err(SyncError::Backend(bridge_traits::BridgeError::NotFound(_)))
        ));
    }

    #[core_async::test]
    async fn test_download_limit_is_independent_of_pool_size() {
        let backend = Arc::new(SlowBackend::default());
        let orchestrator = Orchestrator::new(
            processor(backend.clone(), Arc::new(NoopArtifactGenerator), 2),
            worker(8, 5_000),
        );

        let keys: Vec<String> = (0..10).map(|i| format!("{}.jpg", i)).collect();
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let outcomes = orchestrator.run(units(&key_refs)).await;

        assert_eq!(outcomes.len(), 10);
        assert!(backend.peak.load(Ordering::SeqCst) <= 2);
    }

    #[core_async::test]
    async fn test_pool_bounds_in_flight_units() {
        let backend = Arc::new(SlowBackend::default());
        let orchestrator = Orchestrator::new(
            processor(backend.clone(), Arc::new(NoopArtifactGenerator), 16),
            worker(3, 5_000),
        );

        let keys: Vec<String> = (0..9).map(|i| format!("{}.jpg", i)).collect();
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        orchestrator.run(units(&key_refs)).await;

        let peak = backend.peak.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= 3, "peak {}", peak);
    }

    #[core_async::test]
    async fn test_timeout_fails_only_that_unit() {
        let backend = Arc::new(SlowBackend::default());
        let orchestrator = Orchestrator::new(
            processor(backend, Arc::new(StallingGenerator), 4),
            worker(2, 500),
        );

        let outcomes = orchestrator.run(units(&["a.jpg", "stall.jpg"])).await;
        assert!(outcomes[0].result.is_ok());
        assert!(matches!(outcomes[1].result, Err(SyncError::Timeout(500))));
    }

    #[test]
    fn test_worker_loggers_nest_under_the_parent() {
        let orchestrator = Orchestrator::new(
            processor(
                Arc::new(SlowBackend::default()),
                Arc::new(NoopArtifactGenerator),
                1,
            ),
            worker(2, 1_000),
        )
        .with_logger(TaggedLogger::component("Main").child("Orchestrator"));

        assert_eq!(orchestrator.logger().tag(), "PhotoSync:Main/Orchestrator");
        assert_eq!(
            worker_logger(orchestrator.logger(), 1).tag(),
            "PhotoSync:Main/Orchestrator/Worker-1"
        );
    }

    #[test]
    fn test_cluster_mode_multiplies_slots() {
        let config = WorkerConfig {
            timeout: 1_000,
            use_cluster_mode: true,
            worker_concurrency: 2,
            worker_count: 3,
        };
        let orchestrator = Orchestrator::new(
            processor(
                Arc::new(SlowBackend::default()),
                Arc::new(NoopArtifactGenerator),
                1,
            ),
            config,
        )
        .with_isolation(ProcessIsolation::new("photo-sync-worker"));
        assert_eq!(orchestrator.max_in_flight(), 6);
        assert!(orchestrator.is_isolated());
    }
}
