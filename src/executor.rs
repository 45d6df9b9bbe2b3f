use crate::config::HarvestConfig;
use crate::fetch::HttpCatalogSource;
use crate::harvest::pipeline::{HarvestPipeline, HarvestResult};
use crate::harvest::traits::ItemError;
use crate::index::CatalogIndex;
use crate::model::CatalogIndexEntry;
use crate::store::{ManifestStore, StoreError};
use crate::traits::{CatalogSource, FetchError};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, instrument, warn};

/// Failures that end a whole run. Per-ID failures never show up here.
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Failed to write catalog index: {0}")]
    IndexWrite(#[source] StoreError),
    #[error("Index writer task failed: {0}")]
    IndexTask(String),
    /// The queue was closed before every ID was admitted
    #[error("Harvest queue closed before all IDs were admitted")]
    QueueClosed,
}

/// Outcome of one harvest run.
#[derive(Debug, Clone, Default)]
pub struct HarvestReport {
    /// IDs submitted to the queue
    pub attempted: usize,
    /// IDs that produced a manifest and an index entry
    pub persisted: usize,
    /// Dropped IDs per failure kind
    pub dropped: BTreeMap<&'static str, usize>,
    /// Index entries, sorted by source ID
    pub entries: Vec<CatalogIndexEntry>,
    pub index_path: PathBuf,
    pub duration_ms: u64,
}

impl HarvestReport {
    pub fn dropped_total(&self) -> usize {
        self.dropped.values().sum()
    }
}

type WorkerOutput = (u32, Result<HarvestResult, ItemError>);

/// Bounded-concurrency sweep over a range of catalog IDs.
///
/// At most `concurrency` pipelines run at once. IDs are admitted in
/// submission order; they complete in whatever order the catalog answers.
/// Workers hand their index entries back to the drain loop, which is the only
/// owner of the run's [`CatalogIndex`].
pub struct HarvestQueue<S>
where
    S: CatalogSource + 'static,
{
    pipeline: Arc<HarvestPipeline<S>>,
    semaphore: Arc<Semaphore>,
    index_file: String,
}

impl HarvestQueue<HttpCatalogSource> {
    /// Builds a queue that fetches over HTTP as described by `config`.
    pub fn from_config(config: &HarvestConfig) -> Result<Self, FetchError> {
        let source = HttpCatalogSource::new(&config.catalog)?;
        let pipeline = HarvestPipeline::new(source, ManifestStore::new(&config.harvest.output_dir))
            .with_region(config.harvest.region.clone())
            .with_manifest_config(config.manifest.clone());

        Ok(Self::new(pipeline, config.harvest.concurrency)
            .with_index_file(config.harvest.index_file.clone()))
    }
}

impl<S> HarvestQueue<S>
where
    S: CatalogSource + 'static,
{
    pub fn new(pipeline: HarvestPipeline<S>, concurrency_limit: usize) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            semaphore: Arc::new(Semaphore::new(concurrency_limit.max(1))),
            index_file: "configSummary.json".to_string(),
        }
    }

    pub fn with_index_file(mut self, index_file: impl Into<String>) -> Self {
        self.index_file = index_file.into();
        self
    }

    /// Stops admitting IDs. A run in progress, or any later run, ends with
    /// [`HarvestError::QueueClosed`] at its next admission and writes no
    /// index; pipelines already admitted are aborted.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Attempts every ID exactly once, then writes the index.
    ///
    /// # Errors
    ///
    /// Fails when the index cannot be written or the queue was closed. Fetch,
    /// synthesis and persistence failures drop the ID and are counted in the
    /// report.
    #[instrument(skip(self, ids), fields(catalog = %self.pipeline.source_name()))]
    pub async fn run<I>(&self, ids: I) -> Result<HarvestReport, HarvestError>
    where
        I: IntoIterator<Item = u32>,
    {
        let start = Instant::now();
        let mut index = CatalogIndex::new();
        let mut report = HarvestReport::default();
        let mut workers = JoinSet::new();

        info!("Starting harvest");

        for source_id in ids {
            let permit = Arc::clone(&self.semaphore)
                .acquire_owned()
                .await
                .map_err(|_| HarvestError::QueueClosed)?;
            let pipeline = Arc::clone(&self.pipeline);

            report.attempted += 1;
            workers.spawn(async move {
                let _permit = permit;
                (source_id, pipeline.execute(source_id).await)
            });

            while let Some(joined) = workers.try_join_next() {
                Self::collect(joined, &mut index, &mut report);
            }
        }

        while let Some(joined) = workers.join_next().await {
            Self::collect(joined, &mut index, &mut report);
        }

        // ====================================================================
        // Drain: flush the index exactly once
        // ====================================================================

        let entries = index.into_sorted();
        let store = Arc::clone(self.pipeline.store());
        let index_file = self.index_file.clone();
        let to_write = entries.clone();
        let index_path =
            tokio::task::spawn_blocking(move || store.write_index(&to_write, &index_file))
                .await
                .map_err(|e| HarvestError::IndexTask(e.to_string()))?
                .map_err(HarvestError::IndexWrite)?;

        report.entries = entries;
        report.index_path = index_path;
        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            attempted = report.attempted,
            persisted = report.persisted,
            dropped = report.dropped_total(),
            duration_ms = report.duration_ms,
            index = %report.index_path.display(),
            "Finished harvest"
        );
        Ok(report)
    }

    fn collect(
        joined: Result<WorkerOutput, JoinError>,
        index: &mut CatalogIndex,
        report: &mut HarvestReport,
    ) {
        match joined {
            Ok((_, Ok(result))) => {
                report.persisted += 1;
                index.push(result.entry);
            }
            Ok((source_id, Err(err))) => {
                match &err {
                    ItemError::Persist(_) | ItemError::Worker(_) => {
                        warn!(source_id, error = %err, "Dropping source ID")
                    }
                    _ => debug!(source_id, reason = err.kind(), error = %err, "Dropping source ID"),
                }
                *report.dropped.entry(err.kind()).or_default() += 1;
            }
            Err(err) => {
                warn!(error = %err, "Harvest worker panicked");
                *report.dropped.entry("panic").or_default() += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    // In-memory catalog; IDs without a body answer 404
    #[derive(Default)]
    struct MemorySource {
        bodies: HashMap<u32, String>,
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl MemorySource {
        fn with(mut self, source_id: u32, body: impl Into<String>) -> Self {
            self.bodies.insert(source_id, body.into());
            self
        }
    }

    #[async_trait]
    impl CatalogSource for MemorySource {
        fn name(&self) -> &str {
            "memory"
        }

        async fn fetch(&self, source_id: u32) -> Result<String, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.bodies
                .get(&source_id)
                .cloned()
                .ok_or(FetchError::HttpStatus {
                    status: 404,
                    url: format!("memory/{source_id}"),
                })
        }
    }

    fn device(manufacturer: &str, product: u32) -> String {
        json!({
            "ManufacturerId": manufacturer,
            "ProductTypeId": "0x0001",
            "ProductId": product,
            "Name": format!("Device {product}"),
            "FrequencyName": "Europe",
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_failures_are_dropped_not_fatal() {
        let dir = tempdir().unwrap();
        let source = MemorySource::default()
            .with(1, device("0x0086", 1))
            .with(2, device("0x0086", 2))
            .with(3, "{ truncated")
            .with(4, device("garbage", 4))
            .with(5, device("0x0000", 5))
            .with(6, device("0x0086", 6));
        // 7..=9 answer 404
        let queue = HarvestQueue::new(
            HarvestPipeline::new(source, ManifestStore::new(dir.path())),
            4,
        );

        let report = queue.run(1..=9).await.unwrap();

        assert_eq!(report.attempted, 9);
        assert_eq!(report.persisted, 3);
        assert_eq!(report.entries.len(), 3);
        assert_eq!(report.dropped_total(), 6);
        assert_eq!(report.dropped["transport"], 3);
        assert_eq!(report.dropped["malformed"], 1);
        assert_eq!(report.dropped["unresolvable"], 1);
        assert_eq!(report.dropped["persist"], 1);

        let ids: Vec<_> = report.entries.iter().map(|e| e.source_id).collect();
        assert_eq!(ids, [1, 2, 6]);
        assert!(report.entries.iter().all(|e| e.path.exists()));
    }

    #[tokio::test]
    async fn test_index_written_once_at_drain() {
        let dir = tempdir().unwrap();
        let source = MemorySource::default()
            .with(10, device("0x0086", 1))
            .with(11, device("0x0086", 2));
        let queue = HarvestQueue::new(
            HarvestPipeline::new(source, ManifestStore::new(dir.path())),
            2,
        )
        .with_index_file("index.json");

        let report = queue.run(10..=12).await.unwrap();

        assert_eq!(report.index_path, dir.path().join("index.json"));
        let loaded = CatalogIndex::load(&report.index_path).unwrap();
        assert_eq!(loaded.entries(), report.entries.as_slice());
        assert_eq!(loaded.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrency_ceiling() {
        let dir = tempdir().unwrap();
        let mut source = MemorySource {
            delay: Duration::from_millis(20),
            ..Default::default()
        };
        for id in 0..12 {
            source = source.with(id, device("0x0086", id + 1));
        }
        let queue = HarvestQueue::new(
            HarvestPipeline::new(source, ManifestStore::new(dir.path())),
            3,
        );

        let report = queue.run(0..12).await.unwrap();
        assert_eq!(report.persisted, 12);

        let peak = queue.pipeline.source_peak();
        assert!(peak <= 3, "peak in-flight was {peak}");
        assert!(peak >= 2, "peak in-flight was {peak}");
    }

    #[tokio::test]
    async fn test_colliding_identities_get_suffixes() {
        let dir = tempdir().unwrap();
        let existing = dir.path().join("134/1/1/config.json");
        std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
        std::fs::write(&existing, "keep me").unwrap();

        let source = MemorySource::default()
            .with(1, device("0x0086", 1))
            .with(2, device("134", 1))
            .with(3, device("86", 1));
        let queue = HarvestQueue::new(
            HarvestPipeline::new(source, ManifestStore::new(dir.path())),
            3,
        );

        let report = queue.run(1..=3).await.unwrap();
        assert_eq!(report.persisted, 3);

        let mut paths: Vec<_> = report.entries.iter().map(|e| e.path.clone()).collect();
        paths.sort();
        assert_eq!(
            paths,
            [
                dir.path().join("134/1/1/config-1.json"),
                dir.path().join("134/1/1/config-2.json"),
                dir.path().join("86/1/1/config.json"),
            ]
        );
        assert_eq!(std::fs::read_to_string(&existing).unwrap(), "keep me");
    }

    #[tokio::test]
    async fn test_rerun_is_additive() {
        let dir = tempdir().unwrap();
        let make = || {
            HarvestQueue::new(
                HarvestPipeline::new(
                    MemorySource::default().with(1, device("0x0086", 1)),
                    ManifestStore::new(dir.path()),
                ),
                1,
            )
        };

        let first = make().run(1..=1).await.unwrap();
        let second = make().run(1..=1).await.unwrap();

        assert_eq!(first.entries[0].path, dir.path().join("134/1/1/config.json"));
        assert_eq!(second.entries[0].path, dir.path().join("134/1/1/config-1.json"));
    }

    #[tokio::test]
    async fn test_region_filter_counts_drops() {
        let dir = tempdir().unwrap();
        let us = json!({
            "ManufacturerId": "0x0086",
            "ProductTypeId": 1,
            "ProductId": 9,
            "FrequencyName": "U.S. / Canada / Mexico",
        })
        .to_string();
        let source = MemorySource::default()
            .with(1, device("0x0086", 1))
            .with(2, us);
        let queue = HarvestQueue::new(
            HarvestPipeline::new(source, ManifestStore::new(dir.path()))
                .with_region(Some("Europe".to_string())),
            2,
        );

        let report = queue.run([1, 2]).await.unwrap();
        assert_eq!(report.persisted, 1);
        assert_eq!(report.dropped["filtered"], 1);
    }

    #[tokio::test]
    async fn test_closed_queue_admits_nothing() {
        let dir = tempdir().unwrap();
        let source = MemorySource::default().with(1, device("0x0086", 1));
        let queue = HarvestQueue::new(
            HarvestPipeline::new(source, ManifestStore::new(dir.path())),
            2,
        );

        queue.close();
        assert!(queue.is_closed());

        let err = queue.run(1..=3).await.unwrap_err();
        assert!(matches!(err, HarvestError::QueueClosed));
        assert!(!dir.path().join("configSummary.json").exists());
        assert!(!dir.path().join("134").exists());
    }

    #[tokio::test]
    async fn test_unwritable_index_is_fatal() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("not-a-dir");
        std::fs::write(&root, "file in the way").unwrap();

        let queue = HarvestQueue::new(
            HarvestPipeline::new(
                MemorySource::default().with(1, device("0x0086", 1)),
                ManifestStore::new(&root),
            ),
            1,
        );

        let err = queue.run(1..=1).await.unwrap_err();
        assert!(matches!(err, HarvestError::IndexWrite(_)));
    }

    #[test]
    fn test_from_config() {
        let mut config = HarvestConfig::default();
        config.harvest.concurrency = 5;
        config.harvest.index_file = "summary.json".to_string();

        let queue = HarvestQueue::from_config(&config).unwrap();
        assert_eq!(queue.semaphore.available_permits(), 5);
        assert_eq!(queue.index_file, "summary.json");
    }

    impl HarvestPipeline<MemorySource> {
        fn source_peak(&self) -> usize {
            self.source().peak.load(Ordering::SeqCst)
        }
    }
}
