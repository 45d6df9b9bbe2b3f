//! Per-ID harvest pipeline.
//!
//! This module provides the [`HarvestPipeline`] that runs one source ID
//! through sequential stages (Fetch → Parse → Synthesize → Persist) with:
//! - Async fetch via a [`CatalogSource`]
//! - Synchronous synthesis and persistence (persistence on the blocking pool)
//! - Structured logging via `tracing`
//! - Per-stage timing in [`ItemStats`]
//!
//! The pipeline never retries. Any stage failure is returned as an
//! [`ItemError`] and the caller moves on to the next ID.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::config::ManifestConfig;
use crate::harvest::record::RawCatalogRecord;
use crate::harvest::synthesize::{synthesize_record, SynthesisParams};
use crate::harvest::traits::{ItemError, RejectionReason};
use crate::model::CatalogIndexEntry;
use crate::store::ManifestStore;
use crate::traits::CatalogSource;

// ============================================================================
// Pipeline Types
// ============================================================================

/// Result of one successfully harvested source ID.
#[derive(Debug, Clone)]
pub struct HarvestResult {
    /// Index row for the persisted manifest
    pub entry: CatalogIndexEntry,

    /// Timing and size statistics
    pub stats: ItemStats,
}

/// Statistics about one pipeline execution.
#[derive(Debug, Default, Clone)]
pub struct ItemStats {
    /// Total time spent on the whole pipeline (milliseconds)
    pub total_duration_ms: u64,

    /// Time spent waiting for the catalog (milliseconds)
    pub fetch_duration_ms: u64,

    /// Time spent writing the manifest (milliseconds)
    pub persist_duration_ms: u64,

    /// Size of the fetched body
    pub body_bytes: usize,

    /// Number of settings in the manifest
    pub settings: usize,
}

// ============================================================================
// Pipeline Executor
// ============================================================================

/// Fetch → synthesize → persist for one source ID at a time.
///
/// # Thread Safety
///
/// The pipeline is `Send + Sync` and is shared between workers behind an
/// [`Arc`]. The only state workers contend on is path resolution inside
/// [`ManifestStore`].
///
/// # Example
///
/// ```ignore
/// let pipeline = HarvestPipeline::new(source, ManifestStore::new("products"))
///     .with_region(Some("Europe".to_string()));
///
/// let result = pipeline.execute(1234).await?;
/// println!("Harvested {}", result.entry.path.display());
/// ```
pub struct HarvestPipeline<S>
where
    S: CatalogSource,
{
    /// Where raw records come from
    source: S,

    /// Where manifests go
    store: Arc<ManifestStore>,

    /// Caller-chosen manifest fields
    manifest: ManifestConfig,

    /// Frequency tag records must carry, if any
    region: Option<String>,
}

impl<S> HarvestPipeline<S>
where
    S: CatalogSource,
{
    /// Creates a pipeline with default manifest settings and no region filter.
    pub fn new(source: S, store: ManifestStore) -> Self {
        Self {
            source,
            store: Arc::new(store),
            manifest: ManifestConfig::default(),
            region: None,
        }
    }

    /// Only keep records tagged with `region` (case-insensitive).
    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    /// Sets the driver class, capabilities and generation for manifests.
    pub fn with_manifest_config(mut self, manifest: ManifestConfig) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn store(&self) -> &Arc<ManifestStore> {
        &self.store
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Synthesis parameters used for a given source ID.
    pub fn params_for(&self, source_id: u32) -> SynthesisParams {
        SynthesisParams::new(
            format!("catalog_{source_id}"),
            self.manifest.driver_class.clone(),
            source_id,
        )
        .with_capabilities(self.manifest.capabilities.clone())
        .with_generation(self.manifest.generation)
    }

    /// Runs every stage for `source_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError`] if:
    /// - The fetch fails or returns a non-success status
    /// - The body is malformed or its identity does not resolve
    /// - The record is for another region
    /// - The manifest cannot be written
    pub async fn execute(&self, source_id: u32) -> Result<HarvestResult, ItemError> {
        let start = Instant::now();
        let mut stats = ItemStats::default();

        // ====================================================================
        // Stage 1: Fetch
        // ====================================================================

        let body = self.source.fetch(source_id).await?;
        stats.fetch_duration_ms = start.elapsed().as_millis() as u64;
        stats.body_bytes = body.len();
        debug!(source_id, duration_ms = stats.fetch_duration_ms, "Fetched record");

        // ====================================================================
        // Stage 2: Parse and filter
        // ====================================================================

        let record = RawCatalogRecord::parse(&body)
            .map_err(|e| RejectionReason::MalformedPayload(e.to_string()))?;
        self.check_region(&record)?;

        // ====================================================================
        // Stage 3: Synthesize
        // ====================================================================

        let manifest = synthesize_record(&record, &self.params_for(source_id))?;
        stats.settings = manifest.settings.len();

        // ====================================================================
        // Stage 4: Persist
        // ====================================================================

        let persist_start = Instant::now();
        let store = Arc::clone(&self.store);
        let identity = manifest.identity();
        let name = manifest.display_name().map(str::to_string);

        let path = tokio::task::spawn_blocking(move || store.persist(&manifest))
            .await
            .map_err(|e| ItemError::Worker(e.to_string()))??;

        stats.persist_duration_ms = persist_start.elapsed().as_millis() as u64;
        stats.total_duration_ms = start.elapsed().as_millis() as u64;

        info!(
            source_id,
            path = %path.display(),
            settings = stats.settings,
            duration_ms = stats.total_duration_ms,
            "Created manifest"
        );

        Ok(HarvestResult {
            entry: CatalogIndexEntry {
                identity,
                name,
                source_id,
                path,
            },
            stats,
        })
    }

    fn check_region(&self, record: &RawCatalogRecord) -> Result<(), ItemError> {
        let Some(wanted) = &self.region else {
            return Ok(());
        };
        let found = record.frequency_name.as_deref().unwrap_or_default().trim();
        if found.eq_ignore_ascii_case(wanted.trim()) {
            Ok(())
        } else {
            Err(ItemError::FilteredOut {
                found: found.to_string(),
                wanted: wanted.clone(),
            })
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
