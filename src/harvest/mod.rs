//! Harvest module - manifest synthesis and the per-ID harvest pipeline.
//!
//! This module provides the core of the harvester:
//! - **Record**: Lenient upstream catalog record via [`RawCatalogRecord`]
//! - **Synthesis**: Record → manifest via [`synthesize`]
//! - **Settings**: Ordered setting type inference via [`SettingRule`]
//! - **Pipeline**: Fetch → synthesize → persist via [`pipeline::HarvestPipeline`]

pub mod pipeline;
pub mod record;
pub mod settings;
pub mod synthesize;
pub mod traits;

// Re-export commonly used types
pub use traits::{ItemError, RejectionReason, SettingRule};

pub use record::{RawAssociationGroup, RawCatalogRecord, RawParameter, RawValueRange};

pub use settings::{classify, BooleanRule, EnumeratedRule, NumericRule, SETTING_RULES};

pub use synthesize::{resolve_identity, synthesize, synthesize_record, SynthesisParams};

pub use pipeline::{HarvestPipeline, HarvestResult, ItemStats};
