//! Core traits and error types for manifest synthesis.
//!
//! - Setting classification via [`SettingRule`]
//! - Synthesis rejections via [`RejectionReason`]
//! - Per-item pipeline failures via [`ItemError`]

use thiserror::Error;

use crate::harvest::record::RawParameter;
use crate::model::SettingKind;
use crate::store::StoreError;
use crate::traits::FetchError;

// ============================================================================
// Setting Rule Trait
// ============================================================================

/// One predicate→constructor step of setting type inference.
///
/// Rules are evaluated in a fixed order and the first whose [`matches`]
/// returns `true` builds the setting kind. The last rule must match
/// everything.
///
/// [`matches`]: SettingRule::matches
///
/// # Examples
///
/// ```ignore
/// struct AlwaysNumeric;
///
/// impl SettingRule for AlwaysNumeric {
///     fn name(&self) -> &'static str {
///         "numeric"
///     }
///
///     fn matches(&self, _parameter: &RawParameter) -> bool {
///         true
///     }
///
///     fn build(&self, parameter: &RawParameter) -> SettingKind {
///         todo!()
///     }
/// }
/// ```
pub trait SettingRule: Send + Sync {
    /// Rule name, used in debug logs.
    fn name(&self) -> &'static str;

    /// Whether the parameter has the shape this rule recognizes.
    fn matches(&self, parameter: &RawParameter) -> bool;

    /// Builds the setting kind and typed default. Only called after
    /// [`SettingRule::matches`] returned `true`.
    fn build(&self, parameter: &RawParameter) -> SettingKind;
}

// ============================================================================
// Error Types
// ============================================================================

/// Reasons a catalog record cannot become a manifest.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    /// Body is not a parseable catalog record
    #[error("Malformed catalog payload: {0}")]
    MalformedPayload(String),

    /// An identity field did not normalize to an integer
    #[error("Unresolvable identity field '{field}'")]
    UnresolvableIdentity { field: &'static str },
}

/// Why a single source ID did not make it into the index.
///
/// Every variant is handled at the per-ID boundary; none aborts a run.
#[derive(Error, Debug)]
pub enum ItemError {
    /// Transport error or non-success status
    #[error("Fetch failed: {0}")]
    Transport(#[from] FetchError),

    /// Synthesizer rejected the record
    #[error("Rejected: {0}")]
    Rejected(#[from] RejectionReason),

    /// Record is for a region other than the configured one
    #[error("Filtered out: region '{found}' is not '{wanted}'")]
    FilteredOut { found: String, wanted: String },

    /// Manifest could not be written
    #[error("Persist failed: {0}")]
    Persist(#[from] StoreError),

    /// Blocking persistence task did not complete
    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl ItemError {
    /// Short label used for run statistics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Rejected(RejectionReason::MalformedPayload(_)) => "malformed",
            Self::Rejected(RejectionReason::UnresolvableIdentity { .. }) => "unresolvable",
            Self::FilteredOut { .. } => "filtered",
            Self::Persist(_) => "persist",
            Self::Worker(_) => "worker",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
