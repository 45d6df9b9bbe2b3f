//! Aggregate catalog index.
//!
//! During a run the index is an append-only list owned by the drain
//! coordinator. After a run it can be loaded back to map an identity triple
//! to the catalog ID it was harvested from.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::{CatalogIndexEntry, Identity};

#[derive(Error, Debug)]
pub enum IndexLoadError {
    #[error("Failed to read index '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse index '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogIndex {
    entries: Vec<CatalogIndexEntry>,
}

impl CatalogIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads an index written by a previous run.
    pub fn load(path: &Path) -> Result<Self, IndexLoadError> {
        let body = std::fs::read_to_string(path).map_err(|source| IndexLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let entries = serde_json::from_str(&body).map_err(|source| IndexLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { entries })
    }

    pub fn push(&mut self, entry: CatalogIndexEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion (completion) order.
    pub fn entries(&self) -> &[CatalogIndexEntry] {
        &self.entries
    }

    /// Entries ordered by source ID, for a deterministic index file.
    pub fn into_sorted(mut self) -> Vec<CatalogIndexEntry> {
        self.entries
            .sort_by(|a, b| a.source_id.cmp(&b.source_id).then_with(|| a.path.cmp(&b.path)));
        self.entries
    }

    /// Catalog ID of the first entry harvested for `identity`.
    pub fn find_source_id(&self, identity: &Identity) -> Option<u32> {
        self.entries
            .iter()
            .find(|entry| entry.identity == *identity)
            .map(|entry| entry.source_id)
    }
}
