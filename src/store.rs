//! Durable output: one manifest file per device, one index file per run.
//!
//! Manifests live at `<root>/<manufacturerId>/<productTypeId>/<productId>/config.json`.
//! When that file already exists the next free `config-<n>.json` is used.
//! Existing files are never overwritten.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use thiserror::Error;
use tracing::debug;

use crate::model::{CanonicalManifest, CatalogIndexEntry, Identity};

/// File stem of manifest files inside an identity directory.
pub const MANIFEST_STEM: &str = "config";

#[derive(Error, Debug)]
pub enum StoreError {
    /// Identity has a zero component and cannot key a directory
    #[error("Identity {0:?} cannot be used as a storage key")]
    UnsafeIdentity(Identity),

    /// Every candidate suffix is taken
    #[error("No free manifest path under '{dir}'")]
    PathExhaustion { dir: PathBuf },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to encode JSON: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Writes manifests and the run index under a root directory.
#[derive(Debug)]
pub struct ManifestStore {
    root: PathBuf,
    /// Serializes check-then-create of manifest paths across workers.
    resolve_lock: Mutex<()>,
}

impl ManifestStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            resolve_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for an identity, or `None` when any component is zero.
    ///
    /// Zero is what the catalog uses for "not set".
    pub fn identity_dir(&self, identity: &Identity) -> Option<PathBuf> {
        let Identity {
            manufacturer_id,
            product_type_id,
            product_id,
        } = *identity;
        if manufacturer_id == 0 || product_type_id == 0 || product_id == 0 {
            return None;
        }
        Some(
            self.root
                .join(manufacturer_id.to_string())
                .join(product_type_id.to_string())
                .join(product_id.to_string()),
        )
    }

    /// Candidate manifest path for the `attempt`-th try (0 is unsuffixed).
    pub fn candidate_path(dir: &Path, attempt: u64) -> PathBuf {
        if attempt == 0 {
            dir.join(format!("{MANIFEST_STEM}.json"))
        } else {
            dir.join(format!("{MANIFEST_STEM}-{attempt}.json"))
        }
    }

    /// Writes `manifest` to a fresh path and returns that path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnsafeIdentity`] for identities that cannot key a
    /// directory, and [`StoreError::Io`] for filesystem failures.
    pub fn persist(&self, manifest: &CanonicalManifest) -> Result<PathBuf, StoreError> {
        let identity = manifest.identity();
        let dir = self
            .identity_dir(&identity)
            .ok_or(StoreError::UnsafeIdentity(identity))?;
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let body = to_pretty_json(manifest)?;
        let (path, mut file) = self.reserve(&dir)?;

        if let Err(e) = file.write_all(&body).and_then(|()| file.flush()) {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(StoreError::io(&path, e));
        }

        debug!(path = %path.display(), bytes = body.len(), "Wrote manifest");
        Ok(path)
    }

    /// Picks the first free candidate path in `dir` and creates it.
    ///
    /// The existence check and the creation happen under `resolve_lock`, and
    /// the file is opened with `create_new`, so two workers can never claim
    /// the same path.
    fn reserve(&self, dir: &Path) -> Result<(PathBuf, File), StoreError> {
        let _guard = self
            .resolve_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        for attempt in 0..u64::MAX {
            let path = Self::candidate_path(dir, attempt);
            if path.exists() {
                continue;
            }
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(StoreError::io(&path, e)),
            }
        }

        Err(StoreError::PathExhaustion {
            dir: dir.to_path_buf(),
        })
    }

    /// Writes the run index to `<root>/<file_name>` via temp file and rename.
    pub fn write_index(
        &self,
        entries: &[CatalogIndexEntry],
        file_name: &str,
    ) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.root).map_err(|e| StoreError::io(&self.root, e))?;

        let path = self.root.join(file_name);
        let temp_path = self
            .root
            .join(format!(".{}.{}.tmp", file_name, std::process::id()));
        let body = to_pretty_json(entries)?;

        fs::write(&temp_path, &body).map_err(|e| StoreError::io(&temp_path, e))?;
        if let Err(e) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::io(&path, e));
        }

        Ok(path)
    }
}

/// Tab-indented JSON, the layout the driver tooling expects.
fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut body = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut body, PrettyFormatter::with_indent(b"\t"));
    value.serialize(&mut serializer)?;
    Ok(body)
}
