//! Shared per-mount state.

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

use crate::errors::FsError;
use crate::normalize;
use crate::times::{unix_now, Sidecar};

/// Everything the handlers share: the shadow tree, the source file, the
/// owner identity, the time sidecar, and the dirty bit.
pub struct MountState {
    /// Shadow form of the document; always an object.
    pub root: Value,
    /// Absolutized path of the file the mount was created from.
    pub source_path: PathBuf,
    pub times: Sidecar,
    pub mount_time: i64,
    pub uid: u32,
    pub gid: u32,
    /// True while the in-memory model matches the source file.
    pub saved: bool,
}

impl MountState {
    /// Read and parse the source file, then build the normalized model.
    ///
    /// Any root value is accepted, scalars included. The source path is
    /// resolved against the working directory and stored absolute.
    pub fn load(source: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read {}", source.display()))?;
        let document: Value = serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", source.display()))?;
        let source_path = source
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", source.display()))?;
        let meta = std::fs::metadata(&source_path)
            .with_context(|| format!("Failed to stat {}", source_path.display()))?;
        Ok(Self::new(document, source_path, meta.uid(), meta.gid()))
    }

    pub fn new(document: Value, source_path: PathBuf, uid: u32, gid: u32) -> Self {
        let mount_time = unix_now();
        MountState {
            root: normalize::normalize(&document, true),
            source_path,
            times: Sidecar::new(mount_time),
            mount_time,
            uid,
            gid,
            saved: true,
        }
    }

    /// Write the denormalized document back to the source file,
    /// two-space indented, and mark the mount clean.
    pub fn persist(&mut self) -> Result<(), FsError> {
        let document = normalize::denormalize(&self.root);
        let serialized = serde_json::to_string_pretty(&document).map_err(|_| FsError::Invalid)?;
        std::fs::write(&self.source_path, format!("{serialized}\n"))
            .map_err(|_| FsError::Invalid)?;
        self.saved = true;
        debug!(source = %self.source_path.display(), "document persisted");
        Ok(())
    }
}
