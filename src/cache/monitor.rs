//! Source liveness monitors
//!
//! Every local file read while building an artifact is recorded with its
//! modification signature. An artifact stays valid only while every one of
//! its monitors still matches the file on disk.

use crate::error::{BundleError, BundleResult};
use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Modification signature of a file: mtime plus length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSignature {
    pub modified: Option<SystemTime>,
    pub len: u64,
}

impl From<&Metadata> for FileSignature {
    fn from(meta: &Metadata) -> Self {
        Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        }
    }
}

/// A (path, last-known signature) pair for one contributing file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMonitor {
    pub path: PathBuf,
    pub signature: FileSignature,
}

impl SourceMonitor {
    /// Record the current signature of `path`
    pub async fn capture(path: &Path) -> BundleResult<Self> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| BundleError::io(format!("reading metadata of {}", path.display()), e))?;

        Ok(Self {
            path: path.to_path_buf(),
            signature: FileSignature::from(&meta),
        })
    }

    /// Whether the file still has the recorded signature.
    ///
    /// A file that can no longer be read counts as changed.
    pub async fn is_current(&self) -> bool {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => FileSignature::from(&meta) == self.signature,
            Err(_) => false,
        }
    }
}
