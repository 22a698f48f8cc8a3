//! Best-effort upload of generated artifacts to the publishing host.
//!
//! The protocol client itself is external; the station only sees the
//! [`Uploader`] seam. Failures are returned for logging and never retried.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SinkError;

// ---

pub trait Uploader: Send + Sync {
    /// Upload `local` under `remote_name` on the target.
    fn upload(&self, local: &Path, remote_name: &str) -> Result<(), SinkError>;
}

/// Transfer not configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledUploader;

impl Uploader for DisabledUploader {
    fn upload(&self, local: &Path, remote_name: &str) -> Result<(), SinkError> {
        debug!(local = %local.display(), remote_name, "transfer disabled, skipping");
        Ok(())
    }
}

/// Mirrors artifacts into a mounted remote directory.
#[derive(Debug, Clone)]
pub struct CopyUploader {
    target_dir: PathBuf,
}

impl CopyUploader {
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
        }
    }
}

impl Uploader for CopyUploader {
    fn upload(&self, local: &Path, remote_name: &str) -> Result<(), SinkError> {
        // ---
        let target = self.target_dir.join(remote_name);
        let failed = |reason: String| SinkError::Transfer {
            path: local.to_path_buf(),
            reason,
        };

        fs::create_dir_all(&self.target_dir)
            .map_err(|e| failed(format!("{}: {e}", self.target_dir.display())))?;
        fs::copy(local, &target).map_err(|e| failed(format!("{}: {e}", target.display())))?;
        debug!(local = %local.display(), target = %target.display(), "artifact transferred");
        Ok(())
    }
}
