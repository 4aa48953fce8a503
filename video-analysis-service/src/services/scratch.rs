//! Per-request scratch files for uploaded videos.
//!
//! Every upload gets its own uniquely named file, and the [`ScratchFile`]
//! guard removes it when dropped, so a request that errors or is cancelled
//! mid-flight still leaves nothing behind.

use service_core::error::AppError;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

const SCRATCH_PREFIX: &str = "temp_";
const MAX_EXTENSION_LEN: usize = 8;

/// Directory that holds in-flight uploads.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    base_path: PathBuf,
}

impl ScratchDir {
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;
        Ok(Self { base_path })
    }

    pub fn path(&self) -> &Path {
        &self.base_path
    }

    /// Whether the directory is still present and usable.
    pub async fn is_ready(&self) -> bool {
        fs::metadata(&self.base_path)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }

    /// Write `data` to a fresh scratch file named after `original_name`'s
    /// extension. A partially written file is removed on failure.
    pub async fn persist(&self, original_name: &str, data: &[u8]) -> io::Result<ScratchFile> {
        let file = ScratchFile {
            path: self.base_path.join(scratch_file_name(original_name)),
            removed: false,
        };
        fs::write(&file.path, data).await?;
        Ok(file)
    }
}

/// `temp_<uuid>[.<ext>]`. Only a short alphanumeric extension survives from
/// the client-supplied name, so it can never introduce path separators.
fn scratch_file_name(original_name: &str) -> String {
    let extension = Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| ext.to_ascii_lowercase());

    match extension {
        Some(ext) => format!("{}{}.{}", SCRATCH_PREFIX, Uuid::new_v4(), ext),
        None => format!("{}{}", SCRATCH_PREFIX, Uuid::new_v4()),
    }
}

/// An uploaded video on disk, deleted on [`ScratchFile::remove`] or drop.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    removed: bool,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path).await
    }

    /// Delete the file. Idempotent; a file that is already gone counts as removed.
    pub async fn remove(&mut self) -> io::Result<()> {
        if self.removed {
            return Ok(());
        }
        match fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        self.removed = true;
        Ok(())
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(scratch = %self.path.display(), "Scratch file removed on drop"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                scratch = %self.path.display(),
                error = %e,
                "Failed to remove scratch file"
            ),
        }
    }
}
