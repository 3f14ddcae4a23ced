//! Cross-process sweep lock
//!
//! An advisory lock on a file next to the database. Every process that
//! sweeps the same store takes it first. The operating system releases it
//! when the holder exits, so a crashed sweep leaves nothing behind.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Held for the duration of one sweep; released on drop
#[derive(Debug)]
pub struct SweepLock {
    file: File,
    path: PathBuf,
}

fn open(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("Failed to open lock file {}", path.display()))
}

impl SweepLock {
    /// Take the lock unless another holder has it
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let file = open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to lock {}", path.display()))
            }
        }
    }

    /// Wait until the lock is free, then take it
    pub async fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(lock) = Self::try_acquire(&path)? {
            return Ok(lock);
        }
        tracing::info!(path = %path.display(), "Another process is sweeping, waiting for it");

        tokio::task::spawn_blocking(move || {
            let file = open(&path)?;
            file.lock_exclusive()
                .with_context(|| format!("Failed to lock {}", path.display()))?;
            Ok(Self { file, path })
        })
        .await
        .context("Lock task failed")?
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SweepLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release sweep lock");
        }
    }
}
