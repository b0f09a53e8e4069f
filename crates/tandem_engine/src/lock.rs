//! Cross-process pass lock.

use crate::error::{SyncError, SyncResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// An advisory exclusive lock held for the duration of a pass.
///
/// Released when dropped.
#[derive(Debug)]
pub struct PassLock {
    file: File,
    path: PathBuf,
}

impl PassLock {
    /// Takes the lock at `path` without waiting.
    ///
    /// Fails with [`SyncError::PassInProgress`] if another process holds it.
    pub fn acquire(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref().to_path_buf();
        let lock_error = |err: std::io::Error| SyncError::Lock {
            path: path.clone(),
            message: err.to_string(),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(lock_error)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(lock_error)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(path = %path.display(), "pass lock acquired");
                Ok(Self { file, path })
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(SyncError::PassInProgress)
            }
            Err(e) => Err(lock_error(e)),
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PassLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_holder_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run").join("pass.lock");

        let held = PassLock::acquire(&path).unwrap();
        assert_eq!(held.path(), path.as_path());
        assert!(matches!(
            PassLock::acquire(&path),
            Err(SyncError::PassInProgress)
        ));

        drop(held);
        assert!(PassLock::acquire(&path).is_ok());
    }
}
