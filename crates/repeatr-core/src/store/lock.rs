use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use fd_lock::{RwLock, RwLockWriteGuard};

use crate::error::CoreError;

/// Advisory lock file shared by every process working on one state
/// directory.
///
/// Open it, then [`try_acquire`](Self::try_acquire) for the length of the
/// critical section. Each open is a separate lock holder, so two routers in
/// the same process exclude each other as well.
#[derive(Debug)]
pub struct ModeLock {
    path: PathBuf,
    file: RwLock<File>,
}

impl ModeLock {
    pub async fn open(path: &Path) -> Result<Self, CoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::persistence(parent, e))?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .await
            .map_err(|e| CoreError::persistence(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file.into_std().await),
        })
    }

    /// Take the lock without waiting. A held lock is `LockContention`.
    pub fn try_acquire(&mut self) -> Result<RwLockWriteGuard<'_, File>, CoreError> {
        let path = &self.path;
        self.file.try_write().map_err(|e| {
            if e.kind() == io::ErrorKind::WouldBlock {
                CoreError::LockContention
            } else {
                CoreError::persistence(path, e)
            }
        })
    }
}
