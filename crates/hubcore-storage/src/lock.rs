use std::fs::{File, OpenOptions};
use std::path::Path;

use fs2::FileExt;

use crate::error::{Error, Result};

/// An exclusive hold on a repository's `hub/lock` file, released when
/// dropped. Unlike [`with_repo_lock`], this doesn't bound the locked
/// section to a single synchronous closure — the write pipeline needs the
/// lock held across `await` points (database round trips), which a
/// closure-scoped API can't express. Acquire this on a blocking thread
/// (`tokio::task::spawn_blocking`) and hold the guard across the rest of
/// the pipeline.
pub struct RepoLockGuard {
    file: File,
}

impl RepoLockGuard {
    /// Blocking exclusive acquire. Call from `spawn_blocking`, not from an
    /// async task directly.
    pub fn acquire(hub_dir: &Path) -> Result<Self> {
        let lock_path = hub_dir.join("lock");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| Error::io(&lock_path, e))?;
        file.lock_exclusive().map_err(|e| Error::io(&lock_path, e))?;
        Ok(Self { file })
    }
}

impl Drop for RepoLockGuard {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

/// Acquire an advisory, blocking, exclusive file lock on the repository's
/// `hub/lock` file, run `f`, then release.
///
/// This is the filesystem half of the two-lock ordering in the write
/// pipeline: the caller must take this lock *before* opening the metadata
/// transaction, never after.
pub fn with_repo_lock<F, T>(hub_dir: &Path, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let lock_path = hub_dir.join("lock");

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| Error::io(&lock_path, e))?;

    file.lock_exclusive()
        .map_err(|e| Error::io(&lock_path, e))?;

    let result = f();

    let _ = file.unlock();

    result
    // file drops here, also releasing the lock
}

/// Try to acquire the lock without blocking. Returns `Ok(None)` immediately
/// if another writer currently holds it.
pub fn try_with_repo_lock<F, T>(hub_dir: &Path, f: F) -> Result<Option<T>>
where
    F: FnOnce() -> Result<T>,
{
    let lock_path = hub_dir.join("lock");

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| Error::io(&lock_path, e))?;

    match file.try_lock_exclusive() {
        Ok(()) => {
            let result = f()?;
            let _ = file.unlock();
            Ok(Some(result))
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_blocks_a_second_acquire_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let guard = RepoLockGuard::acquire(dir.path()).unwrap();

        let contended = try_with_repo_lock(dir.path(), || Ok(())).unwrap();
        assert!(contended.is_none());

        drop(guard);
        let now_free = try_with_repo_lock(dir.path(), || Ok(42)).unwrap();
        assert_eq!(now_free, Some(42));
    }
}
