//! Advisory run lock (spec.md §5): a literal file, created at a fixed
//! path, whose mere presence means a run is already in progress (or the
//! previous run crashed before cleaning up). No OS-level file locking is
//! used -- the lock is meant to be visible and removable by an operator.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::{NomenclatureError, Result};

/// Holds the run lock for as long as it's alive. Unlike a typical RAII
/// guard, a plain `Drop` (an error propagated with `?`, a panic, a signal)
/// deliberately leaves the lock file in place -- spec.md §5 requires a
/// crashed run to be detectable by the next invocation. Only an explicit
/// [`RunLock::release`] call, made after a run completes cleanly, removes
/// the file.
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Acquires the lock at `srcfiles_dir/nomenclature.lock`, failing if it
    /// already exists.
    pub fn acquire(srcfiles_dir: &Path) -> Result<Self> {
        let path = srcfiles_dir.join("nomenclature.lock");
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(RunLock { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(NomenclatureError::LockHeld { path })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Releases the lock, used only at the end of a successful run.
    pub fn release(self) -> Result<()> {
        fs::remove_file(&self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_first_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let first = RunLock::acquire(dir.path()).unwrap();
        let second = RunLock::acquire(dir.path());
        assert!(matches!(second, Err(NomenclatureError::LockHeld { .. })));
        first.release().unwrap();
        assert!(RunLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn dropping_without_release_leaves_the_lock_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let lock = RunLock::acquire(dir.path()).unwrap();
        let path = dir.path().join("nomenclature.lock");
        drop(lock);
        assert!(path.exists(), "an unreleased lock must survive a crash/drop");
    }

    #[test]
    fn release_removes_the_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let lock = RunLock::acquire(dir.path()).unwrap();
        let path = dir.path().join("nomenclature.lock");
        assert!(path.exists());
        lock.release().unwrap();
        assert!(!path.exists());
    }
}
