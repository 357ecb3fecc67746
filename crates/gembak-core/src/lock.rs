//! Host-wide advisory lock serializing backup and restore operations.
//!
//! One fixed, well-known lock file is shared by every lifecycle operation
//! that mutates backup state (create, restore, prune). Acquisition is
//! non-blocking: a second invocation finding the lock held fails
//! immediately with [`GembakError::LockBusy`] instead of queueing.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{GembakError, Result};

/// Handle to the acquired lock. The lock is released when the guard drops,
/// on every exit path of the guarded operation.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

/// Well-known lock file path shared by backup and restore.
pub fn default_lock_path() -> PathBuf {
    #[cfg(unix)]
    {
        PathBuf::from("/var/lock/gembak.lock")
    }
    #[cfg(not(unix))]
    {
        std::env::temp_dir().join("gembak.lock")
    }
}

impl LockGuard {
    /// Open (creating if absent) the lock file and take a non-blocking
    /// exclusive advisory lock on it.
    pub fn acquire(path: &Path) -> Result<LockGuard> {
        let file = open_lock_file(path).map_err(|e| {
            if is_contention(&e) {
                GembakError::LockBusy(path.to_path_buf())
            } else {
                GembakError::Io(e)
            }
        })?;

        try_lock_exclusive(&file).map_err(|e| {
            if is_contention(&e) {
                GembakError::LockBusy(path.to_path_buf())
            } else {
                GembakError::Io(e)
            }
        })?;

        debug!(path = %path.display(), "acquired backup lock");
        Ok(LockGuard {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = unlock(&self.file);
        debug!(path = %self.path.display(), "released backup lock");
    }
}

fn is_contention(e: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        e.kind() == std::io::ErrorKind::WouldBlock
    }
    #[cfg(windows)]
    {
        // Share-mode-0 open of a held lock fails with ERROR_SHARING_VIOLATION.
        e.raw_os_error() == Some(32)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = e;
        false
    }
}

#[cfg(unix)]
fn open_lock_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(unix)]
fn unlock(file: &File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn open_lock_file(path: &Path) -> std::io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.read(true).write(true).create(true).truncate(false);
    // Exclusive share mode: a second open of a held lock file fails
    // immediately, preserving the fail-fast contract.
    #[cfg(windows)]
    {
        use std::os::windows::fs::OpenOptionsExt;
        opts.share_mode(0);
    }
    opts.open(path)
}

#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(not(unix))]
fn unlock(_file: &File) -> std::io::Result<()> {
    Ok(())
}
