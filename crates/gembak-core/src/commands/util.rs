use std::path::Path;

use chrono::NaiveDateTime;

use crate::error::Result;
use crate::lock::LockGuard;

/// Run a lifecycle mutation while holding the host-wide lock. The guard
/// drops on every exit path, so the lock is released on success, error and
/// panic alike.
pub(crate) fn with_lifecycle_lock<T>(
    lock_path: &Path,
    action: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let _guard = LockGuard::acquire(lock_path)?;
    action()
}

/// Timestamp token for scratch paths and `.bak` names, e.g. `20251022-042211`.
pub(crate) fn compact_timestamp(ts: NaiveDateTime) -> String {
    ts.format("%Y%m%d-%H%M%S").to_string()
}

/// Remove a directory tree, ignoring a missing path.
pub(crate) fn remove_tree_quiet(path: &Path) {
    if let Err(e) = std::fs::remove_dir_all(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), "failed to remove scratch tree: {e}");
        }
    }
}
