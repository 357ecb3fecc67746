//! Integrity check: compare the live configuration against the newest
//! installed backup. Read-only, so it runs without the lifecycle lock.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{GembakError, Result};
use crate::fsops::{FsOps, TreeDiff};
use crate::set::{BackupKind, BackupSet};

#[derive(Debug)]
pub struct CheckReport {
    /// The newest installed backup the source was compared against.
    pub backup: PathBuf,
    pub differences: Vec<TreeDiff>,
}

impl CheckReport {
    pub fn passed(&self) -> bool {
        self.differences.is_empty()
    }
}

pub fn run(source: &Path, search_dir: &Path, ops: &FsOps) -> Result<CheckReport> {
    if !source.exists() {
        return Err(GembakError::SourceMissing(source.to_path_buf()));
    }

    let set = BackupSet::scan_dir(search_dir, Some(BackupKind::Directory))?;
    let newest = set
        .newest()
        .ok_or_else(|| GembakError::NoBackupsFound(search_dir.display().to_string()))?;
    let backup = newest
        .local_path()
        .expect("locally scanned backup has a local path")
        .to_path_buf();

    info!("found latest backup: {}", backup.display());
    info!("comparing {} with {}", source.display(), backup.display());

    let differences = ops.differ.diff_trees(source, &backup)?;
    if differences.is_empty() {
        info!("integrity check passed: no differences found");
    } else {
        info!("integrity check failed: {} differences found", differences.len());
    }

    Ok(CheckReport {
        backup,
        differences,
    })
}
