//! Backup enumeration for display.

use std::path::Path;

use crate::cloud::CloudMirror;
use crate::error::Result;
use crate::set::{Backup, BackupSet};

/// Backups found at a local directory, chronologically ascending.
/// A missing directory yields an empty list.
pub fn local(search_dir: &Path) -> Result<Vec<Backup>> {
    let set = BackupSet::scan_dir(search_dir, None)?;
    Ok(set.iter().cloned().collect())
}

/// Archives found in the cloud bucket, chronologically ascending.
pub fn cloud(mirror: &dyn CloudMirror) -> Result<Vec<Backup>> {
    let set = BackupSet::from_mirror(mirror)?;
    Ok(set.iter().cloned().collect())
}
