//! Mirror reconciliation: copy archives the other side is missing.
//!
//! `cloud_sync` pushes local archives absent from the bucket; `local_sync`
//! pulls cloud archives absent from the local backup directory. Matching
//! is by canonical name: the embedded timestamp makes names unique, so
//! presence is equality.

use std::collections::HashSet;
use std::path::Path;

use tracing::{info, warn};

use crate::cloud::CloudMirror;
use crate::error::{GembakError, Result};
use crate::set::{BackupKind, BackupSet};

#[derive(Debug, Default)]
pub struct SyncReport {
    pub transferred: Vec<String>,
    pub skipped: usize,
    pub failed: usize,
}

/// Upload local archives that are missing from the cloud bucket.
pub fn cloud_sync(backup_dir: &Path, mirror: &dyn CloudMirror) -> Result<SyncReport> {
    let local = BackupSet::scan_dir(backup_dir, Some(BackupKind::Archive))?;
    let remote_names: HashSet<String> = BackupSet::from_mirror(mirror)?
        .iter()
        .map(|b| b.name.clone())
        .collect();

    let mut report = SyncReport::default();
    for backup in local.iter() {
        if remote_names.contains(&backup.name) {
            report.skipped += 1;
            continue;
        }
        let path = backup
            .local_path()
            .expect("locally scanned backup has a local path");
        info!("uploading missing archive: {}", backup.name);
        match mirror.upload(path, &backup.name) {
            Ok(()) => report.transferred.push(backup.name.clone()),
            Err(e) => {
                warn!("failed to upload {}: {e}", backup.name);
                report.failed += 1;
            }
        }
    }

    finish(report, "upload")
}

/// Download cloud archives that are missing locally.
pub fn local_sync(backup_dir: &Path, mirror: &dyn CloudMirror) -> Result<SyncReport> {
    std::fs::create_dir_all(backup_dir)?;
    let local_names: HashSet<String> = BackupSet::scan_dir(backup_dir, Some(BackupKind::Archive))?
        .iter()
        .map(|b| b.name.clone())
        .collect();

    let mut report = SyncReport::default();
    for backup in BackupSet::from_mirror(mirror)?.iter() {
        if local_names.contains(&backup.name) {
            report.skipped += 1;
            continue;
        }
        info!("downloading missing archive: {}", backup.name);
        match mirror.download(&backup.name, &backup_dir.join(&backup.name)) {
            Ok(()) => report.transferred.push(backup.name.clone()),
            Err(e) => {
                warn!("failed to download {}: {e}", backup.name);
                report.failed += 1;
            }
        }
    }

    finish(report, "download")
}

fn finish(report: SyncReport, verb: &str) -> Result<SyncReport> {
    if report.failed > 0 {
        return Err(GembakError::CloudTransfer(format!(
            "{} of {} {verb}s failed",
            report.failed,
            report.failed + report.transferred.len(),
        )));
    }
    info!(
        "sync complete: {} transferred, {} already present",
        report.transferred.len(),
        report.skipped
    );
    Ok(report)
}
