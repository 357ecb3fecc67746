//! Retention pruning: keep the N most recent archives, delete the rest.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::cloud::CloudMirror;
use crate::error::{GembakError, Result};
use crate::set::{Backup, BackupKind, BackupLocation, BackupSet};

use super::util::with_lifecycle_lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneScope {
    Local,
    Cloud,
    Both,
}

pub struct PruneRequest<'a> {
    pub backup_dir: &'a Path,
    /// Number of most-recent archives to retain per location.
    pub keep: usize,
    pub scope: PruneScope,
    pub dry_run: bool,
    pub mirror: Option<&'a dyn CloudMirror>,
    /// Pruning deletes backups a concurrent restore could be reading, so
    /// it takes the same lock as backup and restore.
    pub lock_path: &'a Path,
}

#[derive(Debug, Default)]
pub struct PruneReport {
    pub kept: usize,
    pub pruned: usize,
    pub failed: usize,
    /// Names that were deleted, or would be under `dry_run`.
    pub deleted: Vec<String>,
    pub dry_run: bool,
}

pub fn run(req: &PruneRequest) -> Result<PruneReport> {
    with_lifecycle_lock(req.lock_path, || {
        let mut report = PruneReport {
            dry_run: req.dry_run,
            ..PruneReport::default()
        };

        if matches!(req.scope, PruneScope::Local | PruneScope::Both) {
            let set = BackupSet::scan_dir(req.backup_dir, Some(BackupKind::Archive))?;
            info!(
                dir = %req.backup_dir.display(),
                count = set.len(),
                "scanning local archives"
            );
            prune_set(&set, req.keep, req.dry_run, &mut report, |backup| {
                delete_local(backup)
            });
        }

        if matches!(req.scope, PruneScope::Cloud | PruneScope::Both) {
            let mirror = req
                .mirror
                .ok_or_else(|| GembakError::Config("cloud prune requires credentials".into()))?;
            let set = BackupSet::from_mirror(mirror)?;
            info!(count = set.len(), "scanning cloud archives");
            prune_set(&set, req.keep, req.dry_run, &mut report, |backup| {
                delete_remote(mirror, backup)
            });
        }

        if report.failed > 0 {
            return Err(GembakError::PartialDeleteFailure {
                failed: report.failed,
                attempted: report.failed + report.pruned,
            });
        }
        Ok(report)
    })
}

/// Apply the retention rule to one location. Delete failures are logged
/// and counted; the remaining deletions still run.
fn prune_set(
    set: &BackupSet,
    keep: usize,
    dry_run: bool,
    report: &mut PruneReport,
    delete: impl Fn(&Backup) -> Result<()>,
) {
    let ordered = set.newest_first();
    if ordered.len() <= keep {
        info!(
            "total backups ({}) <= keep count ({keep}); no pruning needed",
            ordered.len()
        );
        report.kept += ordered.len();
        return;
    }

    let (to_keep, to_delete) = ordered.split_at(keep);
    report.kept += to_keep.len();
    info!("keeping {} latest backups, pruning {}", to_keep.len(), to_delete.len());

    for &backup in to_delete {
        if dry_run {
            info!("dry-run: would delete {}", backup.name);
            report.deleted.push(backup.name.clone());
            report.pruned += 1;
            continue;
        }
        match delete(backup) {
            Ok(()) => {
                info!("deleted {}", backup.name);
                report.deleted.push(backup.name.clone());
                report.pruned += 1;
            }
            Err(e) => {
                warn!("failed to delete {}: {e}", backup.name);
                report.failed += 1;
            }
        }
    }
}

fn delete_local(backup: &Backup) -> Result<()> {
    let path: &PathBuf = match &backup.location {
        BackupLocation::Local(p) => p,
        BackupLocation::Remote(_) => {
            return Err(GembakError::Other(format!(
                "local delete of remote backup '{}'",
                backup.name
            )))
        }
    };
    std::fs::remove_file(path)?;
    Ok(())
}

fn delete_remote(mirror: &dyn CloudMirror, backup: &Backup) -> Result<()> {
    // Deletion needs the version identifier captured at list time.
    let object = backup.remote().ok_or_else(|| {
        GembakError::Other(format!("cloud delete of local backup '{}'", backup.name))
    })?;
    mirror.delete(object)
}
