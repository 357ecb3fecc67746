//! Restore: resolve a backup source, stage it, verify it, and atomically
//! swap it into the live destination with rollback on failure.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{info, warn};

use crate::cloud::CloudMirror;
use crate::error::{GembakError, Result, RollbackStatus};
use crate::fsops::FsOps;
use crate::set::{BackupKind, BackupSet};

use super::util::{compact_timestamp, remove_tree_quiet, with_lifecycle_lock};

/// Where to restore from. Resolved exactly once at the start of the
/// operation; explicit selections beat automatic search at every level.
#[derive(Debug, Clone)]
pub enum RestoreSelector {
    /// Explicit directory backup.
    Dir(PathBuf),
    /// Explicit local archive.
    Archive(PathBuf),
    /// Oldest matching archive in a local search directory.
    AutoLocal(PathBuf),
    /// Cloud archive: explicit remote name, or oldest in the bucket.
    Cloud(Option<String>),
}

pub struct RestoreRequest<'a> {
    pub selector: RestoreSelector,
    /// Live destination directory to replace.
    pub dest: &'a Path,
    /// Delete the existing destination instead of keeping a `.bak` copy.
    pub force: bool,
    pub dry_run: bool,
    pub mirror: Option<&'a dyn CloudMirror>,
    pub lock_path: &'a Path,
}

#[derive(Debug)]
pub struct RestoreReport {
    /// Human-readable description of the resolved source.
    pub source: String,
    pub dest: PathBuf,
    /// Previous destination, kept for manual cleanup.
    pub bak: Option<PathBuf>,
    pub dry_run: bool,
}

/// Resolved source: a local tree or a local archive path (cloud sources
/// are downloaded first). The temp dir guard keeps downloads alive until
/// the operation finishes.
enum ResolvedSource {
    Dir(PathBuf),
    Archive(PathBuf),
}

pub fn run(req: &RestoreRequest, ops: &FsOps) -> Result<RestoreReport> {
    with_lifecycle_lock(req.lock_path, || execute(req, ops))
}

fn execute(req: &RestoreRequest, ops: &FsOps) -> Result<RestoreReport> {
    let scratch = tempfile::Builder::new()
        .prefix("gembak-restore-")
        .tempdir()?;

    let (resolved, source_label) = resolve_source(req, scratch.path())?;

    if req.dry_run {
        info!("dry-run: would restore '{source_label}' into {}", req.dest.display());
        return Ok(RestoreReport {
            source: source_label,
            dest: req.dest.to_path_buf(),
            bak: None,
            dry_run: true,
        });
    }

    // Stage the source: extract archives, use directory trees as-is.
    let src_root = match &resolved {
        ResolvedSource::Archive(archive) => {
            let extract_dir = scratch.path().join("extracted");
            info!("extracting {} -> {}", archive.display(), extract_dir.display());
            ops.archiver.unpack(archive, &extract_dir)?;
            extract_dir
        }
        ResolvedSource::Dir(dir) => dir.clone(),
    };

    let ts = compact_timestamp(Local::now().naive_local());
    let staging = sibling_path(req.dest, &format!("tmp-{ts}"));
    info!("copying {} -> {}", src_root.display(), staging.display());
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    let result = install_verified(req, ops, &src_root, &staging, &ts, &source_label);
    if result.is_err() {
        remove_tree_quiet(&staging);
    }
    result
}

fn install_verified(
    req: &RestoreRequest,
    ops: &FsOps,
    src_root: &Path,
    staging: &Path,
    ts: &str,
    source_label: &str,
) -> Result<RestoreReport> {
    ops.copier.copy_tree(src_root, staging)?;

    // Pre-install verification: the staging tree must match the resolved
    // source exactly before the destination is touched.
    info!("verifying staged copy");
    let diffs = ops.differ.diff_trees(staging, src_root)?;
    if !diffs.is_empty() {
        for d in &diffs {
            warn!("verification difference: {d}");
        }
        return Err(GembakError::VerificationFailed {
            src: src_root.to_path_buf(),
            differences: diffs.len(),
        });
    }
    info!("verification OK");

    // Move the live destination aside (or delete it outright with force).
    let mut bak = None;
    if req.dest.exists() {
        if req.force {
            info!("force: removing existing {}", req.dest.display());
            fs::remove_dir_all(req.dest)?;
        } else {
            let bak_path = sibling_path(req.dest, &format!("bak-{ts}"));
            info!("moving existing {} -> {}", req.dest.display(), bak_path.display());
            fs::rename(req.dest, &bak_path)?;
            bak = Some(bak_path);
        }
    }

    // Atomic install.
    info!("installing {} -> {}", staging.display(), req.dest.display());
    fs::rename(staging, req.dest)?;

    // Post-install verification, with rollback from the .bak copy.
    info!("post-restore verification");
    let diffs = ops.differ.diff_trees(req.dest, src_root)?;
    if !diffs.is_empty() {
        for d in &diffs {
            warn!("post-restore difference: {d}");
        }
        let rollback = roll_back(req.dest, bak.as_deref());
        return Err(GembakError::PostVerificationFailed {
            dest: req.dest.to_path_buf(),
            rollback,
        });
    }
    info!("post-restore verification OK");

    if let Some(bak_path) = &bak {
        info!("previous destination kept at {}", bak_path.display());
    }
    Ok(RestoreReport {
        source: source_label.to_string(),
        dest: req.dest.to_path_buf(),
        bak,
        dry_run: false,
    })
}

/// Resolve the selector to a local source, downloading cloud archives
/// into the scratch directory. Explicit names beat automatic search.
fn resolve_source(req: &RestoreRequest, scratch: &Path) -> Result<(ResolvedSource, String)> {
    match &req.selector {
        RestoreSelector::Dir(dir) => {
            if !dir.exists() {
                return Err(GembakError::SourceMissing(dir.clone()));
            }
            Ok((ResolvedSource::Dir(dir.clone()), dir.display().to_string()))
        }
        RestoreSelector::Archive(archive) => {
            if !archive.exists() {
                return Err(GembakError::SourceMissing(archive.clone()));
            }
            Ok((
                ResolvedSource::Archive(archive.clone()),
                archive.display().to_string(),
            ))
        }
        RestoreSelector::AutoLocal(search_dir) => {
            info!("searching for oldest backup archive in {}", search_dir.display());
            let set = BackupSet::scan_dir(search_dir, Some(BackupKind::Archive))?;
            let oldest = set
                .oldest()
                .ok_or_else(|| GembakError::NoBackupsFound(search_dir.display().to_string()))?;
            let path = oldest
                .local_path()
                .expect("locally scanned backup has a local path")
                .to_path_buf();
            info!("auto-selected oldest backup archive: {}", path.display());
            Ok((ResolvedSource::Archive(path.clone()), path.display().to_string()))
        }
        RestoreSelector::Cloud(explicit) => {
            let mirror = req
                .mirror
                .ok_or_else(|| GembakError::Config("cloud restore requires credentials".into()))?;
            let remote_name = match explicit {
                Some(name) => name.clone(),
                None => {
                    let set = BackupSet::from_mirror(mirror)?;
                    let oldest = set
                        .oldest()
                        .ok_or_else(|| GembakError::NoBackupsFound("cloud bucket".into()))?;
                    info!("auto-selected oldest cloud backup: {}", oldest.name);
                    oldest.name.clone()
                }
            };
            let local = scratch.join(&remote_name);
            if req.dry_run {
                info!("dry-run: would download '{remote_name}'");
            } else {
                mirror.download(&remote_name, &local)?;
            }
            Ok((ResolvedSource::Archive(local), format!("cloud:{remote_name}")))
        }
    }
}

/// Attempt to rename the `.bak` copy back over a failed destination.
/// Reported, never masking the post-verification failure itself.
fn roll_back(dest: &Path, bak: Option<&Path>) -> RollbackStatus {
    let Some(bak) = bak else {
        return RollbackStatus::Unavailable;
    };
    if !bak.exists() {
        return RollbackStatus::Unavailable;
    }
    info!("attempting rollback from {}", bak.display());
    if dest.exists() {
        if let Err(e) = fs::remove_dir_all(dest) {
            return RollbackStatus::Failed(format!("clearing failed destination: {e}"));
        }
    }
    match fs::rename(bak, dest) {
        Ok(()) => {
            info!("rollback to previous copy succeeded");
            RollbackStatus::Restored
        }
        Err(e) => RollbackStatus::Failed(e.to_string()),
    }
}

/// `dest` with a dotted suffix appended to its file name, in the same
/// parent directory so renames stay on one filesystem.
fn sibling_path(dest: &Path, suffix: &str) -> PathBuf {
    let name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("gembak-dest");
    dest.with_file_name(format!("{name}.{suffix}"))
}
