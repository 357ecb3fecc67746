//! Backup creation: a compressed archive plus a verified full-tree copy,
//! installed under a timestamped path with a stable "latest" pointer.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use serde_json::Value;
use tracing::{info, warn};

use crate::cloud::CloudMirror;
use crate::error::{GembakError, Result};
use crate::fsops::FsOps;
use crate::names;

use super::util::{compact_timestamp, remove_tree_quiet, with_lifecycle_lock};

/// Marker file inside the source directory naming the active account.
const ACCOUNT_MARKER: &str = "google_accounts.json";

pub struct BackupRequest<'a> {
    /// Live configuration directory to snapshot.
    pub source: &'a Path,
    /// Directory receiving the compressed archive.
    pub archive_dir: &'a Path,
    /// Parent directory receiving the installed tree and latest pointer.
    pub dest_parent: &'a Path,
    /// Report the plan without mutating anything.
    pub dry_run: bool,
    /// Upload the archive after a successful local install.
    pub mirror: Option<&'a dyn CloudMirror>,
    /// Lock file serializing lifecycle operations.
    pub lock_path: &'a Path,
}

#[derive(Debug)]
pub struct BackupReport {
    /// Base identifier, e.g. `2025-10-22_042211-user@example.com.gemini`.
    pub name: String,
    pub dest: PathBuf,
    pub archive: PathBuf,
    /// Latest pointer path, absent when the account token fell back.
    pub latest_link: Option<PathBuf>,
    pub dry_run: bool,
    /// Cloud mirroring failure, reported but non-fatal: the local
    /// snapshot is already safe.
    pub cloud_warning: Option<String>,
}

pub fn run(req: &BackupRequest, ops: &FsOps) -> Result<BackupReport> {
    if !req.source.exists() {
        return Err(GembakError::SourceMissing(req.source.to_path_buf()));
    }

    with_lifecycle_lock(req.lock_path, || {
        let now = Local::now().naive_local();
        create_snapshot(req, ops, now)
    })
}

fn create_snapshot(req: &BackupRequest, ops: &FsOps, now: NaiveDateTime) -> Result<BackupReport> {
    let account = read_active_account(req.source);
    let (account, latest_link) = match account {
        Some(token) => {
            let link = req.dest_parent.join(names::latest_link_name(&token));
            (token, Some(link))
        }
        None => {
            warn!(
                "could not read active account from {ACCOUNT_MARKER}; using fallback name '{}'",
                names::FALLBACK_ACCOUNT
            );
            (names::FALLBACK_ACCOUNT.to_string(), None)
        }
    };

    let name = names::dir_name(now, &account);
    let dest = req.dest_parent.join(&name);
    let archive = req.archive_dir.join(names::archive_name(now, &account));

    info!(source = %req.source.display(), dest = %dest.display(), "starting backup");

    // 1/4: compressed archive of the source.
    info!("[1/4] creating archive: {}", archive.display());
    if req.dry_run {
        info!("dry-run: would archive {}", req.source.display());
    } else {
        ops.archiver.pack(req.source, &archive)?;
    }

    // 2/4: full copy into a temporary sibling of the destination, so the
    // final install is a same-filesystem rename.
    let staging = req
        .dest_parent
        .join(format!(".{name}.tmp-{}", compact_timestamp(now)));

    let cloud_warning = if req.dry_run {
        info!("[2/4] dry-run: would copy {} -> {}", req.source.display(), staging.display());
        info!("[3/4] dry-run: would diff the copy against {}", req.source.display());
        info!("[4/4] dry-run: would rename staging to {} and update latest pointer", dest.display());
        None
    } else {
        // Any failure past this point must not leave the staging tree
        // behind; the consumed-by-rename case is a no-op removal.
        let result = stage_verify_install(req, ops, &staging, &dest, latest_link.as_deref());
        if result.is_err() {
            remove_tree_quiet(&staging);
        }
        result?;

        if let Some(mirror) = req.mirror {
            let remote_name = names::archive_name(now, &account);
            match mirror.upload(&archive, &remote_name) {
                Ok(()) => None,
                Err(e) => {
                    warn!("cloud upload failed (local backup is intact): {e}");
                    Some(e.to_string())
                }
            }
        } else {
            None
        }
    };

    Ok(BackupReport {
        name,
        dest,
        archive,
        latest_link,
        dry_run: req.dry_run,
        cloud_warning,
    })
}

/// Steps 2-4: copy, verify, atomically install, republish the pointer.
fn stage_verify_install(
    req: &BackupRequest,
    ops: &FsOps,
    staging: &Path,
    dest: &Path,
    latest_link: Option<&Path>,
) -> Result<()> {
    info!("[2/4] copying to temporary location: {}", staging.display());
    if staging.exists() {
        fs::remove_dir_all(staging)?;
    }
    fs::create_dir_all(req.dest_parent)?;
    ops.copier.copy_tree(req.source, staging)?;

    info!("[3/4] verifying copy against source");
    let diffs = ops.differ.diff_trees(req.source, staging)?;
    if !diffs.is_empty() {
        for d in &diffs {
            warn!("verification difference: {d}");
        }
        // The archive from step 1 stays behind as a best-effort artifact.
        return Err(GembakError::VerificationFailed {
            src: req.source.to_path_buf(),
            differences: diffs.len(),
        });
    }
    info!("verification OK (no differences)");

    info!("[4/4] installing directory backup: {}", dest.display());
    fs::rename(staging, dest)?;
    info!(dest = %dest.display(), "backup installed");

    match latest_link {
        Some(link) => {
            if let Err(e) = republish_latest(link, dest) {
                // Pointer upkeep must not undo an already-successful install.
                warn!(link = %link.display(), "failed to update latest pointer: {e}");
            } else {
                info!(link = %link.display(), "latest pointer updated");
            }
        }
        None => info!("no account token available; skipping latest pointer"),
    }
    Ok(())
}

/// Read the sanitized active-account token from the marker file. Any
/// failure (missing file, bad JSON, empty field) is non-fatal and
/// reported as `None`.
fn read_active_account(source: &Path) -> Option<String> {
    let raw = fs::read_to_string(source.join(ACCOUNT_MARKER)).ok()?;
    let doc: Value = serde_json::from_str(&raw).ok()?;
    let active = doc.get("active")?.as_str()?.trim();
    if active.is_empty() {
        return None;
    }
    Some(names::sanitize_account(active))
}

/// Republish the stable pointer: make a new symlink at a scratch name,
/// then atomically rename it over the old one. There is never a moment
/// with no valid pointer.
fn republish_latest(link: &Path, target: &Path) -> Result<()> {
    let scratch = link.with_file_name(format!(
        ".{}.tmp-{}",
        link.file_name().and_then(|n| n.to_str()).unwrap_or("latest"),
        std::process::id()
    ));
    if scratch.symlink_metadata().is_ok() {
        fs::remove_file(&scratch)?;
    }
    make_symlink(target, &scratch)?;
    if let Err(e) = fs::rename(&scratch, link) {
        let _ = fs::remove_file(&scratch);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}
