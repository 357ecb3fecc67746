use std::fs;
use std::path::{Path, PathBuf};

use crate::commands::restore::{self, RestoreRequest, RestoreSelector};
use crate::error::{GembakError, RollbackStatus};
use crate::fsops::{Archiver, FsOps, TarGzArchiver};
use crate::lock::LockGuard;
use crate::testutil::{snapshot_tree, write_tree, FailOnCallDiffer, MemoryMirror};

struct Fixture {
    tmp: tempfile::TempDir,
    search_dir: PathBuf,
    dest: PathBuf,
    lock: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        Self {
            search_dir: tmp.path().join("backups"),
            dest: tmp.path().join("live/.gemini"),
            lock: tmp.path().join("gembak.lock"),
            tmp,
        }
    }

    /// Create an archive named with `stamp` whose single `marker.txt`
    /// holds `content`.
    fn add_archive(&self, stamp: &str, content: &str) -> PathBuf {
        let work = self.tmp.path().join(format!("work-{content}"));
        write_tree(&work, &[("marker.txt", content)]);
        let archive = self.search_dir.join(format!("{stamp}-a.gemini.tar.gz"));
        TarGzArchiver.pack(&work, &archive).unwrap();
        archive
    }

    fn request(&self, selector: RestoreSelector) -> RestoreRequest<'_> {
        RestoreRequest {
            selector,
            dest: &self.dest,
            force: false,
            dry_run: false,
            mirror: None,
            lock_path: &self.lock,
        }
    }
}

fn marker(dest: &Path) -> String {
    fs::read_to_string(dest.join("marker.txt")).unwrap()
}

#[test]
fn auto_select_picks_oldest_archive() {
    let fx = Fixture::new();
    fx.add_archive("2025-03-03_000000", "newest");
    fx.add_archive("2025-01-01_000000", "oldest");
    fx.add_archive("2025-02-02_000000", "middle");

    let req = fx.request(RestoreSelector::AutoLocal(fx.search_dir.clone()));
    let report = restore::run(&req, &FsOps::default()).unwrap();

    assert!(report.source.contains("2025-01-01_000000"));
    assert_eq!(marker(&fx.dest), "oldest");
}

#[test]
fn explicit_archive_is_honored() {
    let fx = Fixture::new();
    let archive = fx.add_archive("2025-01-01_000000", "chosen");

    let req = fx.request(RestoreSelector::Archive(archive));
    restore::run(&req, &FsOps::default()).unwrap();
    assert_eq!(marker(&fx.dest), "chosen");
}

#[test]
fn explicit_directory_source_is_copied() {
    let fx = Fixture::new();
    let dir = fx.tmp.path().join("2025-01-01_000000-a.gemini");
    write_tree(&dir, &[("marker.txt", "from-dir"), ("sub/x.txt", "x")]);

    let req = fx.request(RestoreSelector::Dir(dir.clone()));
    restore::run(&req, &FsOps::default()).unwrap();
    assert_eq!(snapshot_tree(&dir), snapshot_tree(&fx.dest));
}

#[test]
fn missing_explicit_source_fails() {
    let fx = Fixture::new();
    let req = fx.request(RestoreSelector::Archive(fx.tmp.path().join("absent.tar.gz")));
    match restore::run(&req, &FsOps::default()) {
        Err(GembakError::SourceMissing(_)) => {}
        other => panic!("expected SourceMissing, got {other:?}"),
    }
}

#[test]
fn empty_search_dir_reports_no_backups() {
    let fx = Fixture::new();
    fs::create_dir_all(&fx.search_dir).unwrap();
    let req = fx.request(RestoreSelector::AutoLocal(fx.search_dir.clone()));
    match restore::run(&req, &FsOps::default()) {
        Err(GembakError::NoBackupsFound(_)) => {}
        other => panic!("expected NoBackupsFound, got {other:?}"),
    }
}

#[test]
fn existing_destination_is_kept_as_bak() {
    let fx = Fixture::new();
    write_tree(&fx.dest, &[("marker.txt", "previous")]);
    let archive = fx.add_archive("2025-01-01_000000", "restored");

    let req = fx.request(RestoreSelector::Archive(archive));
    let report = restore::run(&req, &FsOps::default()).unwrap();

    assert_eq!(marker(&fx.dest), "restored");
    let bak = report.bak.expect(".bak kept without force");
    assert_eq!(marker(&bak), "previous");
}

#[test]
fn force_removes_destination_without_bak() {
    let fx = Fixture::new();
    write_tree(&fx.dest, &[("marker.txt", "previous")]);
    let archive = fx.add_archive("2025-01-01_000000", "restored");

    let mut req = fx.request(RestoreSelector::Archive(archive));
    req.force = true;
    let report = restore::run(&req, &FsOps::default()).unwrap();

    assert_eq!(marker(&fx.dest), "restored");
    assert!(report.bak.is_none());
    // Nothing matching a .bak suffix left behind.
    let parent = fx.dest.parent().unwrap();
    let baks: Vec<_> = fs::read_dir(parent)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.contains(".bak-"))
        .collect();
    assert!(baks.is_empty(), "unexpected .bak entries: {baks:?}");
}

#[test]
fn pre_install_verification_failure_leaves_destination_unchanged() {
    let fx = Fixture::new();
    write_tree(&fx.dest, &[("marker.txt", "previous")]);
    let archive = fx.add_archive("2025-01-01_000000", "staged");

    let mut ops = FsOps::default();
    ops.differ = Box::new(FailOnCallDiffer::new(1));

    let req = fx.request(RestoreSelector::Archive(archive));
    let err = match restore::run(&req, &ops) {
        Err(e @ GembakError::VerificationFailed { .. }) => e,
        other => panic!("expected VerificationFailed, got {other:?}"),
    };
    assert_eq!(err.exit_code(), 3);
    assert_eq!(marker(&fx.dest), "previous", "destination must be untouched");

    // Staging was discarded.
    let parent = fx.dest.parent().unwrap();
    let tmps: Vec<_> = fs::read_dir(parent)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.contains(".tmp-"))
        .collect();
    assert!(tmps.is_empty(), "staging left behind: {tmps:?}");
}

#[test]
fn post_install_failure_rolls_back_and_exits_four() {
    let fx = Fixture::new();
    write_tree(&fx.dest, &[("marker.txt", "previous")]);
    let archive = fx.add_archive("2025-01-01_000000", "suspect");

    // First diff (pre-install) passes, second (post-install) reports a
    // fabricated corruption.
    let mut ops = FsOps::default();
    ops.differ = Box::new(FailOnCallDiffer::new(2));

    let req = fx.request(RestoreSelector::Archive(archive));
    let err = match restore::run(&req, &ops) {
        Err(e @ GembakError::PostVerificationFailed { .. }) => e,
        other => panic!("expected PostVerificationFailed, got {other:?}"),
    };
    assert_eq!(err.exit_code(), 4);
    match err {
        GembakError::PostVerificationFailed { rollback, .. } => {
            assert_eq!(rollback, RollbackStatus::Restored);
        }
        _ => unreachable!(),
    }

    assert_eq!(marker(&fx.dest), "previous", "rollback restores the original");
}

#[test]
fn post_install_failure_with_force_has_no_rollback() {
    let fx = Fixture::new();
    write_tree(&fx.dest, &[("marker.txt", "previous")]);
    let archive = fx.add_archive("2025-01-01_000000", "suspect");

    let mut ops = FsOps::default();
    ops.differ = Box::new(FailOnCallDiffer::new(2));

    let mut req = fx.request(RestoreSelector::Archive(archive));
    req.force = true;
    match restore::run(&req, &ops) {
        Err(GembakError::PostVerificationFailed { rollback, .. }) => {
            assert_eq!(rollback, RollbackStatus::Unavailable);
        }
        other => panic!("expected PostVerificationFailed, got {other:?}"),
    }
}

#[test]
fn dry_run_discovers_without_mutating() {
    let fx = Fixture::new();
    write_tree(&fx.dest, &[("marker.txt", "previous")]);
    fx.add_archive("2025-01-01_000000", "candidate");

    let mut req = fx.request(RestoreSelector::AutoLocal(fx.search_dir.clone()));
    req.dry_run = true;
    let report = restore::run(&req, &FsOps::default()).unwrap();

    assert!(report.dry_run);
    assert!(report.source.contains("2025-01-01_000000"));
    assert_eq!(marker(&fx.dest), "previous");
}

#[test]
fn cloud_restore_downloads_and_installs() {
    let fx = Fixture::new();
    // Stage an archive into the mirror by packing a tree locally first.
    let archive = fx.add_archive("2025-01-01_000000", "from-cloud");
    let mirror = MemoryMirror::new();
    mirror.insert(
        "2025-01-01_000000-a.gemini.tar.gz",
        &fs::read(&archive).unwrap(),
    );
    fs::remove_file(&archive).unwrap();

    let mut req = fx.request(RestoreSelector::Cloud(None));
    req.mirror = Some(&mirror);
    let report = restore::run(&req, &FsOps::default()).unwrap();

    assert!(report.source.starts_with("cloud:"));
    assert_eq!(marker(&fx.dest), "from-cloud");
}

#[test]
fn cloud_restore_honors_explicit_name_over_oldest() {
    let fx = Fixture::new();
    let older = fx.add_archive("2025-01-01_000000", "older");
    let newer = fx.add_archive("2025-02-01_000000", "newer");
    let mirror = MemoryMirror::new();
    mirror.insert("2025-01-01_000000-a.gemini.tar.gz", &fs::read(&older).unwrap());
    mirror.insert("2025-02-01_000000-a.gemini.tar.gz", &fs::read(&newer).unwrap());

    let mut req = fx.request(RestoreSelector::Cloud(Some(
        "2025-02-01_000000-a.gemini.tar.gz".into(),
    )));
    req.mirror = Some(&mirror);
    restore::run(&req, &FsOps::default()).unwrap();
    assert_eq!(marker(&fx.dest), "newer");
}

#[test]
fn cloud_restore_of_absent_object_fails() {
    let fx = Fixture::new();
    let mirror = MemoryMirror::new();
    let mut req = fx.request(RestoreSelector::Cloud(Some("missing.tar.gz".into())));
    req.mirror = Some(&mirror);
    match restore::run(&req, &FsOps::default()) {
        Err(GembakError::CloudTransfer(_)) => {}
        other => panic!("expected CloudTransfer, got {other:?}"),
    }
}

#[cfg(unix)]
#[test]
fn restore_respects_held_lock() {
    let fx = Fixture::new();
    fx.add_archive("2025-01-01_000000", "x");
    let held = LockGuard::acquire(&fx.lock).unwrap();

    let req = fx.request(RestoreSelector::AutoLocal(fx.search_dir.clone()));
    match restore::run(&req, &FsOps::default()) {
        Err(GembakError::LockBusy(_)) => {}
        other => panic!("expected LockBusy, got {other:?}"),
    }
    drop(held);
    assert!(!fx.dest.exists());
}
