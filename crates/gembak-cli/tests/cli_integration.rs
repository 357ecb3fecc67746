//! Exit-code and surface tests driving the built `gembak` binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

struct CliFixture {
    _tmp: TempDir,
    source: PathBuf,
    backup_dir: PathBuf,
    dest: PathBuf,
    lock: PathBuf,
}

impl CliFixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source");
        fs::create_dir_all(source.join("chats")).unwrap();
        fs::write(
            source.join("google_accounts.json"),
            r#"{"active": "user@example.com"}"#,
        )
        .unwrap();
        fs::write(source.join("settings.json"), r#"{"theme": "dark"}"#).unwrap();
        fs::write(source.join("chats/one.json"), "{}").unwrap();

        Self {
            source,
            backup_dir: tmp.path().join("backups"),
            dest: tmp.path().join("restored"),
            lock: tmp.path().join("gembak.lock"),
            _tmp: tmp,
        }
    }

    fn run(&self, args: &[&str]) -> Output {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_gembak"));
        cmd.args(args);
        cmd.env("GEMBAK_LOCK_FILE", &self.lock);
        cmd.env_remove("GEMBAK_B2_KEY_ID");
        cmd.env_remove("GEMBAK_B2_APP_KEY");
        cmd.env_remove("GEMBAK_B2_BUCKET");
        cmd.output().unwrap()
    }

    fn run_ok(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "command failed: {args:?}\nstdout:\n{}\nstderr:\n{}",
            stdout(&output),
            stderr(&output)
        );
        stdout(&output)
    }

    fn backup(&self) {
        self.run_ok(&[
            "backup",
            "--src",
            self.source.to_str().unwrap(),
            "--archive-dir",
            self.backup_dir.to_str().unwrap(),
            "--dest-parent",
            self.backup_dir.to_str().unwrap(),
        ]);
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn exit_code(output: &Output) -> i32 {
    output.status.code().expect("process terminated by signal")
}

fn archive_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".gemini.tar.gz"))
        .collect();
    names.sort();
    names
}

#[test]
fn backup_then_list_shows_both_kinds() {
    let fx = CliFixture::new();
    fx.backup();

    let out = fx.run_ok(&["list", "--search-dir", fx.backup_dir.to_str().unwrap()]);
    assert!(out.contains("archive"), "missing archive entry:\n{out}");
    assert!(out.contains("dir"), "missing directory entry:\n{out}");
    assert!(out.contains("user@example.com"));
}

#[test]
fn backup_missing_source_exits_one() {
    let fx = CliFixture::new();
    let output = fx.run(&[
        "backup",
        "--src",
        fx._tmp.path().join("absent").to_str().unwrap(),
        "--archive-dir",
        fx.backup_dir.to_str().unwrap(),
        "--dest-parent",
        fx.backup_dir.to_str().unwrap(),
    ]);
    assert_eq!(exit_code(&output), 1);
    assert!(stderr(&output).contains("does not exist"));
}

#[test]
fn restore_auto_selects_oldest_and_exits_zero() {
    let fx = CliFixture::new();
    fx.backup();
    std::thread::sleep(std::time::Duration::from_millis(1100));
    fs::write(fx.source.join("settings.json"), r#"{"theme": "light"}"#).unwrap();
    fx.backup();

    assert_eq!(archive_names(&fx.backup_dir).len(), 2);

    fx.run_ok(&[
        "restore",
        "--search-dir",
        fx.backup_dir.to_str().unwrap(),
        "--dest",
        fx.dest.to_str().unwrap(),
    ]);

    // The older snapshot had the dark theme.
    let settings = fs::read_to_string(fx.dest.join("settings.json")).unwrap();
    assert!(settings.contains("dark"), "expected oldest snapshot restored");
}

#[test]
fn restore_with_no_backups_exits_one() {
    let fx = CliFixture::new();
    fs::create_dir_all(&fx.backup_dir).unwrap();
    let output = fx.run(&[
        "restore",
        "--search-dir",
        fx.backup_dir.to_str().unwrap(),
        "--dest",
        fx.dest.to_str().unwrap(),
    ]);
    assert_eq!(exit_code(&output), 1);
    assert!(stderr(&output).contains("no matching backups"));
}

#[cfg(unix)]
#[test]
fn held_lock_exits_two() {
    use std::os::unix::io::AsRawFd;

    let fx = CliFixture::new();
    let lock_file = fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&fx.lock)
        .unwrap();
    let rc = unsafe { libc::flock(lock_file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    assert_eq!(rc, 0, "test setup could not take the lock");

    let output = fx.run(&[
        "backup",
        "--src",
        fx.source.to_str().unwrap(),
        "--archive-dir",
        fx.backup_dir.to_str().unwrap(),
        "--dest-parent",
        fx.backup_dir.to_str().unwrap(),
    ]);
    assert_eq!(exit_code(&output), 2);
    assert!(stderr(&output).contains("another backup or restore is running"));
    assert!(!fx.backup_dir.exists(), "loser must not touch the filesystem");
}

#[test]
fn prune_keeps_requested_count() {
    let fx = CliFixture::new();
    fs::create_dir_all(&fx.backup_dir).unwrap();
    for stamp in [
        "2025-01-01_000000",
        "2025-01-02_000000",
        "2025-01-03_000000",
        "2025-01-04_000000",
        "2025-01-05_000000",
    ] {
        fs::write(
            fx.backup_dir.join(format!("{stamp}-a.gemini.tar.gz")),
            b"archive",
        )
        .unwrap();
    }

    let out = fx.run_ok(&[
        "prune",
        "--keep",
        "2",
        "--backup-dir",
        fx.backup_dir.to_str().unwrap(),
    ]);
    assert!(out.contains("Pruned 3"), "unexpected output:\n{out}");
    assert_eq!(
        archive_names(&fx.backup_dir),
        [
            "2025-01-04_000000-a.gemini.tar.gz",
            "2025-01-05_000000-a.gemini.tar.gz",
        ]
    );
}

#[test]
fn prune_dry_run_deletes_nothing() {
    let fx = CliFixture::new();
    fs::create_dir_all(&fx.backup_dir).unwrap();
    for stamp in ["2025-01-01_000000", "2025-01-02_000000", "2025-01-03_000000"] {
        fs::write(
            fx.backup_dir.join(format!("{stamp}-a.gemini.tar.gz")),
            b"archive",
        )
        .unwrap();
    }

    let out = fx.run_ok(&[
        "prune",
        "--keep",
        "1",
        "--dry-run",
        "--backup-dir",
        fx.backup_dir.to_str().unwrap(),
    ]);
    assert!(out.contains("would delete"));
    assert_eq!(archive_names(&fx.backup_dir).len(), 3);
}

#[test]
fn check_integrity_passes_after_backup() {
    let fx = CliFixture::new();
    fx.backup();

    let out = fx.run_ok(&[
        "check-integrity",
        "--src",
        fx.source.to_str().unwrap(),
        "--search-dir",
        fx.backup_dir.to_str().unwrap(),
    ]);
    assert!(out.contains("passed"));
}

#[test]
fn check_integrity_reports_drift() {
    let fx = CliFixture::new();
    fx.backup();
    fs::write(fx.source.join("settings.json"), r#"{"theme": "light"}"#).unwrap();

    let out = fx.run_ok(&[
        "check-integrity",
        "--src",
        fx.source.to_str().unwrap(),
        "--search-dir",
        fx.backup_dir.to_str().unwrap(),
    ]);
    assert!(out.contains("failed"));
    assert!(out.contains("settings.json"));
}

#[test]
fn cloud_operations_without_credentials_exit_one() {
    let fx = CliFixture::new();
    let output = fx.run(&["cloud-check"]);
    assert_eq!(exit_code(&output), 1);
    assert!(stderr(&output).contains("credentials not configured"));

    let output = fx.run(&[
        "prune",
        "--cloud-only",
        "--backup-dir",
        fx.backup_dir.to_str().unwrap(),
    ]);
    assert_eq!(exit_code(&output), 1);
}

#[test]
fn dry_run_backup_leaves_no_artifacts() {
    let fx = CliFixture::new();
    let out = fx.run_ok(&[
        "backup",
        "--dry-run",
        "--src",
        fx.source.to_str().unwrap(),
        "--archive-dir",
        fx.backup_dir.to_str().unwrap(),
        "--dest-parent",
        fx.backup_dir.to_str().unwrap(),
    ]);
    assert!(out.contains("Dry run"));
    assert!(!fx.backup_dir.exists());
}
