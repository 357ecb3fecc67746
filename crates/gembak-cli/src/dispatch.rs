use std::path::PathBuf;

use gembak_core::cloud::{B2Mirror, CloudMirror};
use gembak_core::commands::{backup, check, list, prune, restore, sync};
use gembak_core::config;
use gembak_core::error::Result;
use gembak_core::fsops::FsOps;
use gembak_core::set::{Backup, BackupKind};

use crate::cli::{CloudOpts, Commands};

/// Resolve an optional flag path with tilde expansion, or a default.
fn path_or(flag: &Option<String>, default: impl FnOnce() -> PathBuf) -> PathBuf {
    flag.as_deref().map(config::expand_tilde).unwrap_or_else(default)
}

fn connect(opts: &CloudOpts) -> Result<B2Mirror> {
    let creds = config::require_credentials(
        opts.key_id.as_deref(),
        opts.app_key.as_deref(),
        opts.bucket.as_deref(),
    )?;
    B2Mirror::connect(&creds)
}

pub(crate) fn dispatch(command: &Commands) -> Result<()> {
    let ops = FsOps::default();
    let lock_path = config::lock_path();

    match command {
        Commands::Backup {
            src,
            archive_dir,
            dest_parent,
            dry_run,
            cloud,
            cloud_opts,
        } => {
            // Mirroring is best-effort for backup: the local snapshot is
            // the primary guarantee, so an unconfigured or unreachable
            // cloud degrades to a warning instead of aborting.
            let mirror = if *cloud {
                match connect(cloud_opts) {
                    Ok(m) => Some(m),
                    Err(e) => {
                        eprintln!("Warning: cloud mirroring skipped: {e}");
                        None
                    }
                }
            } else {
                None
            };
            let report = backup::run(
                &backup::BackupRequest {
                    source: &path_or(src, config::default_source_dir),
                    archive_dir: &path_or(archive_dir, config::default_backup_dir),
                    dest_parent: &path_or(dest_parent, config::default_backup_dir),
                    dry_run: *dry_run,
                    mirror: mirror.as_ref().map(|m| m as &dyn CloudMirror),
                    lock_path: &lock_path,
                },
                &ops,
            )?;

            if report.dry_run {
                println!("Dry run: would create {}", report.name);
            } else {
                println!("Backup complete.");
                println!("  directory: {}", report.dest.display());
                println!("  archive:   {}", report.archive.display());
                if let Some(warning) = report.cloud_warning {
                    println!("  cloud:     upload failed ({warning})");
                } else if mirror.is_some() {
                    println!("  cloud:     uploaded");
                }
            }
            Ok(())
        }

        Commands::Restore {
            from_dir,
            from_archive,
            search_dir,
            dest,
            force,
            dry_run,
            cloud,
            cloud_opts,
        } => {
            let mirror = if *cloud { Some(connect(cloud_opts)?) } else { None };
            // Explicit sources beat automatic search; a cloud restore
            // treats --from-archive as the exact remote name.
            let selector = if *cloud {
                restore::RestoreSelector::Cloud(from_archive.clone())
            } else if let Some(dir) = from_dir {
                restore::RestoreSelector::Dir(config::expand_tilde(dir))
            } else if let Some(archive) = from_archive {
                restore::RestoreSelector::Archive(config::expand_tilde(archive))
            } else {
                restore::RestoreSelector::AutoLocal(path_or(search_dir, config::default_backup_dir))
            };

            let report = restore::run(
                &restore::RestoreRequest {
                    selector,
                    dest: &path_or(dest, config::default_source_dir),
                    force: *force,
                    dry_run: *dry_run,
                    mirror: mirror.as_ref().map(|m| m as &dyn CloudMirror),
                    lock_path: &lock_path,
                },
                &ops,
            )?;

            if report.dry_run {
                println!("Dry run: would restore {} -> {}", report.source, report.dest.display());
            } else {
                println!("Restore complete.");
                if let Some(bak) = report.bak {
                    println!("  previous destination moved to: {}", bak.display());
                }
            }
            Ok(())
        }

        Commands::CheckIntegrity { src, search_dir } => {
            let report = check::run(
                &path_or(src, config::default_source_dir),
                &path_or(search_dir, config::default_backup_dir),
                &ops,
            )?;
            if report.passed() {
                println!("Integrity check passed: no differences found.");
            } else {
                println!("Integrity check failed: differences found.");
                for diff in &report.differences {
                    println!("  {diff}");
                }
            }
            Ok(())
        }

        Commands::List {
            search_dir,
            cloud,
            cloud_opts,
        } => {
            let backups = if *cloud {
                let mirror = connect(cloud_opts)?;
                list::cloud(&mirror)?
            } else {
                list::local(&path_or(search_dir, config::default_backup_dir))?
            };
            print_backups(&backups);
            Ok(())
        }

        Commands::Prune {
            keep,
            backup_dir,
            cloud,
            cloud_only,
            dry_run,
            cloud_opts,
        } => {
            let mut scope = match (*cloud, *cloud_only) {
                (_, true) => prune::PruneScope::Cloud,
                (true, false) => prune::PruneScope::Both,
                (false, false) => prune::PruneScope::Local,
            };
            // Cloud-only pruning has no local fallback, so connection
            // failures are fatal there; with --cloud the local half still
            // runs and the cloud half is skipped with a warning.
            let mirror = match scope {
                prune::PruneScope::Cloud => Some(connect(cloud_opts)?),
                prune::PruneScope::Both => match connect(cloud_opts) {
                    Ok(m) => Some(m),
                    Err(e) => {
                        eprintln!("Warning: cloud prune skipped: {e}");
                        scope = prune::PruneScope::Local;
                        None
                    }
                },
                prune::PruneScope::Local => None,
            };
            let report = prune::run(&prune::PruneRequest {
                backup_dir: &path_or(backup_dir, config::default_backup_dir),
                keep: *keep,
                scope,
                dry_run: *dry_run,
                mirror: mirror.as_ref().map(|m| m as &dyn CloudMirror),
                lock_path: &lock_path,
            })?;

            if report.dry_run {
                for name in &report.deleted {
                    println!("would delete: {name}");
                }
                println!("Dry run: would keep {} and delete {} backups", report.kept, report.pruned);
            } else {
                println!("Pruned {} backups (kept {})", report.pruned, report.kept);
            }
            Ok(())
        }

        Commands::CloudCheck { cloud_opts } => {
            connect(cloud_opts)?;
            println!("Cloud credentials and bucket access are correctly configured.");
            Ok(())
        }

        Commands::CloudSync {
            backup_dir,
            cloud_opts,
        } => {
            let mirror = connect(cloud_opts)?;
            let report = sync::cloud_sync(&path_or(backup_dir, config::default_backup_dir), &mirror)?;
            println!(
                "Uploaded {} archives ({} already present).",
                report.transferred.len(),
                report.skipped
            );
            Ok(())
        }

        Commands::LocalSync {
            backup_dir,
            cloud_opts,
        } => {
            let mirror = connect(cloud_opts)?;
            let report = sync::local_sync(&path_or(backup_dir, config::default_backup_dir), &mirror)?;
            println!(
                "Downloaded {} archives ({} already present).",
                report.transferred.len(),
                report.skipped
            );
            Ok(())
        }
    }
}

fn print_backups(backups: &[Backup]) {
    if backups.is_empty() {
        println!("No backups found.");
        return;
    }
    println!("Available backups:");
    for backup in backups {
        let kind = match backup.kind {
            BackupKind::Archive => "archive",
            BackupKind::Directory => "dir",
        };
        println!("  {:<8} {}", kind, backup.name);
    }
}
