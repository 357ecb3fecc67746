//! Backup records and their discovery.
//!
//! A [`BackupSet`] is the ordered collection of backups found at one
//! storage location: a local directory or a cloud bucket. Discovery
//! filters entries by the canonical name shape and silently discards
//! everything else; foreign files are not this tool's backups.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::debug;

use crate::cloud::{CloudMirror, RemoteObject};
use crate::error::Result;
use crate::names;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    Archive,
    Directory,
}

/// Where a backup lives.
#[derive(Debug, Clone)]
pub enum BackupLocation {
    Local(PathBuf),
    Remote(RemoteObject),
}

/// One immutable backup: created once, read many times, deleted only by
/// the pruner or by hand.
#[derive(Debug, Clone)]
pub struct Backup {
    pub timestamp: NaiveDateTime,
    pub name: String,
    pub location: BackupLocation,
    pub kind: BackupKind,
}

impl Backup {
    /// Local path of this backup; `None` for remote entries.
    pub fn local_path(&self) -> Option<&Path> {
        match &self.location {
            BackupLocation::Local(p) => Some(p),
            BackupLocation::Remote(_) => None,
        }
    }

    pub fn remote(&self) -> Option<&RemoteObject> {
        match &self.location {
            BackupLocation::Local(_) => None,
            BackupLocation::Remote(o) => Some(o),
        }
    }
}

/// Ordered collection of backups at one location, chronologically
/// ascending. Entries with identical timestamps keep their discovery
/// order (the sort is stable), which makes tie-breaking deterministic.
#[derive(Debug, Default)]
pub struct BackupSet {
    entries: Vec<Backup>,
}

impl BackupSet {
    /// Scan a local directory. A missing directory yields an empty set;
    /// callers decide whether emptiness is an error.
    pub fn scan_dir(dir: &Path, kind: Option<BackupKind>) -> Result<BackupSet> {
        let mut entries = Vec::new();
        let read_dir = match fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BackupSet::default());
            }
            Err(e) => return Err(e.into()),
        };

        for entry in read_dir {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(found) = classify(name, entry.path().is_dir()) else {
                continue;
            };
            if kind.is_some_and(|k| k != found.1) {
                continue;
            }
            entries.push(Backup {
                timestamp: found.0,
                name: name.to_string(),
                location: BackupLocation::Local(entry.path()),
                kind: found.1,
            });
        }

        entries.sort_by_key(|b| b.timestamp);
        debug!(dir = %dir.display(), count = entries.len(), "scanned local backups");
        Ok(BackupSet { entries })
    }

    /// List a cloud bucket. Only archive entries exist remotely.
    pub fn from_mirror(mirror: &dyn CloudMirror) -> Result<BackupSet> {
        let mut entries = Vec::new();
        for object in mirror.list()? {
            if !names::is_archive_name(&object.name) {
                continue;
            }
            let Some(ts) = names::decode(&object.name) else {
                continue;
            };
            entries.push(Backup {
                timestamp: ts,
                name: object.name.clone(),
                location: BackupLocation::Remote(object),
                kind: BackupKind::Archive,
            });
        }
        entries.sort_by_key(|b| b.timestamp);
        debug!(count = entries.len(), "listed cloud backups");
        Ok(BackupSet { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Earliest backup: the auto-restore candidate.
    pub fn oldest(&self) -> Option<&Backup> {
        self.entries.first()
    }

    /// Most recent backup: the integrity-check reference.
    pub fn newest(&self) -> Option<&Backup> {
        self.entries.last()
    }

    /// Chronologically ascending iteration.
    pub fn iter(&self) -> impl Iterator<Item = &Backup> {
        self.entries.iter()
    }

    /// Entries newest-first, for retention decisions. The stable sort
    /// keeps discovery order among identical timestamps.
    pub fn newest_first(&self) -> Vec<&Backup> {
        let mut entries: Vec<&Backup> = self.entries.iter().collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries
    }
}

/// Match a directory entry name against the canonical shapes. Returns the
/// decoded timestamp and kind, or `None` for foreign entries.
fn classify(name: &str, is_dir: bool) -> Option<(NaiveDateTime, BackupKind)> {
    let kind = if names::is_archive_name(name) && !is_dir {
        BackupKind::Archive
    } else if names::is_dir_name(name) && is_dir {
        BackupKind::Directory
    } else {
        return None;
    };
    names::decode(name).map(|ts| (ts, kind))
}
