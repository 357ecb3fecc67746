use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{GembakError, Result};
use crate::fsops::TreeDiffer;

/// One difference between two trees, relative to the tree roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeDiff {
    /// Entry exists only under the left root.
    OnlyInLeft(PathBuf),
    /// Entry exists only under the right root.
    OnlyInRight(PathBuf),
    /// Entry kinds differ (file vs directory vs symlink).
    TypeMismatch(PathBuf),
    /// Regular file contents differ.
    ContentMismatch(PathBuf),
    /// Symlink targets differ.
    LinkMismatch(PathBuf),
}

impl std::fmt::Display for TreeDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TreeDiff::OnlyInLeft(p) => write!(f, "only in left: {}", p.display()),
            TreeDiff::OnlyInRight(p) => write!(f, "only in right: {}", p.display()),
            TreeDiff::TypeMismatch(p) => write!(f, "entry type differs: {}", p.display()),
            TreeDiff::ContentMismatch(p) => write!(f, "content differs: {}", p.display()),
            TreeDiff::LinkMismatch(p) => write!(f, "symlink target differs: {}", p.display()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Dir,
    Symlink,
}

/// Recursive content comparison of two trees: the engine's `diff -r`.
///
/// Compares entry sets, entry kinds, file contents and symlink targets.
/// Metadata (modes, mtimes) is deliberately not compared.
pub struct WalkDiffer;

impl TreeDiffer for WalkDiffer {
    fn diff_trees(&self, left: &Path, right: &Path) -> Result<Vec<TreeDiff>> {
        let left_entries = collect_entries(left)?;
        let right_entries = collect_entries(right)?;
        let mut diffs = Vec::new();

        for (rel, kind) in &left_entries {
            match right_entries.get(rel) {
                None => diffs.push(TreeDiff::OnlyInLeft(rel.clone())),
                Some(other) if other != kind => diffs.push(TreeDiff::TypeMismatch(rel.clone())),
                Some(EntryKind::File) => {
                    if !files_equal(&left.join(rel), &right.join(rel))? {
                        diffs.push(TreeDiff::ContentMismatch(rel.clone()));
                    }
                }
                Some(EntryKind::Symlink) => {
                    if fs::read_link(left.join(rel))? != fs::read_link(right.join(rel))? {
                        diffs.push(TreeDiff::LinkMismatch(rel.clone()));
                    }
                }
                Some(EntryKind::Dir) => {}
            }
        }
        for rel in right_entries.keys() {
            if !left_entries.contains_key(rel) {
                diffs.push(TreeDiff::OnlyInRight(rel.clone()));
            }
        }
        Ok(diffs)
    }
}

fn collect_entries(root: &Path) -> Result<BTreeMap<PathBuf, EntryKind>> {
    let mut entries = BTreeMap::new();
    for entry in WalkDir::new(root).follow_links(false).min_depth(1) {
        let entry = entry.map_err(|e| GembakError::Other(format!("walk '{}': {e}", root.display())))?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| GembakError::Other(format!("walk '{}': {e}", root.display())))?
            .to_path_buf();
        let ft = entry.file_type();
        let kind = if ft.is_symlink() {
            EntryKind::Symlink
        } else if ft.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        };
        entries.insert(rel, kind);
    }
    Ok(entries)
}

fn files_equal(a: &Path, b: &Path) -> Result<bool> {
    let meta_a = fs::metadata(a)?;
    let meta_b = fs::metadata(b)?;
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }
    // Size check first keeps the common mismatch cheap; full read settles it.
    Ok(fs::read(a)? == fs::read(b)?)
}
