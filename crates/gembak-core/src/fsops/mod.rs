//! Narrow filesystem capability traits.
//!
//! The lifecycle engine drives three mechanisms (archiving, tree copying,
//! tree diffing) through traits so its control flow is independent of the
//! underlying implementation, and so verification behavior can be
//! exercised directly in tests.

mod archive;
mod copy;
mod diff;

pub use archive::TarGzArchiver;
pub use copy::FsTreeCopier;
pub use diff::{TreeDiff, WalkDiffer};

use std::path::Path;

use crate::error::Result;

/// Produces and unpacks compressed tree archives.
pub trait Archiver {
    /// Pack the contents of `src_dir` into a gzip-compressed tarball at
    /// `archive_path`.
    fn pack(&self, src_dir: &Path, archive_path: &Path) -> Result<()>;

    /// Unpack an archive into `dest_dir` (created if absent).
    fn unpack(&self, archive_path: &Path, dest_dir: &Path) -> Result<()>;
}

/// Copies a directory tree preserving file modes, mtimes and symlinks.
pub trait TreeCopier {
    fn copy_tree(&self, src: &Path, dest: &Path) -> Result<()>;
}

/// Compares two directory trees recursively.
pub trait TreeDiffer {
    /// Every difference between `left` and `right`: entries present on only
    /// one side, type mismatches, and content mismatches. An empty result
    /// means the trees are identical.
    fn diff_trees(&self, left: &Path, right: &Path) -> Result<Vec<TreeDiff>>;
}

/// Default capability set backed by the real filesystem.
pub struct FsOps {
    pub archiver: Box<dyn Archiver>,
    pub copier: Box<dyn TreeCopier>,
    pub differ: Box<dyn TreeDiffer>,
}

impl Default for FsOps {
    fn default() -> Self {
        FsOps {
            archiver: Box::new(TarGzArchiver),
            copier: Box::new(FsTreeCopier),
            differ: Box::new(WalkDiffer),
        }
    }
}
