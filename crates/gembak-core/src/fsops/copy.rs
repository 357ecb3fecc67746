use std::fs;
use std::path::Path;

use filetime::FileTime;

use crate::error::{GembakError, Result};
use crate::fsops::TreeCopier;

/// Recursive tree copy preserving file modes, mtimes and symlinks: the
/// equivalent of `cp -a` for regular trees.
pub struct FsTreeCopier;

impl TreeCopier for FsTreeCopier {
    fn copy_tree(&self, src: &Path, dest: &Path) -> Result<()> {
        let meta = fs::symlink_metadata(src)?;
        if !meta.is_dir() {
            return Err(GembakError::Other(format!(
                "copy source is not a directory: '{}'",
                src.display()
            )));
        }
        copy_dir(src, dest)
    }
}

fn copy_dir(src: &Path, dest: &Path) -> Result<()> {
    let src_meta = fs::metadata(src)?;
    fs::create_dir_all(dest)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_symlink() {
            copy_symlink(&from, &to)?;
        } else if file_type.is_dir() {
            copy_dir(&from, &to)?;
        } else {
            // fs::copy carries permissions along with the content.
            fs::copy(&from, &to)?;
            copy_mtime(&from, &to)?;
        }
    }

    // Directory permissions and mtime are applied after the children:
    // a read-only source directory must not block its own copy, and the
    // child writes would bump a restored mtime.
    fs::set_permissions(dest, src_meta.permissions())?;
    copy_mtime(src, dest)?;
    Ok(())
}

fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    let target = fs::read_link(from)?;
    #[cfg(unix)]
    std::os::unix::fs::symlink(&target, to)?;
    #[cfg(windows)]
    {
        if fs::metadata(from).map(|m| m.is_dir()).unwrap_or(false) {
            std::os::windows::fs::symlink_dir(&target, to)?;
        } else {
            std::os::windows::fs::symlink_file(&target, to)?;
        }
    }
    Ok(())
}

fn copy_mtime(from: &Path, to: &Path) -> Result<()> {
    let meta = fs::metadata(from)?;
    let mtime = FileTime::from_last_modification_time(&meta);
    filetime::set_file_mtime(to, mtime)?;
    Ok(())
}
