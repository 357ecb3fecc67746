use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use crate::error::{GembakError, Result};
use crate::fsops::Archiver;

/// Gzip-compressed tar archiver.
pub struct TarGzArchiver;

impl Archiver for TarGzArchiver {
    fn pack(&self, src_dir: &Path, archive_path: &Path) -> Result<()> {
        if let Some(parent) = archive_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = BufWriter::new(File::create(archive_path)?);
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        // Keep symlinks as symlinks, matching the on-disk tree.
        builder.follow_symlinks(false);
        builder
            .append_dir_all(".", src_dir)
            .map_err(|e| GembakError::Archive(format!("pack '{}': {e}", src_dir.display())))?;
        let encoder = builder
            .into_inner()
            .map_err(|e| GembakError::Archive(format!("finalize '{}': {e}", archive_path.display())))?;
        let mut file = encoder
            .finish()
            .map_err(|e| GembakError::Archive(format!("finalize '{}': {e}", archive_path.display())))?;
        file.flush()?;
        debug!(archive = %archive_path.display(), "archive written");
        Ok(())
    }

    fn unpack(&self, archive_path: &Path, dest_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dest_dir)?;
        let file = BufReader::new(File::open(archive_path)?);
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        archive.set_preserve_permissions(true);
        archive.set_preserve_mtime(true);
        archive
            .unpack(dest_dir)
            .map_err(|e| GembakError::Archive(format!("unpack '{}': {e}", archive_path.display())))?;
        debug!(archive = %archive_path.display(), dest = %dest_dir.display(), "archive unpacked");
        Ok(())
    }
}
