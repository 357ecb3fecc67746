//! Cloud object-store collaborator.
//!
//! The lifecycle engine only needs four primitives from a cloud backend:
//! upload, download, list and delete-by-name. [`B2Mirror`] implements them
//! against the Backblaze B2 native API; tests substitute an in-memory
//! mirror.

mod b2;
mod retry;

pub use b2::B2Mirror;
pub use retry::RetryConfig;

use std::path::Path;

use crate::error::Result;

/// One remote backup object. `file_id` is the store's internal version
/// identifier, captured at list time: deletion requires it, so callers
/// carry the whole record from list to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub name: String,
    pub file_id: String,
}

/// Interface to any cloud object store holding mirrored archives.
pub trait CloudMirror {
    /// Upload a local file under `remote_name`.
    fn upload(&self, local: &Path, remote_name: &str) -> Result<()>;

    /// Download `remote_name` to a local path. Fails if the remote object
    /// is absent.
    fn download(&self, remote_name: &str, local: &Path) -> Result<()>;

    /// List every object in the bucket, ordered by name.
    fn list(&self) -> Result<Vec<RemoteObject>>;

    /// Delete one object by name and internal version identifier.
    fn delete(&self, object: &RemoteObject) -> Result<()>;
}
