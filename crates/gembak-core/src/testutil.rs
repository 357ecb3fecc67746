use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::cloud::{CloudMirror, RemoteObject};
use crate::error::{GembakError, Result};
use crate::fsops::{TreeDiff, TreeDiffer, WalkDiffer};

/// In-memory cloud mirror for testing. Thread-safe via Mutex; assigns a
/// fresh file id per upload, the way a real object store versions files.
pub struct MemoryMirror {
    objects: Mutex<BTreeMap<String, (String, Vec<u8>)>>,
    next_id: AtomicU64,
    fail_uploads: bool,
    fail_delete_of: Mutex<Option<String>>,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            fail_uploads: false,
            fail_delete_of: Mutex::new(None),
        }
    }

    /// A mirror whose uploads always fail, for best-effort paths.
    pub fn failing_uploads() -> Self {
        Self {
            fail_uploads: true,
            ..Self::new()
        }
    }

    /// Make deletion of one named object fail, for partial-failure paths.
    pub fn fail_delete_of(&self, name: &str) {
        *self.fail_delete_of.lock().unwrap() = Some(name.to_string());
    }

    pub fn insert(&self, name: &str, data: &[u8]) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .insert(name.to_string(), (format!("id-{id}"), data.to_vec()));
    }

    pub fn names(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.lock().unwrap().contains_key(name)
    }
}

impl CloudMirror for MemoryMirror {
    fn upload(&self, local: &Path, remote_name: &str) -> Result<()> {
        if self.fail_uploads {
            return Err(GembakError::CloudTransfer("upload rejected".into()));
        }
        let data = std::fs::read(local)?;
        self.insert(remote_name, &data);
        Ok(())
    }

    fn download(&self, remote_name: &str, local: &Path) -> Result<()> {
        let objects = self.objects.lock().unwrap();
        let (_, data) = objects
            .get(remote_name)
            .ok_or_else(|| GembakError::CloudTransfer(format!("no such object: {remote_name}")))?;
        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(local, data)?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<RemoteObject>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .map(|(name, (id, _))| RemoteObject {
                name: name.clone(),
                file_id: id.clone(),
            })
            .collect())
    }

    fn delete(&self, object: &RemoteObject) -> Result<()> {
        if self.fail_delete_of.lock().unwrap().as_deref() == Some(object.name.as_str()) {
            return Err(GembakError::CloudTransfer(format!(
                "delete rejected: {}",
                object.name
            )));
        }
        let mut objects = self.objects.lock().unwrap();
        match objects.get(&object.name) {
            Some((id, _)) if *id == object.file_id => {
                objects.remove(&object.name);
                Ok(())
            }
            Some(_) => Err(GembakError::CloudTransfer(format!(
                "stale file id for {}",
                object.name
            ))),
            None => Err(GembakError::CloudTransfer(format!(
                "no such object: {}",
                object.name
            ))),
        }
    }
}

/// Differ wrapper that injects a fabricated difference on the Nth call
/// (1-based), delegating to [`WalkDiffer`] otherwise. Lets tests trip the
/// pre- or post-install verification gates deterministically.
pub struct FailOnCallDiffer {
    inner: WalkDiffer,
    fail_on: usize,
    calls: AtomicUsize,
}

impl FailOnCallDiffer {
    pub fn new(fail_on: usize) -> Self {
        Self {
            inner: WalkDiffer,
            fail_on,
            calls: AtomicUsize::new(0),
        }
    }
}

impl TreeDiffer for FailOnCallDiffer {
    fn diff_trees(&self, left: &Path, right: &Path) -> Result<Vec<TreeDiff>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            return Ok(vec![TreeDiff::ContentMismatch(PathBuf::from(
                "injected-difference",
            ))]);
        }
        self.inner.diff_trees(left, right)
    }
}

/// Write a small tree of files under `root`, creating parents as needed.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (rel, content) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
}

/// A source directory that looks like a live configuration dir with an
/// active account marker.
pub fn write_source_tree(root: &Path, account: &str) {
    write_tree(
        root,
        &[
            (
                "google_accounts.json",
                &format!(r#"{{"active": "{account}"}}"#),
            ),
            ("settings.json", r#"{"theme": "dark"}"#),
            ("chats/session-1.json", "{\"messages\": []}"),
        ],
    );
}

/// Read every file under `root` into a relative-path map, for tree
/// equality assertions.
pub fn snapshot_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut out = BTreeMap::new();
    for entry in walkdir::WalkDir::new(root).min_depth(1) {
        let entry = entry.unwrap();
        if entry.file_type().is_file() {
            let rel = entry
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .into_owned();
            out.insert(rel, std::fs::read(entry.path()).unwrap());
        }
    }
    out
}
