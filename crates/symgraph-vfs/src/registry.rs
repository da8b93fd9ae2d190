use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use bincode::Options;
use parking_lot::RwLock;
use symgraph_store::{atomic_write, DATABASE_VERSION};

use symgraph_core::FileId;

use crate::VfsError;

/// Process-wide bijection between absolute paths and 32-bit file ids.
///
/// Id 0 is reserved as "none" and never allocated. Indexer workers read the
/// registry concurrently while the orchestrator inserts, so all access goes
/// through an internal read-write lock; callers share the registry via
/// `Arc`.
#[derive(Debug, Default)]
pub struct FileIdRegistry {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    path_to_id: HashMap<PathBuf, FileId>,
    id_to_path: HashMap<FileId, PathBuf>,
    next_id: u32,
}

impl FileIdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `path` if it has been interned.
    pub fn file_id(&self, path: &Path) -> Option<FileId> {
        self.inner.read().path_to_id.get(path).copied()
    }

    /// Returns the stable id for `path`, allocating a new one if necessary.
    pub fn insert_file(&self, path: impl Into<PathBuf>) -> FileId {
        let path = path.into();
        if let Some(&id) = self.inner.read().path_to_id.get(&path) {
            return id;
        }

        let mut inner = self.inner.write();
        // Re-check under the write lock; another thread may have interned
        // the path between the two lock acquisitions.
        if let Some(&id) = inner.path_to_id.get(&path) {
            return id;
        }
        inner.next_id += 1;
        let id = FileId::from_raw(inner.next_id);
        inner.id_to_path.insert(id, path.clone());
        inner.path_to_id.insert(path, id);
        id
    }

    pub fn path(&self, id: FileId) -> Option<PathBuf> {
        self.inner.read().id_to_path.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().path_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().path_to_id.is_empty()
    }

    /// Millis-since-epoch mtime of the file behind `id`; 0 when the id is
    /// unknown or the file is gone. 0 therefore doubles as "vanished" in the
    /// dirty detectors.
    pub fn last_modified_millis(&self, id: FileId) -> u64 {
        let Some(path) = self.path(id) else {
            return 0;
        };
        let Ok(metadata) = std::fs::metadata(&path) else {
            return 0;
        };
        metadata
            .modified()
            .ok()
            .and_then(|mtime| mtime.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }

    pub fn load(path: &Path) -> Result<Self, VfsError> {
        let bytes = std::fs::read(path)?;
        let (version, entries): (u32, Vec<(PathBuf, u32)>) = bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .with_little_endian()
            .deserialize(&bytes)?;
        if version != DATABASE_VERSION {
            return Err(VfsError::IncompatibleVersion {
                expected: DATABASE_VERSION,
                found: version,
            });
        }

        let mut inner = Inner::default();
        for (entry_path, raw) in entries {
            let id = FileId::from_raw(raw);
            inner.next_id = inner.next_id.max(raw);
            inner.id_to_path.insert(id, entry_path.clone());
            inner.path_to_id.insert(entry_path, id);
        }
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), VfsError> {
        let entries: Vec<(PathBuf, u32)> = {
            let inner = self.inner.read();
            inner
                .path_to_id
                .iter()
                .map(|(entry_path, id)| (entry_path.clone(), id.to_raw()))
                .collect()
        };
        let bytes = bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .with_little_endian()
            .serialize(&(DATABASE_VERSION, entries))?;
        atomic_write(path, &bytes)?;
        Ok(())
    }
}
