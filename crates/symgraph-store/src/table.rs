use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::util::{atomic_write, decode, encode, read_snapshot};
use crate::{StoreError, DATABASE_VERSION};

/// An ordered key–value table backed by an on-disk snapshot.
///
/// Cloning a `Table` clones a handle to the same underlying state; the sync
/// worker and the orchestrator share tables this way.
pub struct Table<K, V> {
    inner: Arc<TableInner<K, V>>,
}

struct TableInner<K, V> {
    path: PathBuf,
    map: RwLock<BTreeMap<K, V>>,
}

impl<K, V> Clone for Table<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Table<K, V>
where
    K: Ord + Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
{
    /// Opens the table at `path`. A missing file opens an empty table; a
    /// corrupt, oversized, or version-incompatible file is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let map = match read_snapshot(&path)? {
            None => BTreeMap::new(),
            Some(bytes) => {
                let (version, map): (u32, BTreeMap<K, V>) = decode(&bytes)?;
                if version != DATABASE_VERSION {
                    return Err(StoreError::IncompatibleVersion {
                        path,
                        expected: DATABASE_VERSION,
                        found: version,
                    });
                }
                map
            }
        };
        Ok(Self {
            inner: Arc::new(TableInner {
                path,
                map: RwLock::new(map),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn value(&self, key: &K) -> Option<V> {
        self.inner.map.read().get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.map.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.map.read().is_empty()
    }

    /// Cursor positioned at the first entry whose key is `>= key`.
    pub fn lower_bound(&self, key: &K) -> Cursor<K, V> {
        let position = self
            .inner
            .map
            .read()
            .range((Bound::Included(key.clone()), Bound::Unbounded))
            .next()
            .map(|(k, _)| k.clone());
        Cursor {
            table: self.clone(),
            position,
        }
    }

    /// Cursor positioned at the first entry.
    pub fn cursor_first(&self) -> Cursor<K, V> {
        let position = self.inner.map.read().keys().next().cloned();
        Cursor {
            table: self.clone(),
            position,
        }
    }

    /// Begins a batched write. Buffered operations become visible to
    /// readers all at once when the scope flushes.
    pub fn write_scope(&self) -> WriteScope<K, V> {
        WriteScope {
            table: self.clone(),
            pending: BTreeMap::new(),
        }
    }

    /// Persists the current in-memory image.
    pub fn save(&self) -> Result<(), StoreError> {
        let bytes = {
            let map = self.inner.map.read();
            encode(&(DATABASE_VERSION, &*map))?
        };
        atomic_write(&self.inner.path, &bytes)
    }
}

/// Iteration handle addressing entries by key.
///
/// A cursor never borrows table state: every step re-resolves the position
/// against the current image, so cursors stay valid across flushes and
/// erases. A cursor sitting on an erased key reports no value but still
/// advances correctly.
pub struct Cursor<K, V> {
    table: Table<K, V>,
    position: Option<K>,
}

impl<K, V> Cursor<K, V>
where
    K: Ord + Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
{
    pub fn is_valid(&self) -> bool {
        self.position.is_some()
    }

    pub fn key(&self) -> Option<K> {
        self.position.clone()
    }

    pub fn value(&self) -> Option<V> {
        let key = self.position.as_ref()?;
        self.table.inner.map.read().get(key).cloned()
    }

    pub fn next(&mut self) {
        let map = self.table.inner.map.read();
        self.position = match self.position.take() {
            Some(current) => map
                .range((Bound::Excluded(current), Bound::Unbounded))
                .next()
                .map(|(k, _)| k.clone()),
            None => None,
        };
    }

    pub fn prev(&mut self) {
        let map = self.table.inner.map.read();
        self.position = match self.position.take() {
            Some(current) => map
                .range((Bound::Unbounded, Bound::Excluded(current)))
                .next_back()
                .map(|(k, _)| k.clone()),
            None => None,
        };
    }

    /// Moves to the last entry; used as the fallback when `lower_bound` ran
    /// off the end.
    pub fn seek_to_end(&mut self) {
        self.position = self.table.inner.map.read().keys().next_back().cloned();
    }
}

enum Op<V> {
    Put(V),
    Erase,
}

/// A batched write to one table.
///
/// Operations buffer inside the scope; [`WriteScope::flush`] applies them
/// under the table's write lock in one critical section and persists the
/// snapshot atomically. Readers observe either the pre-scope or post-scope
/// image, never a partial batch. Dropping a scope with unflushed operations
/// flushes best-effort and logs on failure.
pub struct WriteScope<K, V>
where
    K: Ord + Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
{
    table: Table<K, V>,
    pending: BTreeMap<K, Op<V>>,
}

impl<K, V> WriteScope<K, V>
where
    K: Ord + Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
{
    pub fn set(&mut self, key: K, value: V) {
        self.pending.insert(key, Op::Put(value));
    }

    pub fn erase(&mut self, key: K) {
        self.pending.insert(key, Op::Erase);
    }

    /// Reads through the pending batch, falling back to the table image.
    /// Needed when one batch merges several deltas touching the same key.
    pub fn value(&self, key: &K) -> Option<V> {
        match self.pending.get(key) {
            Some(Op::Put(value)) => Some(value.clone()),
            Some(Op::Erase) => None,
            None => self.table.value(key),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn flush(&mut self) -> Result<(), StoreError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending);
        self.table.apply_and_persist(pending)
    }
}

impl<K, V> Drop for WriteScope<K, V>
where
    K: Ord + Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
{
    fn drop(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending);
        if let Err(err) = self.table.apply_and_persist(pending) {
            tracing::error!(
                path = %self.table.inner.path.display(),
                error = %err,
                "failed to flush write scope on drop"
            );
        }
    }
}

impl<K, V> Table<K, V>
where
    K: Ord + Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
{
    fn apply_and_persist(&self, pending: BTreeMap<K, Op<V>>) -> Result<(), StoreError> {
        let bytes = {
            let mut map = self.inner.map.write();
            for (key, op) in pending {
                match op {
                    Op::Put(value) => {
                        map.insert(key, value);
                    }
                    Op::Erase => {
                        map.remove(&key);
                    }
                }
            }
            encode(&(DATABASE_VERSION, &*map))?
        };
        atomic_write(&self.inner.path, &bytes)
    }
}
