//! Dirty detection: deciding which sources must be re-indexed.
//!
//! A detector is seeded from one trigger (an explicit file set, a watcher
//! batch, or plain mtime comparison) and then asked, per source, whether
//! the source went stale. Everything a detector marks dirty ends up purged
//! from the symbol-family tables at the next sync.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use symgraph_core::{FileId, PathMatch, Source};
use symgraph_store::Table;
use symgraph_vfs::FileIdRegistry;

/// Tagged variant over the detection strategies.
pub enum Dirty {
    Simple(SimpleDirty),
    Suspended(SuspendedDirty),
    IfModified(IfModifiedDirty),
    Watcher(WatcherDirty),
}

impl Dirty {
    /// Every file id known to be stale so far. Grows as `is_dirty` runs.
    pub fn dirtied(&self) -> BTreeSet<FileId> {
        match self {
            Dirty::Simple(simple) => simple.dirty.clone(),
            Dirty::Suspended(suspended) => suspended.state.dirty.clone(),
            Dirty::IfModified(if_modified) => if_modified.state.dirty.clone(),
            Dirty::Watcher(watcher) => watcher.state.dirty.clone(),
        }
    }

    pub fn is_dirty(&mut self, source: &Source) -> bool {
        match self {
            Dirty::Simple(simple) => simple.is_dirty(source),
            Dirty::Suspended(_) => false,
            Dirty::IfModified(if_modified) => if_modified.is_dirty(source),
            Dirty::Watcher(watcher) => watcher.is_dirty(source),
        }
    }

    /// Force-marks a file stale; used by the load-time sweep for files that
    /// vanished from disk.
    pub fn insert_dirty_file(&mut self, file_id: FileId) {
        match self {
            Dirty::Simple(simple) => {
                simple.dirty.insert(file_id);
            }
            Dirty::Suspended(suspended) => {
                suspended.state.dirty.insert(file_id);
            }
            Dirty::IfModified(if_modified) => {
                if_modified.state.dirty.insert(file_id);
            }
            Dirty::Watcher(watcher) => {
                watcher.state.dirty.insert(file_id);
            }
        }
    }
}

/// Shared helpers for the detectors that consult the filesystem: the dirty
/// set plus a per-instance mtime memo.
struct ComplexState {
    registry: Arc<FileIdRegistry>,
    last_modified: HashMap<FileId, u64>,
    dirty: BTreeSet<FileId>,
}

impl ComplexState {
    fn new(registry: Arc<FileIdRegistry>) -> Self {
        Self {
            registry,
            last_modified: HashMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    /// Memoized mtime; 0 means the file is gone.
    fn last_modified(&mut self, file_id: FileId) -> u64 {
        let registry = &self.registry;
        *self
            .last_modified
            .entry(file_id)
            .or_insert_with(|| registry.last_modified_millis(file_id))
    }
}

/// Seeded with an explicit file set, transitively including dependents.
pub struct SimpleDirty {
    dirty: BTreeSet<FileId>,
}

impl SimpleDirty {
    pub fn new(seed: &BTreeSet<FileId>, dependencies: &Table<FileId, BTreeSet<FileId>>) -> Self {
        let mut dirty = BTreeSet::new();
        for &file_id in seed {
            dirty.insert(file_id);
            if let Some(dependents) = dependencies.value(&file_id) {
                dirty.extend(dependents);
            }
        }
        Self { dirty }
    }

    fn is_dirty(&mut self, source: &Source) -> bool {
        self.dirty.contains(&source.file_id)
    }
}

/// Reports nothing dirty; used while the whole project is suspended. Still
/// accumulates force-inserted files so a load-time purge can commit.
pub struct SuspendedDirty {
    state: ComplexState,
}

impl SuspendedDirty {
    pub fn new(registry: Arc<FileIdRegistry>) -> Self {
        Self {
            state: ComplexState::new(registry),
        }
    }
}

/// A source is dirty iff one of the files it depends on vanished or is
/// newer than the source's recorded parse time. Optionally narrowed to
/// sources matching a pattern.
pub struct IfModifiedDirty {
    state: ComplexState,
    reversed: BTreeMap<FileId, BTreeSet<FileId>>,
    pattern: PathMatch,
}

impl IfModifiedDirty {
    pub fn new(
        dependencies: &Table<FileId, BTreeSet<FileId>>,
        pattern: PathMatch,
        registry: Arc<FileIdRegistry>,
    ) -> Self {
        // The stored graph maps header → dependents; invert it so each
        // source can look up what it depends on.
        let mut reversed: BTreeMap<FileId, BTreeSet<FileId>> = BTreeMap::new();
        let mut cursor = dependencies.cursor_first();
        while let Some(dependee) = cursor.key() {
            if let Some(dependents) = cursor.value() {
                for dependent in dependents {
                    reversed.entry(dependent).or_default().insert(dependee);
                }
            }
            cursor.next();
        }
        Self {
            state: ComplexState::new(registry),
            reversed,
            pattern,
        }
    }

    fn is_dirty(&mut self, source: &Source) -> bool {
        if !self.pattern.is_empty() {
            let matched = self
                .state
                .registry
                .path(source.file_id)
                .is_some_and(|path| self.pattern.matches(&path));
            if !matched {
                return false;
            }
        }

        let mut ret = false;
        if let Some(dependees) = self.reversed.get(&source.file_id) {
            for &dependee in dependees {
                let modified = self.state.last_modified(dependee);
                if modified == 0 || modified > source.parsed {
                    ret = true;
                    self.state.dirty.insert(dependee);
                }
            }
        }
        if ret {
            self.state.dirty.insert(source.file_id);
        }
        ret
    }
}

/// Seeded by a set of modified file ids from the watcher; a source is dirty
/// iff a modified file reaches it through the include graph and is newer
/// than the source's parse time.
pub struct WatcherDirty {
    state: ComplexState,
    modified: BTreeMap<FileId, BTreeSet<FileId>>,
}

impl WatcherDirty {
    pub fn new(
        dependencies: &Table<FileId, BTreeSet<FileId>>,
        modified: &BTreeSet<FileId>,
        registry: Arc<FileIdRegistry>,
    ) -> Self {
        let modified = modified
            .iter()
            .map(|&file_id| {
                (
                    file_id,
                    dependencies.value(&file_id).unwrap_or_default(),
                )
            })
            .collect();
        Self {
            state: ComplexState::new(registry),
            modified,
        }
    }

    fn is_dirty(&mut self, source: &Source) -> bool {
        let mut ret = false;
        let reaching: Vec<FileId> = self
            .modified
            .iter()
            .filter(|(_, dependents)| dependents.contains(&source.file_id))
            .map(|(&file_id, _)| file_id)
            .collect();
        for file_id in reaching {
            let modified = self.state.last_modified(file_id);
            if modified == 0 || modified > source.parsed {
                ret = true;
                self.state.dirty.insert(file_id);
            }
        }
        if ret {
            self.state.dirty.insert(source.file_id);
        }
        ret
    }
}
