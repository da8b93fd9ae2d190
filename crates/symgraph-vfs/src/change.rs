use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileChangeKind {
    Created,
    Modified,
    Removed,
}

/// A normalized filesystem change.
///
/// Watcher backends are allowed to be lossy and to coalesce events;
/// consumers should treat changes as hints and consult the filesystem for
/// the authoritative state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileChange {
    Created { path: PathBuf },
    Modified { path: PathBuf },
    Removed { path: PathBuf },
}

impl FileChange {
    pub fn kind(&self) -> FileChangeKind {
        match self {
            FileChange::Created { .. } => FileChangeKind::Created,
            FileChange::Modified { .. } => FileChangeKind::Modified,
            FileChange::Removed { .. } => FileChangeKind::Removed,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            FileChange::Created { path }
            | FileChange::Modified { path }
            | FileChange::Removed { path } => path,
        }
    }
}
