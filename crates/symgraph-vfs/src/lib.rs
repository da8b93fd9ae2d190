//! Filesystem collaborators for the symgraph indexing core.
//!
//! This crate owns the two places the core touches the real filesystem
//! outside of its own tables: the process-wide [`FileIdRegistry`] (the
//! path ⇄ id bijection) and OS file watching. Higher layers depend only on
//! the [`FileWatcher`] trait and the [`FileChange`] model; the `notify`
//! backend stays behind the `watch-notify` feature so library consumers
//! don't pull in platform watcher dependencies.

mod change;
mod registry;
mod watch;

pub use change::*;
pub use registry::*;
pub use watch::*;

/// Errors produced by the registry's persistence.
#[derive(Debug, thiserror::Error)]
pub enum VfsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error(transparent)]
    Store(#[from] symgraph_store::StoreError),

    #[error("incompatible file-id registry version: expected {expected}, found {found}")]
    IncompatibleVersion { expected: u32, found: u32 },
}
