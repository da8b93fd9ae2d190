//! The project indexing core.
//!
//! A [`Project`] ingests per-translation-unit [`IndexData`] deltas produced
//! by an external indexer, batches them in memory, and folds them into the
//! persistent symbol tables during a *sync*. File modifications propagate
//! through the persisted include graph via the [`dirty`] detectors and
//! trigger re-indexing jobs through an external [`JobScheduler`].
//!
//! All project state is mutated from one thread (the orchestrator); see
//! [`ProjectDriver`] for the event loop that ties together watcher events,
//! job completions, sync completions, and timers. The only structure shared
//! with indexer workers is [`VisitedFiles`].

pub mod dirty;
mod driver;
mod index_data;
mod job;
mod options;
mod project;
mod query;
mod sync;
mod tables;
pub mod test_support;
mod visited;

pub use driver::ProjectDriver;
pub use index_data::{IndexData, JobFlags};
pub use job::{Indexer, IndexerJob, JobScheduler};
pub use options::ProjectOptions;
pub use project::{DependencyMode, Project, ProjectEvent, ReindexMode, State, SyncMode};
pub use query::{match_symbol_name, SORT_DECLARATION_ONLY, SORT_NONE, SORT_REVERSE};
pub use sync::SyncOutcome;
pub use visited::VisitedFiles;

/// Errors that can keep a project from loading.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error(transparent)]
    Store(#[from] symgraph_store::StoreError),

    #[error(transparent)]
    Vfs(#[from] symgraph_vfs::VfsError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
