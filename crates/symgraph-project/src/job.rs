use std::path::PathBuf;
use std::sync::Arc;

use symgraph_core::{Source, SourceKey};

use crate::index_data::{IndexData, JobFlags};
use crate::visited::VisitedFiles;

/// One unit of indexing work: a source plus the reason it was submitted.
///
/// Jobs are shared as `Arc` and compared by identity: when a submission
/// replaces a still-running job for the same key, the replacement is a
/// different instance, so a completion arriving for the old one is detected
/// as stale and dropped.
#[derive(Debug)]
pub struct IndexerJob {
    pub source: Source,
    pub flags: JobFlags,
    pub project_root: PathBuf,
}

impl IndexerJob {
    pub fn new(source: Source, flags: JobFlags, project_root: PathBuf) -> Self {
        Self {
            source,
            flags,
            project_root,
        }
    }

    #[inline]
    pub fn key(&self) -> SourceKey {
        self.source.key()
    }
}

/// Contract consumed by the project for running jobs.
///
/// `abort` must be idempotent and must not re-enter the project with a
/// completion for the aborted job.
pub trait JobScheduler: Send {
    fn add(&mut self, job: &Arc<IndexerJob>);

    fn abort(&mut self, job: &Arc<IndexerJob>);
}

/// Contract of the parser front-end.
///
/// Implementations must claim every file they emit locations for through
/// [`VisitedFiles::visit_file`] before emitting, and release any file they
/// abandon. The result's `flags` must carry [`JobFlags::COMPLETE`] on
/// success; anything else makes the project drop the result and release the
/// job's claims.
pub trait Indexer: Send + Sync {
    fn index(&self, job: &IndexerJob, visited: &VisitedFiles) -> IndexData;
}
