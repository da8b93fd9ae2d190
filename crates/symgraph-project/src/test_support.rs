//! In-process doubles for the external collaborators, used by this crate's
//! tests and by embedders writing their own.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::job::{IndexerJob, JobScheduler};

/// Scheduler that records submissions and aborts instead of running
/// anything. Tests complete jobs by calling `Project::on_job_finished`
/// directly with a hand-built result.
#[derive(Clone, Default)]
pub struct RecordingScheduler {
    inner: Arc<Mutex<RecordingInner>>,
}

#[derive(Default)]
struct RecordingInner {
    added: Vec<Arc<IndexerJob>>,
    aborted: Vec<Arc<IndexerJob>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn added(&self) -> Vec<Arc<IndexerJob>> {
        self.inner.lock().added.clone()
    }

    pub fn aborted(&self) -> Vec<Arc<IndexerJob>> {
        self.inner.lock().aborted.clone()
    }

    /// Removes and returns everything submitted so far.
    pub fn take_added(&self) -> Vec<Arc<IndexerJob>> {
        std::mem::take(&mut self.inner.lock().added)
    }
}

impl JobScheduler for RecordingScheduler {
    fn add(&mut self, job: &Arc<IndexerJob>) {
        self.inner.lock().added.push(Arc::clone(job));
    }

    fn abort(&mut self, job: &Arc<IndexerJob>) {
        self.inner.lock().aborted.push(Arc::clone(job));
    }
}
