use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use bincode::Options;
use parking_lot::Mutex;

use symgraph_core::{FileId, SourceKey};
use symgraph_store::DATABASE_VERSION;

/// The files claimed by the in-flight set of indexer jobs.
///
/// During a job round each file has at most one owner: the first job to
/// call [`visit_file`](VisitedFiles::visit_file) wins and every other job
/// must skip the file. This is the only structure shared between the
/// orchestrator and indexer workers; every access takes a short mutex.
#[derive(Debug, Default)]
pub struct VisitedFiles {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    files: HashMap<FileId, PathBuf>,
    owned: HashMap<SourceKey, HashSet<FileId>>,
}

impl VisitedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `job_key` eligible to claim files. Called on job admission.
    pub(crate) fn register_job(&self, job_key: SourceKey) {
        self.inner.lock().owned.entry(job_key).or_default();
    }

    /// Claims `file_id` for the job owning `job_key`.
    ///
    /// Returns true when the claim succeeded; false when another job
    /// already owns the file this round, or when `job_key` is not an active
    /// job (e.g. it was just aborted).
    pub fn visit_file(&self, file_id: FileId, path: impl Into<PathBuf>, job_key: SourceKey) -> bool {
        let mut inner = self.inner.lock();
        if inner.files.contains_key(&file_id) {
            return false;
        }
        let Some(owned) = inner.owned.get_mut(&job_key) else {
            tracing::warn!(?file_id, ?job_key, "visit from unknown job");
            return false;
        };
        owned.insert(file_id);
        inner.files.insert(file_id, path.into());
        true
    }

    /// Releases claims the indexer chose to abandon.
    pub fn release_file_ids<I: IntoIterator<Item = FileId>>(&self, file_ids: I) {
        let mut inner = self.inner.lock();
        for file_id in file_ids {
            inner.files.remove(&file_id);
        }
    }

    /// Drops the job's ownership bookkeeping, keeping its claims. Used on
    /// successful completion: the claims persist into the synced state.
    pub(crate) fn finish_job(&self, job_key: SourceKey) {
        self.inner.lock().owned.remove(&job_key);
    }

    /// Drops the job's ownership bookkeeping *and* its claims. Used on
    /// abort and on any non-complete termination.
    pub(crate) fn release_job(&self, job_key: SourceKey) {
        let mut inner = self.inner.lock();
        if let Some(owned) = inner.owned.remove(&job_key) {
            for file_id in owned {
                inner.files.remove(&file_id);
            }
        }
    }

    /// Un-claims a file that is about to be re-indexed.
    pub(crate) fn remove(&self, file_id: FileId) {
        self.inner.lock().files.remove(&file_id);
    }

    pub fn contains(&self, file_id: FileId) -> bool {
        self.inner.lock().files.contains_key(&file_id)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().files.is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<FileId, PathBuf> {
        self.inner
            .lock()
            .files
            .iter()
            .map(|(id, path)| (*id, path.clone()))
            .collect()
    }

    pub(crate) fn replace(&self, files: BTreeMap<FileId, PathBuf>) {
        let mut inner = self.inner.lock();
        inner.files = files.into_iter().collect();
        inner.owned.clear();
    }

    pub(crate) fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.files.clear();
        inner.owned.clear();
    }
}

fn bincode_options() -> impl bincode::Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

/// Serializes a visited-files snapshot for the general table, tagged with
/// the database version.
pub(crate) fn encode_visited(
    files: &BTreeMap<FileId, PathBuf>,
) -> Result<Vec<u8>, bincode::Error> {
    bincode_options().serialize(&(DATABASE_VERSION, files))
}

pub(crate) fn decode_visited(
    bytes: &[u8],
) -> Result<BTreeMap<FileId, PathBuf>, bincode::Error> {
    let (version, files): (u32, BTreeMap<FileId, PathBuf>) =
        bincode_options().deserialize(bytes)?;
    if version != DATABASE_VERSION {
        return Err(Box::new(bincode::ErrorKind::Custom(format!(
            "incompatible visitedFiles version {version}, expected {DATABASE_VERSION}"
        ))));
    }
    Ok(files)
}
