use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel as channel;

use symgraph_core::{
    BuildRootId, FileId, Location, PathMatch, Source, SourceKey, SortedSymbol, SymbolInfo,
};
use symgraph_store::{Table, WriteScope};
use symgraph_vfs::{FileChange, FileIdRegistry, FileWatcher, WatchMessage};

use crate::dirty::{Dirty, IfModifiedDirty, SimpleDirty, SuspendedDirty, WatcherDirty};
use crate::index_data::{IndexData, JobFlags};
use crate::job::{IndexerJob, JobScheduler};
use crate::options::ProjectOptions;
use crate::query::{best_target, find_symbol, match_symbol_name};
use crate::query::{SORT_DECLARATION_ONLY, SORT_REVERSE};
use crate::sync::{SyncOutcome, SyncTask};
use crate::tables::ProjectTables;
use crate::visited::{decode_visited, VisitedFiles};
use crate::ProjectError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    Unloaded,
    Loaded,
    Syncing,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SyncMode {
    Synchronous,
    Asynchronous,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DependencyMode {
    /// What depends on the argument: the stored dependents set.
    DependsOnArg,
    /// What the argument depends on: scans the whole table.
    ArgDependsOn,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReindexMode {
    /// Unconditionally re-index everything matching.
    Reindex,
    /// Re-index only what the mtime comparison finds stale.
    CheckReindex,
}

/// Messages delivered to the orchestrator's event loop.
///
/// Indexer workers send `JobFinished`; the sync worker sends `Synced`.
pub enum ProjectEvent {
    JobFinished {
        job: Arc<IndexerJob>,
        data: IndexData,
    },
    Synced(Box<SyncOutcome>),
}

/// Single-shot deadline timer owned by the project; the driver polls
/// [`Project::next_deadline`] and calls [`Project::fire_due_timers`].
#[derive(Debug, Default)]
struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    fn restart(&mut self, after: Duration) {
        self.deadline = Some(Instant::now() + after);
    }

    fn stop(&mut self) {
        self.deadline = None;
    }

    fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// The project indexing core: a state machine over
/// `Unloaded → Loaded ⇄ Syncing` that admits jobs, buffers their results,
/// and folds them into the persistent tables.
///
/// All methods must be called from one thread (the orchestrator). The only
/// structure indexer workers touch concurrently is the shared
/// [`VisitedFiles`].
pub struct Project {
    root: PathBuf,
    data_dir: PathBuf,
    options: ProjectOptions,
    state: State,
    tables: Option<ProjectTables>,
    registry: Arc<FileIdRegistry>,
    visited: Arc<VisitedFiles>,
    scheduler: Box<dyn JobScheduler>,
    watcher: Box<dyn FileWatcher>,
    events: channel::Sender<ProjectEvent>,

    active_jobs: HashMap<SourceKey, Arc<IndexerJob>>,
    pending_index_data: BTreeMap<SourceKey, (Arc<IndexerJob>, IndexData)>,
    pending_jobs: Vec<Arc<IndexerJob>>,
    index_data: BTreeMap<SourceKey, IndexData>,

    dirty_files: BTreeSet<FileId>,
    pending_dirty_files: BTreeSet<FileId>,
    suspended_files: BTreeSet<FileId>,
    suspended: bool,

    watched_paths: BTreeSet<PathBuf>,
    fix_its: HashMap<FileId, BTreeSet<symgraph_core::FixIt>>,

    job_counter: usize,
    batch_started: Instant,

    sync_timer: Timer,
    dirty_timer: Timer,
    unload_timer: Timer,
}

impl Project {
    pub fn new(
        root: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        options: ProjectOptions,
        registry: Arc<FileIdRegistry>,
        scheduler: Box<dyn JobScheduler>,
        watcher: Box<dyn FileWatcher>,
        events: channel::Sender<ProjectEvent>,
    ) -> Self {
        Self {
            root: root.into(),
            data_dir: data_dir.into(),
            options,
            state: State::Unloaded,
            tables: None,
            registry,
            visited: Arc::new(VisitedFiles::new()),
            scheduler,
            watcher,
            events,
            active_jobs: HashMap::new(),
            pending_index_data: BTreeMap::new(),
            pending_jobs: Vec::new(),
            index_data: BTreeMap::new(),
            dirty_files: BTreeSet::new(),
            pending_dirty_files: BTreeSet::new(),
            suspended_files: BTreeSet::new(),
            suspended: false,
            watched_paths: BTreeSet::new(),
            fix_its: HashMap::new(),
            job_counter: 0,
            batch_started: Instant::now(),
            sync_timer: Timer::default(),
            dirty_timer: Timer::default(),
            unload_timer: Timer::default(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry(&self) -> &Arc<FileIdRegistry> {
        &self.registry
    }

    /// Shared handle indexer workers use for `visit_file` /
    /// `release_file_ids`.
    pub fn visited_handle(&self) -> Arc<VisitedFiles> {
        Arc::clone(&self.visited)
    }

    /// Sender for completion events; hand a clone to whatever runs jobs.
    pub fn event_sender(&self) -> channel::Sender<ProjectEvent> {
        self.events.clone()
    }

    pub fn watcher_receiver(&self) -> channel::Receiver<WatchMessage> {
        self.watcher.receiver().clone()
    }

    pub fn is_indexing(&self) -> bool {
        !self.active_jobs.is_empty()
    }

    /// Whether `key` still names a live job. The zero key stands for
    /// job-less callers (queries) and is always considered active.
    pub fn is_active_job(&self, key: SourceKey) -> bool {
        key.to_raw() == 0 || self.active_jobs.contains_key(&key)
    }

    pub fn visited_files(&self) -> BTreeMap<FileId, PathBuf> {
        self.visited.snapshot()
    }

    pub fn watched_paths(&self) -> &BTreeSet<PathBuf> {
        &self.watched_paths
    }

    // ---- lifecycle -------------------------------------------------------

    /// Opens the tables, replays persisted state, and runs the initial
    /// dirty sweep. Failure to open any table is fatal: the project stays
    /// `Unloaded`.
    pub fn load(&mut self) -> Result<(), ProjectError> {
        match self.state {
            State::Loaded | State::Syncing => return Ok(()),
            State::Unloaded => {}
        }

        let tables = ProjectTables::open(&self.data_dir)?;
        self.tables = Some(tables.clone());
        self.state = State::Loaded;

        if let Some(bytes) = tables.general.value(&"visitedFiles".to_string()) {
            match decode_visited(&bytes) {
                Ok(files) => self.visited.replace(files),
                Err(err) => {
                    tracing::warn!(error = %err, "discarding persisted visited files");
                }
            }
        }

        // Re-watch every dependency root.
        let mut cursor = tables.dependencies.cursor_first();
        while let Some(file_id) = cursor.key() {
            self.watch_file(file_id);
            cursor.next();
        }

        let mut dirty = if self.suspended {
            Dirty::Suspended(SuspendedDirty::new(Arc::clone(&self.registry)))
        } else {
            Dirty::IfModified(IfModifiedDirty::new(
                &tables.dependencies,
                PathMatch::any(),
                Arc::clone(&self.registry),
            ))
        };

        // Dependency entries whose file vanished take their dependents down
        // with them; there is no mtime left to compare against.
        {
            let mut scope = tables.dependencies.write_scope();
            let mut cursor = tables.dependencies.cursor_first();
            while let Some(file_id) = cursor.key() {
                if !self.file_exists(file_id) {
                    tracing::error!(
                        path = %self.display_path(file_id),
                        "file seems to have disappeared"
                    );
                    dirty.insert_dirty_file(file_id);
                    if let Some(dependents) = cursor.value() {
                        for dependent in dependents {
                            dirty.insert_dirty_file(dependent);
                        }
                    }
                    scope.erase(file_id);
                }
                cursor.next();
            }
            if let Err(err) = scope.flush() {
                tracing::error!(error = %err, "failed to prune dependencies");
            }
        }

        {
            let mut scope = tables.sources.write_scope();
            let mut cursor = tables.sources.cursor_first();
            while let Some(key) = cursor.key() {
                if let Some(source) = cursor.value() {
                    if !self.file_exists(source.file_id) {
                        tracing::error!(
                            path = %self.display_path(source.file_id),
                            "source seems to have disappeared"
                        );
                        dirty.insert_dirty_file(source.file_id);
                        scope.erase(key);
                    }
                }
                cursor.next();
            }
            if let Err(err) = scope.flush() {
                tracing::error!(error = %err, "failed to prune sources");
            }
        }

        self.start_dirty_jobs(&mut dirty);
        Ok(())
    }

    /// Aborts every job, runs a final synchronous sync, and closes the
    /// tables. An unload arriving mid-sync is retried after a delay.
    pub fn unload(&mut self) {
        match self.state {
            State::Unloaded => return,
            State::Syncing => {
                self.unload_timer.restart(self.options.unload_retry);
                return;
            }
            State::Loaded => {}
        }

        for job in self.active_jobs.values() {
            self.scheduler.abort(job);
        }

        let task = self.make_sync_task();
        let outcome = task.run();
        if !outcome.message.is_empty() {
            tracing::info!("{}", outcome.message);
        }

        self.active_jobs.clear();
        self.pending_jobs.clear();
        self.pending_index_data.clear();
        self.index_data.clear();
        self.dirty_files.clear();
        self.pending_dirty_files.clear();
        self.fix_its.clear();
        self.visited.clear();
        self.tables = None;
        self.state = State::Unloaded;
        self.job_counter = 0;
        self.sync_timer.stop();
        self.dirty_timer.stop();
    }

    // ---- job lifecycle ---------------------------------------------------

    /// Admits a job: runs source-table admission for compiles, replaces any
    /// job already active for the key, and hands the job to the scheduler.
    /// Submissions during a sync are queued and replayed afterwards.
    pub fn index(&mut self, job: Arc<IndexerJob>) {
        if let Some(filter) = &self.options.file_filter {
            let source_path = self.display_path(job.source.file_id);
            if !source_path.contains(filter.as_str()) {
                tracing::error!(path = %source_path, filter = %filter, "not indexing, file filter");
                return;
            }
        }

        if self.state != State::Loaded {
            self.pending_jobs.push(job);
            return;
        }
        let Some(tables) = self.tables.clone() else {
            return;
        };

        let key = job.key();
        let file_id = job.source.file_id;

        if self.suspended && tables.sources.contains(&key) && job.flags.contains(JobFlags::COMPILE)
        {
            return;
        }

        let mut scope = tables.sources.write_scope();
        if job.flags.contains(JobFlags::COMPILE) {
            if self.options.no_file_system_watch {
                // Without a watcher, updating compiles are ignored; an
                // explicit check-reindex has to pick up changes.
                let cursor = tables.sources.lower_bound(&SourceKey::range_start(file_id));
                if let Some(existing) = cursor.key() {
                    if existing.file_id() == file_id {
                        return;
                    }
                }
            } else if let Some(current) = tables.sources.value(&key) {
                if !current.is_active() {
                    mark_active(&tables.sources, &mut scope, file_id, current.build_root_id);
                }
                if current.compare_arguments(&job.source) {
                    // No changes to record; the scope drop still flushes
                    // any flipped Active flags.
                    return;
                }
            } else {
                let mut unset_active = false;
                let mut cursor = tables.sources.lower_bound(&SourceKey::range_start(file_id));
                while let Some(existing_key) = cursor.key() {
                    if existing_key.file_id() != file_id {
                        break;
                    }
                    if let Some(existing) = cursor.value() {
                        if existing.compare_arguments(&job.source) {
                            mark_active(
                                &tables.sources,
                                &mut scope,
                                file_id,
                                existing.build_root_id,
                            );
                            return;
                        }
                        if self.options.disallow_multiple_sources {
                            scope.erase(existing_key);
                        } else {
                            unset_active = true;
                        }
                    }
                    cursor.next();
                }
                if unset_active {
                    mark_active(&tables.sources, &mut scope, file_id, BuildRootId::NONE);
                }
            }
        }

        let mut source = job.source.clone();
        source.set_active(true);
        scope.set(key, source);
        if let Err(err) = scope.flush() {
            tracing::error!(error = %err, "failed to write to sources");
        }

        if let Some(previous) = self.active_jobs.insert(key, Arc::clone(&job)) {
            self.visited.release_job(key);
            self.scheduler.abort(&previous);
            self.job_counter = self.job_counter.saturating_sub(1);
        }
        self.visited.register_job(key);

        if self.index_data.remove(&key).is_some() {
            self.job_counter = self.job_counter.saturating_sub(1);
        }

        if self.job_counter == 0 {
            self.batch_started = Instant::now();
        }
        self.job_counter += 1;

        self.sync_timer.stop();
        self.scheduler.add(&job);
    }

    /// Applies one completed job. Results arriving during a sync are
    /// stashed and replayed by the post-sync transition.
    pub fn on_job_finished(&mut self, job: Arc<IndexerJob>, data: IndexData) {
        self.sync_timer.stop();
        match self.state {
            State::Syncing => {
                self.pending_index_data.insert(data.key, (job, data));
                return;
            }
            State::Unloaded => return,
            State::Loaded => {}
        }

        let key = data.key;
        let file_id = data.file_id();

        match self.active_jobs.get(&key) {
            None => {
                tracing::error!(path = %self.display_path(file_id), "no active job for result");
                return;
            }
            Some(active) if !Arc::ptr_eq(active, &job) => {
                tracing::error!(path = %self.display_path(file_id), "stale job result, dropping");
                return;
            }
            Some(_) => {}
        }
        self.active_jobs.remove(&key);

        let success = data.flags.contains(JobFlags::COMPLETE);
        let index = self.job_counter.saturating_sub(self.active_jobs.len());
        let total = self.job_counter.max(1);
        let percent = ((index as f64 / total as f64) * 100.0).round();

        if !success {
            // Nothing from this job may reach the tables; its claims go
            // back so the next dirty cycle can retry.
            self.visited.release_job(key);
            tracing::error!(
                "[{percent:3}%] {index}/{total} {} indexing crashed",
                self.display_path(file_id)
            );
            return;
        }
        self.visited.finish_job(key);

        let Some(tables) = self.tables.clone() else {
            return;
        };
        let Some(mut source) = tables.sources.value(&key) else {
            tracing::error!(path = %self.display_path(file_id), "can't find source for result");
            return;
        };

        // The parse stamp only ever moves forward.
        source.parsed = source.parsed.max(data.parse_time);
        let mut scope = tables.sources.write_scope();
        scope.set(key, source);
        if let Err(err) = scope.flush() {
            tracing::error!(error = %err, "failed to stamp parse time");
        }

        tracing::info!("[{percent:3}%] {index}/{total} {}", data.message);
        let dirty = data.flags.contains(JobFlags::DIRTY);
        self.index_data.insert(key, data);

        if self.options.sync_threshold > 0 && self.index_data.len() >= self.options.sync_threshold
        {
            self.start_sync(SyncMode::Asynchronous);
        } else if self.active_jobs.is_empty() {
            self.sync_timer.restart(if dirty {
                Duration::ZERO
            } else {
                self.options.sync_timeout
            });
        }
    }

    pub fn on_event(&mut self, event: ProjectEvent) {
        match event {
            ProjectEvent::JobFinished { job, data } => self.on_job_finished(job, data),
            ProjectEvent::Synced(outcome) => self.on_synced(*outcome),
        }
    }

    // ---- sync ------------------------------------------------------------

    /// Transitions `Loaded → Syncing` and runs the merge, inline or on the
    /// single worker thread. Returns whether a sync actually started.
    pub fn start_sync(&mut self, mode: SyncMode) -> bool {
        if self.state != State::Loaded {
            if mode == SyncMode::Asynchronous {
                self.sync_timer.restart(self.options.sync_timeout);
            }
            return false;
        }
        self.state = State::Syncing;
        self.sync_timer.stop();
        self.job_counter = self.active_jobs.len();

        let task = self.make_sync_task();
        match mode {
            SyncMode::Synchronous => {
                let outcome = task.run();
                self.on_synced(outcome);
            }
            SyncMode::Asynchronous => {
                let sender = self.events.clone();
                std::thread::spawn(move || {
                    let outcome = task.run();
                    // The receiver only disappears when the whole project
                    // went away; the outcome is moot then.
                    let _ = sender.send(ProjectEvent::Synced(Box::new(outcome)));
                });
            }
        }
        true
    }

    fn make_sync_task(&mut self) -> SyncTask {
        let tables = self
            .tables
            .clone()
            .expect("sync requires loaded tables");
        let task = SyncTask {
            tables,
            index_data: std::mem::take(&mut self.index_data),
            dirty_files: std::mem::take(&mut self.dirty_files),
            visited: Arc::clone(&self.visited),
            registry: Arc::clone(&self.registry),
            objc_property_fallback: self.options.objc_property_fallback,
            file_ids_path: self.options.file_ids_path.clone(),
            jobs_elapsed: self.batch_started.elapsed(),
        };
        self.batch_started = Instant::now();
        task
    }

    /// Post-sync transition: applies the outcome, re-enters `Loaded`, and
    /// replays everything that queued up during the sync.
    fn on_synced(&mut self, outcome: SyncOutcome) {
        for (file_id, fix_its) in outcome.fix_its {
            match fix_its {
                Some(fix_its) => {
                    self.fix_its.insert(file_id, fix_its);
                }
                None => {
                    self.fix_its.remove(&file_id);
                }
            }
        }
        for file_id in outcome.new_files {
            self.watch_file(file_id);
        }
        if !outcome.message.is_empty() {
            tracing::info!("{}", outcome.message);
        }

        self.state = State::Loaded;
        for (_, (job, data)) in std::mem::take(&mut self.pending_index_data) {
            self.on_job_finished(job, data);
        }
        for job in std::mem::take(&mut self.pending_jobs) {
            self.index(job);
        }
    }

    // ---- dirtying --------------------------------------------------------

    /// Watcher callback: coalesces modifications through the dirty timer.
    pub fn on_file_modified_or_removed(&mut self, path: &Path) {
        let Some(file_id) = self.registry.file_id(path) else {
            return;
        };
        tracing::debug!(path = %path.display(), ?file_id, "file modified");
        if self.suspended || self.suspended_files.contains(&file_id) {
            tracing::warn!(path = %path.display(), "suspended, ignoring modification");
            return;
        }
        if self.pending_dirty_files.insert(file_id) {
            self.dirty_timer.restart(self.options.dirty_timeout);
        }
    }

    pub fn on_watch_message(&mut self, message: WatchMessage) {
        match message {
            Ok(changes) => {
                for change in changes {
                    match change {
                        FileChange::Modified { path } | FileChange::Removed { path } => {
                            self.on_file_modified_or_removed(&path);
                        }
                        FileChange::Created { .. } => {}
                    }
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "file watcher error");
            }
        }
    }

    /// Drains the coalescing buffer into a watcher-seeded dirty pass.
    pub fn on_dirty_timeout(&mut self) {
        let modified = std::mem::take(&mut self.pending_dirty_files);
        if modified.is_empty() {
            return;
        }
        let Some(tables) = self.tables.clone() else {
            return;
        };
        let mut dirty = Dirty::Watcher(WatcherDirty::new(
            &tables.dependencies,
            &modified,
            Arc::clone(&self.registry),
        ));
        self.start_dirty_jobs(&mut dirty);
    }

    /// Submits `Dirty`-flagged jobs for every active source the detector
    /// marks stale. When nothing needs re-indexing but files were dirtied
    /// (the removal case), the symbol-family purge happens immediately;
    /// otherwise it is deferred to the next sync.
    pub(crate) fn start_dirty_jobs(&mut self, dirty: &mut Dirty) -> usize {
        let Some(tables) = self.tables.clone() else {
            return 0;
        };

        let mut to_index = Vec::new();
        let mut cursor = tables.sources.cursor_first();
        while cursor.is_valid() {
            if let Some(source) = cursor.value() {
                if source.is_active() && dirty.is_dirty(&source) {
                    to_index.push(source);
                }
            }
            cursor.next();
        }

        let dirtied = dirty.dirtied();
        for &file_id in &dirtied {
            self.visited.remove(file_id);
        }

        for source in &to_index {
            self.index(Arc::new(IndexerJob::new(
                source.clone(),
                JobFlags::DIRTY,
                self.root.clone(),
            )));
        }

        if to_index.is_empty() && !dirtied.is_empty() && self.state == State::Loaded {
            // Removal case with nothing to re-index: purge right away. The
            // state check keeps table writes off this thread while the sync
            // worker holds them; the deferred set covers that case.
            if let Err(err) = tables.purge_dirty(&dirtied) {
                tracing::error!(error = %err, "failed to purge removed files");
            }
        } else {
            self.dirty_files.extend(dirtied);
        }
        to_index.len()
    }

    // ---- timers ----------------------------------------------------------

    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.sync_timer.deadline(),
            self.dirty_timer.deadline(),
            self.unload_timer.deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn fire_due_timers(&mut self) {
        let now = Instant::now();
        if self.dirty_timer.take_due(now) {
            self.on_dirty_timeout();
        }
        if self.sync_timer.take_due(now) {
            self.start_sync(SyncMode::Asynchronous);
        }
        if self.unload_timer.take_due(now) {
            self.unload();
        }
    }

    // ---- queries ---------------------------------------------------------

    /// Symbol-name lookup; see `match_symbol_name` for the matching rules.
    /// With a file id the scan is confined to that file and an empty name
    /// returns every non-reference symbol in it.
    pub fn locations(&self, symbol_name: &str, file_id: FileId) -> BTreeSet<Location> {
        let mut ret = BTreeSet::new();
        let Some(tables) = &self.tables else {
            return ret;
        };

        if !file_id.is_none() {
            for (location, info) in self.symbols_for_file(file_id) {
                if info.kind.is_reference() {
                    continue;
                }
                if symbol_name.is_empty()
                    || match_symbol_name(
                        symbol_name,
                        &info.symbol_name,
                        info.kind.name_match_mode(),
                    )
                {
                    ret.insert(location);
                }
            }
        } else if symbol_name.is_empty() {
            let mut cursor = tables.symbols.cursor_first();
            while let Some(location) = cursor.key() {
                if let Some(info) = cursor.value() {
                    if !info.kind.is_reference() {
                        ret.insert(location);
                    }
                }
                cursor.next();
            }
        } else {
            let mut cursor = tables.symbol_names.lower_bound(&symbol_name.to_string());
            while let Some(name) = cursor.key() {
                if !name.starts_with(symbol_name) {
                    break;
                }
                // The stored name may be a local nested in a signature;
                // assume function-style matching for the name table.
                if match_symbol_name(
                    symbol_name,
                    &name,
                    symgraph_core::NameMatchMode::MaybeFunction,
                ) {
                    if let Some(locations) = cursor.value() {
                        ret.extend(locations);
                    }
                }
                cursor.next();
            }
        }
        ret
    }

    /// Every symbol record in `file_id`, in location order.
    pub fn symbols_for_file(&self, file_id: FileId) -> BTreeMap<Location, SymbolInfo> {
        let mut ret = BTreeMap::new();
        let Some(tables) = &self.tables else {
            return ret;
        };
        if file_id.is_none() {
            return ret;
        }
        let mut cursor = tables.symbols.lower_bound(&Location::file_start(file_id));
        while let Some(location) = cursor.key() {
            if location.file_id != file_id {
                break;
            }
            if let Some(info) = cursor.value() {
                ret.insert(location, info);
            }
            cursor.next();
        }
        ret
    }

    /// Location-tolerant single-symbol lookup.
    pub fn symbol_at(&self, location: Location) -> Option<(Location, SymbolInfo)> {
        let tables = self.tables.as_ref()?;
        find_symbol(&tables.symbols, location)
    }

    /// Produces sorted `(location, kind, is_definition)` records; see the
    /// `SORT_*` flags.
    pub fn sort(&self, locations: &BTreeSet<Location>, flags: u32) -> Vec<SortedSymbol> {
        let mut sorted = Vec::with_capacity(locations.len());
        let Some(tables) = &self.tables else {
            return sorted;
        };

        for &location in locations {
            let mut node = SortedSymbol::new(location);
            if let Some(info) = tables.symbols.value(&location) {
                node.is_definition = info.is_definition();
                if flags & SORT_DECLARATION_ONLY != 0 && node.is_definition {
                    if let Some((_, declaration)) = best_target(&info, &tables.symbols) {
                        if !declaration.is_empty() {
                            continue;
                        }
                    }
                }
                node.kind = info.kind;
            }
            sorted.push(node);
        }

        sorted.sort();
        if flags & SORT_REVERSE != 0 {
            sorted.reverse();
        }
        sorted
    }

    /// Every source row for `file_id`, in build-root order.
    pub fn sources(&self, file_id: FileId) -> Vec<Source> {
        let mut ret = Vec::new();
        let Some(tables) = &self.tables else {
            return ret;
        };
        if file_id.is_none() {
            return ret;
        }
        let mut cursor = tables.sources.lower_bound(&SourceKey::range_start(file_id));
        while let Some(key) = cursor.key() {
            if key.file_id() != file_id {
                break;
            }
            if let Some(source) = cursor.value() {
                ret.push(source);
            }
            cursor.next();
        }
        ret
    }

    /// Definition sites the record at `location` may resolve to.
    pub fn targets_of(&self, location: Location) -> BTreeMap<Location, symgraph_core::SymbolKind> {
        self.tables
            .as_ref()
            .and_then(|tables| tables.targets.value(&location))
            .unwrap_or_default()
    }

    /// Locations referencing the record at `location`.
    pub fn references_to(&self, location: Location) -> BTreeSet<Location> {
        self.tables
            .as_ref()
            .and_then(|tables| tables.references.value(&location))
            .unwrap_or_default()
    }

    pub fn dependencies(&self, file_id: FileId, mode: DependencyMode) -> BTreeSet<FileId> {
        let Some(tables) = &self.tables else {
            return BTreeSet::new();
        };
        match mode {
            DependencyMode::DependsOnArg => {
                tables.dependencies.value(&file_id).unwrap_or_default()
            }
            DependencyMode::ArgDependsOn => {
                let mut ret = BTreeSet::new();
                let mut cursor = tables.dependencies.cursor_first();
                while let Some(dependee) = cursor.key() {
                    if let Some(dependents) = cursor.value() {
                        if dependents.contains(&file_id) {
                            ret.insert(dependee);
                        }
                    }
                    cursor.next();
                }
                ret
            }
        }
    }

    /// Dirties files matching `pattern` and submits re-index jobs. Returns
    /// how many jobs were started.
    pub fn reindex(&mut self, pattern: &PathMatch, mode: ReindexMode) -> usize {
        let Some(tables) = self.tables.clone() else {
            return 0;
        };
        match mode {
            ReindexMode::Reindex => {
                let mut seed = BTreeSet::new();
                let mut cursor = tables.dependencies.cursor_first();
                while let Some(file_id) = cursor.key() {
                    if pattern.is_empty()
                        || self
                            .registry
                            .path(file_id)
                            .is_some_and(|path| pattern.matches(&path))
                    {
                        seed.insert(file_id);
                    }
                    cursor.next();
                }
                if seed.is_empty() {
                    return 0;
                }
                let mut dirty = Dirty::Simple(SimpleDirty::new(&seed, &tables.dependencies));
                self.start_dirty_jobs(&mut dirty)
            }
            ReindexMode::CheckReindex => {
                let mut dirty = Dirty::IfModified(IfModifiedDirty::new(
                    &tables.dependencies,
                    pattern.clone(),
                    Arc::clone(&self.registry),
                ));
                self.start_dirty_jobs(&mut dirty)
            }
        }
    }

    /// Erases matching sources, aborts their jobs, and purges their rows
    /// from the symbol-family tables. Returns how many sources went away.
    pub fn remove(&mut self, pattern: &PathMatch) -> usize {
        let Some(tables) = self.tables.clone() else {
            return 0;
        };

        let mut count = 0;
        let mut dirty = BTreeSet::new();
        let mut scope = tables.sources.write_scope();
        let mut cursor = tables.sources.cursor_first();
        while let Some(key) = cursor.key() {
            if let Some(source) = cursor.value() {
                let matched = self
                    .registry
                    .path(source.file_id)
                    .is_some_and(|path| pattern.matches(&path));
                if matched {
                    scope.erase(key);
                    if let Some(job) = self.active_jobs.remove(&key) {
                        self.visited.release_job(key);
                        self.scheduler.abort(&job);
                    }
                    self.index_data.remove(&key);
                    dirty.insert(source.file_id);
                    count += 1;
                }
            }
            cursor.next();
        }
        if let Err(err) = scope.flush() {
            tracing::error!(error = %err, "failed to erase sources");
        }

        if count > 0 {
            if let Err(err) = tables.purge_dirty(&dirty) {
                tracing::error!(error = %err, "failed to purge removed sources");
            }
        }
        count
    }

    /// Renders the fix-its recorded for `file_id`, newest first, one
    /// `line:column length text` per line.
    pub fn fix_its(&self, file_id: FileId) -> String {
        let Some(fix_its) = self.fix_its.get(&file_id) else {
            return String::new();
        };
        let mut out = String::new();
        for fix_it in fix_its.iter().rev() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!(
                "{}:{} {} {}",
                fix_it.line, fix_it.column, fix_it.length, fix_it.text
            ));
        }
        out
    }

    /// A file counts as indexed when an in-flight job claimed it or any
    /// source row exists for it.
    pub fn is_indexed(&self, file_id: FileId) -> bool {
        if self.visited.contains(file_id) {
            return true;
        }
        if let Some(tables) = &self.tables {
            let cursor = tables.sources.lower_bound(&SourceKey::range_start(file_id));
            if let Some(key) = cursor.key() {
                return key.file_id() == file_id;
            }
        }
        false
    }

    /// Whether the pattern hits this project: an indexed file, or the
    /// project root itself.
    pub fn matches(&self, pattern: &PathMatch) -> bool {
        if let Some(path) = pattern.as_path() {
            if let Some(file_id) = self.registry.file_id(path) {
                if self.is_indexed(file_id) {
                    return true;
                }
            }
        }
        pattern.matches(&self.root)
    }

    // ---- suspension ------------------------------------------------------

    pub fn suspended_files(&self) -> &BTreeSet<FileId> {
        &self.suspended_files
    }

    /// Returns true when the file is suspended after the call.
    pub fn toggle_suspend_file(&mut self, file_id: FileId) -> bool {
        if !self.suspended_files.insert(file_id) {
            self.suspended_files.remove(&file_id);
            return false;
        }
        true
    }

    pub fn is_suspended(&self, file_id: FileId) -> bool {
        self.suspended_files.contains(&file_id)
    }

    pub fn clear_suspended_files(&mut self) {
        self.suspended_files.clear();
    }

    /// Suspends or resumes the whole project; while suspended, watcher
    /// events are ignored and compile submissions for known sources are
    /// dropped.
    pub fn set_suspended(&mut self, suspended: bool) {
        self.suspended = suspended;
    }

    pub fn suspended(&self) -> bool {
        self.suspended
    }

    // ---- watching --------------------------------------------------------

    /// Watches the parent directory of `file_id`, subject to the
    /// system-path policy.
    fn watch_file(&mut self, file_id: FileId) {
        if self.options.no_file_system_watch {
            return;
        }
        let Some(path) = self.registry.path(file_id) else {
            return;
        };
        let Some(dir) = path.parent() else {
            tracing::error!(path = %path.display(), "no parent dir to watch");
            return;
        };
        if self.watched_paths.contains(dir) {
            return;
        }
        if is_system_path(dir) && !self.options.watch_system_paths {
            return;
        }
        self.watched_paths.insert(dir.to_path_buf());
        if let Err(err) = self.watcher.watch_path(dir) {
            tracing::warn!(path = %dir.display(), error = %err, "failed to watch");
        }
    }

    fn file_exists(&self, file_id: FileId) -> bool {
        self.registry
            .path(file_id)
            .is_some_and(|path| path.is_file())
    }

    fn display_path(&self, file_id: FileId) -> String {
        self.registry
            .path(file_id)
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| format!("<file {}>", file_id.to_raw()))
    }
}

/// Rewrites the contiguous source range of one file so exactly the entry
/// with `build_root_id == chosen` carries the Active flag (none when
/// `chosen` is zero).
fn mark_active(
    sources: &Table<SourceKey, Source>,
    scope: &mut WriteScope<SourceKey, Source>,
    file_id: FileId,
    chosen: BuildRootId,
) {
    let mut cursor = sources.lower_bound(&SourceKey::range_start(file_id));
    while let Some(key) = cursor.key() {
        if key.file_id() != file_id {
            break;
        }
        if let Some(mut source) = scope.value(&key) {
            let active = source.build_root_id == chosen && !chosen.is_none();
            if source.is_active() != active {
                source.set_active(active);
                scope.set(key, source);
            }
        }
        cursor.next();
    }
}

fn is_system_path(dir: &Path) -> bool {
    const SYSTEM_PREFIXES: &[&str] = &[
        "/usr", "/opt", "/bin", "/sbin", "/lib", "/lib64", "/etc", "/System", "/Library",
    ];
    SYSTEM_PREFIXES
        .iter()
        .any(|prefix| dir.starts_with(prefix))
}
