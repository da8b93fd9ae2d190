//! Shared fixture for the project integration tests.
//!
//! Everything is deterministic: the watcher is the injectable manual
//! implementation, the scheduler only records, and jobs are completed by
//! feeding hand-built results straight into the project.

// Each integration test binary compiles its own copy and uses a subset.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crossbeam_channel as channel;

use symgraph_core::{
    BuildRootId, FileId, FixIt, Location, Source, SymbolInfo, SymbolKind,
};
use symgraph_project::test_support::RecordingScheduler;
use symgraph_project::{
    IndexData, IndexerJob, JobFlags, Project, ProjectEvent, ProjectOptions,
};
use symgraph_vfs::{FileIdRegistry, ManualFileWatcher, ManualFileWatcherHandle};

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub registry: Arc<FileIdRegistry>,
    pub scheduler: RecordingScheduler,
    pub watcher: ManualFileWatcherHandle,
    pub events: channel::Receiver<ProjectEvent>,
    pub project: Project,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_options(ProjectOptions::default())
    }

    pub fn with_options(options: ProjectOptions) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = Arc::new(FileIdRegistry::new());
        let scheduler = RecordingScheduler::new();
        let watcher = ManualFileWatcher::new();
        let watcher_handle = watcher.handle();
        let (events_tx, events_rx) = channel::unbounded();

        let project = Project::new(
            dir.path().join("project"),
            dir.path().join("db"),
            options,
            Arc::clone(&registry),
            Box::new(scheduler.clone()),
            Box::new(watcher),
            events_tx,
        );

        Self {
            dir,
            registry,
            scheduler,
            watcher: watcher_handle,
            events: events_rx,
            project,
        }
    }

    /// Reopens the same data directory with a fresh project instance,
    /// keeping the on-disk state and the registry. The original project
    /// should be unloaded first.
    pub fn reopen(self) -> Fixture {
        let scheduler = RecordingScheduler::new();
        let watcher = ManualFileWatcher::new();
        let watcher_handle = watcher.handle();
        let (events_tx, events_rx) = channel::unbounded();

        let project = Project::new(
            self.dir.path().join("project"),
            self.dir.path().join("db"),
            ProjectOptions::default(),
            Arc::clone(&self.registry),
            Box::new(scheduler.clone()),
            Box::new(watcher),
            events_tx,
        );

        Self {
            dir: self.dir,
            registry: self.registry,
            scheduler,
            watcher: watcher_handle,
            events: events_rx,
            project,
        }
    }

    pub fn load(&mut self) {
        self.project.load().expect("project load");
    }

    /// Creates `name` on disk under the project root and interns it.
    pub fn file(&self, name: &str) -> FileId {
        let path = self.dir.path().join("project").join(name);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, format!("// {name}\n")).expect("write");
        self.registry.insert_file(path)
    }

    pub fn path_of(&self, file_id: FileId) -> PathBuf {
        self.registry.path(file_id).expect("registered path")
    }

    pub fn remove_file(&self, file_id: FileId) {
        std::fs::remove_file(self.path_of(file_id)).expect("remove");
    }

    pub fn touch(&self, file_id: FileId) {
        let path = self.path_of(file_id);
        std::fs::write(&path, format!("// touched {}\n", now_millis())).expect("touch");
    }

    pub fn compile_job(&self, file_id: FileId, build: u32, args: &[&str]) -> Arc<IndexerJob> {
        let mut source = Source::new(file_id, BuildRootId::new(build));
        source.compiler = PathBuf::from("/usr/bin/cc");
        source.arguments = args.iter().map(|arg| arg.to_string()).collect();
        Arc::new(IndexerJob::new(
            source,
            JobFlags::COMPILE,
            self.dir.path().join("project"),
        ))
    }

    /// Claims `file_id` for `job` the way an indexer worker would.
    pub fn claim(&self, job: &IndexerJob, file_id: FileId) -> bool {
        self.project
            .visited_handle()
            .visit_file(file_id, self.path_of(file_id), job.key())
    }
}

pub fn loc(file_id: FileId, line: u32, column: u32) -> Location {
    Location::new(file_id, line, column)
}

pub fn symbol(name: &str, kind: SymbolKind, definition: bool) -> SymbolInfo {
    let bare = name.rsplit("::").next().unwrap_or(name);
    let bare_len = bare.find('(').unwrap_or(bare.len());
    SymbolInfo {
        symbol_length: bare_len as u16,
        symbol_name: name.to_string(),
        kind,
        definition,
        ..SymbolInfo::new()
    }
}

/// Assembles a completed [`IndexData`] the way an indexer would emit it.
pub struct IndexDataBuilder {
    data: IndexData,
}

impl IndexDataBuilder {
    pub fn new(job: &IndexerJob) -> Self {
        let mut data = IndexData::new(job.key(), job.flags | JobFlags::COMPLETE);
        data.parse_time = now_millis();
        data.message = format!("indexed {:?}", job.key());
        Self { data }
    }

    pub fn parse_time(mut self, parse_time: u64) -> Self {
        self.data.parse_time = parse_time;
        self
    }

    /// Records a symbol and, for non-reference kinds, its name-table
    /// entries (the full name plus the stripped-argument form for
    /// function-style names).
    pub fn symbol(mut self, location: Location, info: SymbolInfo) -> Self {
        if !info.kind.is_reference() {
            let name = info.symbol_name.clone();
            self.data
                .symbol_names
                .entry(name.clone())
                .or_default()
                .insert(location);
            if let Some(paren) = name.find('(') {
                self.data
                    .symbol_names
                    .entry(name[..paren].to_string())
                    .or_default()
                    .insert(location);
            }
        }
        self.data.symbols.insert(location, info);
        self
    }

    /// Records `from` referencing `to` (whose record has `kind`),
    /// maintaining both edge tables.
    pub fn reference(mut self, from: Location, to: Location, kind: SymbolKind) -> Self {
        self.data.references.entry(to).or_default().insert(from);
        self.data.targets.entry(from).or_default().insert(to, kind);
        if let Some(info) = self.data.symbols.get_mut(&from) {
            info.targets.insert(to);
        }
        if let Some(info) = self.data.symbols.get_mut(&to) {
            info.references.insert(from);
        }
        self
    }

    pub fn usr(mut self, usr: &str, location: Location, kind: SymbolKind) -> Self {
        self.data
            .usrs
            .entry(usr.to_string())
            .or_default()
            .insert(location, kind);
        self
    }

    pub fn pending_reference(mut self, usr: &str, location: Location, kind: SymbolKind) -> Self {
        self.data
            .pending_references
            .entry(usr.to_string())
            .or_default()
            .insert(location, kind);
        self
    }

    pub fn depends(mut self, header: FileId, dependent: FileId) -> Self {
        self.data
            .dependencies
            .entry(header)
            .or_default()
            .insert(dependent);
        self
    }

    pub fn visit(mut self, file_id: FileId) -> Self {
        self.data.visited.insert(file_id, true);
        self
    }

    pub fn fix_it(mut self, file_id: FileId, line: u32, column: u32, length: u32, text: &str) -> Self {
        self.data.fix_its.entry(file_id).or_default().insert(FixIt {
            line,
            column,
            length,
            text: text.to_string(),
        });
        self
    }

    pub fn crashed(mut self) -> Self {
        self.data.flags = self.data.flags.without(JobFlags::COMPLETE).with(JobFlags::CRASHED);
        self
    }

    pub fn build(self) -> IndexData {
        self.data
    }
}
