//! Minimal end-to-end wiring: a project, an in-process indexer, and the
//! event-loop driver.
//!
//! ```sh
//! cargo run -p symgraph-project --example walkthrough
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crossbeam_channel as channel;
use parking_lot::Mutex;

use symgraph_core::{BuildRootId, FileId, Location, Source, SymbolInfo, SymbolKind};
use symgraph_project::{
    IndexData, Indexer, IndexerJob, JobFlags, JobScheduler, Project, ProjectDriver, ProjectEvent,
    ProjectOptions, State, VisitedFiles,
};
use symgraph_vfs::{FileIdRegistry, ManualFileWatcher};

/// Toy "parser": one definition per file, on line 1.
struct LineOneIndexer {
    registry: Arc<FileIdRegistry>,
}

impl Indexer for LineOneIndexer {
    fn index(&self, job: &IndexerJob, visited: &VisitedFiles) -> IndexData {
        let file_id = job.source.file_id;
        let mut data = IndexData::new(job.key(), job.flags.with(JobFlags::COMPLETE));
        data.parse_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        let path = self.registry.path(file_id).unwrap_or_default();
        if visited.visit_file(file_id, &path, job.key()) {
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "anonymous".to_string());
            let location = Location::new(file_id, 1, 1);
            let info = SymbolInfo {
                symbol_length: name.len() as u16,
                symbol_name: name.clone(),
                kind: SymbolKind::Function,
                definition: true,
                ..SymbolInfo::new()
            };
            data.symbols.insert(location, info);
            data.symbol_names.entry(name).or_default().insert(location);
            data.visited.insert(file_id, true);
        }
        data.dependencies.entry(file_id).or_default().insert(file_id);
        data.message = format!("indexed {}", path.display());
        data
    }
}

/// Runs each job on its own thread and posts the result back.
struct ThreadScheduler {
    wiring: Arc<Mutex<Option<(Arc<dyn Indexer>, Arc<VisitedFiles>, channel::Sender<ProjectEvent>)>>>,
}

impl JobScheduler for ThreadScheduler {
    fn add(&mut self, job: &Arc<IndexerJob>) {
        let Some((indexer, visited, events)) = self.wiring.lock().clone() else {
            return;
        };
        let job = Arc::clone(job);
        std::thread::spawn(move || {
            let data = indexer.index(&job, &visited);
            let _ = events.send(ProjectEvent::JobFinished { job, data });
        });
    }

    fn abort(&mut self, _job: &Arc<IndexerJob>) {}
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let workspace = tempfile::tempdir().expect("tempdir");
    let root = workspace.path().join("project");
    std::fs::create_dir_all(&root).expect("mkdir");

    let registry = Arc::new(FileIdRegistry::new());
    let wiring = Arc::new(Mutex::new(None));
    let scheduler = ThreadScheduler {
        wiring: Arc::clone(&wiring),
    };
    let (events_tx, events_rx) = channel::unbounded();

    let mut options = ProjectOptions::default();
    options.sync_threshold = 2;

    let mut project = Project::new(
        root.clone(),
        workspace.path().join("db"),
        options,
        Arc::clone(&registry),
        Box::new(scheduler),
        Box::new(ManualFileWatcher::new()),
        events_tx,
    );
    *wiring.lock() = Some((
        Arc::new(LineOneIndexer {
            registry: Arc::clone(&registry),
        }),
        project.visited_handle(),
        project.event_sender(),
    ));

    project.load().expect("load");

    for name in ["alpha.cpp", "beta.cpp"] {
        let path = root.join(name);
        std::fs::write(&path, format!("// {name}\n")).expect("write");
        let file_id = registry.insert_file(path);

        let mut source = Source::new(file_id, BuildRootId::new(1));
        source.compiler = "/usr/bin/cc".into();
        project.index(Arc::new(IndexerJob::new(
            source,
            JobFlags::COMPILE,
            root.clone(),
        )));
    }

    let mut driver = ProjectDriver::new(project, events_rx);
    let deadline = Instant::now() + Duration::from_secs(10);
    while driver.project().state() != State::Loaded
        || driver.project().locations("", FileId::NONE).len() < 2
    {
        assert!(Instant::now() < deadline, "indexing stalled");
        driver.step(Duration::from_millis(50));
    }

    let all: BTreeSet<Location> = driver.project().locations("", FileId::NONE);
    println!("indexed {} symbols:", all.len());
    for location in &all {
        let (_, info) = driver.project().symbol_at(*location).expect("record");
        println!("  {} @ {location}", info.display_name());
    }

    driver.project_mut().unload();
    println!("unloaded cleanly");
}
