//! File watching.
//!
//! The core watches the parent directories of every file the index depends
//! on and re-dirties translation units when those files change. This module
//! owns the watcher boundary: backends normalize OS events into batches of
//! [`FileChange`]s delivered over a `crossbeam_channel` receiver, so the
//! orchestrator can fold watching into its own event loop without an async
//! runtime.
//!
//! Backends can surface errors asynchronously; these arrive on the same
//! stream (see [`WatchMessage`]).
//!
//! Tests should not depend on real OS watcher timing; use the deterministic
//! [`ManualFileWatcher`] and inject events explicitly.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use crossbeam_channel as channel;

use crate::change::FileChange;

/// Message type delivered by a [`FileWatcher`].
pub type WatchMessage = io::Result<Vec<FileChange>>;

/// Event-driven watcher abstraction.
///
/// Directory watches are non-recursive: the indexing core registers each
/// parent directory it cares about individually.
pub trait FileWatcher: Send {
    fn watch_path(&mut self, path: &Path) -> io::Result<()>;

    fn unwatch_path(&mut self, path: &Path) -> io::Result<()>;

    /// Returns the receiver used to consume watcher events.
    fn receiver(&self) -> &channel::Receiver<WatchMessage>;
}

const MANUAL_WATCH_QUEUE_CAPACITY: usize = 1024;

/// Deterministic watcher implementation for tests.
///
/// Does not touch the OS; callers inject events via [`ManualFileWatcher::push`]
/// or a [`ManualFileWatcherHandle`] after the watcher moved into the project.
#[derive(Debug)]
pub struct ManualFileWatcher {
    tx: channel::Sender<WatchMessage>,
    rx: channel::Receiver<WatchMessage>,
    watched: BTreeSet<PathBuf>,
    watch_calls: Vec<PathBuf>,
}

/// Cloneable handle for injecting events into a [`ManualFileWatcher`].
#[derive(Debug, Clone)]
pub struct ManualFileWatcherHandle {
    tx: channel::Sender<WatchMessage>,
}

impl ManualFileWatcherHandle {
    pub fn push(&self, changes: Vec<FileChange>) -> io::Result<()> {
        match self.tx.try_send(Ok(changes)) {
            Ok(()) => Ok(()),
            Err(channel::TrySendError::Full(_)) => Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "watch queue is full",
            )),
            Err(channel::TrySendError::Disconnected(_)) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "watch receiver dropped",
            )),
        }
    }
}

impl Default for ManualFileWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualFileWatcher {
    pub fn new() -> Self {
        let (tx, rx) = channel::bounded(MANUAL_WATCH_QUEUE_CAPACITY);
        Self {
            tx,
            rx,
            watched: BTreeSet::new(),
            watch_calls: Vec::new(),
        }
    }

    pub fn handle(&self) -> ManualFileWatcherHandle {
        ManualFileWatcherHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn push(&self, changes: Vec<FileChange>) -> io::Result<()> {
        self.handle().push(changes)
    }

    /// Paths passed to [`FileWatcher::watch_path`] in call order.
    pub fn watch_calls(&self) -> &[PathBuf] {
        &self.watch_calls
    }

    /// The set of currently watched directories.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.watched.iter().cloned().collect()
    }
}

impl FileWatcher for ManualFileWatcher {
    fn watch_path(&mut self, path: &Path) -> io::Result<()> {
        self.watch_calls.push(path.to_path_buf());
        self.watched.insert(path.to_path_buf());
        Ok(())
    }

    fn unwatch_path(&mut self, path: &Path) -> io::Result<()> {
        self.watched.remove(path);
        Ok(())
    }

    fn receiver(&self) -> &channel::Receiver<WatchMessage> {
        &self.rx
    }
}

impl<W: ?Sized + FileWatcher> FileWatcher for Box<W> {
    fn watch_path(&mut self, path: &Path) -> io::Result<()> {
        self.as_mut().watch_path(path)
    }

    fn unwatch_path(&mut self, path: &Path) -> io::Result<()> {
        self.as_mut().unwatch_path(path)
    }

    fn receiver(&self) -> &channel::Receiver<WatchMessage> {
        self.as_ref().receiver()
    }
}

#[cfg(any(test, feature = "watch-notify"))]
mod notify_impl {
    use super::*;

    use notify::EventKind;

    /// Maps a raw `notify` event onto the normalized change model.
    ///
    /// Rename events carry no reliable pairing across platforms, so both
    /// halves degrade to modifications; the dirty engine re-stats the file
    /// anyway.
    pub(super) fn normalize_event(event: notify::Event) -> Vec<FileChange> {
        let change: fn(PathBuf) -> FileChange = match event.kind {
            EventKind::Create(_) => |path| FileChange::Created { path },
            EventKind::Remove(_) => |path| FileChange::Removed { path },
            _ => |path| FileChange::Modified { path },
        };
        event.paths.into_iter().map(change).collect()
    }

    #[cfg(feature = "watch-notify")]
    pub use backend::NotifyFileWatcher;

    #[cfg(feature = "watch-notify")]
    mod backend {
        use super::*;

        use std::collections::HashSet;

        use notify::Watcher;

        const EVENTS_QUEUE_CAPACITY: usize = 4096;

        fn notify_error_to_io(err: notify::Error) -> io::Error {
            io::Error::other(err)
        }

        /// OS watcher backed by `notify`.
        ///
        /// Events are normalized in the notify callback and pushed onto a
        /// bounded queue; a full queue drops the batch with a warning
        /// rather than blocking the callback thread.
        pub struct NotifyFileWatcher {
            watcher: notify::RecommendedWatcher,
            rx: channel::Receiver<WatchMessage>,
            watched: HashSet<PathBuf>,
        }

        impl NotifyFileWatcher {
            pub fn new() -> io::Result<Self> {
                let (tx, rx) = channel::bounded::<WatchMessage>(EVENTS_QUEUE_CAPACITY);
                let watcher = notify::recommended_watcher(move |result| {
                    let message = match result {
                        Ok(event) => {
                            let changes = normalize_event(event);
                            if changes.is_empty() {
                                return;
                            }
                            Ok(changes)
                        }
                        Err(err) => Err(notify_error_to_io(err)),
                    };
                    if tx.try_send(message).is_err() {
                        tracing::warn!("file watcher queue full, dropping event batch");
                    }
                })
                .map_err(notify_error_to_io)?;

                Ok(Self {
                    watcher,
                    rx,
                    watched: HashSet::new(),
                })
            }
        }

        impl FileWatcher for NotifyFileWatcher {
            fn watch_path(&mut self, path: &Path) -> io::Result<()> {
                if !self.watched.insert(path.to_path_buf()) {
                    return Ok(());
                }
                self.watcher
                    .watch(path, notify::RecursiveMode::NonRecursive)
                    .map_err(notify_error_to_io)
            }

            fn unwatch_path(&mut self, path: &Path) -> io::Result<()> {
                if !self.watched.remove(path) {
                    return Ok(());
                }
                self.watcher.unwatch(path).map_err(notify_error_to_io)
            }

            fn receiver(&self) -> &channel::Receiver<WatchMessage> {
                &self.rx
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use notify::event::{CreateKind, ModifyKind, RemoveKind};

        #[test]
        fn normalizes_create_modify_and_remove() {
            let path = PathBuf::from("/p/a.cpp");

            let created = notify::Event {
                kind: EventKind::Create(CreateKind::File),
                paths: vec![path.clone()],
                attrs: Default::default(),
            };
            assert_eq!(
                normalize_event(created),
                vec![FileChange::Created { path: path.clone() }]
            );

            let modified = notify::Event {
                kind: EventKind::Modify(ModifyKind::Any),
                paths: vec![path.clone()],
                attrs: Default::default(),
            };
            assert_eq!(
                normalize_event(modified),
                vec![FileChange::Modified { path: path.clone() }]
            );

            let removed = notify::Event {
                kind: EventKind::Remove(RemoveKind::File),
                paths: vec![path.clone()],
                attrs: Default::default(),
            };
            assert_eq!(normalize_event(removed), vec![FileChange::Removed { path }]);
        }
    }
}

#[cfg(feature = "watch-notify")]
pub use notify_impl::NotifyFileWatcher;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_watcher_delivers_injected_events() {
        let mut watcher = ManualFileWatcher::new();
        watcher.watch_path(Path::new("/p")).unwrap();
        assert_eq!(watcher.watched_paths(), vec![PathBuf::from("/p")]);

        let handle = watcher.handle();
        handle
            .push(vec![FileChange::Modified {
                path: PathBuf::from("/p/a.cpp"),
            }])
            .unwrap();

        let changes = watcher.receiver().try_recv().unwrap().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path(), Path::new("/p/a.cpp"));
    }

    #[test]
    fn unwatch_removes_the_path() {
        let mut watcher = ManualFileWatcher::new();
        watcher.watch_path(Path::new("/p")).unwrap();
        watcher.unwatch_path(Path::new("/p")).unwrap();
        assert!(watcher.watched_paths().is_empty());
        // The call log still records the original registration.
        assert_eq!(watcher.watch_calls(), &[PathBuf::from("/p")]);
    }
}
