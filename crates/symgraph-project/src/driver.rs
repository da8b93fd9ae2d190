use std::time::{Duration, Instant};

use crossbeam_channel as channel;

use crate::project::{Project, ProjectEvent, State};

/// Event loop driving one [`Project`].
///
/// Serializes everything that mutates project state onto the calling
/// thread: job completions and sync completions (the project event
/// channel), watcher batches, and timer expiries. The project never blocks;
/// the driver sleeps until the nearest timer deadline or the next message.
pub struct ProjectDriver {
    project: Project,
    events: channel::Receiver<ProjectEvent>,
    watch_messages: channel::Receiver<symgraph_vfs::WatchMessage>,
}

impl ProjectDriver {
    pub fn new(project: Project, events: channel::Receiver<ProjectEvent>) -> Self {
        let watch_messages = project.watcher_receiver();
        Self {
            project,
            events,
            watch_messages,
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn project_mut(&mut self) -> &mut Project {
        &mut self.project
    }

    /// Processes at most one message, then fires whatever timers came due.
    /// Returns whether a message was handled (timer-only wakeups return
    /// false).
    pub fn step(&mut self, max_wait: Duration) -> bool {
        let now = Instant::now();
        let timeout = match self.project.next_deadline() {
            Some(deadline) => deadline.saturating_duration_since(now).min(max_wait),
            None => max_wait,
        };

        let mut handled = true;
        channel::select! {
            recv(self.events) -> message => match message {
                Ok(event) => self.project.on_event(event),
                Err(_) => handled = false,
            },
            recv(self.watch_messages) -> message => match message {
                Ok(message) => self.project.on_watch_message(message),
                Err(_) => handled = false,
            },
            default(timeout) => handled = false,
        }

        self.project.fire_due_timers();
        handled
    }

    /// Runs until the project unloads.
    pub fn run(&mut self) {
        while self.project.state() != State::Unloaded {
            self.step(Duration::from_millis(500));
        }
    }

    /// Drains everything currently actionable without waiting: pending
    /// messages, then due timers, until the loop goes quiet. Intended for
    /// tests and synchronous embedders.
    pub fn drain(&mut self) {
        loop {
            let handled = self.step(Duration::ZERO);
            if !handled && self.project.next_deadline().map_or(true, |d| d > Instant::now())
            {
                break;
            }
        }
    }
}
