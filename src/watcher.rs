//! File system watcher feeding the incremental index
//!
//! The watcher runs on its own thread, collects file system events, and
//! hands out debounced batches of [`FileChange`]s. It never touches search
//! state itself; the consumer feeds each batch to
//! [`IncrementalIndex::apply`](crate::incremental::IncrementalIndex::apply)
//! before its next query.

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use strum::Display;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::host::PathFilter;

/// Configuration for file watching
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Quiet period after the last event before a batch is released
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 300 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

impl ChangeKind {
    /// Net effect of two events on the same path, in arrival order
    fn merge(self, next: ChangeKind) -> ChangeKind {
        match (self, next) {
            (_, ChangeKind::Removed) => ChangeKind::Removed,
            (ChangeKind::Created, _) => ChangeKind::Created,
            _ => ChangeKind::Modified,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Coalesces bursts of events into one change per path
///
/// The timer restarts on every event, so a batch is only released once the
/// paths have been quiet for the whole delay:
///
/// ```text
/// t=0ms:   a.rs modified  [timer starts]
/// t=120ms: b.rs created   [timer resets]
/// t=200ms: a.rs modified  [timer resets, a.rs still one entry]
/// t=500ms: timer expires  [release a.rs, b.rs]
/// ```
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: BTreeMap<PathBuf, ChangeKind>,
    last_event: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: BTreeMap::new(),
            last_event: None,
        }
    }

    pub fn push(&mut self, change: FileChange, now: Instant) {
        let kind = match self.pending.get(&change.path) {
            Some(previous) => previous.merge(change.kind),
            None => change.kind,
        };
        self.pending.insert(change.path, kind);
        self.last_event = Some(now);
    }

    /// Release the batch once the quiet period has passed
    pub fn ready(&mut self, now: Instant) -> Option<Vec<FileChange>> {
        let last = self.last_event?;
        if self.pending.is_empty() || now.duration_since(last) < self.delay {
            return None;
        }

        self.last_event = None;
        Some(
            std::mem::take(&mut self.pending)
                .into_iter()
                .map(|(path, kind)| FileChange { path, kind })
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Running watcher; dropping it stops the thread
pub struct WatchHandle {
    batches: UnboundedReceiver<Vec<FileChange>>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Next debounced batch; `None` once the watcher has stopped
    pub async fn next_batch(&mut self) -> Option<Vec<FileChange>> {
        self.batches.recv().await
    }

    /// Drain every batch already released, merged into one list
    pub fn drain(&mut self) -> Vec<FileChange> {
        let mut changes = Vec::new();
        while let Ok(batch) = self.batches.try_recv() {
            changes.extend(batch);
        }
        changes
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Start watching `root` recursively
///
/// Reported paths are `root` joined with the path relative to it, so they
/// line up with what [`LocalFileHost`](crate::host::LocalFileHost) enumerates
/// for the same root.
pub fn watch(root: &Path, filter: PathFilter, config: WatchConfig) -> Result<WatchHandle> {
    log::info!(
        "Starting file watcher for {:?} with {}ms debounce",
        root,
        config.debounce_ms
    );

    let canonical_root = root
        .canonicalize()
        .with_context(|| format!("Cannot watch {}", root.display()))?;

    let (tx, rx) = channel();
    let mut watcher =
        RecommendedWatcher::new(tx, Config::default()).context("Failed to create file watcher")?;
    watcher
        .watch(&canonical_root, RecursiveMode::Recursive)
        .context("Failed to start watching directory")?;

    let (batch_tx, batch_rx) = unbounded_channel();
    let stop = Arc::new(AtomicBool::new(false));
    let state = LoopState {
        root: root.to_path_buf(),
        canonical_root,
        filter,
        debouncer: Debouncer::new(Duration::from_millis(config.debounce_ms)),
        stop: Arc::clone(&stop),
    };

    let thread = std::thread::Builder::new()
        .name("medit-watcher".to_string())
        .spawn(move || {
            // Keep the watcher alive for as long as the loop runs
            let _watcher = watcher;
            state.run(rx, batch_tx);
        })
        .context("Failed to spawn watcher thread")?;

    Ok(WatchHandle {
        batches: batch_rx,
        stop,
        thread: Some(thread),
    })
}

struct LoopState {
    root: PathBuf,
    canonical_root: PathBuf,
    filter: PathFilter,
    debouncer: Debouncer,
    stop: Arc<AtomicBool>,
}

impl LoopState {
    fn run(
        mut self,
        rx: std::sync::mpsc::Receiver<notify::Result<Event>>,
        batches: UnboundedSender<Vec<FileChange>>,
    ) {
        while !self.stop.load(Ordering::SeqCst) {
            // Short timeout so the debounce timer and stop flag are checked
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(Ok(event)) => {
                    for (path, kind) in process_event(&event) {
                        if let Some(change) = self.to_change(&path, kind) {
                            log::debug!("Detected change: {:?}", change);
                            self.debouncer.push(change, Instant::now());
                        }
                    }
                }
                Ok(Err(e)) => {
                    log::warn!("Watch error: {}", e);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    log::info!("Watcher channel disconnected, stopping...");
                    break;
                }
            }

            if let Some(batch) = self.debouncer.ready(Instant::now()) {
                log::debug!("Releasing batch of {} changed file(s)", batch.len());
                if batches.send(batch).is_err() {
                    break;
                }
            }
        }

        log::info!("Watcher stopped.");
    }

    fn to_change(&self, path: &Path, kind: ChangeKind) -> Option<FileChange> {
        let relative = path.strip_prefix(&self.canonical_root).ok()?;
        if !should_watch_file(path, relative, &self.filter) {
            return None;
        }
        Some(FileChange {
            path: self.root.join(relative),
            kind,
        })
    }
}

/// Changed paths of one event with their kind
///
/// Access and metadata-only events are ignored. Renames become a removal of
/// the old path and a creation of the new one.
fn process_event(event: &Event) -> Vec<(PathBuf, ChangeKind)> {
    let all = |kind: ChangeKind| -> Vec<(PathBuf, ChangeKind)> {
        event.paths.iter().map(|p| (p.clone(), kind)).collect()
    };

    match event.kind {
        EventKind::Create(_) => all(ChangeKind::Created),
        EventKind::Remove(_) => all(ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => all(ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => all(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut changes = Vec::new();
            if let Some(from) = event.paths.first() {
                changes.push((from.clone(), ChangeKind::Removed));
            }
            if let Some(to) = event.paths.get(1) {
                changes.push((to.clone(), ChangeKind::Created));
            }
            changes
        }
        EventKind::Modify(_) => all(ChangeKind::Modified),
        _ => Vec::new(),
    }
}

/// Check if a changed path can affect search results
///
/// Hidden files and directories (including our own temporary files) and
/// paths rejected by the scope's globs are skipped.
fn should_watch_file(path: &Path, relative: &Path, filter: &PathFilter) -> bool {
    let hidden = relative.components().any(|c| match c {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    });
    if hidden {
        return false;
    }

    if path.is_dir() {
        return false;
    }

    filter.matches(relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn change(path: &str, kind: ChangeKind) -> FileChange {
        FileChange {
            path: PathBuf::from(path),
            kind,
        }
    }

    #[test]
    fn test_debouncer_waits_for_quiet_period() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(300));

        debouncer.push(change("a.rs", ChangeKind::Modified), start);
        debouncer.push(
            change("b.rs", ChangeKind::Created),
            start + Duration::from_millis(120),
        );
        debouncer.push(
            change("a.rs", ChangeKind::Modified),
            start + Duration::from_millis(200),
        );

        assert!(debouncer.ready(start + Duration::from_millis(400)).is_none());

        let batch = debouncer.ready(start + Duration::from_millis(500)).unwrap();
        assert_eq!(
            batch,
            vec![
                change("a.rs", ChangeKind::Modified),
                change("b.rs", ChangeKind::Created)
            ]
        );
        assert!(debouncer.is_empty());
        assert!(debouncer.ready(start + Duration::from_millis(900)).is_none());
    }

    #[test]
    fn test_change_kinds_coalesce() {
        use ChangeKind::*;
        assert_eq!(Created.merge(Modified), Created);
        assert_eq!(Created.merge(Removed), Removed);
        assert_eq!(Removed.merge(Created), Modified);
        assert_eq!(Modified.merge(Modified), Modified);
        assert_eq!(Modified.merge(Removed), Removed);
    }

    #[test]
    fn test_should_watch_filters_hidden_and_globs() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("lib.rs");
        fs::write(&file, "fn main() {}").unwrap();
        let filter = PathFilter::new(&["*.rs".to_string()], &[]).unwrap();

        assert!(should_watch_file(&file, Path::new("lib.rs"), &filter));
        assert!(!should_watch_file(
            &temp.path().join("notes.txt"),
            Path::new("notes.txt"),
            &filter
        ));
        assert!(!should_watch_file(
            &temp.path().join(".lib.rs.medit-1.tmp"),
            Path::new(".lib.rs.medit-1.tmp"),
            &PathFilter::default()
        ));
        assert!(!should_watch_file(
            &temp.path().join(".git/index"),
            Path::new(".git/index"),
            &PathFilter::default()
        ));
    }

    #[test]
    fn test_should_not_watch_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("src");
        fs::create_dir(&dir).unwrap();

        assert!(!should_watch_file(&dir, Path::new("src"), &PathFilter::default()));
    }

    #[test]
    fn test_process_event_kinds() {
        let event = |kind| Event {
            kind,
            paths: vec![PathBuf::from("/test/file.rs")],
            attrs: Default::default(),
        };

        assert_eq!(
            process_event(&event(EventKind::Create(notify::event::CreateKind::File))),
            vec![(PathBuf::from("/test/file.rs"), ChangeKind::Created)]
        );
        assert_eq!(
            process_event(&event(EventKind::Modify(ModifyKind::Data(
                notify::event::DataChange::Any
            )))),
            vec![(PathBuf::from("/test/file.rs"), ChangeKind::Modified)]
        );
        assert!(process_event(&event(EventKind::Access(notify::event::AccessKind::Read))).is_empty());
    }

    #[test]
    fn test_process_event_rename_both() {
        let event = Event {
            kind: EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            paths: vec![PathBuf::from("/t/.a.rs.tmp"), PathBuf::from("/t/a.rs")],
            attrs: Default::default(),
        };

        assert_eq!(
            process_event(&event),
            vec![
                (PathBuf::from("/t/.a.rs.tmp"), ChangeKind::Removed),
                (PathBuf::from("/t/a.rs"), ChangeKind::Created)
            ]
        );
    }
}
