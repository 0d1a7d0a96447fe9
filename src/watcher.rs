//! Non-recursive watcher over the profiles root.
//!
//! Translates raw `notify` events into the three shapes the synchronizer
//! understands: a direct child appeared, disappeared, or changed. Renames
//! surface as Deleted(old) + Created(new) so the consumer never needs
//! rename tracking. Events cross a plain mpsc channel; the synchronizer
//! drains them serially on its own thread, the watcher never mutates
//! shared state.

use anyhow::{Context, Result};
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, PollWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread::JoinHandle;
use std::time::Duration;

/// The watcher backend shut down; no further events will ever arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherClosed;

impl std::fmt::Display for WatcherClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "directory watcher has shut down")
    }
}

impl std::error::Error for WatcherClosed {}

/// A change to a direct child of the watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Created(PathBuf),
    Deleted(PathBuf),
    Modified(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Created(p) | WatchEvent::Deleted(p) | WatchEvent::Modified(p) => p,
        }
    }
}

/// Watches a single directory, non-recursively, until dropped or
/// [`stop`](DirectoryWatcher::stop)ped.
///
/// Callers keep at most one alive per directory; replacing a watcher means
/// stopping the old one first so its forwarding thread is joined before a
/// new one starts.
pub struct DirectoryWatcher {
    // Kept alive to maintain watching; dropping it disconnects the raw
    // channel and ends the forwarding thread.
    watcher: Option<Box<dyn Watcher + Send>>,
    forwarder: Option<JoinHandle<()>>,
    events: Receiver<WatchEvent>,
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher").finish_non_exhaustive()
    }
}

impl DirectoryWatcher {
    /// Start watching `dir`. Prefers the platform-native backend (inotify,
    /// kqueue, ReadDirectoryChanges) and falls back to a 500 ms poll
    /// watcher where the native one cannot initialize, e.g. on network
    /// filesystems.
    pub fn new(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            anyhow::bail!("Directory to watch does not exist: {}", dir.display());
        }
        let dir: PathBuf = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());

        let (raw_tx, raw_rx) = channel::<Event>();
        let (tx, rx) = channel::<WatchEvent>();

        let mut watcher = Self::create_backend(raw_tx)?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch directory: {}", dir.display()))?;

        let forwarder = std::thread::Builder::new()
            .name("modswap-watch".into())
            .spawn(move || {
                while let Ok(event) = raw_rx.recv() {
                    forward(event, &dir, &tx);
                }
            })
            .context("Failed to spawn watcher forwarding thread")?;

        Ok(Self {
            watcher: Some(watcher),
            forwarder: Some(forwarder),
            events: rx,
        })
    }

    fn create_backend(raw_tx: Sender<Event>) -> Result<Box<dyn Watcher + Send>> {
        let handler = {
            let raw_tx = raw_tx.clone();
            move |result: std::result::Result<Event, notify::Error>| {
                if let Ok(event) = result {
                    let _ = raw_tx.send(event);
                }
            }
        };

        match notify::recommended_watcher(handler) {
            Ok(w) => Ok(Box::new(w)),
            Err(_) => {
                let fallback = move |result: std::result::Result<Event, notify::Error>| {
                    if let Ok(event) = result {
                        let _ = raw_tx.send(event);
                    }
                };
                let poll = PollWatcher::new(
                    fallback,
                    NotifyConfig::default().with_poll_interval(Duration::from_millis(500)),
                )
                .context("Failed to create fallback poll watcher")?;
                Ok(Box::new(poll))
            }
        }
    }

    /// Next pending event, if any (non-blocking).
    pub fn try_recv(&self) -> Option<WatchEvent> {
        self.events.try_recv().ok()
    }

    /// Block for up to `timeout` waiting for the next event.
    ///
    /// `Ok(None)` means the timeout elapsed with no event. A closed
    /// channel is reported distinctly so callers can stop polling
    /// instead of spinning on timeouts forever.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<WatchEvent>, WatcherClosed> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(WatcherClosed),
        }
    }

    /// Stop watching and join the forwarding thread. No events are
    /// delivered after this returns; subsequent receives report
    /// [`WatcherClosed`].
    pub fn stop(&mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the backend disconnects the raw channel, which ends
        // the forwarding loop.
        self.watcher.take();
        if let Some(handle) = self.forwarder.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Translate one raw event, keeping only direct children of `dir`.
fn forward(event: Event, dir: &Path, tx: &Sender<WatchEvent>) {
    let children = |event: &Event| -> Vec<PathBuf> {
        event
            .paths
            .iter()
            .filter(|p| p.parent() == Some(dir))
            .cloned()
            .collect()
    };

    match event.kind {
        EventKind::Create(_) => {
            for path in children(&event) {
                let _ = tx.send(WatchEvent::Created(path));
            }
        }
        EventKind::Remove(_) => {
            for path in children(&event) {
                let _ = tx.send(WatchEvent::Deleted(path));
            }
        }
        // A rename away from the watched directory (or to an unknown
        // destination) is a deletion from the consumer's point of view.
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            for path in children(&event) {
                let _ = tx.send(WatchEvent::Deleted(path));
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            for path in children(&event) {
                let _ = tx.send(WatchEvent::Created(path));
            }
        }
        // Both sides in one event: old name first, new name second.
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let paths = children(&event);
            if let [old, new] = paths.as_slice() {
                let _ = tx.send(WatchEvent::Deleted(old.clone()));
                let _ = tx.send(WatchEvent::Created(new.clone()));
            } else {
                for path in paths {
                    let _ = tx.send(WatchEvent::Modified(path));
                }
            }
        }
        EventKind::Modify(_) => {
            for path in children(&event) {
                let _ = tx.send(WatchEvent::Modified(path));
            }
        }
        _ => {}
    }
}
