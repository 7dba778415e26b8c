//! Directory notification backend.
//!
//! Wraps a non-recursive `notify` watcher and bridges its callback onto two
//! tokio channels: typed directory events and backend errors.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::error::WatcherError;

/// A change to an entry of a subscribed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirEvent {
    /// A new entry appeared, either created or renamed into place.
    Created(PathBuf),
    /// An entry was deleted.
    Removed(PathBuf),
    /// An entry was renamed away from this path.
    Renamed(PathBuf),
}

impl DirEvent {
    /// The path affected by this event.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Created(p) | Self::Removed(p) | Self::Renamed(p) => p,
        }
    }
}

/// Directory-level subscription interface of a notification backend.
///
/// Subscribing a directory again after a failed attempt must be safe.
pub trait DirWatcher: Send + Sync {
    /// Start delivering events for entries of `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot watch the directory.
    fn subscribe(&self, dir: &Path) -> Result<(), WatcherError>;

    /// Stop delivering events for entries of `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory was not subscribed or the backend
    /// refuses to drop it.
    fn unsubscribe(&self, dir: &Path) -> Result<(), WatcherError>;
}

/// Receiving ends of a backend's event and error streams.
#[derive(Debug)]
pub struct BackendStreams {
    /// Typed directory events.
    pub events: mpsc::UnboundedReceiver<DirEvent>,
    /// Errors reported by the backend.
    pub errors: mpsc::UnboundedReceiver<WatcherError>,
}

impl BackendStreams {
    /// Create a connected pair of senders and streams.
    ///
    /// Used by backends to publish, and by tests to feed events directly.
    #[must_use]
    pub fn channel() -> (
        mpsc::UnboundedSender<DirEvent>,
        mpsc::UnboundedSender<WatcherError>,
        Self,
    ) {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (error_tx, errors) = mpsc::unbounded_channel();
        (event_tx, error_tx, Self { events, errors })
    }
}

/// `notify`-based backend watching each subscribed directory non-recursively.
///
/// Dropping the backend drops the underlying watcher, which closes the
/// event stream.
pub struct NotifyBackend {
    watcher: Mutex<RecommendedWatcher>,
}

impl std::fmt::Debug for NotifyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyBackend").finish_non_exhaustive()
    }
}

impl NotifyBackend {
    /// Create the backend and the streams it publishes to.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform watcher cannot be initialized.
    pub fn new() -> Result<(Self, BackendStreams), WatcherError> {
        let (event_tx, error_tx, streams) = BackendStreams::channel();

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for dir_event in translate(&event) {
                    let _ = event_tx.send(dir_event);
                }
            }
            Err(e) => {
                let _ = error_tx.send(WatcherError::Notify(e));
            }
        })?;

        Ok((
            Self {
                watcher: Mutex::new(watcher),
            },
            streams,
        ))
    }
}

impl DirWatcher for NotifyBackend {
    fn subscribe(&self, dir: &Path) -> Result<(), WatcherError> {
        self.watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .watch(dir, RecursiveMode::NonRecursive)?;
        Ok(())
    }

    fn unsubscribe(&self, dir: &Path) -> Result<(), WatcherError> {
        self.watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unwatch(dir)?;
        Ok(())
    }
}

/// Translate a raw `notify` event into directory events.
///
/// The source name of a rename becomes [`DirEvent::Renamed`] and the
/// destination name [`DirEvent::Created`]. When the backend cannot tell
/// which side of a rename a path is on, its existence decides.
#[must_use]
pub fn translate(event: &Event) -> Vec<DirEvent> {
    match event.kind {
        EventKind::Create(_) => event.paths.iter().cloned().map(DirEvent::Created).collect(),
        EventKind::Remove(_) => event.paths.iter().cloned().map(DirEvent::Removed).collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => event.paths.iter().cloned().map(DirEvent::Renamed).collect(),
            RenameMode::To => event.paths.iter().cloned().map(DirEvent::Created).collect(),
            RenameMode::Both => {
                let mut events = Vec::with_capacity(2);
                if let Some(from) = event.paths.first() {
                    events.push(DirEvent::Renamed(from.clone()));
                }
                if let Some(to) = event.paths.get(1) {
                    events.push(DirEvent::Created(to.clone()));
                }
                events
            }
            RenameMode::Any | RenameMode::Other => event
                .paths
                .iter()
                .map(|p| {
                    if p.exists() {
                        DirEvent::Created(p.clone())
                    } else {
                        DirEvent::Renamed(p.clone())
                    }
                })
                .collect(),
        },
        _ => Vec::new(),
    }
}
