//! Incremental watch-set updates driven by directory notifications.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::backend::{BackendStreams, DirEvent};
use super::reconciler::track_file;
use super::resolver::{canonicalize_or_absolute, PathResolver};
use super::watch_set::WatchSet;

/// Applies directory events to the watch set between reconciliation passes.
#[derive(Debug, Clone)]
pub struct EventListener {
    resolver: Arc<PathResolver>,
    watch_set: Arc<WatchSet>,
}

impl EventListener {
    /// Create a listener over the shared watch set.
    #[must_use]
    pub fn new(resolver: Arc<PathResolver>, watch_set: Arc<WatchSet>) -> Self {
        Self {
            resolver,
            watch_set,
        }
    }

    /// Apply a single event.
    ///
    /// A created path is tracked at its current size if it matches a
    /// pattern. A removed or renamed path is dropped; the new name of a
    /// rename arrives as its own creation or is found by the next scan.
    pub fn handle_event(&self, event: DirEvent) {
        match event {
            DirEvent::Created(path) => {
                let canonical = canonicalize_or_absolute(&path);
                if self.resolver.matches(&canonical) {
                    track_file(&self.watch_set, &canonical);
                }
            }
            DirEvent::Removed(path) | DirEvent::Renamed(path) => {
                if self.watch_set.remove_file(&path).is_some() {
                    tracing::info!(path = %path.display(), "Stopped watching file");
                }
            }
        }
    }

    /// Consume events until the event stream closes or `cancel` fires.
    ///
    /// Backend errors are logged and never end the loop.
    pub async fn run(self, streams: BackendStreams, cancel: CancellationToken) {
        let BackendStreams {
            mut events,
            mut errors,
        } = streams;
        let mut errors_open = true;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                event = events.recv() => {
                    let Some(event) = event else {
                        tracing::debug!("Directory event stream closed");
                        break;
                    };
                    tracing::trace!(?event, "Directory event");
                    let this = self.clone();
                    if let Err(e) = tokio::task::spawn_blocking(move || this.handle_event(event)).await {
                        tracing::error!(error = %e, "Directory event handling failed");
                    }
                }
                error = errors.recv(), if errors_open => match error {
                    Some(e) => tracing::error!(error = %e, "Directory watcher error"),
                    None => errors_open = false,
                },
            }
        }

        tracing::debug!("Event listener stopped");
    }
}
