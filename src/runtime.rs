//! Tailer orchestration.
//!
//! Runs the startup reconciliation, then drives the reconciler, the event
//! listener and the poller concurrently against one shared watch set until
//! shutdown is requested.

use std::io::Write;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::TailConfig;
use crate::display::OutputSink;
use crate::watcher::{
    BackendStreams, DirWatcher, EventListener, NotifyBackend, PathResolver, Poller, Reconciler,
    WatchSet, WatcherError,
};

/// Owns the shared watch state and the three tailing tasks.
pub struct Tailer {
    config: Arc<TailConfig>,
    watch_set: Arc<WatchSet>,
    reconciler: Reconciler,
    listener: EventListener,
    streams: BackendStreams,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Tailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tailer")
            .field("config", &self.config)
            .field("watch_set", &self.watch_set)
            .finish_non_exhaustive()
    }
}

impl Tailer {
    /// Create a tailer over an explicit notification backend.
    #[must_use]
    pub fn new(
        config: Arc<TailConfig>,
        watcher: Arc<dyn DirWatcher>,
        streams: BackendStreams,
    ) -> Self {
        let resolver = Arc::new(PathResolver::new(config.patterns.clone()));
        let watch_set = Arc::new(WatchSet::new());

        Self {
            reconciler: Reconciler::new(Arc::clone(&resolver), Arc::clone(&watch_set), watcher),
            listener: EventListener::new(resolver, Arc::clone(&watch_set)),
            config,
            watch_set,
            streams,
            cancel: CancellationToken::new(),
        }
    }

    /// Create a tailer backed by the platform's file notification service.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification backend cannot be initialized.
    pub fn with_notify(config: Arc<TailConfig>) -> Result<Self, WatcherError> {
        let (backend, streams) = NotifyBackend::new()?;
        Ok(Self::new(config, Arc::new(backend), streams))
    }

    /// Get the shared watch set.
    #[must_use]
    pub fn watch_set(&self) -> Arc<WatchSet> {
        Arc::clone(&self.watch_set)
    }

    /// Get a token that stops every task once cancelled.
    #[must_use]
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Seed the watch set, then tail until shutdown is requested.
    ///
    /// # Errors
    ///
    /// Returns an error only if the startup pass cannot be run to completion.
    pub async fn run<W>(self, sink: OutputSink<W>) -> Result<(), WatcherError>
    where
        W: Write + Send + 'static,
    {
        let Self {
            config,
            watch_set,
            reconciler,
            listener,
            streams,
            cancel,
        } = self;

        let startup = reconciler.clone();
        tokio::task::spawn_blocking(move || startup.reconcile()).await?;
        tracing::info!(
            files = watch_set.file_count(),
            dirs = watch_set.dir_count(),
            "Initial scan complete"
        );

        let poller = Poller::new(Arc::clone(&watch_set), sink, config.disp_interval);

        let mut tasks = JoinSet::new();
        tasks.spawn(reconciler.run(config.scan_interval, cancel.clone()));
        tasks.spawn(listener.run(streams, cancel.clone()));
        tasks.spawn(poller.run(config.poll_interval, cancel.clone()));

        cancel.cancelled().await;
        tracing::debug!("Shutting down");

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Task ended abnormally");
            }
        }

        Ok(())
    }
}
