//! Periodic re-derivation of the watch state from the filesystem.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::backend::DirWatcher;
use super::resolver::PathResolver;
use super::watch_set::{DirStatus, WatchSet};

/// Start tracking a file at its current size unless it is already tracked.
///
/// Content written before this call is never delivered. Returns `true` if
/// the file is tracked after the call.
pub fn track_file(watch_set: &WatchSet, path: &Path) -> bool {
    if watch_set.contains_file(path) {
        return true;
    }

    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Error getting file info");
            return false;
        }
    };

    if watch_set.insert_file(path.to_path_buf(), metadata.len()) {
        tracing::info!(path = %path.display(), offset = metadata.len(), "Watching new file");
    }
    true
}

/// Changes applied by one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Files tracked for the first time.
    pub files_added: Vec<PathBuf>,
    /// Files no longer matching any pattern.
    pub files_removed: Vec<PathBuf>,
    /// Directories newly subscribed.
    pub dirs_added: Vec<PathBuf>,
    /// Directories that no longer hold a tracked file.
    pub dirs_removed: Vec<PathBuf>,
}

impl ReconcileReport {
    /// Whether the pass changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files_added.is_empty()
            && self.files_removed.is_empty()
            && self.dirs_added.is_empty()
            && self.dirs_removed.is_empty()
    }
}

/// Diffs the resolved glob matches against the watch set and applies the
/// minimal set of additions and removals.
#[derive(Clone)]
pub struct Reconciler {
    resolver: Arc<PathResolver>,
    watch_set: Arc<WatchSet>,
    watcher: Arc<dyn DirWatcher>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("resolver", &self.resolver)
            .field("watch_set", &self.watch_set)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Create a reconciler over the shared watch set.
    #[must_use]
    pub fn new(
        resolver: Arc<PathResolver>,
        watch_set: Arc<WatchSet>,
        watcher: Arc<dyn DirWatcher>,
    ) -> Self {
        Self {
            resolver,
            watch_set,
            watcher,
        }
    }

    /// Run one reconciliation pass.
    ///
    /// Only files tracked before the pass started are candidates for
    /// removal, so an entry added concurrently by the listener survives.
    pub fn reconcile(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let previous = self.watch_set.file_paths();
        let mut matched = HashSet::new();
        let mut matched_dirs = HashSet::new();

        for path in self.resolver.resolve() {
            if let Some(dir) = path.parent() {
                if self.subscribe_dir(dir) {
                    report.dirs_added.push(dir.to_path_buf());
                }
                matched_dirs.insert(dir.to_path_buf());
            }

            let was_tracked = self.watch_set.contains_file(&path);
            if track_file(&self.watch_set, &path) {
                if !was_tracked {
                    report.files_added.push(path.clone());
                }
                matched.insert(path);
            }
        }

        for path in previous {
            if !matched.contains(&path) && self.watch_set.remove_file(&path).is_some() {
                tracing::info!(path = %path.display(), "Stopped watching file");
                report.files_removed.push(path);
            }
        }

        // A directory stays while it holds a tracked file or a match that
        // could not be added yet.
        let owners: HashSet<PathBuf> = self
            .watch_set
            .file_paths()
            .into_iter()
            .filter_map(|p| p.parent().map(Path::to_path_buf))
            .chain(matched_dirs)
            .collect();

        for dir in self.watch_set.dir_paths() {
            if !owners.contains(&dir) {
                self.remove_dir(&dir);
                report.dirs_removed.push(dir);
            }
        }

        report
    }

    /// Ensure a directory is subscribed.
    ///
    /// Returns `true` only when this call newly subscribed it. Only the first
    /// failure for a directory is logged; later attempts retry silently.
    fn subscribe_dir(&self, dir: &Path) -> bool {
        let previous = self.watch_set.dir_status(dir);
        if previous.as_ref().is_some_and(DirStatus::is_subscribed) {
            return false;
        }

        match self.watcher.subscribe(dir) {
            Ok(()) => {
                self.watch_set
                    .set_dir_status(dir.to_path_buf(), DirStatus::Subscribed);
                tracing::info!(path = %dir.display(), "Watching directory");
                true
            }
            Err(e) => {
                self.watch_set
                    .set_dir_status(dir.to_path_buf(), DirStatus::Failed(e.to_string()));
                if previous.is_none() {
                    tracing::error!(
                        path = %dir.display(),
                        error = %e,
                        "Error adding directory to watcher"
                    );
                }
                false
            }
        }
    }

    fn remove_dir(&self, dir: &Path) {
        if let Some(DirStatus::Subscribed) = self.watch_set.remove_dir(dir) {
            if let Err(e) = self.watcher.unsubscribe(dir) {
                tracing::error!(
                    path = %dir.display(),
                    error = %e,
                    "Error removing directory from watcher"
                );
            }
        }
        tracing::info!(path = %dir.display(), "Stopped watching directory");
    }

    /// Re-run reconciliation every `period` until cancelled.
    ///
    /// The first pass happens one period after the call; the startup pass is
    /// expected to have been run already.
    pub async fn run(self, period: Duration, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let this = self.clone();
                    match tokio::task::spawn_blocking(move || this.reconcile()).await {
                        Ok(report) if !report.is_empty() => {
                            tracing::debug!(?report, "Reconciliation applied changes");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "Reconciliation pass failed"),
                    }
                }
            }
        }

        tracing::debug!("Reconciler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::error::WatcherError;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records calls and fails subscriptions for selected directories.
    #[derive(Default)]
    struct FakeWatcher {
        failing: Mutex<HashSet<PathBuf>>,
        subscribe_calls: Mutex<Vec<PathBuf>>,
        unsubscribed: Mutex<Vec<PathBuf>>,
    }

    impl FakeWatcher {
        fn fail(&self, dir: &Path) {
            self.failing.lock().unwrap().insert(dir.to_path_buf());
        }

        fn recover(&self, dir: &Path) {
            self.failing.lock().unwrap().remove(dir);
        }

        fn subscribe_count(&self, dir: &Path) -> usize {
            self.subscribe_calls
                .lock()
                .unwrap()
                .iter()
                .filter(|d| *d == dir)
                .count()
        }
    }

    impl DirWatcher for FakeWatcher {
        fn subscribe(&self, dir: &Path) -> Result<(), WatcherError> {
            self.subscribe_calls.lock().unwrap().push(dir.to_path_buf());
            if self.failing.lock().unwrap().contains(dir) {
                return Err(WatcherError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "permission denied",
                )));
            }
            Ok(())
        }

        fn unsubscribe(&self, dir: &Path) -> Result<(), WatcherError> {
            self.unsubscribed.lock().unwrap().push(dir.to_path_buf());
            Ok(())
        }
    }

    struct Fixture {
        _temp_dir: TempDir,
        root: PathBuf,
        watch_set: Arc<WatchSet>,
        watcher: Arc<FakeWatcher>,
        reconciler: Reconciler,
    }

    fn fixture(suffix: &str) -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let root = std::fs::canonicalize(temp_dir.path()).unwrap();
        let resolver = Arc::new(PathResolver::new(vec![format!(
            "{}/{suffix}",
            root.display()
        )]));
        let watch_set = Arc::new(WatchSet::new());
        let watcher = Arc::new(FakeWatcher::default());
        let reconciler = Reconciler::new(
            resolver,
            Arc::clone(&watch_set),
            Arc::clone(&watcher) as Arc<dyn DirWatcher>,
        );
        Fixture {
            _temp_dir: temp_dir,
            root,
            watch_set,
            watcher,
            reconciler,
        }
    }

    #[test]
    fn test_initial_offset_is_current_size() {
        let fx = fixture("*.log");
        let path = fx.root.join("app.log");
        std::fs::write(&path, "existing content\n").unwrap();

        let report = fx.reconciler.reconcile();

        assert_eq!(report.files_added, vec![path.clone()]);
        assert_eq!(report.dirs_added, vec![fx.root.clone()]);
        assert_eq!(fx.watch_set.offset(&path), Some(17));
        assert!(fx.watch_set.dir_status(&fx.root).unwrap().is_subscribed());
    }

    #[test]
    fn test_second_pass_is_idempotent() {
        let fx = fixture("*.log");
        let path = fx.root.join("app.log");
        std::fs::write(&path, "abc").unwrap();

        fx.reconciler.reconcile();
        fx.watch_set.store_offset(&path, 1);
        let report = fx.reconciler.reconcile();

        assert!(report.is_empty());
        assert_eq!(fx.watch_set.offset(&path), Some(1));
        assert_eq!(fx.watcher.subscribe_count(&fx.root), 1);
    }

    /// Stands in for the listener by tracking a file while a pass runs.
    struct ConcurrentAddWatcher {
        watch_set: Arc<WatchSet>,
        late: PathBuf,
    }

    impl DirWatcher for ConcurrentAddWatcher {
        fn subscribe(&self, _dir: &Path) -> Result<(), WatcherError> {
            std::fs::write(&self.late, "abc").unwrap();
            track_file(&self.watch_set, &self.late);
            Ok(())
        }

        fn unsubscribe(&self, _dir: &Path) -> Result<(), WatcherError> {
            Ok(())
        }
    }

    #[test]
    fn test_file_added_during_pass_is_kept() {
        let temp_dir = TempDir::new().unwrap();
        let root = std::fs::canonicalize(temp_dir.path()).unwrap();
        std::fs::write(root.join("app.log"), "abc").unwrap();
        let late = root.join("late.log");

        let watch_set = Arc::new(WatchSet::new());
        let reconciler = Reconciler::new(
            Arc::new(PathResolver::new(vec![format!("{}/*.log", root.display())])),
            Arc::clone(&watch_set),
            Arc::new(ConcurrentAddWatcher {
                watch_set: Arc::clone(&watch_set),
                late: late.clone(),
            }),
        );

        let report = reconciler.reconcile();

        assert!(report.files_removed.is_empty());
        assert!(watch_set.contains_file(&late));
        assert_eq!(watch_set.offset(&late), Some(3));
    }

    #[cfg(unix)]
    #[test]
    fn test_dir_with_only_broken_link_stays_subscribed() {
        let fx = fixture("*.log");
        std::os::unix::fs::symlink(fx.root.join("gone.log"), fx.root.join("broken.log")).unwrap();

        let first = fx.reconciler.reconcile();
        assert_eq!(first.dirs_added, vec![fx.root.clone()]);
        assert!(first.dirs_removed.is_empty());
        assert_eq!(fx.watch_set.file_count(), 0);

        let second = fx.reconciler.reconcile();
        assert!(second.is_empty());
        assert_eq!(fx.watcher.subscribe_count(&fx.root), 1);
        assert!(fx.watcher.unsubscribed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_removes_files_and_dirs_no_longer_matching() {
        let fx = fixture("**/*.log");
        let sub = fx.root.join("sub");
        std::fs::create_dir(&sub).unwrap();
        let path = sub.join("app.log");
        std::fs::write(&path, "abc").unwrap();

        fx.reconciler.reconcile();
        assert!(fx.watch_set.contains_file(&path));

        std::fs::remove_file(&path).unwrap();
        let report = fx.reconciler.reconcile();

        assert_eq!(report.files_removed, vec![path.clone()]);
        assert_eq!(report.dirs_removed, vec![sub.clone()]);
        assert!(!fx.watch_set.contains_file(&path));
        assert_eq!(fx.watch_set.dir_count(), 0);
        assert_eq!(*fx.watcher.unsubscribed.lock().unwrap(), vec![sub]);
    }

    #[test]
    fn test_readded_file_starts_fresh_offset() {
        let fx = fixture("*.log");
        let path = fx.root.join("app.log");
        std::fs::write(&path, "abc").unwrap();
        fx.reconciler.reconcile();

        let hidden = fx.root.join("app.hidden");
        std::fs::rename(&path, &hidden).unwrap();
        fx.reconciler.reconcile();
        assert!(!fx.watch_set.contains_file(&path));

        std::fs::write(&hidden, "abcdefgh").unwrap();
        std::fs::rename(&hidden, &path).unwrap();
        fx.reconciler.reconcile();

        assert_eq!(fx.watch_set.offset(&path), Some(8));
    }

    #[test]
    fn test_failed_subscription_retried_and_kept() {
        let fx = fixture("*.log");
        let path = fx.root.join("app.log");
        std::fs::write(&path, "abc").unwrap();
        fx.watcher.fail(&fx.root);

        let report = fx.reconciler.reconcile();
        assert!(report.dirs_added.is_empty());
        assert!(matches!(
            fx.watch_set.dir_status(&fx.root),
            Some(DirStatus::Failed(_))
        ));
        // The file is still polled even without notifications.
        assert!(fx.watch_set.contains_file(&path));

        fx.reconciler.reconcile();
        assert_eq!(fx.watcher.subscribe_count(&fx.root), 2);
        assert_eq!(fx.watch_set.dir_count(), 1);

        fx.watcher.recover(&fx.root);
        let report = fx.reconciler.reconcile();
        assert_eq!(report.dirs_added, vec![fx.root.clone()]);
        assert!(fx.watch_set.dir_status(&fx.root).unwrap().is_subscribed());
    }

    #[test]
    fn test_failed_dir_not_unsubscribed_on_removal() {
        let fx = fixture("*.log");
        let path = fx.root.join("app.log");
        std::fs::write(&path, "abc").unwrap();
        fx.watcher.fail(&fx.root);
        fx.reconciler.reconcile();

        std::fs::remove_file(&path).unwrap();
        let report = fx.reconciler.reconcile();

        assert_eq!(report.dirs_removed, vec![fx.root.clone()]);
        assert!(fx.watcher.unsubscribed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_track_file_missing_path() {
        let watch_set = WatchSet::new();
        assert!(!track_file(
            &watch_set,
            Path::new("/nonexistent-globtail-dir/app.log")
        ));
        assert_eq!(watch_set.file_count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_and_target_share_one_entry() {
        let fx = fixture("*.log");
        let real = fx.root.join("real.log");
        std::fs::write(&real, "abc").unwrap();
        std::os::unix::fs::symlink(&real, fx.root.join("alias.log")).unwrap();

        fx.reconciler.reconcile();

        assert_eq!(fx.watch_set.file_paths(), vec![real]);
    }
}
