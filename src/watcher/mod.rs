//! Watch-state reconciliation engine.
//!
//! Keeps a deduplicated, canonical set of tracked files and subscribed
//! directories consistent across directory notifications and periodic
//! glob re-scans, while the poller delivers appended content.

mod backend;
mod error;
mod listener;
mod poller;
mod reconciler;
mod resolver;
mod watch_set;

pub use backend::{translate, BackendStreams, DirEvent, DirWatcher, NotifyBackend};
pub use error::WatcherError;
pub use listener::EventListener;
pub use poller::{Poller, QuietTimer};
pub use reconciler::{track_file, ReconcileReport, Reconciler};
pub use resolver::{canonicalize_or_absolute, split_pattern, PathResolver};
pub use watch_set::{DirStatus, WatchSet};
