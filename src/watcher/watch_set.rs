//! Shared watch state: tracked files with their read offsets and
//! subscribed directories with their subscription outcome.
//!
//! Both maps are sharded (`DashMap`), so a caller only ever locks the shard
//! holding the entry it touches. Iteration hands out owned snapshots so no
//! shard lock is held while the caller does I/O.

use std::path::{Path, PathBuf};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Outcome of the last attempt to subscribe a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirStatus {
    /// The notification backend accepted the directory.
    Subscribed,
    /// The last subscription attempt failed with this message.
    Failed(String),
}

impl DirStatus {
    /// Whether the directory is currently subscribed.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        matches!(self, Self::Subscribed)
    }
}

/// Concurrent store of watched files and directories, keyed by canonical path.
#[derive(Debug, Default)]
pub struct WatchSet {
    files: DashMap<PathBuf, u64>,
    dirs: DashMap<PathBuf, DirStatus>,
}

impl WatchSet {
    /// Create an empty watch set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a file starting at `offset` unless it is already tracked.
    ///
    /// Returns `true` if the file was inserted by this call.
    pub fn insert_file(&self, path: PathBuf, offset: u64) -> bool {
        match self.files.entry(path) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(offset);
                true
            }
        }
    }

    /// Get the stored offset of a tracked file.
    #[must_use]
    pub fn offset(&self, path: &Path) -> Option<u64> {
        self.files.get(path).map(|entry| *entry)
    }

    /// Overwrite the offset of a tracked file.
    ///
    /// Does nothing if the file was removed in the meantime, so a reader
    /// finishing late never resurrects a dropped entry. Returns `true` if the
    /// offset was stored.
    pub fn store_offset(&self, path: &Path, offset: u64) -> bool {
        match self.files.get_mut(path) {
            Some(mut entry) => {
                *entry = offset;
                true
            }
            None => false,
        }
    }

    /// Stop tracking a file, returning its last offset.
    pub fn remove_file(&self, path: &Path) -> Option<u64> {
        self.files.remove(path).map(|(_, offset)| offset)
    }

    /// Whether a file is tracked.
    #[must_use]
    pub fn contains_file(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    /// Snapshot of every tracked file and its offset.
    ///
    /// Each offset is read atomically but the snapshot as a whole is not:
    /// entries may be added or removed while it is being collected.
    #[must_use]
    pub fn files(&self) -> Vec<(PathBuf, u64)> {
        self.files
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Snapshot of every tracked file path.
    #[must_use]
    pub fn file_paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of tracked files.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Record a directory's subscription outcome, returning the previous one.
    pub fn set_dir_status(&self, dir: PathBuf, status: DirStatus) -> Option<DirStatus> {
        self.dirs.insert(dir, status)
    }

    /// Get the subscription outcome of a directory.
    #[must_use]
    pub fn dir_status(&self, dir: &Path) -> Option<DirStatus> {
        self.dirs.get(dir).map(|entry| entry.value().clone())
    }

    /// Forget a directory, returning its last subscription outcome.
    pub fn remove_dir(&self, dir: &Path) -> Option<DirStatus> {
        self.dirs.remove(dir).map(|(_, status)| status)
    }

    /// Snapshot of every known directory path.
    #[must_use]
    pub fn dir_paths(&self) -> Vec<PathBuf> {
        self.dirs.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of known directories.
    #[must_use]
    pub fn dir_count(&self) -> usize {
        self.dirs.len()
    }
}
