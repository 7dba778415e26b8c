//! Watcher error types.

use std::path::PathBuf;

/// Errors that can occur while resolving, subscribing or reading watched files.
#[derive(thiserror::Error, Debug)]
pub enum WatcherError {
    /// Glob pattern could not be compiled.
    #[error("Invalid glob pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        source: globset::Error,
    },

    /// Directory walk below a pattern's base directory failed.
    #[error("Cannot expand pattern {pattern}: {source}")]
    Walk {
        pattern: String,
        source: walkdir::Error,
    },

    /// Base directory of a pattern is not accessible.
    #[error("Base directory {path} is not accessible: {source}")]
    BaseDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Notify watcher error.
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Background task join error.
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}
