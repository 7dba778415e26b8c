//! globtail - follow every file matching a set of glob patterns.

pub mod config;
pub mod display;
pub mod runtime;
pub mod watcher;

pub use runtime::Tailer;
