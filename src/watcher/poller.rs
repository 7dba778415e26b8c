//! Timer-driven reader delivering appended bytes of every tracked file.
//!
//! Files are opened and closed on every tick, so descriptors are only held
//! while a file is actually being read.

use std::io::{ErrorKind, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::error::WatcherError;
use super::watch_set::WatchSet;
use crate::display::OutputSink;

/// Tracks how long no file has produced content.
///
/// Fires once per silence period longer than the threshold; a zero
/// threshold never fires.
#[derive(Debug, Clone)]
pub struct QuietTimer {
    threshold: Duration,
    last_activity: Instant,
}

impl QuietTimer {
    /// Start a timer at `now`.
    #[must_use]
    pub fn new(threshold: Duration, now: Instant) -> Self {
        Self {
            threshold,
            last_activity: now,
        }
    }

    /// Record that content was emitted at `now`.
    pub fn record_activity(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Whether the quiet notice is due at `now`. Firing resets the timer.
    pub fn check(&mut self, now: Instant) -> bool {
        if self.threshold.is_zero() {
            return false;
        }
        if now.saturating_duration_since(self.last_activity) > self.threshold {
            self.last_activity = now;
            return true;
        }
        false
    }
}

/// Reads new content of tracked files on a fixed cadence.
#[derive(Debug)]
pub struct Poller<W: Write> {
    watch_set: Arc<WatchSet>,
    sink: OutputSink<W>,
    quiet: QuietTimer,
}

impl<W: Write> Poller<W> {
    /// Create a poller writing to `sink`.
    ///
    /// `quiet_threshold` is how long no file may yield content before a
    /// "no files changed" notice is logged; zero disables the notice.
    pub fn new(watch_set: Arc<WatchSet>, sink: OutputSink<W>, quiet_threshold: Duration) -> Self {
        Self {
            watch_set,
            sink,
            quiet: QuietTimer::new(quiet_threshold, Instant::now()),
        }
    }

    /// Visit every tracked file once, returning the number of bytes emitted.
    pub async fn poll_once(&mut self) -> u64 {
        let mut emitted = 0;

        for (path, offset) in self.watch_set.files() {
            match self.poll_file(&path, offset).await {
                Ok(n) => emitted += n,
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Error reading file");
                }
            }
        }

        let now = Instant::now();
        if emitted > 0 {
            self.quiet.record_activity(now);
        }
        if self.quiet.check(now) {
            tracing::info!("no files changed");
        }

        emitted
    }

    /// Deliver the bytes appended to one file since `offset`.
    async fn poll_file(&mut self, path: &Path, mut offset: u64) -> Result<u64, WatcherError> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if self.watch_set.remove_file(path).is_some() {
                    tracing::info!(path = %path.display(), "Stopped watching file");
                }
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        let file_len = metadata.len();
        let truncated = file_len < offset;
        if truncated {
            tracing::info!(
                path = %path.display(),
                old_offset = offset,
                new_len = file_len,
                "File truncated, re-reading from start"
            );
            offset = 0;
        }

        if file_len == offset {
            if truncated {
                // Truncated to empty; later appends must be read from the start.
                self.watch_set.store_offset(path, 0);
            }
            return Ok(0);
        }

        let mut file = File::open(path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).await?;
        drop(file);

        if data.is_empty() {
            return Ok(0);
        }

        self.sink.emit(path, &data)?;
        let read = data.len() as u64;
        self.watch_set.store_offset(path, offset + read);
        Ok(read)
    }

    /// Get the output sink back, consuming the poller.
    pub fn into_sink(self) -> OutputSink<W> {
        self.sink
    }

    /// Poll every `period` until cancelled.
    pub async fn run(mut self, period: Duration, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }

        tracing::debug!("Poller stopped");
    }
}
