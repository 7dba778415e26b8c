//! Primary output stream: file content with path separators.
//!
//! Only file bytes and separator lines are ever written here. Diagnostics go
//! through `tracing` to stderr.

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use owo_colors::OwoColorize;

/// When to render separators in color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorChoice {
    /// Color when stdout is a terminal.
    #[default]
    Auto,
    /// Always color.
    Always,
    /// Never color.
    Never,
}

impl ColorChoice {
    /// Decide whether stdout output should be colored.
    #[must_use]
    pub fn enabled(self) -> bool {
        match self {
            Self::Auto => io::stdout().is_terminal(),
            Self::Always => true,
            Self::Never => false,
        }
    }
}

/// Format the separator line announcing a file's content.
#[must_use]
pub fn separator(path: &Path) -> String {
    format!("--- {} ---", path.display())
}

/// Writes file chunks to the primary sink, announcing each switch of
/// source file with a separator.
#[derive(Debug)]
pub struct OutputSink<W: Write> {
    out: W,
    last_path: Option<PathBuf>,
    color: bool,
}

impl OutputSink<io::Stdout> {
    /// Sink writing to standard output.
    #[must_use]
    pub fn stdout(color: ColorChoice) -> Self {
        Self::new(io::stdout(), color.enabled())
    }
}

impl<W: Write> OutputSink<W> {
    /// Wrap a writer.
    pub fn new(out: W, color: bool) -> Self {
        Self {
            out,
            last_path: None,
            color,
        }
    }

    /// Write a chunk read from `path`.
    ///
    /// A blank line and a separator precede the chunk whenever the previous
    /// chunk came from another file or nothing was written yet.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to or flushing the underlying writer fails.
    pub fn emit(&mut self, path: &Path, data: &[u8]) -> io::Result<()> {
        if self.last_path.as_deref() != Some(path) {
            writeln!(self.out)?;
            let line = separator(path);
            if self.color {
                writeln!(self.out, "{}", line.bold())?;
            } else {
                writeln!(self.out, "{line}")?;
            }
            self.last_path = Some(path.to_path_buf());
        }

        self.out.write_all(data)?;
        self.out.flush()
    }

    /// Path of the most recently emitted chunk.
    #[must_use]
    pub fn last_path(&self) -> Option<&Path> {
        self.last_path.as_deref()
    }

    /// Get the underlying writer back.
    pub fn into_inner(self) -> W {
        self.out
    }
}
