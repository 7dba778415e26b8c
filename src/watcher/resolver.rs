//! Glob pattern resolution to canonical file paths.
//!
//! Each pattern is split into a literal base directory and a wildcard
//! suffix. The suffix is matched against every entry found by walking the
//! base directory, so `**` can descend any number of levels while `*` and
//! `?` stay within one path component.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use walkdir::WalkDir;

use super::error::WatcherError;

const GLOB_META: [char; 4] = ['*', '?', '[', '{'];

/// Split a pattern into its literal base directory and wildcard suffix.
///
/// A pattern without wildcards splits at its last separator, so a plain
/// file path resolves to itself.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use globtail::watcher::split_pattern;
///
/// assert_eq!(
///     split_pattern("/var/log/**/*.log"),
///     (PathBuf::from("/var/log"), "**/*.log".to_string())
/// );
/// assert_eq!(split_pattern("*.log"), (PathBuf::from("."), "*.log".to_string()));
/// ```
#[must_use]
pub fn split_pattern(pattern: &str) -> (PathBuf, String) {
    let literal_end = pattern.find(&GLOB_META[..]).unwrap_or(pattern.len());

    match pattern[..literal_end].rfind('/') {
        Some(0) => (PathBuf::from("/"), pattern[1..].to_string()),
        Some(idx) => (
            PathBuf::from(&pattern[..idx]),
            pattern[idx + 1..].to_string(),
        ),
        None => (PathBuf::from("."), pattern.to_string()),
    }
}

/// Resolve a matched path to its canonical form.
///
/// Falls back to the absolute, unresolved path when symlink resolution
/// fails (broken link, permission denied on an intermediate directory).
#[must_use]
pub fn canonicalize_or_absolute(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    std::fs::canonicalize(&absolute).unwrap_or(absolute)
}

/// Resolves a fixed set of glob patterns to canonical file paths.
#[derive(Debug, Clone)]
pub struct PathResolver {
    patterns: Vec<String>,
}

impl PathResolver {
    /// Create a resolver for the given patterns.
    #[must_use]
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }

    /// Resolve every pattern to the deduplicated list of canonical paths
    /// currently matching at least one of them.
    ///
    /// A pattern that fails to expand is logged and contributes nothing; the
    /// remaining patterns are still resolved.
    #[must_use]
    pub fn resolve(&self) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        let mut resolved = Vec::new();

        for pattern in &self.patterns {
            let result = Self::expand(pattern, &mut |path: PathBuf| {
                let canonical = canonicalize_or_absolute(&path);
                if seen.insert(canonical.clone()) {
                    resolved.push(canonical);
                }
            });

            if let Err(e) = result {
                tracing::error!(pattern = %pattern, error = %e, "Error with glob pattern");
            }
        }

        resolved
    }

    /// Check whether a canonical path matches any configured pattern.
    ///
    /// Runs the same resolution as [`PathResolver::resolve`] so the two
    /// always agree.
    #[must_use]
    pub fn matches(&self, canonical: &Path) -> bool {
        self.resolve().iter().any(|p| p == canonical)
    }

    /// Expand a single pattern, calling `visit` for every matching
    /// non-directory entry below its base directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern cannot be compiled or its base
    /// directory cannot be read. Entries below the base that cannot be read
    /// are logged and skipped.
    pub fn expand(pattern: &str, visit: &mut dyn FnMut(PathBuf)) -> Result<(), WatcherError> {
        let (base, suffix) = split_pattern(pattern);

        let matcher = compile(&suffix).map_err(|source| WatcherError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;

        let base_meta = std::fs::metadata(&base).map_err(|source| WatcherError::BaseDir {
            path: base.clone(),
            source,
        })?;
        if !base_meta.is_dir() {
            return Ok(());
        }

        let mut walker = WalkDir::new(&base).min_depth(1);
        if !suffix.contains("**") {
            walker = walker.max_depth(suffix.split('/').filter(|s| !s.is_empty()).count());
        }

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) if source.depth() == 0 => {
                    return Err(WatcherError::Walk {
                        pattern: pattern.to_string(),
                        source,
                    });
                }
                Err(e) => {
                    tracing::error!(pattern = %pattern, error = %e, "Skipping unreadable path");
                    continue;
                }
            };

            let Ok(relative) = entry.path().strip_prefix(&base) else {
                continue;
            };
            if !matcher.is_match(relative) {
                continue;
            }

            // Follows symlinks; a broken link is not a directory and is kept.
            if entry.path().is_dir() {
                continue;
            }

            visit(entry.into_path());
        }

        Ok(())
    }
}

fn compile(suffix: &str) -> Result<GlobMatcher, globset::Error> {
    Ok(GlobBuilder::new(suffix)
        .literal_separator(true)
        .build()?
        .compile_matcher())
}
