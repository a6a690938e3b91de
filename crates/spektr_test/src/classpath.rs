//! Classpath roots scanned for supporting classes.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::settings::SpektrSettings;

#[cfg(test)]
#[path = "classpath_tests.rs"]
mod tests;

/// Path segments of build caches, dependency caches and runtime libraries.
///
/// Roots containing any of these are infrastructure, not project code.
pub const DEFAULT_SKIP_SEGMENTS: &[&str] = &[
    "/.gradle/",
    "/gradle/caches/",
    "/.m2/",
    "/jdk/",
    "/jre/",
    "/.cargo/registry/",
    "/.rustup/",
];

/// Ordered classpath roots plus the denylist applied to them.
#[derive(Debug, Clone, PartialEq)]
pub struct Classpath {
    roots: Vec<PathBuf>,
    skip_segments: Vec<String>,
}

impl Default for Classpath {
    fn default() -> Self {
        Self::new(Vec::<PathBuf>::new())
    }
}

impl Classpath {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            skip_segments: DEFAULT_SKIP_SEGMENTS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn from_settings(settings: &SpektrSettings) -> Self {
        Self::new(settings.classpath.iter().cloned())
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    /// Add a path substring that excludes matching roots.
    pub fn with_skip_segment(mut self, segment: impl Into<String>) -> Self {
        self.skip_segments.push(segment.into());
        self
    }

    /// Every configured root, before filtering.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Whether the absolute form of `path` contains a denylisted segment.
    pub fn is_skipped(&self, path: &Path) -> bool {
        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let normalized = absolute.to_string_lossy().replace('\\', "/");
        self.skip_segments
            .iter()
            .any(|segment| normalized.contains(segment.as_str()))
    }

    /// Roots that exist and are not denylisted, in configured order.
    pub fn effective_roots(&self) -> Vec<PathBuf> {
        self.roots
            .iter()
            .filter(|root| {
                if self.is_skipped(root) {
                    debug!(root = %root.display(), "Skipping infrastructure classpath root");
                    return false;
                }
                if !root.exists() {
                    debug!(root = %root.display(), "Skipping missing classpath root");
                    return false;
                }
                true
            })
            .cloned()
            .collect()
    }
}
