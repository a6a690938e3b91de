//! Process-wide key/value properties.
//!
//! Started containers publish their base URL here so that code wiring up
//! the service under test can find Spektr. Writes overwrite; the last
//! writer wins.
//!
//! Readers that must not depend on this crate can enable a file mirror:
//! every write rewrites a TOML table of all properties, e.g.
//!
//! ```toml
//! "spektr.base-url" = "http://localhost:32768"
//! ```

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "properties_tests.rs"]
mod tests;

/// Key under which every started container's base URL is published.
pub const BASE_URL_PROPERTY: &str = "spektr.base-url";

/// Shared handle to a property store; clones see the same values.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    values: Arc<RwLock<HashMap<String, String>>>,
    mirror: Option<PathBuf>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// The store shared by the whole test process.
    pub fn global() -> &'static Properties {
        static GLOBAL: OnceLock<Properties> = OnceLock::new();
        GLOBAL.get_or_init(Properties::new)
    }

    /// Rewrite `path` with every property after each write through this handle.
    ///
    /// The file is replaced atomically. Failing to write it is logged and
    /// does not affect the in-memory store.
    pub fn with_file_mirror(mut self, path: impl Into<PathBuf>) -> Self {
        self.mirror = Some(path.into());
        self
    }

    pub fn mirror_path(&self) -> Option<&Path> {
        self.mirror.as_deref()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.into(), value.into());
        self.write_mirror(&values);
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Publish `base_url` under [`BASE_URL_PROPERTY`] and every extra key.
    pub fn publish_base_url<S: AsRef<str>>(&self, base_url: &str, extra_keys: &[S]) {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(BASE_URL_PROPERTY.to_string(), base_url.to_string());
        for key in extra_keys {
            values.insert(key.as_ref().to_string(), base_url.to_string());
        }
        self.write_mirror(&values);
        info!(
            base_url = base_url,
            extra_keys = extra_keys.len(),
            "Published Spektr base URL"
        );
    }

    /// All properties, sorted by key.
    pub fn snapshot(&self) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort();
        entries
    }

    // Called with the write lock held so mirror writes land in order.
    fn write_mirror(&self, values: &HashMap<String, String>) {
        let Some(path) = &self.mirror else {
            return;
        };
        match write_table(path, values) {
            Ok(()) => debug!(path = %path.display(), entries = values.len(), "Mirrored properties"),
            Err(reason) => {
                warn!(path = %path.display(), error = %reason, "Failed to mirror properties")
            }
        }
    }
}

fn write_table(path: &Path, values: &HashMap<String, String>) -> Result<(), String> {
    let sorted: BTreeMap<&str, &str> = values
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    let content = toml::to_string(&sorted).map_err(|e| e.to_string())?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| e.to_string())?;

    let mut staged = tempfile::NamedTempFile::new_in(dir).map_err(|e| e.to_string())?;
    staged
        .write_all(content.as_bytes())
        .map_err(|e| e.to_string())?;
    staged.persist(path).map_err(|e| e.error.to_string())?;
    Ok(())
}
