//! Endpoint module references and their compiled locations.
//!
//! A module is identified by its fully-qualified name, which is also what the
//! Spektr service reads from the service-registration entry of the archive.
//! Where a module's compiled classes live is answered by a [`ModuleLocator`];
//! [`ModuleTable`] is the explicit registration table used by default.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::debug;

use crate::errors::{ConfigurationError, ConfigurationResult};

#[cfg(test)]
#[path = "module_tests.rs"]
mod tests;

/// Stable, globally unique name of a pluggable endpoint module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleReference(String);

impl ModuleReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ModuleReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ModuleReference {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModuleReference {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ModuleReference {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Resolves a module to the classpath root holding its compiled classes.
///
/// The returned path is either a class directory or a `.jar` file.
pub trait ModuleLocator: Send + Sync {
    fn locate(&self, module: &ModuleReference) -> Option<PathBuf>;
}

#[derive(Debug, Deserialize)]
struct ModuleManifest {
    #[serde(default)]
    modules: HashMap<String, PathBuf>,
}

/// Explicit module-to-location registration table.
///
/// Populated by code (`register`) or from a TOML manifest produced by the
/// build:
///
/// ```toml
/// [modules]
/// "com.example.UsersEndpoints" = "build/classes/kotlin/test"
/// ```
#[derive(Debug, Default)]
pub struct ModuleTable {
    entries: RwLock<HashMap<ModuleReference, PathBuf>>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide table shared by every provisioner built from settings.
    pub fn global() -> &'static ModuleTable {
        static GLOBAL: OnceLock<ModuleTable> = OnceLock::new();
        GLOBAL.get_or_init(ModuleTable::new)
    }

    /// Register (or replace) the location of a module.
    pub fn register(&self, module: impl Into<ModuleReference>, location: impl Into<PathBuf>) {
        let module = module.into();
        let location = location.into();
        debug!(module = %module, location = %location.display(), "Registered endpoint module");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(module, location);
    }

    /// Builder-style variant of [`ModuleTable::register`].
    pub fn with_module(
        self,
        module: impl Into<ModuleReference>,
        location: impl Into<PathBuf>,
    ) -> Self {
        self.register(module, location);
        self
    }

    /// Load every entry of a TOML manifest file.
    ///
    /// Relative locations are resolved against the manifest's directory.
    pub fn load_manifest(&self, manifest: &Path) -> ConfigurationResult<usize> {
        let content = std::fs::read_to_string(manifest).map_err(|e| {
            ConfigurationError::ManifestAccessError {
                path: manifest.display().to_string(),
                reason: e.to_string(),
            }
        })?;
        let base = manifest.parent().unwrap_or_else(|| Path::new("."));
        self.load_entries(&content, base, &manifest.display().to_string())
    }

    /// Load manifest content, resolving relative locations against `base`.
    pub fn load_manifest_str(&self, content: &str, base: &Path) -> ConfigurationResult<usize> {
        self.load_entries(content, base, "<inline>")
    }

    fn load_entries(&self, content: &str, base: &Path, label: &str) -> ConfigurationResult<usize> {
        let manifest: ModuleManifest =
            toml::from_str(content).map_err(|e| ConfigurationError::ManifestParseError {
                path: label.to_string(),
                reason: e.to_string(),
            })?;

        let count = manifest.modules.len();
        for (name, location) in manifest.modules {
            let location = if location.is_absolute() {
                location
            } else {
                base.join(location)
            };
            self.register(name, location);
        }
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ModuleLocator for ModuleTable {
    fn locate(&self, module: &ModuleReference) -> Option<PathBuf> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(module)
            .cloned()
    }
}

impl<L: ModuleLocator + ?Sized> ModuleLocator for &L {
    fn locate(&self, module: &ModuleReference) -> Option<PathBuf> {
        (**self).locate(module)
    }
}

impl<L: ModuleLocator + ?Sized> ModuleLocator for Arc<L> {
    fn locate(&self, module: &ModuleReference) -> Option<PathBuf> {
        (**self).locate(module)
    }
}
