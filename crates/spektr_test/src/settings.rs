//! Process-level settings loaded from the environment.
//!
//! These cover what is shared by every provisioned container in a test
//! process: where the classpath roots are, where assembled archives go,
//! which container port Spektr listens on and how long startup may take.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{ConfigurationError, ConfigurationResult};

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;

/// Platform path list of classpath roots scanned for supporting classes.
pub const CLASSPATH_ENV: &str = "SPEKTR_CLASSPATH";

/// TOML module table mapping module names to compiled locations.
pub const MODULE_MANIFEST_ENV: &str = "SPEKTR_MODULE_MANIFEST";

/// Directory that receives assembled endpoint archives.
pub const ARTIFACT_DIR_ENV: &str = "SPEKTR_ARTIFACT_DIR";

/// Container port the Spektr service listens on.
pub const EXPOSED_PORT_ENV: &str = "SPEKTR_EXPOSED_PORT";

/// Seconds the health probe may take before startup fails.
pub const STARTUP_TIMEOUT_ENV: &str = "SPEKTR_STARTUP_TIMEOUT_SECS";

/// File that mirrors published properties as a TOML table.
pub const PROPERTIES_FILE_ENV: &str = "SPEKTR_PROPERTIES_FILE";

pub const DEFAULT_EXPOSED_PORT: u16 = 8080;
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Largest accepted startup timeout: one day.
pub const MAX_STARTUP_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Settings shared by every container provisioned in this process.
#[derive(Debug, Clone, PartialEq)]
pub struct SpektrSettings {
    /// Classpath roots, in order.
    pub classpath: Vec<PathBuf>,

    /// Optional module table manifest.
    pub module_manifest: Option<PathBuf>,

    /// Where assembled archives are written.
    pub artifact_dir: PathBuf,

    pub exposed_port: u16,

    pub startup_timeout: Duration,

    /// Optional file mirroring published properties.
    pub properties_file: Option<PathBuf>,
}

impl Default for SpektrSettings {
    fn default() -> Self {
        Self {
            classpath: Vec::new(),
            module_manifest: None,
            artifact_dir: env::temp_dir(),
            exposed_port: DEFAULT_EXPOSED_PORT,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            properties_file: None,
        }
    }
}

impl SpektrSettings {
    /// Load settings from environment variables.
    ///
    /// Every variable is optional; unset variables keep their defaults.
    ///
    /// # Errors
    /// Returns `ConfigurationError::InvalidSetting` when a numeric variable
    /// cannot be parsed, is zero, or the startup timeout exceeds
    /// [`MAX_STARTUP_TIMEOUT_SECS`].
    pub fn from_env() -> ConfigurationResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigurationResult<Self> {
        let mut settings = Self::default();

        if let Some(classpath) = lookup(CLASSPATH_ENV) {
            settings.classpath = env::split_paths(&classpath)
                .filter(|path| !path.as_os_str().is_empty())
                .collect();
        }

        settings.module_manifest = lookup(MODULE_MANIFEST_ENV)
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        if let Some(dir) = lookup(ARTIFACT_DIR_ENV).filter(|value| !value.trim().is_empty()) {
            settings.artifact_dir = PathBuf::from(dir);
        }

        if let Some(port) = lookup(EXPOSED_PORT_ENV) {
            settings.exposed_port = parse_positive(EXPOSED_PORT_ENV, &port)?;
        }

        if let Some(seconds) = lookup(STARTUP_TIMEOUT_ENV) {
            let parsed = parse_positive::<u64>(STARTUP_TIMEOUT_ENV, &seconds)?;
            if parsed > MAX_STARTUP_TIMEOUT_SECS {
                return Err(ConfigurationError::InvalidSetting {
                    key: STARTUP_TIMEOUT_ENV.to_string(),
                    value: seconds,
                    reason: format!("must not exceed {MAX_STARTUP_TIMEOUT_SECS} seconds"),
                });
            }
            settings.startup_timeout = Duration::from_secs(parsed);
        }

        settings.properties_file = lookup(PROPERTIES_FILE_ENV)
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Ok(settings)
    }
}

fn parse_positive<T>(key: &str, value: &str) -> ConfigurationResult<T>
where
    T: std::str::FromStr + PartialEq + Default,
    T::Err: std::fmt::Display,
{
    let parsed = value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigurationError::InvalidSetting {
            key: key.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })?;

    if parsed == T::default() {
        return Err(ConfigurationError::InvalidSetting {
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }

    Ok(parsed)
}
