//! Error types for Spektr provisioning.
//!
//! Each stage of provisioning has its own error family. Reasons are carried
//! as strings so that every error is `Clone`: a failed container start is
//! handed to every test that was waiting on it.

use std::time::Duration;
use thiserror::Error;

use crate::fingerprint::ConfigFingerprint;

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Invalid or missing configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Invalid provisioning configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("Invalid setting {key}='{value}': {reason}")]
    InvalidSetting {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read module manifest: {path} - {reason}")]
    ManifestAccessError { path: String, reason: String },

    #[error("Failed to parse module manifest: {path} - {reason}")]
    ManifestParseError { path: String, reason: String },
}

/// Failures while building the endpoint module archive.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssemblyError {
    /// No location is registered for the module.
    #[error("No compiled location is registered for endpoint module '{module}'")]
    ModuleNotLocated { module: String },

    /// A location is registered but nothing exists there.
    #[error("Endpoint module '{module}' is registered at {path}, which does not exist")]
    ModuleLocationMissing { module: String, path: String },

    #[error("Nothing to assemble: the module list is empty")]
    NoModules,

    #[error("File system operation '{operation}' failed for {path}: {reason}")]
    Io {
        operation: String,
        path: String,
        reason: String,
    },

    #[error("Archive operation '{operation}' failed for {path}: {reason}")]
    Archive {
        operation: String,
        path: String,
        reason: String,
    },
}

impl AssemblyError {
    pub(crate) fn io(
        operation: &str,
        path: &std::path::Path,
        error: impl std::fmt::Display,
    ) -> Self {
        Self::Io {
            operation: operation.to_string(),
            path: path.display().to_string(),
            reason: error.to_string(),
        }
    }

    pub(crate) fn archive(
        operation: &str,
        path: &std::path::Path,
        error: impl std::fmt::Display,
    ) -> Self {
        Self::Archive {
            operation: operation.to_string(),
            path: path.display().to_string(),
            reason: error.to_string(),
        }
    }
}

/// Failures reported by a container runtime.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Failed to launch container from image '{image}': {reason}")]
    Launch { image: String, reason: String },

    #[error("Failed to prepare mount {source_path} -> {target}: {reason}")]
    Mount {
        source_path: String,
        target: String,
        reason: String,
    },

    #[error("Container {container_id} could not report its {what}: {reason}")]
    Inspect {
        container_id: String,
        what: String,
        reason: String,
    },

    #[error("Failed to stop container {container_id}: {reason}")]
    Stop {
        container_id: String,
        reason: String,
    },
}

/// Failures while starting a Spektr container.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContainerError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// The health probe did not succeed in time. The container has been stopped.
    #[error(
        "Container from image '{image}' was not healthy at {health_url} within {timeout:?} (last probe: {last_outcome})"
    )]
    StartupTimeout {
        image: String,
        health_url: String,
        timeout: Duration,
        last_outcome: String,
    },

    #[error("Failed to build the health probe client: {reason}")]
    ProbeClient { reason: String },
}

/// Top-level provisioning failure, attributed to the configuration that failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProvisionError {
    #[error("Failed to assemble endpoint modules for Spektr configuration [{fingerprint}]: {source}")]
    Assembly {
        fingerprint: ConfigFingerprint,
        #[source]
        source: AssemblyError,
    },

    #[error("Failed to start Spektr container for configuration [{fingerprint}]: {source}")]
    Startup {
        fingerprint: ConfigFingerprint,
        #[source]
        source: ContainerError,
    },

    #[error("Provisioning panicked for Spektr configuration [{fingerprint}]")]
    InitializerPanicked { fingerprint: ConfigFingerprint },
}

impl ProvisionError {
    /// Fingerprint of the configuration whose provisioning failed.
    pub fn fingerprint(&self) -> &ConfigFingerprint {
        match self {
            Self::Assembly { fingerprint, .. }
            | Self::Startup { fingerprint, .. }
            | Self::InitializerPanicked { fingerprint } => fingerprint,
        }
    }
}

/// Result type alias for configuration operations.
pub type ConfigurationResult<T> = Result<T, ConfigurationError>;

/// Result type alias for provisioning operations.
pub type ProvisionResult<T> = Result<T, ProvisionError>;
