//! Container runtime capability.
//!
//! The container handle only needs a small set of operations from the
//! underlying runtime: launch an image with ports, environment and copied
//! files, report the host and port mapping, and stop. [`ContainerRuntime`]
//! captures that set so the handle and the provisioner can run against
//! Docker through `testcontainers` or against an in-memory double.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use testcontainers::core::IntoContainerPort;
use testcontainers::runners::SyncRunner;
use testcontainers::{Container, ContainerRequest, CopyDataSource, GenericImage, ImageExt};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::errors::RuntimeError;

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;

/// Everything a runtime needs to launch one container.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LaunchRequest {
    pub image: String,
    pub exposed_ports: Vec<u16>,
    pub env: BTreeMap<String, String>,
    pub mounts: Vec<Mount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    /// A single host file copied to exactly `target`.
    File,
    /// A host directory whose files are copied below `target`.
    Directory,
}

/// Host content copied into the container before it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub source: PathBuf,
    pub target: String,
    pub kind: MountKind,
}

impl Mount {
    pub fn file(source: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind: MountKind::File,
        }
    }

    pub fn directory(source: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind: MountKind::Directory,
        }
    }

    /// Individual `(host file, container path)` copies for this mount.
    ///
    /// Directory mounts are walked recursively; each file lands below the
    /// target at its path relative to the source directory.
    ///
    /// # Errors
    /// Fails when the source does not exist, has the wrong kind, or cannot
    /// be walked.
    pub fn expand(&self) -> Result<Vec<(PathBuf, String)>, RuntimeError> {
        match self.kind {
            MountKind::File => {
                if !self.source.is_file() {
                    return Err(self.error("source is not a file"));
                }
                Ok(vec![(self.source.clone(), self.target.clone())])
            }
            MountKind::Directory => {
                if !self.source.is_dir() {
                    return Err(self.error("source is not a directory"));
                }
                let base = self.target.trim_end_matches('/');
                let mut copies = Vec::new();
                for entry in WalkDir::new(&self.source).sort_by_file_name() {
                    let entry = entry.map_err(|e| self.error(e))?;
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    let relative = entry
                        .path()
                        .strip_prefix(&self.source)
                        .map_err(|e| self.error(e))?;
                    copies.push((
                        entry.path().to_path_buf(),
                        format!("{}/{}", base, container_path(relative)),
                    ));
                }
                Ok(copies)
            }
        }
    }

    fn error(&self, reason: impl fmt::Display) -> RuntimeError {
        RuntimeError::Mount {
            source_path: self.source.display().to_string(),
            target: self.target.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Launches containers.
pub trait ContainerRuntime: Send + Sync {
    /// Launch a container and return once the runtime reports it running.
    fn launch(&self, request: &LaunchRequest) -> Result<Box<dyn RuntimeContainer>, RuntimeError>;
}

/// A running container owned by a runtime.
pub trait RuntimeContainer: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    /// Host name or address at which mapped ports are reachable.
    fn host(&self) -> Result<String, RuntimeError>;

    /// Host port mapped to `container_port`.
    fn mapped_port(&self, container_port: u16) -> Result<u16, RuntimeError>;

    fn stop(&self) -> Result<(), RuntimeError>;
}

/// Docker-backed runtime using the blocking `testcontainers` runner.
///
/// Containers are removed when their handle is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct TestcontainersRuntime;

impl TestcontainersRuntime {
    pub fn new() -> Self {
        Self
    }
}

impl ContainerRuntime for TestcontainersRuntime {
    fn launch(&self, request: &LaunchRequest) -> Result<Box<dyn RuntimeContainer>, RuntimeError> {
        let (name, tag) = split_image_reference(&request.image);

        let mut image = GenericImage::new(name, tag);
        for port in &request.exposed_ports {
            image = image.with_exposed_port(port.tcp());
        }

        let mut container_request: ContainerRequest<GenericImage> = image.into();
        for (key, value) in &request.env {
            container_request = container_request.with_env_var(key, value);
        }
        for mount in &request.mounts {
            for (source, target) in mount.expand()? {
                debug!(source = %source.display(), target = %target, "Copying file into container");
                container_request = container_request.with_copy_to(target, CopyDataSource::File(source));
            }
        }

        let container = container_request.start().map_err(|e| RuntimeError::Launch {
            image: request.image.clone(),
            reason: e.to_string(),
        })?;

        info!(
            container_id = container.id(),
            image = %request.image,
            "Container launched"
        );

        Ok(Box::new(DockerContainer { container }))
    }
}

struct DockerContainer {
    container: Container<GenericImage>,
}

impl fmt::Debug for DockerContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DockerContainer")
            .field("id", &self.container.id())
            .finish()
    }
}

impl RuntimeContainer for DockerContainer {
    fn id(&self) -> &str {
        self.container.id()
    }

    fn host(&self) -> Result<String, RuntimeError> {
        self.container
            .get_host()
            .map(|host| host.to_string())
            .map_err(|e| RuntimeError::Inspect {
                container_id: self.id().to_string(),
                what: "host".to_string(),
                reason: e.to_string(),
            })
    }

    fn mapped_port(&self, container_port: u16) -> Result<u16, RuntimeError> {
        self.container
            .get_host_port_ipv4(container_port.tcp())
            .map_err(|e| RuntimeError::Inspect {
                container_id: self.id().to_string(),
                what: format!("mapping for port {container_port}"),
                reason: e.to_string(),
            })
    }

    fn stop(&self) -> Result<(), RuntimeError> {
        self.container.stop().map_err(|e| {
            warn!(container_id = self.id(), error = %e, "Failed to stop container");
            RuntimeError::Stop {
                container_id: self.id().to_string(),
                reason: e.to_string(),
            }
        })
    }
}

/// Split `name[:tag]` into name and tag, defaulting the tag to `latest`.
///
/// A colon before the last `/` belongs to a registry port, not a tag.
pub fn split_image_reference(image: &str) -> (&str, &str) {
    let name_start = image.rfind('/').map_or(0, |slash| slash + 1);
    match image[name_start..].rfind(':') {
        Some(colon) => {
            let split = name_start + colon;
            (&image[..split], &image[split + 1..])
        }
        None => (image, "latest"),
    }
}

fn container_path(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
