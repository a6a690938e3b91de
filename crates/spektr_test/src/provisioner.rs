//! Provisioning entry point for test suites.
//!
//! A [`Provisioner`] turns a [`ProvisioningConfig`] into a running Spektr
//! container, starting at most one container per configuration fingerprint
//! for its whole lifetime. Suites usually go through
//! [`Provisioner::global`], which lives until the test process exits.
//!
//! # Examples
//!
//! ```no_run
//! use spektr_test::{Provisioner, ProvisioningConfig, SpektrSuite};
//!
//! struct UsersApiTests;
//!
//! impl SpektrSuite for UsersApiTests {
//!     fn spektr_config() -> Option<ProvisioningConfig> {
//!         ProvisioningConfig::builder()
//!             .module("com.example.UsersEndpoints")
//!             .property("users.client.base-url")
//!             .build()
//!             .ok()
//!     }
//! }
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provisioner = Provisioner::global()?;
//! provisioner.before_all_for::<UsersApiTests>()?;
//!
//! let spektr = provisioner.resolve_for::<UsersApiTests>().expect("started above");
//! println!("{}", spektr.base_url());
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info};

use crate::assembler::{ArtifactAssembler, ModuleJarBuilder};
use crate::classpath::Classpath;
use crate::config::{PackagingSource, ProvisioningConfig};
use crate::container::{HealthCheck, SpektrContainer, DEFAULT_POLL_INTERVAL};
use crate::errors::{ConfigurationError, ConfigurationResult, ProvisionError, ProvisionResult};
use crate::fingerprint::ConfigFingerprint;
use crate::module::ModuleTable;
use crate::properties::Properties;
use crate::registry::{ContainerRecord, ContainerRegistry};
use crate::runtime::{ContainerRuntime, TestcontainersRuntime};
use crate::settings::{SpektrSettings, DEFAULT_EXPOSED_PORT, DEFAULT_STARTUP_TIMEOUT};

#[cfg(test)]
#[path = "provisioner_tests.rs"]
mod tests;

/// A test suite that may declare the Spektr container it needs.
pub trait SpektrSuite {
    /// The suite's declared configuration, or `None` if it declares none.
    fn spektr_config() -> Option<ProvisioningConfig>;
}

/// Starts and caches Spektr containers by configuration fingerprint.
pub struct Provisioner {
    runtime: Arc<dyn ContainerRuntime>,
    assembler: Arc<dyn ArtifactAssembler>,
    properties: Properties,
    registry: ContainerRegistry,
    exposed_port: u16,
    startup_timeout: Duration,
    poll_interval: Duration,
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("exposed_port", &self.exposed_port)
            .field("startup_timeout", &self.startup_timeout)
            .field("running", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Provisioner {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        assembler: Arc<dyn ArtifactAssembler>,
        properties: Properties,
    ) -> Self {
        Self {
            runtime,
            assembler,
            properties,
            registry: ContainerRegistry::new(),
            exposed_port: DEFAULT_EXPOSED_PORT,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Docker-backed provisioner configured from `settings`.
    ///
    /// Modules resolve through [`ModuleTable::global`], which is first
    /// seeded from the settings' module manifest when one is configured.
    /// Base URLs are published to [`Properties::global`], mirrored to the
    /// settings' properties file when one is configured.
    ///
    /// # Errors
    /// Fails when the configured module manifest cannot be read or parsed.
    pub fn from_settings(settings: &SpektrSettings) -> ConfigurationResult<Self> {
        let modules = ModuleTable::global();
        if let Some(manifest) = &settings.module_manifest {
            modules.load_manifest(manifest)?;
        }

        let assembler = ModuleJarBuilder::new(modules, Classpath::from_settings(settings))
            .with_output_dir(&settings.artifact_dir);

        let mut properties = Properties::global().clone();
        if let Some(path) = &settings.properties_file {
            properties = properties.with_file_mirror(path);
        }

        Ok(Self::new(
            Arc::new(TestcontainersRuntime::new()),
            Arc::new(assembler),
            properties,
        )
        .with_exposed_port(settings.exposed_port)
        .with_startup_timeout(settings.startup_timeout))
    }

    /// The process-wide provisioner, built from the environment on first use.
    ///
    /// # Errors
    /// Returns the settings error on every call if the environment is invalid.
    pub fn global() -> ConfigurationResult<&'static Provisioner> {
        static GLOBAL: OnceLock<Result<Provisioner, ConfigurationError>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| SpektrSettings::from_env().and_then(|s| Self::from_settings(&s)))
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Container port that Spektr listens on.
    pub fn with_exposed_port(mut self, port: u16) -> Self {
        self.exposed_port = port;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_health_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Return the container for `config`, starting it if needed.
    ///
    /// The base URL is published under the well-known key and every
    /// property named by `config` on each call, since configurations that
    /// share a fingerprint may name different properties.
    ///
    /// # Errors
    /// Returns the assembly or startup failure, attributed to the
    /// configuration's fingerprint.
    pub fn get_or_start(&self, config: &ProvisioningConfig) -> ProvisionResult<Arc<ContainerRecord>> {
        let fingerprint = config.fingerprint();
        let record = self
            .registry
            .get_or_init(&fingerprint, || self.start_container(config, &fingerprint))?;

        self.properties
            .publish_base_url(record.base_url(), config.properties());
        Ok(record)
    }

    /// Suite setup: start the declared container, or do nothing if none is declared.
    pub fn before_all(
        &self,
        config: Option<&ProvisioningConfig>,
    ) -> ProvisionResult<Option<Arc<ContainerRecord>>> {
        match config {
            Some(config) => self.get_or_start(config).map(Some),
            None => {
                debug!("No Spektr configuration declared; skipping provisioning");
                Ok(None)
            }
        }
    }

    /// The running container for a declared configuration.
    ///
    /// Looks up by the configuration's own fingerprint, so a suite never
    /// receives a container started for a different configuration.
    pub fn resolve(&self, config: Option<&ProvisioningConfig>) -> Option<Arc<ContainerRecord>> {
        let config = config?;
        self.registry.get(&config.fingerprint())
    }

    pub fn before_all_for<S: SpektrSuite>(&self) -> ProvisionResult<Option<Arc<ContainerRecord>>> {
        self.before_all(S::spektr_config().as_ref())
    }

    pub fn resolve_for<S: SpektrSuite>(&self) -> Option<Arc<ContainerRecord>> {
        self.resolve(S::spektr_config().as_ref())
    }

    /// Number of containers started so far.
    pub fn running(&self) -> usize {
        self.registry.len()
    }

    fn start_container(
        &self,
        config: &ProvisioningConfig,
        fingerprint: &ConfigFingerprint,
    ) -> ProvisionResult<ContainerRecord> {
        info!(fingerprint = %fingerprint, image = config.image(), "Provisioning Spektr container");

        let mut container = SpektrContainer::new(config.image())
            .with_exposed_port(self.exposed_port)
            .with_https(config.uses_https())
            .with_health_check(HealthCheck {
                timeout: self.startup_timeout,
                poll_interval: self.poll_interval,
                ..HealthCheck::default()
            })
            .with_rest_enabled(config.rest_enabled())
            .with_soap_enabled(config.soap_enabled());

        let artifact = match config.packaging_source() {
            PackagingSource::Modules(modules) => {
                let artifact = self.assembler.assemble(modules).map_err(|source| {
                    ProvisionError::Assembly {
                        fingerprint: fingerprint.clone(),
                        source,
                    }
                })?;
                container = container.with_endpoint_jar_file(artifact.path());
                Some(artifact)
            }
            PackagingSource::PrebuiltDirectory(dir) => {
                container = container.with_endpoint_jars_dir(dir);
                None
            }
            PackagingSource::None => None,
        };

        let started = container
            .start(self.runtime.as_ref())
            .map_err(|source| ProvisionError::Startup {
                fingerprint: fingerprint.clone(),
                source,
            })?;

        // The runtime copied the archive at launch.
        drop(artifact);

        Ok(ContainerRecord::new(fingerprint.clone(), started))
    }
}
