//! Cached Spektr containers for integration tests.
//!
//! Test suites declare the Spektr instance they need as a
//! [`ProvisioningConfig`]. The [`Provisioner`] fingerprints that
//! configuration and starts one container per distinct fingerprint, however
//! many suites ask for it concurrently. Module-based configurations are
//! packaged into a jar with a service-registration entry before the
//! container starts. The container's base URL is published to
//! [`Properties`] for code that wires up the service under test.

// Declared configuration
pub mod config;
pub mod fingerprint;
pub mod settings;

// Endpoint module packaging
pub mod assembler;
pub mod classpath;
pub mod module;

// Containers
pub mod container;
pub mod runtime;

// Provisioning
pub mod properties;
pub mod provisioner;
pub mod registry;

pub mod errors;

// In-memory doubles for tests
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use assembler::{ArtifactAssembler, AssembledArtifact, ModuleJarBuilder};
pub use classpath::Classpath;
pub use config::{PackagingSource, ProvisioningConfig, ProvisioningConfigBuilder};
pub use container::{HealthCheck, SpektrContainer, StartedSpektr};
pub use errors::{
    AssemblyError, ConfigurationError, ConfigurationResult, ContainerError, ProvisionError,
    ProvisionResult, RuntimeError,
};
pub use fingerprint::ConfigFingerprint;
pub use module::{ModuleLocator, ModuleReference, ModuleTable};
pub use properties::{Properties, BASE_URL_PROPERTY};
pub use provisioner::{Provisioner, SpektrSuite};
pub use registry::{ContainerRecord, ContainerRegistry};
pub use runtime::{ContainerRuntime, LaunchRequest, Mount, RuntimeContainer, TestcontainersRuntime};
pub use settings::SpektrSettings;
