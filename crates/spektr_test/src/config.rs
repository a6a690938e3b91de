//! Declared provisioning configuration.
//!
//! A [`ProvisioningConfig`] describes the Spektr container a test suite
//! needs. It is immutable once built; use [`ProvisioningConfig::builder`]
//! to create one.

use std::path::Path;
use tracing::warn;

use crate::errors::{ConfigurationError, ConfigurationResult};
use crate::fingerprint::ConfigFingerprint;
use crate::module::ModuleReference;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Image used when a configuration does not name one.
pub const DEFAULT_IMAGE: &str = "spektr:local";

/// What gets mounted into the container's endpoint-jar directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackagingSource<'a> {
    /// Package these modules into a fresh archive.
    Modules(&'a [ModuleReference]),

    /// Mount a directory of pre-built endpoint jars.
    PrebuiltDirectory(&'a Path),

    /// Mount nothing.
    None,
}

/// Immutable description of a desired Spektr container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningConfig {
    image: String,
    endpoint_jars_path: String,
    modules: Vec<ModuleReference>,
    rest_enabled: bool,
    soap_enabled: bool,
    uses_https: bool,
    properties: Vec<String>,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            endpoint_jars_path: String::new(),
            modules: Vec::new(),
            rest_enabled: true,
            soap_enabled: true,
            uses_https: false,
            properties: Vec::new(),
        }
    }
}

impl ProvisioningConfig {
    pub fn builder() -> ProvisioningConfigBuilder {
        ProvisioningConfigBuilder::default()
    }

    /// Container image reference, e.g. `spektr:local`.
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Directory of pre-built endpoint jars; blank when unused.
    pub fn endpoint_jars_path(&self) -> &str {
        &self.endpoint_jars_path
    }

    /// Modules to package, in declaration order.
    pub fn modules(&self) -> &[ModuleReference] {
        &self.modules
    }

    pub fn rest_enabled(&self) -> bool {
        self.rest_enabled
    }

    pub fn soap_enabled(&self) -> bool {
        self.soap_enabled
    }

    pub fn uses_https(&self) -> bool {
        self.uses_https
    }

    /// Property names that receive the container's base URL.
    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    /// The active packaging source.
    ///
    /// Modules take precedence over a pre-built path; a blank path counts as
    /// no path.
    pub fn packaging_source(&self) -> PackagingSource<'_> {
        if !self.modules.is_empty() {
            PackagingSource::Modules(&self.modules)
        } else if !self.endpoint_jars_path.trim().is_empty() {
            PackagingSource::PrebuiltDirectory(Path::new(&self.endpoint_jars_path))
        } else {
            PackagingSource::None
        }
    }

    pub fn fingerprint(&self) -> ConfigFingerprint {
        ConfigFingerprint::of(self)
    }
}

/// Builder for [`ProvisioningConfig`].
///
/// # Examples
///
/// ```
/// use spektr_test::ProvisioningConfig;
///
/// let config = ProvisioningConfig::builder()
///     .module("com.example.UsersEndpoints")
///     .soap_enabled(false)
///     .property("users.client.base-url")
///     .build()
///     .unwrap();
///
/// assert_eq!(config.image(), "spektr:local");
/// assert_eq!(config.modules().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ProvisioningConfigBuilder {
    config: ProvisioningConfig,
}

impl ProvisioningConfigBuilder {
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.config.image = image.into();
        self
    }

    pub fn endpoint_jars_path(mut self, path: impl Into<String>) -> Self {
        self.config.endpoint_jars_path = path.into();
        self
    }

    /// Append a module to package.
    pub fn module(mut self, module: impl Into<ModuleReference>) -> Self {
        self.config.modules.push(module.into());
        self
    }

    /// Append several modules, keeping their order.
    pub fn modules<I, M>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<ModuleReference>,
    {
        self.config
            .modules
            .extend(modules.into_iter().map(Into::into));
        self
    }

    pub fn rest_enabled(mut self, enabled: bool) -> Self {
        self.config.rest_enabled = enabled;
        self
    }

    pub fn soap_enabled(mut self, enabled: bool) -> Self {
        self.config.soap_enabled = enabled;
        self
    }

    pub fn uses_https(mut self, https: bool) -> Self {
        self.config.uses_https = https;
        self
    }

    /// Add a property name that receives the base URL.
    pub fn property(mut self, name: impl Into<String>) -> Self {
        self.config.properties.push(name.into());
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    /// Returns `ConfigurationError::InvalidConfiguration` when the image,
    /// a module name or a property name is blank.
    pub fn build(self) -> ConfigurationResult<ProvisioningConfig> {
        let config = self.config;

        if config.image.trim().is_empty() {
            return Err(ConfigurationError::InvalidConfiguration {
                field: "image".to_string(),
                reason: "image reference must not be blank".to_string(),
            });
        }

        if config.modules.iter().any(|m| m.as_str().trim().is_empty()) {
            return Err(ConfigurationError::InvalidConfiguration {
                field: "modules".to_string(),
                reason: "module names must not be blank".to_string(),
            });
        }

        if config.properties.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigurationError::InvalidConfiguration {
                field: "properties".to_string(),
                reason: "property names must not be blank".to_string(),
            });
        }

        if !config.modules.is_empty() && !config.endpoint_jars_path.trim().is_empty() {
            warn!(
                path = %config.endpoint_jars_path,
                modules = config.modules.len(),
                "Both modules and a pre-built endpoint jar path are declared; the modules win"
            );
        }

        Ok(config)
    }
}
