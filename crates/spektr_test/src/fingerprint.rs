//! Configuration fingerprints.
//!
//! A fingerprint is the identity of a container: two configurations with the
//! same fingerprint share one container. It is derived from every field that
//! changes what gets started and nothing else, so the property names a test
//! wants the base URL published under are not part of it.

use crate::config::ProvisioningConfig;

#[cfg(test)]
#[path = "fingerprint_tests.rs"]
mod tests;

const FIELD_SEPARATOR: char = '|';
const MODULE_SEPARATOR: char = ',';
const ESCAPE: char = '\\';

/// Deterministic identity string of a [`ProvisioningConfig`].
///
/// Layout: `image|path|module,module|rest|soap|https`. Separator and escape
/// characters inside values are backslash-escaped, so distinct configurations
/// never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigFingerprint(String);

impl ConfigFingerprint {
    /// Compute the fingerprint of a configuration.
    ///
    /// Pure: no I/O and no ambient state. Module order is significant.
    pub fn of(config: &ProvisioningConfig) -> Self {
        let modules = config
            .modules()
            .iter()
            .map(|module| escape(module.as_str()))
            .collect::<Vec<_>>()
            .join(&MODULE_SEPARATOR.to_string());

        let fields = [
            escape(config.image()),
            escape(config.endpoint_jars_path()),
            modules,
            config.rest_enabled().to_string(),
            config.soap_enabled().to_string(),
            config.uses_https().to_string(),
        ];

        Self(fields.join(&FIELD_SEPARATOR.to_string()))
    }

    /// Wrap an already computed fingerprint string.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConfigFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ConfigFingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, FIELD_SEPARATOR | MODULE_SEPARATOR | ESCAPE) {
            escaped.push(ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}
