//! End-to-end tests against a real Docker daemon.
//!
//! These need the `spektr:local` image to be built beforehand:
//!
//! ```bash
//! docker build -t spektr:local .
//! cargo test -p spektr_test --test container_e2e -- --ignored
//! ```

use anyhow::Result;
use spektr_test::{
    Classpath, ModuleJarBuilder, ModuleTable, Properties, ProvisioningConfig, Provisioner,
    SpektrContainer, TestcontainersRuntime, BASE_URL_PROPERTY,
};
use std::sync::Arc;
use test_utils::{init_logging, HEALTH_PATH};

fn assert_base_url_shape(base_url: &str, host: &str, port: u16) {
    assert_eq!(base_url, format!("http://{host}:{port}"));
    assert!(!base_url.ends_with('/'));
}

#[test]
#[ignore = "Requires Docker daemon running and pre-built image"]
fn test_e2e_container_starts_and_reports_healthy() -> Result<()> {
    init_logging();

    let spektr = SpektrContainer::new("spektr:local")
        .with_rest_enabled(true)
        .with_soap_enabled(false)
        .start(&TestcontainersRuntime::new())?;

    assert_base_url_shape(spektr.base_url(), spektr.host(), spektr.mapped_port());

    let response = reqwest::blocking::get(format!("{}{}", spektr.base_url(), HEALTH_PATH))?;
    assert!(response.status().is_success());

    spektr.stop()?;
    Ok(())
}

#[test]
#[ignore = "Requires Docker daemon running and pre-built image"]
fn test_e2e_provisioner_reuses_container_for_identical_config() -> Result<()> {
    init_logging();

    let provisioner = Provisioner::new(
        Arc::new(TestcontainersRuntime::new()),
        Arc::new(ModuleJarBuilder::new(ModuleTable::new(), Classpath::default())),
        Properties::new(),
    );
    let config = ProvisioningConfig::builder()
        .property("e2e.spektr.url")
        .build()?;

    let first = provisioner.get_or_start(&config)?;
    let second = provisioner.get_or_start(&config)?;

    assert!(Arc::ptr_eq(&first, &second));
    let container = first.container();
    assert_base_url_shape(first.base_url(), container.host(), container.mapped_port());
    assert_eq!(
        provisioner.properties().get(BASE_URL_PROPERTY).as_deref(),
        Some(first.base_url())
    );
    assert_eq!(
        provisioner.properties().get("e2e.spektr.url").as_deref(),
        Some(first.base_url())
    );

    let response = reqwest::blocking::get(format!("{}{}", first.base_url(), HEALTH_PATH))?;
    assert!(response.status().is_success());
    Ok(())
}
