//! Tests for environment settings.

use super::*;
use serial_test::serial;
use std::collections::HashMap;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let values: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| values.get(key).cloned()
}

#[test]
fn test_defaults_when_nothing_is_set() {
    let settings = SpektrSettings::from_lookup(|_| None).unwrap();

    assert_eq!(settings, SpektrSettings::default());
    assert_eq!(settings.exposed_port, 8080);
    assert_eq!(settings.startup_timeout, Duration::from_secs(60));
    assert!(settings.classpath.is_empty());
    assert!(settings.module_manifest.is_none());
}

#[test]
fn test_classpath_is_split_on_platform_separator() {
    let joined = env::join_paths(["/work/build/classes", "/work/libs/support.jar"]).unwrap();
    let joined = joined.to_string_lossy().to_string();

    let settings = SpektrSettings::from_lookup(lookup_from(&[(CLASSPATH_ENV, &joined)])).unwrap();

    assert_eq!(
        settings.classpath,
        vec![
            PathBuf::from("/work/build/classes"),
            PathBuf::from("/work/libs/support.jar")
        ]
    );
}

#[test]
fn test_numeric_settings_are_parsed() {
    let settings = SpektrSettings::from_lookup(lookup_from(&[
        (EXPOSED_PORT_ENV, "9090"),
        (STARTUP_TIMEOUT_ENV, " 15 "),
        (ARTIFACT_DIR_ENV, "/tmp/spektr"),
        (MODULE_MANIFEST_ENV, "/work/spektr-modules.toml"),
    ]))
    .unwrap();

    assert_eq!(settings.exposed_port, 9090);
    assert_eq!(settings.startup_timeout, Duration::from_secs(15));
    assert_eq!(settings.artifact_dir, PathBuf::from("/tmp/spektr"));
    assert_eq!(
        settings.module_manifest,
        Some(PathBuf::from("/work/spektr-modules.toml"))
    );
}

#[test]
fn test_invalid_port_is_reported_with_key() {
    let result = SpektrSettings::from_lookup(lookup_from(&[(EXPOSED_PORT_ENV, "eighty")]));

    match result {
        Err(ConfigurationError::InvalidSetting { key, value, .. }) => {
            assert_eq!(key, EXPOSED_PORT_ENV);
            assert_eq!(value, "eighty");
        }
        other => panic!("Expected InvalidSetting, got {other:?}"),
    }
}

#[test]
fn test_zero_timeout_is_rejected() {
    let result = SpektrSettings::from_lookup(lookup_from(&[(STARTUP_TIMEOUT_ENV, "0")]));

    assert!(matches!(
        result,
        Err(ConfigurationError::InvalidSetting { ref reason, .. }) if reason.contains("greater than zero")
    ));
}

#[test]
fn test_startup_timeout_above_one_day_is_rejected() {
    let result =
        SpektrSettings::from_lookup(lookup_from(&[(STARTUP_TIMEOUT_ENV, "18446744073709551615")]));

    match result {
        Err(ConfigurationError::InvalidSetting { key, reason, .. }) => {
            assert_eq!(key, STARTUP_TIMEOUT_ENV);
            assert!(reason.contains("must not exceed 86400 seconds"));
        }
        other => panic!("Expected InvalidSetting, got {other:?}"),
    }

    let at_limit = SpektrSettings::from_lookup(lookup_from(&[(STARTUP_TIMEOUT_ENV, "86400")]))
        .unwrap();
    assert_eq!(at_limit.startup_timeout, Duration::from_secs(86_400));
}

#[test]
fn test_properties_file_is_optional() {
    let blank = SpektrSettings::from_lookup(lookup_from(&[(PROPERTIES_FILE_ENV, "  ")])).unwrap();
    let set = SpektrSettings::from_lookup(lookup_from(&[(
        PROPERTIES_FILE_ENV,
        "/work/spektr.properties.toml",
    )]))
    .unwrap();

    assert!(blank.properties_file.is_none());
    assert_eq!(
        set.properties_file,
        Some(PathBuf::from("/work/spektr.properties.toml"))
    );
}

#[test]
#[serial]
fn test_from_env_reads_process_environment() {
    env::set_var(EXPOSED_PORT_ENV, "18080");
    let settings = SpektrSettings::from_env();
    env::remove_var(EXPOSED_PORT_ENV);

    assert_eq!(settings.unwrap().exposed_port, 18080);
}
