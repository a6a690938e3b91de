//! Tests for the container handle, run against the recording runtime.

use super::*;
use crate::errors::RuntimeError;
use crate::runtime::MountKind;
use crate::testing::RecordingRuntime;
use test_utils::{unused_port, HttpStub};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

fn fast_check(timeout_ms: u64) -> HealthCheck {
    HealthCheck {
        timeout: Duration::from_millis(timeout_ms),
        poll_interval: Duration::from_millis(50),
        ..HealthCheck::default()
    }
}

#[test]
fn test_defaults() {
    let container = SpektrContainer::default();

    assert_eq!(container.image(), "spektr:local");
    assert_eq!(container.exposed_port(), 8080);
    assert_eq!(container.health_check, Some(HealthCheck::default()));
    assert_eq!(HealthCheck::default().path, "/actuator/health");
    assert_eq!(HealthCheck::default().timeout, Duration::from_secs(60));
}

#[test]
fn test_launch_request_carries_ports_env_and_mounts() {
    let container = SpektrContainer::new("spektr:local")
        .with_exposed_port(9090)
        .with_rest_enabled(true)
        .with_soap_enabled(false)
        .with_endpoint_jars_dir("/work/prebuilt")
        .with_endpoint_jar_file("/tmp/spektr-modules-abc.jar");

    let request = container.launch_request();

    assert_eq!(request.image, "spektr:local");
    assert_eq!(request.exposed_ports, vec![9090]);
    assert_eq!(request.env.get(REST_ENABLED_ENV).map(String::as_str), Some("true"));
    assert_eq!(request.env.get(SOAP_ENABLED_ENV).map(String::as_str), Some("false"));
    assert_eq!(
        request.mounts,
        vec![
            Mount::directory("/work/prebuilt", "/app/endpoint-jars"),
            Mount::file(
                "/tmp/spektr-modules-abc.jar",
                "/app/endpoint-jars/spektr-modules-abc.jar"
            ),
        ]
    );
    assert_eq!(request.mounts[1].kind, MountKind::File);
}

#[test]
fn test_repeated_env_configuration_keeps_last_value() {
    let request = SpektrContainer::default()
        .with_rest_enabled(false)
        .with_rest_enabled(true)
        .launch_request();

    assert_eq!(request.env.len(), 1);
    assert_eq!(request.env[REST_ENABLED_ENV], "true");
}

#[test]
fn test_start_waits_for_health_and_builds_base_url() {
    let stub = HttpStub::healthy().unwrap();
    let runtime = RecordingRuntime::new(stub.host(), stub.port());

    let started = SpektrContainer::default()
        .with_health_check(fast_check(5_000))
        .start(&runtime)
        .unwrap();

    assert_eq!(
        started.base_url(),
        format!("http://{}:{}", stub.host(), stub.port())
    );
    assert_eq!(started.base_url(), stub.uri());
    assert_eq!(started.mapped_port(), stub.port());
    assert_eq!(started.id(), "recorded-1");
    assert!(stub.requests_to(HEALTH_CHECK_PATH) >= 1);
    assert!(runtime.stopped().is_empty());
}

#[test]
fn test_probe_retries_until_healthy() {
    let stub = HttpStub::start().unwrap();
    stub.mount(
        Mock::given(method("GET"))
            .and(path(HEALTH_CHECK_PATH))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .with_priority(1),
    );
    stub.mount(
        Mock::given(method("GET"))
            .and(path(HEALTH_CHECK_PATH))
            .respond_with(ResponseTemplate::new(200)),
    );
    let runtime = RecordingRuntime::new(stub.host(), stub.port());

    let started = SpektrContainer::default()
        .with_health_check(fast_check(5_000))
        .start(&runtime);

    assert!(started.is_ok());
    assert_eq!(stub.requests_to(HEALTH_CHECK_PATH), 3);
}

#[test]
fn test_unhealthy_container_times_out_and_is_stopped() {
    let stub = HttpStub::start().unwrap();
    stub.mount(
        Mock::given(method("GET"))
            .and(path(HEALTH_CHECK_PATH))
            .respond_with(ResponseTemplate::new(503)),
    );
    let runtime = RecordingRuntime::new(stub.host(), stub.port());

    let result = SpektrContainer::default()
        .with_health_check(fast_check(300))
        .start(&runtime);

    match result {
        Err(ContainerError::StartupTimeout {
            image,
            health_url,
            timeout,
            last_outcome,
        }) => {
            assert_eq!(image, "spektr:local");
            assert_eq!(health_url, format!("{}/actuator/health", stub.uri()));
            assert_eq!(timeout, Duration::from_millis(300));
            assert!(last_outcome.contains("503"), "{last_outcome}");
        }
        other => panic!("Expected StartupTimeout, got {other:?}"),
    }
    assert_eq!(runtime.stopped(), vec!["recorded-1".to_string()]);
}

#[test]
fn test_unreachable_container_times_out() {
    let port = unused_port().unwrap();
    let runtime = RecordingRuntime::new("127.0.0.1", port);

    let result = SpektrContainer::default()
        .with_health_check(fast_check(200))
        .start(&runtime);

    assert!(matches!(result, Err(ContainerError::StartupTimeout { .. })));
    assert_eq!(runtime.stopped().len(), 1);
}

#[test]
fn test_without_health_check_skips_probe() {
    let port = unused_port().unwrap();
    let runtime = RecordingRuntime::new("127.0.0.1", port);

    let started = SpektrContainer::default()
        .without_health_check()
        .start(&runtime)
        .unwrap();

    assert_eq!(started.base_url(), format!("http://127.0.0.1:{port}"));
}

#[test]
fn test_https_changes_scheme() {
    let runtime = RecordingRuntime::new("localhost", 32768);

    let started = SpektrContainer::default()
        .with_https(true)
        .without_health_check()
        .start(&runtime)
        .unwrap();

    assert_eq!(started.base_url(), "https://localhost:32768");
}

#[test]
fn test_unrepresentable_startup_timeout_polls_without_deadline() {
    let stub = HttpStub::start().unwrap();
    stub.mount(
        Mock::given(method("GET"))
            .and(path(HEALTH_CHECK_PATH))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .with_priority(1),
    );
    stub.mount(
        Mock::given(method("GET"))
            .and(path(HEALTH_CHECK_PATH))
            .respond_with(ResponseTemplate::new(200)),
    );
    let runtime = RecordingRuntime::new(stub.host(), stub.port());

    let started = SpektrContainer::default()
        .with_startup_timeout(Duration::MAX)
        .with_poll_interval(Duration::from_millis(50))
        .start(&runtime);

    assert!(started.is_ok());
    assert_eq!(stub.requests_to(HEALTH_CHECK_PATH), 3);
    assert!(runtime.stopped().is_empty());
}

#[test]
fn test_startup_timeout_setter_keeps_probe_enabled() {
    let container = SpektrContainer::default()
        .without_health_check()
        .with_startup_timeout(Duration::from_secs(5));

    assert_eq!(
        container.health_check,
        Some(HealthCheck {
            timeout: Duration::from_secs(5),
            ..HealthCheck::default()
        })
    );
}

#[test]
fn test_launch_failure_is_returned_without_stop() {
    let runtime = RecordingRuntime::new("localhost", 1);
    runtime.fail_next_launches(1);

    let result = SpektrContainer::default().start(&runtime);

    assert!(matches!(
        result,
        Err(ContainerError::Runtime(RuntimeError::Launch { .. }))
    ));
    assert!(runtime.stopped().is_empty());
}

#[test]
fn test_stop_delegates_to_runtime() {
    let runtime = RecordingRuntime::new("localhost", 1);
    let started = SpektrContainer::default()
        .without_health_check()
        .start(&runtime)
        .unwrap();

    started.stop().unwrap();

    assert_eq!(runtime.stopped(), vec!["recorded-1".to_string()]);
}
