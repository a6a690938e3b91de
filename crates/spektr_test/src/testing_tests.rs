use super::*;
use crate::classpath::Classpath;
use crate::assembler::ModuleJarBuilder;
use crate::module::ModuleTable;

fn request(image: &str) -> LaunchRequest {
    LaunchRequest {
        image: image.to_string(),
        exposed_ports: vec![8080],
        ..LaunchRequest::default()
    }
}

#[test]
fn test_recording_runtime_maps_every_port_to_configured_address() {
    let runtime = RecordingRuntime::new("127.0.0.1", 41000);

    let container = runtime.launch(&request("spektr:local")).unwrap();

    assert_eq!(container.id(), "recorded-1");
    assert_eq!(container.host().unwrap(), "127.0.0.1");
    assert_eq!(container.mapped_port(8080).unwrap(), 41000);
    assert_eq!(container.mapped_port(8443).unwrap(), 41000);
    assert_eq!(runtime.launches(), vec![request("spektr:local")]);
}

#[test]
fn test_requested_failures_are_consumed_in_order() {
    let runtime = RecordingRuntime::new("localhost", 1);
    runtime.fail_next_launches(1);

    assert!(matches!(
        runtime.launch(&request("spektr:local")),
        Err(RuntimeError::Launch { .. })
    ));
    assert!(runtime.launch(&request("spektr:local")).is_ok());
    assert_eq!(runtime.launch_count(), 2);
}

#[test]
fn test_stops_are_recorded_across_clones() {
    let runtime = RecordingRuntime::new("localhost", 1);
    let observer = runtime.clone();

    let container = runtime.launch(&request("spektr:local")).unwrap();
    container.stop().unwrap();

    assert_eq!(observer.stopped(), vec!["recorded-1".to_string()]);
}

#[test]
fn test_counting_assembler_counts_failed_calls_too() {
    let output = tempfile::tempdir().unwrap();
    let assembler = CountingAssembler::new(
        ModuleJarBuilder::new(ModuleTable::new(), Classpath::default())
            .with_output_dir(output.path()),
    );

    assert_eq!(assembler.assemble(&[]).unwrap_err(), AssemblyError::NoModules);
    assert!(assembler
        .assemble(&[ModuleReference::new("com.example.Missing")])
        .is_err());
    assert_eq!(assembler.calls(), 2);
}
