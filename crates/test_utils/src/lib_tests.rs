//! Tests for test utilities.

use super::*;

#[test]
fn test_directory_root_writes_nested_files() {
    let fixture = ClasspathFixture::new().unwrap();
    let root = fixture
        .directory_root("classes", &[("com/example/Users.class", b"users")])
        .unwrap();

    let content = fs::read(root.join("com/example/Users.class")).unwrap();
    assert_eq!(content, b"users");
    assert!(root.starts_with(fixture.path()));
}

#[test]
fn test_jar_root_starts_with_manifest_and_directories() {
    let fixture = ClasspathFixture::new().unwrap();
    let jar = fixture
        .jar_root("libs/support.jar", &[("com/example/Support.class", b"support")])
        .unwrap();

    let names = archive_entry_names(&jar).unwrap();
    assert_eq!(names[0], "META-INF/");
    assert_eq!(names[1], "META-INF/MANIFEST.MF");
    assert!(names.contains(&"com/".to_string()));
    assert!(names.contains(&"com/example/".to_string()));
    assert_eq!(
        read_archive_entry(&jar, "com/example/Support.class").unwrap(),
        "support"
    );
}

#[test]
fn test_unused_port_is_not_listening() {
    let port = unused_port().unwrap();
    assert!(std::net::TcpStream::connect(("127.0.0.1", port)).is_err());
}

#[test]
fn test_healthy_stub_answers_health_probe() {
    let stub = HttpStub::healthy().unwrap();

    let response = reqwest::blocking::get(format!("{}{}", stub.uri(), HEALTH_PATH)).unwrap();

    assert!(response.status().is_success());
    assert_eq!(stub.requests_to(HEALTH_PATH), 1);
    assert_eq!(stub.uri(), format!("http://{}:{}", stub.host(), stub.port()));
}
