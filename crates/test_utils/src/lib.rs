//! Test utilities for the Spektr crates.
//!
//! This crate provides the fixtures shared by unit and integration tests:
//! logging setup, synthetic classpath roots (plain directories and jar
//! archives) and a stub HTTP server that synchronous tests can drive.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path probed by the Spektr container health check.
pub const HEALTH_PATH: &str = "/actuator/health";

/// Initialize logging for tests.
///
/// Safe to call from every test; only the first call installs the subscriber.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_test_writer()
        .try_init();
}

/// Return a localhost port that nothing is listening on.
pub fn unused_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("Failed to bind probe listener")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

/// Scratch area for building classpath roots.
///
/// Everything is created below a temporary directory that is removed when
/// the fixture is dropped.
pub struct ClasspathFixture {
    root: TempDir,
}

impl ClasspathFixture {
    pub fn new() -> Result<Self> {
        let root = tempfile::Builder::new()
            .prefix("spektr-classpath-")
            .tempdir()
            .context("Failed to create classpath fixture directory")?;
        Ok(Self { root })
    }

    /// The directory holding every root created by this fixture.
    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Create a directory classpath root containing the given files.
    ///
    /// File names use `/` separators and are created relative to the root.
    pub fn directory_root(&self, name: &str, files: &[(&str, &[u8])]) -> Result<PathBuf> {
        let dir = self.root.path().join(name);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory root {}", dir.display()))?;

        for (relative, content) in files {
            let target = dir.join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, content)
                .with_context(|| format!("Failed to write {}", target.display()))?;
        }

        debug!(root = %dir.display(), files = files.len(), "Created directory classpath root");
        Ok(dir)
    }

    /// Create a jar classpath root containing the given files.
    ///
    /// Like a compiler-produced jar, the archive starts with its own
    /// `META-INF/MANIFEST.MF` and carries directory entries for every parent.
    pub fn jar_root(&self, name: &str, files: &[(&str, &[u8])]) -> Result<PathBuf> {
        let jar_path = self.root.path().join(name);
        if let Some(parent) = jar_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&jar_path)
            .with_context(|| format!("Failed to create jar {}", jar_path.display()))?;

        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::<()>::default()
            .compression_method(zip::CompressionMethod::Deflated);

        zip.add_directory("META-INF/", options)?;
        zip.start_file("META-INF/MANIFEST.MF", options)?;
        zip.write_all(b"Manifest-Version: 1.0\r\nCreated-By: fixture\r\n\r\n")?;

        let mut directories = BTreeSet::new();
        for (entry_name, _) in files {
            let mut parts: Vec<&str> = entry_name.split('/').collect();
            parts.pop();
            let mut prefix = String::new();
            for part in parts {
                prefix.push_str(part);
                prefix.push('/');
                directories.insert(prefix.clone());
            }
        }
        directories.remove("META-INF/");
        for directory in directories {
            zip.add_directory(directory, options)?;
        }

        for (entry_name, content) in files {
            zip.start_file(entry_name.to_string(), options)?;
            zip.write_all(content)?;
        }
        zip.finish()?;

        debug!(jar = %jar_path.display(), files = files.len(), "Created jar classpath root");
        Ok(jar_path)
    }
}

/// List the entry names of an archive in stored order.
pub fn archive_entry_names(archive: &Path) -> Result<Vec<String>> {
    let file =
        File::open(archive).with_context(|| format!("Failed to open {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(file).context("Not a valid zip archive")?;
    let mut names = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        names.push(zip.by_index_raw(index)?.name().to_string());
    }
    Ok(names)
}

/// Read a single archive entry as UTF-8 text.
pub fn read_archive_entry(archive: &Path, name: &str) -> Result<String> {
    let file =
        File::open(archive).with_context(|| format!("Failed to open {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(file).context("Not a valid zip archive")?;
    let mut entry = zip
        .by_name(name)
        .with_context(|| format!("Entry {name} not found in {}", archive.display()))?;
    let mut content = String::new();
    entry.read_to_string(&mut content)?;
    Ok(content)
}

/// Stub HTTP server usable from synchronous tests.
///
/// `wiremock` serves requests from its own thread; the runtime held here only
/// drives registration and inspection calls. Blocking HTTP clients must be
/// called from outside this runtime, which plain `#[test]` functions are.
pub struct HttpStub {
    server: MockServer,
    runtime: tokio::runtime::Runtime,
}

impl HttpStub {
    /// Start an empty stub server.
    pub fn start() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .context("Failed to build stub server runtime")?;
        let server = runtime.block_on(MockServer::start());
        debug!(uri = %server.uri(), "Started HTTP stub server");
        Ok(Self { server, runtime })
    }

    /// Start a stub server whose health endpoint reports `UP`.
    pub fn healthy() -> Result<Self> {
        let stub = Self::start()?;
        stub.mount(
            Mock::given(method("GET"))
                .and(path(HEALTH_PATH))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_raw(r#"{"status":"UP"}"#, "application/json"),
                ),
        );
        Ok(stub)
    }

    /// Register a mock on the server.
    pub fn mount(&self, mock: Mock) {
        self.runtime.block_on(mock.mount(&self.server));
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn host(&self) -> String {
        self.server.address().ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.server.address().port()
    }

    /// Number of requests received so far for the given path.
    pub fn requests_to(&self, request_path: &str) -> usize {
        self.runtime
            .block_on(self.server.received_requests())
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == request_path)
            .count()
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
