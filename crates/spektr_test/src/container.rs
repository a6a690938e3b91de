//! Spektr container handle.
//!
//! [`SpektrContainer`] collects the port, health check, environment and
//! endpoint jar mounts for one Spektr instance. Starting it consumes the
//! configuration and yields a [`StartedSpektr`], the only type that knows a
//! base URL.
//!
//! # Examples
//!
//! ```no_run
//! use spektr_test::container::SpektrContainer;
//! use spektr_test::runtime::TestcontainersRuntime;
//!
//! # fn example() -> Result<(), spektr_test::errors::ContainerError> {
//! let spektr = SpektrContainer::new("spektr:local")
//!     .with_endpoint_jars_dir("build/endpoint-jars")
//!     .with_soap_enabled(false)
//!     .start(&TestcontainersRuntime::new())?;
//!
//! println!("Spektr is listening on {}", spektr.base_url());
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_IMAGE;
use crate::errors::ContainerError;
use crate::runtime::{ContainerRuntime, LaunchRequest, Mount, RuntimeContainer};
use crate::settings::{DEFAULT_EXPOSED_PORT, DEFAULT_STARTUP_TIMEOUT};

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;

/// Directory inside the container that Spektr loads endpoint jars from.
pub const ENDPOINT_JARS_DIR: &str = "/app/endpoint-jars";

pub const HEALTH_CHECK_PATH: &str = "/actuator/health";

pub const REST_ENABLED_ENV: &str = "SPEKTR_REST_ENABLED";
pub const SOAP_ENABLED_ENV: &str = "SPEKTR_SOAP_ENABLED";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Upper bound for a single probe request.
const PROBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP readiness probe run after launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    pub path: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            path: HEALTH_CHECK_PATH.to_string(),
            timeout: DEFAULT_STARTUP_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// A Spektr container that has been configured but not started.
#[derive(Debug, Clone, PartialEq)]
pub struct SpektrContainer {
    image: String,
    exposed_port: u16,
    uses_https: bool,
    health_check: Option<HealthCheck>,
    env: BTreeMap<String, String>,
    mounts: Vec<Mount>,
}

impl Default for SpektrContainer {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE)
    }
}

impl SpektrContainer {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            exposed_port: DEFAULT_EXPOSED_PORT,
            uses_https: false,
            health_check: Some(HealthCheck::default()),
            env: BTreeMap::new(),
            mounts: Vec::new(),
        }
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn exposed_port(&self) -> u16 {
        self.exposed_port
    }

    pub fn with_exposed_port(mut self, port: u16) -> Self {
        self.exposed_port = port;
        self
    }

    /// Address the service over `https` instead of `http`.
    pub fn with_https(mut self, uses_https: bool) -> Self {
        self.uses_https = uses_https;
        self
    }

    pub fn with_health_check(mut self, check: HealthCheck) -> Self {
        self.health_check = Some(check);
        self
    }

    /// Change the probe window, keeping the probe path and interval.
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.health_check.get_or_insert_with(HealthCheck::default).timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.health_check.get_or_insert_with(HealthCheck::default).poll_interval = interval;
        self
    }

    /// Treat the container as ready as soon as the runtime reports it running.
    pub fn without_health_check(mut self) -> Self {
        self.health_check = None;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Copy every file below `host_dir` into the endpoint jar directory.
    pub fn with_endpoint_jars_dir(mut self, host_dir: impl Into<PathBuf>) -> Self {
        self.mounts.push(Mount::directory(host_dir, ENDPOINT_JARS_DIR));
        self
    }

    /// Copy a single jar into the endpoint jar directory under its own file name.
    pub fn with_endpoint_jar_file(mut self, host_file: impl Into<PathBuf>) -> Self {
        let host_file = host_file.into();
        let file_name = host_file
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let target = format!("{ENDPOINT_JARS_DIR}/{file_name}");
        self.mounts.push(Mount::file(host_file, target));
        self
    }

    pub fn with_rest_enabled(self, enabled: bool) -> Self {
        self.with_env(REST_ENABLED_ENV, enabled.to_string())
    }

    pub fn with_soap_enabled(self, enabled: bool) -> Self {
        self.with_env(SOAP_ENABLED_ENV, enabled.to_string())
    }

    /// The request handed to the runtime on [`start`](Self::start).
    pub fn launch_request(&self) -> LaunchRequest {
        LaunchRequest {
            image: self.image.clone(),
            exposed_ports: vec![self.exposed_port],
            env: self.env.clone(),
            mounts: self.mounts.clone(),
        }
    }

    fn scheme(&self) -> &'static str {
        if self.uses_https {
            "https"
        } else {
            "http"
        }
    }

    /// Launch the container and block until it is healthy.
    ///
    /// # Errors
    /// Returns the runtime failure if the launch or port lookup fails, and
    /// [`ContainerError::StartupTimeout`] if the health probe does not
    /// succeed in time. In both cases a launched container is stopped
    /// before returning.
    pub fn start(self, runtime: &dyn ContainerRuntime) -> Result<StartedSpektr, ContainerError> {
        info!(
            image = %self.image,
            port = self.exposed_port,
            mounts = self.mounts.len(),
            "Starting Spektr container"
        );

        let container = runtime.launch(&self.launch_request())?;

        let address = container.host().and_then(|host| {
            container
                .mapped_port(self.exposed_port)
                .map(|port| (host, port))
        });
        let (host, mapped_port) = match address {
            Ok(address) => address,
            Err(e) => {
                stop_quietly(container.as_ref());
                return Err(e.into());
            }
        };

        let started = StartedSpektr {
            base_url: format!("{}://{}:{}", self.scheme(), host, mapped_port),
            host,
            mapped_port,
            image: self.image.clone(),
            container,
        };

        if let Some(check) = &self.health_check {
            if let Err(e) = wait_for_health(&started, check) {
                stop_quietly(started.container.as_ref());
                return Err(e);
            }
        }

        info!(
            container_id = started.id(),
            base_url = %started.base_url,
            "Spektr container is ready"
        );
        Ok(started)
    }
}

/// A running Spektr container.
#[derive(Debug)]
pub struct StartedSpektr {
    base_url: String,
    host: String,
    mapped_port: u16,
    image: String,
    container: Box<dyn RuntimeContainer>,
}

impl StartedSpektr {
    /// `<scheme>://<host>:<mapped port>`, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn mapped_port(&self) -> u16 {
        self.mapped_port
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn id(&self) -> &str {
        self.container.id()
    }

    /// Stop the container. Cached containers are normally left running
    /// until the process exits.
    pub fn stop(&self) -> Result<(), ContainerError> {
        self.container.stop().map_err(ContainerError::from)
    }
}

fn wait_for_health(started: &StartedSpektr, check: &HealthCheck) -> Result<(), ContainerError> {
    let health_url = format!("{}{}", started.base_url, check.path);
    let client = reqwest::blocking::Client::builder()
        .timeout(check.timeout.min(PROBE_REQUEST_TIMEOUT))
        .danger_accept_invalid_certs(true)
        .build()
        .map_err(|e| ContainerError::ProbeClient {
            reason: e.to_string(),
        })?;

    info!(health_url = %health_url, timeout = ?check.timeout, "Waiting for Spektr to become healthy");

    // No deadline when the window is too large to represent.
    let deadline = Instant::now().checked_add(check.timeout);
    let mut attempt = 0u32;
    let last_outcome: String;

    loop {
        attempt += 1;
        match client.get(&health_url).send() {
            Ok(response) if response.status().is_success() => {
                debug!(attempt, "Health check succeeded");
                return Ok(());
            }
            Ok(response) => {
                debug!(attempt, status = %response.status(), "Health check returned non-success status");
                if past_deadline(deadline) {
                    last_outcome = format!("HTTP {}", response.status());
                    break;
                }
            }
            Err(e) => {
                debug!(attempt, error = %e, "Health check failed");
                if past_deadline(deadline) {
                    last_outcome = e.to_string();
                    break;
                }
            }
        }

        let pause = match deadline {
            Some(deadline) => check
                .poll_interval
                .min(deadline.saturating_duration_since(Instant::now())),
            None => check.poll_interval,
        };
        thread::sleep(pause);
    }

    error!(
        health_url = %health_url,
        attempts = attempt,
        last_outcome = %last_outcome,
        "Spektr container did not become healthy"
    );
    Err(ContainerError::StartupTimeout {
        image: started.image.clone(),
        health_url,
        timeout: check.timeout,
        last_outcome,
    })
}

fn past_deadline(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

fn stop_quietly(container: &dyn RuntimeContainer) {
    if let Err(e) = container.stop() {
        warn!(container_id = container.id(), error = %e, "Failed to stop container after failed start");
    }
}
