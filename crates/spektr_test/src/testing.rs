//! In-memory doubles for the container runtime and the assembler.
//!
//! These let provisioning be exercised without a Docker daemon. Every
//! launched container reports the same host and port, so pointing them at
//! a local HTTP stub makes the health probe and base URL real.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::assembler::{ArtifactAssembler, AssembledArtifact};
use crate::errors::{AssemblyError, RuntimeError};
use crate::module::ModuleReference;
use crate::runtime::{ContainerRuntime, LaunchRequest, RuntimeContainer};

#[cfg(test)]
#[path = "testing_tests.rs"]
mod tests;

#[derive(Debug, Default)]
struct RuntimeLog {
    launches: Vec<LaunchRequest>,
    stopped: Vec<String>,
}

/// Runtime that records requests instead of starting containers.
#[derive(Debug, Clone)]
pub struct RecordingRuntime {
    host: String,
    port: u16,
    launch_delay: Duration,
    failures_remaining: Arc<AtomicUsize>,
    log: Arc<Mutex<RuntimeLog>>,
}

impl RecordingRuntime {
    /// Every container port maps to `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            launch_delay: Duration::ZERO,
            failures_remaining: Arc::new(AtomicUsize::new(0)),
            log: Arc::new(Mutex::new(RuntimeLog::default())),
        }
    }

    /// Sleep inside every launch, widening race windows.
    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    /// Fail the next `count` launches.
    pub fn fail_next_launches(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Launch attempts so far, including failed ones.
    pub fn launch_count(&self) -> usize {
        self.lock().launches.len()
    }

    pub fn launches(&self) -> Vec<LaunchRequest> {
        self.lock().launches.clone()
    }

    /// Ids of the containers that were stopped, in order.
    pub fn stopped(&self) -> Vec<String> {
        self.lock().stopped.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RuntimeLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ContainerRuntime for RecordingRuntime {
    fn launch(&self, request: &LaunchRequest) -> Result<Box<dyn RuntimeContainer>, RuntimeError> {
        let number = {
            let mut log = self.lock();
            log.launches.push(request.clone());
            log.launches.len()
        };

        if !self.launch_delay.is_zero() {
            thread::sleep(self.launch_delay);
        }

        let fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(RuntimeError::Launch {
                image: request.image.clone(),
                reason: "launch failure requested by test".to_string(),
            });
        }

        Ok(Box::new(RecordedContainer {
            id: format!("recorded-{number}"),
            host: self.host.clone(),
            port: self.port,
            log: Arc::clone(&self.log),
        }))
    }
}

#[derive(Debug)]
struct RecordedContainer {
    id: String,
    host: String,
    port: u16,
    log: Arc<Mutex<RuntimeLog>>,
}

impl RuntimeContainer for RecordedContainer {
    fn id(&self) -> &str {
        &self.id
    }

    fn host(&self) -> Result<String, RuntimeError> {
        Ok(self.host.clone())
    }

    fn mapped_port(&self, _container_port: u16) -> Result<u16, RuntimeError> {
        Ok(self.port)
    }

    fn stop(&self) -> Result<(), RuntimeError> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stopped
            .push(self.id.clone());
        Ok(())
    }
}

/// Wraps an assembler and counts how often it runs.
#[derive(Debug)]
pub struct CountingAssembler<A> {
    inner: A,
    calls: AtomicUsize,
}

impl<A: ArtifactAssembler> CountingAssembler<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<A: ArtifactAssembler> ArtifactAssembler for CountingAssembler<A> {
    fn assemble(&self, modules: &[ModuleReference]) -> Result<AssembledArtifact, AssemblyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.assemble(modules)
    }
}
