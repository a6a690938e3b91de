//! Process-wide cache of started Spektr containers.
//!
//! The registry maps a [`ConfigFingerprint`] to the container started for
//! it. [`ContainerRegistry::get_or_init`] is the only way to add an entry:
//! for any fingerprint at most one initializer runs at a time, and every
//! caller that arrives while it runs blocks until it finishes.
//!
//! Failure policy: a failed attempt is returned to its own caller and to
//! every caller that was waiting on it. The fingerprint then becomes vacant
//! again, so a later call starts a fresh attempt. Successful entries are
//! never removed or replaced.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::container::StartedSpektr;
use crate::errors::{ProvisionError, ProvisionResult};
use crate::fingerprint::ConfigFingerprint;

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

/// A started container together with the configuration it serves.
#[derive(Debug)]
pub struct ContainerRecord {
    fingerprint: ConfigFingerprint,
    container: StartedSpektr,
}

impl ContainerRecord {
    pub fn new(fingerprint: ConfigFingerprint, container: StartedSpektr) -> Self {
        Self {
            fingerprint,
            container,
        }
    }

    pub fn fingerprint(&self) -> &ConfigFingerprint {
        &self.fingerprint
    }

    pub fn base_url(&self) -> &str {
        self.container.base_url()
    }

    pub fn container(&self) -> &StartedSpektr {
        &self.container
    }
}

#[derive(Debug)]
enum Phase {
    Vacant,
    Starting,
    Running(Arc<ContainerRecord>),
}

#[derive(Debug)]
struct SlotState {
    phase: Phase,
    /// Number of initializer runs so far.
    attempt: u64,
    /// Most recent failed attempt and its error.
    last_failure: Option<(u64, ProvisionError)>,
}

#[derive(Debug)]
struct Slot {
    state: Mutex<SlotState>,
    settled: Condvar,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                phase: Phase::Vacant,
                attempt: 0,
                last_failure: None,
            }),
            settled: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fingerprint-keyed container cache with exactly-once initialization.
#[derive(Debug, Default)]
pub struct ContainerRegistry {
    slots: Mutex<HashMap<ConfigFingerprint, Arc<Slot>>>,
}

impl ContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, fingerprint: &ConfigFingerprint) -> Arc<Slot> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            slots
                .entry(fingerprint.clone())
                .or_insert_with(|| Arc::new(Slot::new())),
        )
    }

    /// Return the container for `fingerprint`, running `init` if there is none.
    ///
    /// Concurrent callers with the same fingerprint share one run of `init`.
    /// Callers with different fingerprints never wait on each other.
    ///
    /// # Errors
    /// Returns the error of the attempt this call ran or waited on. A panic
    /// in `init` is reported as [`ProvisionError::InitializerPanicked`].
    pub fn get_or_init<F>(
        &self,
        fingerprint: &ConfigFingerprint,
        init: F,
    ) -> ProvisionResult<Arc<ContainerRecord>>
    where
        F: FnOnce() -> ProvisionResult<ContainerRecord>,
    {
        let slot = self.slot(fingerprint);
        let mut state = slot.lock();

        loop {
            match &state.phase {
                Phase::Running(record) => {
                    debug!(fingerprint = %fingerprint, "Reusing cached Spektr container");
                    return Ok(Arc::clone(record));
                }
                Phase::Starting => {
                    let awaited = state.attempt;
                    info!(fingerprint = %fingerprint, "Waiting for in-flight Spektr provisioning");
                    while matches!(state.phase, Phase::Starting) && state.attempt == awaited {
                        state = slot
                            .settled
                            .wait(state)
                            .unwrap_or_else(PoisonError::into_inner);
                    }

                    if let Phase::Running(record) = &state.phase {
                        return Ok(Arc::clone(record));
                    }
                    if let Some((failed, error)) = &state.last_failure {
                        if *failed >= awaited {
                            return Err(error.clone());
                        }
                    }
                }
                Phase::Vacant => break,
            }
        }

        state.attempt += 1;
        let attempt = state.attempt;
        state.phase = Phase::Starting;
        drop(state);

        debug!(fingerprint = %fingerprint, attempt, "Provisioning Spektr container");
        let outcome = panic::catch_unwind(AssertUnwindSafe(init)).unwrap_or_else(|_| {
            Err(ProvisionError::InitializerPanicked {
                fingerprint: fingerprint.clone(),
            })
        });

        let mut state = slot.lock();
        let result = match outcome {
            Ok(record) => {
                let record = Arc::new(record);
                state.phase = Phase::Running(Arc::clone(&record));
                state.last_failure = None;
                Ok(record)
            }
            Err(error) => {
                warn!(fingerprint = %fingerprint, attempt, error = %error, "Spektr provisioning failed");
                state.phase = Phase::Vacant;
                state.last_failure = Some((attempt, error.clone()));
                Err(error)
            }
        };
        drop(state);
        slot.settled.notify_all();
        result
    }

    /// The running container for `fingerprint`, if one has been started.
    pub fn get(&self, fingerprint: &ConfigFingerprint) -> Option<Arc<ContainerRecord>> {
        let slot = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.get(fingerprint)?)
        };
        let state = slot.lock();
        match &state.phase {
            Phase::Running(record) => Some(Arc::clone(record)),
            Phase::Vacant | Phase::Starting => None,
        }
    }

    /// Number of running containers.
    pub fn len(&self) -> usize {
        let slots: Vec<Arc<Slot>> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        slots
            .iter()
            .filter(|slot| matches!(slot.lock().phase, Phase::Running(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
