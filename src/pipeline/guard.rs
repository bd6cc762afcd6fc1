// src/pipeline/guard.rs

//! Single-flight guard for refresh runs.
//!
//! Backed by a one-permit semaphore: acquiring is an atomic
//! check-and-set, and the permit is released when dropped, including
//! during unwinding.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// At most one holder at a time.
#[derive(Clone)]
pub struct SingleFlight {
    slot: Arc<Semaphore>,
}

/// Proof of holding the guard; releases it on drop.
#[derive(Debug)]
pub struct FlightPermit {
    _permit: OwnedSemaphorePermit,
}

impl FlightPermit {
    /// Release the guard explicitly.
    pub fn release(self) {
        drop(self);
    }
}

impl SingleFlight {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    /// Try to become the single holder without waiting.
    ///
    /// Returns `None` if another holder is active.
    pub fn try_acquire(&self) -> Option<FlightPermit> {
        let permit = Arc::clone(&self.slot).try_acquire_owned().ok()?;
        Some(FlightPermit { _permit: permit })
    }

    pub fn is_running(&self) -> bool {
        self.slot.available_permits() == 0
    }
}

impl Default for SingleFlight {
    fn default() -> Self {
        Self::new()
    }
}
