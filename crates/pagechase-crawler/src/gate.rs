//! Admission control for concurrent chain steps.
//!
//! The gate owns the two counters of a concurrent walk:
//! - `running`: chain steps that were admitted and haven't released their slot;
//! - `waiting`: admission requests that were denied at least once and are
//!   still polling for a slot.
//!
//! A walk is drained exactly when both counters are zero. Every operation
//! that reads and mutates them does so under one lock, so the drain test can
//! never interleave with another chain's admission.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::Ceiling;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateState {
    pub running: usize,
    pub waiting: usize,
}

impl GateState {
    pub fn is_drained(&self) -> bool {
        self.running == 0 && self.waiting == 0
    }
}

/// One logical request for a slot, kept across its retries.
#[derive(Debug, Default)]
pub struct AdmissionRequest {
    queued: bool,
    denials: u32,
}

impl AdmissionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the gate turned this request down.
    pub fn denials(&self) -> u32 {
        self.denials
    }

    /// Whether this request currently counts towards `waiting`.
    pub fn is_queued(&self) -> bool {
        self.queued
    }
}

#[derive(Debug)]
pub struct AdmissionGate {
    ceiling: Ceiling,
    state: Mutex<GateState>,
}

impl AdmissionGate {
    pub fn new(ceiling: Ceiling) -> Self {
        Self {
            ceiling,
            state: Mutex::new(GateState::default()),
        }
    }

    pub fn ceiling(&self) -> Ceiling {
        self.ceiling
    }

    pub fn state(&self) -> GateState {
        *self.lock()
    }

    /// Takes a slot if one is free.
    ///
    /// A denied request is counted in `waiting` on its first denial only; the
    /// count is removed when the request is eventually admitted.
    pub fn try_admit(&self, request: &mut AdmissionRequest) -> bool {
        let mut state = self.lock();
        if state.running < self.ceiling.get() {
            if request.queued {
                state.waiting -= 1;
                request.queued = false;
            }
            state.running += 1;
            true
        } else {
            if !request.queued {
                state.waiting += 1;
                request.queued = true;
            }
            request.denials = request.denials.saturating_add(1);
            false
        }
    }

    /// Gives back a slot, returns true when the walk is drained.
    pub fn release(&self) -> bool {
        let mut state = self.lock();
        debug_assert!(state.running > 0, "released a slot that was never taken");
        state.running = state.running.saturating_sub(1);
        state.is_drained()
    }

    /// Drops a request that will never be admitted, returns true when the walk
    /// is drained.
    pub fn withdraw(&self, request: &mut AdmissionRequest) -> bool {
        let mut state = self.lock();
        if request.queued {
            state.waiting -= 1;
            request.queued = false;
        }
        state.is_drained()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
