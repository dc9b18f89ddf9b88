//! Read-only view of the scanner for other threads.
//!
//! The service itself lives on the host's command thread. A
//! [`ScannerMonitor`] can be cloned into a metrics server or a status
//! reporter and always reflects whichever session the service holds.

use super::state::SessionState;
use crate::detection::{FramePipeline, PipelineCounters, PipelineStats};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lifecycle state written by a session and read by its monitors.
#[derive(Debug)]
pub(crate) struct StateCell(Mutex<SessionState>);

impl StateCell {
    pub(crate) fn new(state: SessionState) -> Self {
        Self(Mutex::new(state))
    }

    pub(crate) fn get(&self) -> SessionState {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set(&self, state: SessionState) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// Folds the pipeline flags into the stored state.
///
/// An open session whose device died reads as `Stopped`; one with
/// scanning enabled reads as `Scanning`.
pub(crate) fn effective_state(stored: SessionState, pipeline: &FramePipeline) -> SessionState {
    match stored {
        SessionState::Opened if pipeline.is_device_lost() => SessionState::Stopped,
        SessionState::Opened if pipeline.is_scanning() => SessionState::Scanning,
        state => state,
    }
}

/// The parts of a session a monitor needs.
#[derive(Debug, Clone)]
pub(crate) struct SessionView {
    pub(crate) state: Arc<StateCell>,
    pub(crate) pipeline: FramePipeline,
}

/// Cloneable, thread-safe view of a [`ScannerService`](super::ScannerService).
#[derive(Debug, Clone)]
pub struct ScannerMonitor {
    current: Arc<Mutex<Option<SessionView>>>,
    stats: Arc<PipelineStats>,
}

impl ScannerMonitor {
    pub(crate) fn new(stats: Arc<PipelineStats>) -> Self {
        Self {
            current: Arc::default(),
            stats,
        }
    }

    fn current(&self) -> MutexGuard<'_, Option<SessionView>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Points every clone at a new session.
    pub(crate) fn attach(&self, view: SessionView) {
        *self.current() = Some(view);
    }

    /// State of the current session, if any.
    pub fn state(&self) -> Option<SessionState> {
        self.current()
            .as_ref()
            .map(|view| effective_state(view.state.get(), &view.pipeline))
    }

    /// Returns true while the current session has a detection in flight.
    pub fn detection_in_flight(&self) -> bool {
        self.current()
            .as_ref()
            .is_some_and(|view| view.pipeline.is_busy())
    }

    /// Counters accumulated over every session of the service.
    pub fn counters(&self) -> PipelineCounters {
        self.stats.snapshot()
    }
}
