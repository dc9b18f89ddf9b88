//! Capture session lifecycle and the host-facing service.
//!
//! The service holds at most one [`CaptureSession`]. A session walks the
//! states in [`SessionState`], gated on camera permission, and pushes
//! [`ScanEvent`]s to the host through an [`EventSink`].

mod capture;
mod error;
pub mod events;
mod monitor;
mod service;
mod state;

#[cfg(test)]
pub(crate) mod fixture;

pub use capture::{CaptureSession, Initialized, OpenResult, OpenTicket};
pub use error::SessionError;
pub use events::{EventSink, NullSink, ScanEvent};
pub use monitor::ScannerMonitor;
pub use service::{Platform, ScannerService};
pub use state::{LifecycleEvent, SessionState};
