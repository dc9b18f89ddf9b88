//! Prometheus metrics exporter for scanner monitoring.
//!
//! With the `metrics` feature, [`MetricsServer`] serves `/metrics` and a
//! JSON `/status`, both read from a [`ScannerMonitor`](crate::session::ScannerMonitor)
//! at request time.
//!
//! # Metrics Exposed
//!
//! ## Session Metrics
//! - `optical_scan_session_state` - Current session state code (-1 when no session)
//! - `optical_scan_scanning` - Whether scanning is enabled
//! - `optical_scan_detection_in_flight` - Whether a detection is in flight
//!
//! ## Frame Metrics
//! - `optical_scan_frames_received_total` - Frames delivered by the camera
//! - `optical_scan_frames_idle_total` - Frames dropped while not scanning
//! - `optical_scan_frames_throttled_total` - Frames dropped by the single-flight throttle
//!
//! ## Detector Metrics
//! - `optical_scan_detector_submissions_total` - Frames submitted to the detector
//! - `optical_scan_detector_completions_total` - Detector completions
//! - `optical_scan_detector_failures_total` - Failed detections
//!
//! ## Result Metrics
//! - `optical_scan_codes_forwarded_total` - Decoded values delivered to the host
//! - `optical_scan_results_suppressed_total` - Decoded values discarded after stop
//!
//! ## Device Metrics
//! - `optical_scan_device_losses_total` - Camera streams that ended unexpectedly
//!
//! # Example
//!
//! ```no_run
//! use optical_scan::detection::PipelineCounters;
//! use optical_scan::metrics::{MetricsRegistry, MetricsSnapshot};
//! use optical_scan::session::SessionState;
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//!
//! let snapshot = MetricsSnapshot {
//!     session_state: Some(SessionState::Scanning),
//!     detection_in_flight: false,
//!     counters: PipelineCounters {
//!         frames_received: 120,
//!         submissions: 12,
//!         completions: 12,
//!         codes_forwarded: 1,
//!         ..Default::default()
//!     },
//! };
//!
//! registry.update(&snapshot);
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, MetricsState, ServerError};
