//! Metrics collection and registry.

use crate::detection::PipelineCounters;
use crate::session::{ScannerMonitor, SessionState};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of scanner state for metrics update.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// State of the current session, if any.
    pub session_state: Option<SessionState>,
    /// Whether a detection is in flight.
    pub detection_in_flight: bool,
    /// Cumulative pipeline counters.
    pub counters: PipelineCounters,
}

/// Prometheus metrics registry for scanner monitoring.
pub struct MetricsRegistry {
    registry: Registry,

    // Session metrics
    session_state: IntGauge,
    scanning: IntGauge,
    detection_in_flight: IntGauge,

    // Frame metrics
    frames_received: IntCounter,
    frames_idle: IntCounter,
    frames_throttled: IntCounter,

    // Detector metrics
    submissions: IntCounter,
    completions: IntCounter,
    failures: IntCounter,

    // Result metrics
    codes_forwarded: IntCounter,
    results_suppressed: IntCounter,

    // Device metrics
    device_losses: IntCounter,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all scanner metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let session_state = IntGauge::new(
            "optical_scan_session_state",
            "Session state (-1=none, 0=created, 1=awaiting_permission, 2=opening, 3=opened, 4=scanning, 5=stopped, 6=disposed)",
        )?;
        let scanning = IntGauge::new(
            "optical_scan_scanning",
            "Whether scanning is enabled (1=scanning, 0=idle)",
        )?;
        let detection_in_flight = IntGauge::new(
            "optical_scan_detection_in_flight",
            "Whether a detection is currently in flight",
        )?;

        let frames_received = IntCounter::new(
            "optical_scan_frames_received_total",
            "Total frames delivered by the camera",
        )?;
        let frames_idle = IntCounter::new(
            "optical_scan_frames_idle_total",
            "Frames dropped because scanning was off",
        )?;
        let frames_throttled = IntCounter::new(
            "optical_scan_frames_throttled_total",
            "Frames dropped because a detection was in flight",
        )?;

        let submissions = IntCounter::new(
            "optical_scan_detector_submissions_total",
            "Total frames submitted to the detector",
        )?;
        let completions = IntCounter::new(
            "optical_scan_detector_completions_total",
            "Total detector completions",
        )?;
        let failures = IntCounter::new(
            "optical_scan_detector_failures_total",
            "Total failed detections",
        )?;

        let codes_forwarded = IntCounter::new(
            "optical_scan_codes_forwarded_total",
            "Total decoded values delivered to the host",
        )?;
        let results_suppressed = IntCounter::new(
            "optical_scan_results_suppressed_total",
            "Decoded values discarded because scanning had stopped",
        )?;

        let device_losses = IntCounter::new(
            "optical_scan_device_losses_total",
            "Camera streams that ended unexpectedly",
        )?;

        registry.register(Box::new(session_state.clone()))?;
        registry.register(Box::new(scanning.clone()))?;
        registry.register(Box::new(detection_in_flight.clone()))?;
        registry.register(Box::new(frames_received.clone()))?;
        registry.register(Box::new(frames_idle.clone()))?;
        registry.register(Box::new(frames_throttled.clone()))?;
        registry.register(Box::new(submissions.clone()))?;
        registry.register(Box::new(completions.clone()))?;
        registry.register(Box::new(failures.clone()))?;
        registry.register(Box::new(codes_forwarded.clone()))?;
        registry.register(Box::new(results_suppressed.clone()))?;
        registry.register(Box::new(device_losses.clone()))?;

        Ok(Self {
            registry,
            session_state,
            scanning,
            detection_in_flight,
            frames_received,
            frames_idle,
            frames_throttled,
            submissions,
            completions,
            failures,
            codes_forwarded,
            results_suppressed,
            device_losses,
        })
    }

    /// Updates all metrics from a snapshot of scanner state.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        self.session_state
            .set(snapshot.session_state.map_or(-1, SessionState::code));
        self.scanning
            .set(i64::from(snapshot.session_state == Some(SessionState::Scanning)));
        self.detection_in_flight
            .set(i64::from(snapshot.detection_in_flight));

        // Counters only move forward, so increment by the difference.
        let counters = &snapshot.counters;
        advance(&self.frames_received, counters.frames_received);
        advance(&self.frames_idle, counters.frames_idle);
        advance(&self.frames_throttled, counters.frames_throttled);
        advance(&self.submissions, counters.submissions);
        advance(&self.completions, counters.completions);
        advance(&self.failures, counters.detector_failures);
        advance(&self.codes_forwarded, counters.codes_forwarded);
        advance(&self.results_suppressed, counters.results_suppressed);
        advance(&self.device_losses, counters.device_losses);
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

impl MetricsSnapshot {
    /// Reads the scanner through a monitor.
    pub fn from_monitor(monitor: &ScannerMonitor) -> Self {
        Self {
            session_state: monitor.state(),
            detection_in_flight: monitor.detection_in_flight(),
            counters: monitor.counters(),
        }
    }
}
