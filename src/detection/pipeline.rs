//! Single-flight frame pipeline.
//!
//! Frames arrive on the camera thread. While scanning, each frame tries to
//! claim the `busy` flag; the winner is submitted to the detector and every
//! other frame is dropped until the detection completes. Completion runs
//! on the tokio runtime and forwards at most one decoded value per
//! scanning activation. A detection that outlives the configured timeout
//! is abandoned and reported as aborted.

use super::detector::{DecodedResult, Detector, DetectorError};
use crate::capture::{CameraError, ErrorCallback, Frame, FrameCallback};
use crate::session::{EventSink, ScanEvent};
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

/// Cumulative pipeline counters, shared across sessions.
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_received: AtomicU64,
    frames_idle: AtomicU64,
    frames_throttled: AtomicU64,
    submissions: AtomicU64,
    completions: AtomicU64,
    codes_forwarded: AtomicU64,
    results_suppressed: AtomicU64,
    detector_failures: AtomicU64,
    device_losses: AtomicU64,
}

impl PipelineStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every counter.
    pub fn snapshot(&self) -> PipelineCounters {
        PipelineCounters {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_idle: self.frames_idle.load(Ordering::Relaxed),
            frames_throttled: self.frames_throttled.load(Ordering::Relaxed),
            submissions: self.submissions.load(Ordering::Relaxed),
            completions: self.completions.load(Ordering::Relaxed),
            codes_forwarded: self.codes_forwarded.load(Ordering::Relaxed),
            results_suppressed: self.results_suppressed.load(Ordering::Relaxed),
            detector_failures: self.detector_failures.load(Ordering::Relaxed),
            device_losses: self.device_losses.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineCounters {
    /// Frames delivered by the camera.
    pub frames_received: u64,
    /// Frames dropped because scanning was off.
    pub frames_idle: u64,
    /// Frames dropped because a detection was in flight.
    pub frames_throttled: u64,
    /// Frames handed to the detector.
    pub submissions: u64,
    /// Detections that completed, successfully or not.
    pub completions: u64,
    /// Decoded values sent to the host.
    pub codes_forwarded: u64,
    /// Decoded values discarded because scanning had stopped.
    pub results_suppressed: u64,
    /// Detections that failed, timed out or panicked.
    pub detector_failures: u64,
    /// Camera streams that ended unexpectedly.
    pub device_losses: u64,
}

struct Shared {
    /// True while a detection is in flight.
    busy: AtomicBool,
    scanning: AtomicBool,
    disposed: AtomicBool,
    /// Set when the camera stream dies; cleared when a device restarts.
    device_lost: AtomicBool,
    detector: Arc<dyn Detector>,
    events: Arc<dyn EventSink>,
    runtime: Handle,
    timeout: Duration,
    stats: Arc<PipelineStats>,
}

/// Feeds camera frames to a detector, one at a time.
///
/// Clones share the same flags, so the camera callback, the completion
/// task and the owning session all see one pipeline.
#[derive(Clone)]
pub struct FramePipeline {
    shared: Arc<Shared>,
}

impl FramePipeline {
    /// Creates an idle pipeline.
    ///
    /// Detections are spawned on `runtime` and abandoned after `timeout`.
    pub fn new(
        detector: Arc<dyn Detector>,
        events: Arc<dyn EventSink>,
        runtime: Handle,
        timeout: Duration,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                busy: AtomicBool::new(false),
                scanning: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                device_lost: AtomicBool::new(false),
                detector,
                events,
                runtime,
                timeout,
                stats,
            }),
        }
    }

    /// Callback to register with the camera device.
    pub fn frame_callback(&self) -> FrameCallback {
        let pipeline = self.clone();
        Arc::new(move |frame: Frame| pipeline.on_frame(frame))
    }

    /// Stream failure callback to register with the camera device.
    pub fn error_callback(&self) -> ErrorCallback {
        let pipeline = self.clone();
        Arc::new(move |error: CameraError| pipeline.on_device_error(error))
    }

    /// Handles one frame from the camera. Never blocks.
    pub fn on_frame(&self, frame: Frame) {
        let shared = &self.shared;
        bump(&shared.stats.frames_received);

        if !shared.scanning.load(Ordering::Acquire) || shared.disposed.load(Ordering::Acquire) {
            bump(&shared.stats.frames_idle);
            return;
        }

        if shared
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            bump(&shared.stats.frames_throttled);
            trace!(sequence = frame.sequence(), "Detection in flight, dropping frame");
            return;
        }

        bump(&shared.stats.submissions);
        trace!(
            sequence = frame.sequence(),
            width = frame.width(),
            height = frame.height(),
            "Submitting frame to detector"
        );

        let detection = AssertUnwindSafe(shared.detector.submit(frame)).catch_unwind();
        let timeout = shared.timeout;
        let pipeline = self.clone();
        shared.runtime.spawn(async move {
            let result = match tokio::time::timeout(timeout, detection).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(DetectorError::Aborted("detector panicked".to_string())),
                Err(_) => Err(DetectorError::Aborted(format!(
                    "timed out after {} ms",
                    timeout.as_millis()
                ))),
            };
            pipeline.on_detect_result(result);
        });
    }

    /// Handles the camera stream ending unexpectedly.
    ///
    /// Scanning stops and the host gets one error event per loss.
    pub fn on_device_error(&self, error: CameraError) {
        let shared = &self.shared;
        if shared.disposed.load(Ordering::Acquire) {
            debug!(error = %error, "Camera error after dispose, ignoring");
            return;
        }
        if shared.device_lost.swap(true, Ordering::AcqRel) {
            return;
        }

        bump(&shared.stats.device_losses);
        shared.scanning.store(false, Ordering::Release);
        warn!(error = %error, "Camera device lost, scanning stopped");
        shared.events.emit(ScanEvent::Error {
            description: error.to_string(),
        });
    }

    /// Returns true if the camera stream died since the last restart.
    pub fn is_device_lost(&self) -> bool {
        self.shared.device_lost.load(Ordering::Acquire)
    }

    /// Clears the device-lost flag before a device starts streaming again.
    pub fn device_restarted(&self) {
        self.shared.device_lost.store(false, Ordering::Release);
    }

    /// Handles a detector completion.
    ///
    /// Forwards the first decoded value if scanning is still on, then ends
    /// the scanning activation. Errors are reported and leave scanning as
    /// it was. After dispose only the in-flight flag is cleared.
    pub fn on_detect_result(&self, result: Result<Vec<DecodedResult>, DetectorError>) {
        let shared = &self.shared;
        bump(&shared.stats.completions);

        if shared.disposed.load(Ordering::Acquire) {
            debug!("Detection completed after dispose, ignoring");
            shared.busy.store(false, Ordering::Release);
            return;
        }

        match result {
            Err(e) => {
                bump(&shared.stats.detector_failures);
                warn!(error = %e, "Detector failed");
                shared.events.emit(ScanEvent::Error {
                    description: e.to_string(),
                });
            }
            Ok(results) => {
                let count = results.len();
                if let Some(first) = results.into_iter().next() {
                    if shared
                        .scanning
                        .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        bump(&shared.stats.codes_forwarded);
                        info!(
                            format = %first.format,
                            decoded = count,
                            "Code detected, scanning stopped"
                        );
                        shared.events.emit(ScanEvent::Code {
                            value: first.raw_value,
                            format: first.format,
                        });
                    } else {
                        bump(&shared.stats.results_suppressed);
                        debug!(decoded = count, "Scanning stopped, suppressing result");
                    }
                }
            }
        }

        shared.busy.store(false, Ordering::Release);
    }

    /// Enables forwarding for one decoded value.
    ///
    /// A detection already in flight keeps the in-flight flag until it
    /// completes, so at most one submission is ever outstanding.
    pub fn start_scanning(&self) {
        if self.shared.disposed.load(Ordering::Acquire) || self.is_device_lost() {
            return;
        }
        if !self.shared.scanning.swap(true, Ordering::AcqRel) {
            debug!("Scanning started");
        }
    }

    /// Stops submissions and suppresses any in-flight result. Idempotent.
    pub fn stop_scanning(&self) {
        if self.shared.scanning.swap(false, Ordering::AcqRel) {
            debug!("Scanning stopped");
        }
    }

    /// Returns true while scanning is enabled.
    pub fn is_scanning(&self) -> bool {
        self.shared.scanning.load(Ordering::Acquire)
    }

    /// Returns true while a detection is in flight.
    pub fn is_busy(&self) -> bool {
        self.shared.busy.load(Ordering::Acquire)
    }

    /// Stops the pipeline for good and closes the detector.
    ///
    /// A late completion is tolerated; it only clears the in-flight flag.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.scanning.store(false, Ordering::Release);
        self.shared.detector.close();
        debug!("Frame pipeline disposed");
    }

    /// Returns true once disposed.
    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    /// Cumulative counters, including earlier sessions sharing the stats.
    pub fn counters(&self) -> PipelineCounters {
        self.shared.stats.snapshot()
    }
}

impl std::fmt::Debug for FramePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePipeline")
            .field("scanning", &self.is_scanning())
            .field("busy", &self.is_busy())
            .field("disposed", &self.is_disposed())
            .field("device_lost", &self.is_device_lost())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::detector::manual::ManualDetector;
    use crate::detection::CodeFormat;
    use crate::session::events;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn frame(sequence: u64) -> Frame {
        Frame::new(vec![0u8; 16], 4, 4, sequence)
    }

    fn setup() -> (FramePipeline, Arc<ManualDetector>, UnboundedReceiver<ScanEvent>) {
        let detector = ManualDetector::new();
        let (tx, rx) = events::channel();
        let pipeline = FramePipeline::new(
            detector.clone(),
            Arc::new(tx),
            Handle::current(),
            Duration::from_secs(5),
            Arc::new(PipelineStats::new()),
        );
        (pipeline, detector, rx)
    }

    fn code(value: &str) -> DecodedResult {
        DecodedResult::new(value, CodeFormat::Qr)
    }

    /// Lets the completion task run until the in-flight flag clears.
    async fn settle(pipeline: &FramePipeline) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while pipeline.is_busy() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("completion task did not run");
    }

    #[tokio::test]
    async fn test_frames_ignored_while_not_scanning() {
        let (pipeline, detector, _rx) = setup();

        pipeline.on_frame(frame(1));
        pipeline.on_frame(frame(2));

        assert_eq!(detector.submissions(), 0);
        let counters = pipeline.counters();
        assert_eq!(counters.frames_received, 2);
        assert_eq!(counters.frames_idle, 2);
    }

    #[tokio::test]
    async fn test_single_flight() {
        let (pipeline, detector, _rx) = setup();
        pipeline.start_scanning();

        for seq in 1..=10 {
            pipeline.on_frame(frame(seq));
        }
        assert_eq!(detector.submissions(), 1);
        assert!(pipeline.is_busy());

        assert!(detector.complete(Ok(Vec::new())));
        settle(&pipeline).await;

        pipeline.on_frame(frame(11));
        pipeline.on_frame(frame(12));
        assert_eq!(detector.submissions(), 2);

        let counters = pipeline.counters();
        assert!(counters.submissions <= counters.completions + 1);
        assert_eq!(counters.frames_throttled, 10);
    }

    #[tokio::test]
    async fn test_only_first_code_forwarded() {
        let (pipeline, detector, mut rx) = setup();
        pipeline.start_scanning();

        pipeline.on_frame(frame(1));
        detector.complete(Ok(vec![code("first"), code("second")]));
        settle(&pipeline).await;

        assert_eq!(
            rx.try_recv().unwrap(),
            ScanEvent::Code {
                value: "first".to_string(),
                format: CodeFormat::Qr
            }
        );
        assert!(rx.try_recv().is_err());
        assert!(!pipeline.is_scanning());
    }

    #[tokio::test]
    async fn test_one_shot_until_restarted() {
        let (pipeline, detector, mut rx) = setup();
        pipeline.start_scanning();

        pipeline.on_frame(frame(1));
        detector.complete(Ok(vec![code("a")]));
        settle(&pipeline).await;
        assert!(rx.try_recv().is_ok());

        // Scanning is off, so nothing reaches the detector.
        pipeline.on_frame(frame(2));
        assert_eq!(detector.submissions(), 1);

        pipeline.start_scanning();
        pipeline.on_frame(frame(3));
        detector.complete(Ok(vec![code("b")]));
        settle(&pipeline).await;
        assert_eq!(
            rx.try_recv().unwrap(),
            ScanEvent::Code {
                value: "b".to_string(),
                format: CodeFormat::Qr
            }
        );
        assert_eq!(pipeline.counters().codes_forwarded, 2);
    }

    #[tokio::test]
    async fn test_result_suppressed_after_stop() {
        let (pipeline, detector, mut rx) = setup();
        pipeline.start_scanning();

        pipeline.on_frame(frame(1));
        pipeline.stop_scanning();
        detector.complete(Ok(vec![code("late")]));
        settle(&pipeline).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(pipeline.counters().results_suppressed, 1);
    }

    #[tokio::test]
    async fn test_restart_keeps_single_flight() {
        let (pipeline, detector, _rx) = setup();
        pipeline.start_scanning();
        pipeline.on_frame(frame(1));

        pipeline.stop_scanning();
        pipeline.start_scanning();
        pipeline.on_frame(frame(2));

        assert_eq!(detector.submissions(), 1);
        detector.complete(Ok(Vec::new()));
        settle(&pipeline).await;
    }

    #[tokio::test]
    async fn test_error_reported_and_scanning_kept() {
        let (pipeline, detector, mut rx) = setup();
        pipeline.start_scanning();

        pipeline.on_frame(frame(1));
        detector.complete(Err(DetectorError::Failed("blurry".to_string())));
        settle(&pipeline).await;

        assert_eq!(
            rx.try_recv().unwrap(),
            ScanEvent::Error {
                description: "detection failed: blurry".to_string()
            }
        );
        assert!(pipeline.is_scanning());
        assert_eq!(pipeline.counters().detector_failures, 1);

        pipeline.on_frame(frame(2));
        assert_eq!(detector.submissions(), 2);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (pipeline, _detector, _rx) = setup();
        pipeline.stop_scanning();
        pipeline.stop_scanning();
        assert!(!pipeline.is_scanning());
    }

    #[tokio::test]
    async fn test_completion_after_dispose_is_ignored() {
        let (pipeline, detector, mut rx) = setup();
        pipeline.start_scanning();
        pipeline.on_frame(frame(1));

        pipeline.dispose();
        assert!(detector.is_closed());

        detector.complete(Ok(vec![code("gone")]));
        settle(&pipeline).await;
        assert!(rx.try_recv().is_err());

        pipeline.start_scanning();
        assert!(!pipeline.is_scanning());
    }

    struct PanickingDetector;

    impl Detector for PanickingDetector {
        fn submit(&self, _frame: Frame) -> crate::detection::DetectionFuture {
            async { panic!("decoder crashed") }.boxed()
        }

        fn close(&self) {}
    }

    #[tokio::test]
    async fn test_detector_panic_reported_as_abort() {
        let (tx, mut rx) = events::channel();
        let pipeline = FramePipeline::new(
            Arc::new(PanickingDetector),
            Arc::new(tx),
            Handle::current(),
            Duration::from_secs(5),
            Arc::new(PipelineStats::new()),
        );
        pipeline.start_scanning();
        pipeline.on_frame(frame(1));
        settle(&pipeline).await;

        assert_eq!(
            rx.try_recv().unwrap(),
            ScanEvent::Error {
                description: "detection aborted: detector panicked".to_string()
            }
        );
        assert!(pipeline.is_scanning());
    }

    #[tokio::test]
    async fn test_stalled_detection_times_out() {
        let detector = ManualDetector::new();
        let (tx, mut rx) = events::channel();
        let pipeline = FramePipeline::new(
            detector.clone(),
            Arc::new(tx),
            Handle::current(),
            Duration::from_millis(20),
            Arc::new(PipelineStats::new()),
        );
        pipeline.start_scanning();
        pipeline.on_frame(frame(1));
        assert!(pipeline.is_busy());

        // The detector never completes.
        settle(&pipeline).await;
        assert_eq!(
            rx.try_recv().unwrap(),
            ScanEvent::Error {
                description: "detection aborted: timed out after 20 ms".to_string()
            }
        );
        assert!(pipeline.is_scanning());
        assert_eq!(pipeline.counters().detector_failures, 1);

        pipeline.on_frame(frame(2));
        assert_eq!(detector.submissions(), 2);
    }

    #[tokio::test]
    async fn test_device_loss_stops_scanning_once() {
        let (pipeline, detector, mut rx) = setup();
        pipeline.start_scanning();

        pipeline.on_device_error(CameraError::Disconnected("unplugged".to_string()));
        pipeline.on_device_error(CameraError::Disconnected("unplugged".to_string()));

        assert_eq!(
            rx.try_recv().unwrap(),
            ScanEvent::Error {
                description: "camera disconnected: unplugged".to_string()
            }
        );
        assert!(rx.try_recv().is_err());
        assert!(pipeline.is_device_lost());
        assert!(!pipeline.is_scanning());
        assert_eq!(pipeline.counters().device_losses, 1);

        pipeline.start_scanning();
        pipeline.on_frame(frame(1));
        assert_eq!(detector.submissions(), 0);

        pipeline.device_restarted();
        pipeline.start_scanning();
        pipeline.on_frame(frame(2));
        assert_eq!(detector.submissions(), 1);
    }

    #[tokio::test]
    async fn test_device_error_after_dispose_is_silent() {
        let (pipeline, _detector, mut rx) = setup();
        pipeline.dispose();
        pipeline.on_device_error(CameraError::Disconnected("gone".to_string()));
        assert!(rx.try_recv().is_err());
        assert!(!pipeline.is_device_lost());
    }
}
