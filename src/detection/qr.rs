//! QR code detection task
//!
//! Frames are sampled to grayscale, downscaled to a bounded size and
//! searched with rqrr on the blocking pool. Only the QR symbology is
//! decoded; a session that did not request QR gets empty results.

use super::detector::{DecodedResult, DetectionFuture, Detector, DetectorError};
use super::formats::{CodeFormat, CodeFormatSet};
use crate::capture::Frame;
use futures::future::{self, FutureExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, trace};

/// rqrr-backed QR detector.
#[derive(Debug)]
pub struct QrDetector {
    enabled: bool,
    /// Maximum dimension for processing (frames are downscaled to this)
    max_dimension: u32,
    closed: AtomicBool,
}

impl QrDetector {
    /// Creates a detector for the requested formats.
    pub fn new(formats: &CodeFormatSet, max_dimension: u32) -> Self {
        let enabled = formats.contains(CodeFormat::Qr);
        if !enabled {
            debug!(
                mask = formats.native_mask(),
                "QR detector created for a format set without QR, results will be empty"
            );
        }
        Self {
            enabled,
            max_dimension: max_dimension.max(1),
            closed: AtomicBool::new(false),
        }
    }
}

impl Detector for QrDetector {
    fn submit(&self, frame: Frame) -> DetectionFuture {
        if self.closed.load(Ordering::Acquire) {
            return future::ready(Err(DetectorError::Closed)).boxed();
        }
        if !self.enabled {
            return future::ready(Ok(Vec::new())).boxed();
        }

        let max_dimension = self.max_dimension;
        // spawn_blocking runs when the future is first polled, which is
        // always on the runtime.
        async move {
            tokio::task::spawn_blocking(move || detect_sync(&frame, max_dimension))
                .await
                .map_err(|e| DetectorError::Aborted(e.to_string()))
        }
        .boxed()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Synchronous QR detection (runs in blocking task)
fn detect_sync(frame: &Frame, max_dimension: u32) -> Vec<DecodedResult> {
    let start = Instant::now();

    let (width, height) = (frame.width(), frame.height());
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let step = width.max(height).div_ceil(max_dimension).max(1);
    let proc_width = width.div_ceil(step);
    let proc_height = height.div_ceil(step);

    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
        proc_width as usize,
        proc_height as usize,
        |x, y| {
            let sx = (x as u32 * step).min(width - 1);
            let sy = (y as u32 * step).min(height - 1);
            frame.luma(sx, sy)
        },
    );

    let grids = prepared.detect_grids();
    trace!(
        proc_width,
        proc_height,
        step,
        grids = grids.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "QR grid detection complete"
    );

    let mut results = Vec::with_capacity(grids.len());
    for grid in grids {
        match grid.decode() {
            Ok((_meta, content)) => results.push(DecodedResult::new(content, CodeFormat::Qr)),
            Err(e) => debug!(error = %e, "Failed to decode QR grid"),
        }
    }

    if !results.is_empty() {
        debug!(
            count = results.len(),
            sequence = frame.sequence(),
            total_ms = start.elapsed().as_millis() as u64,
            "QR detection found codes"
        );
    }
    results
}
