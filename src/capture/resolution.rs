//! Capture and preview resolution negotiation.
//!
//! A device advertises one list of sizes for analysis capture and another
//! for the preview surface. The capture size is the largest analysis size;
//! the preview size is the smallest surface size that keeps the capture
//! aspect ratio and clears the quality tier's floor, so per-frame detector
//! cost stays proportional to what the tier actually asks for.

use super::config::QualityTier;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tallest recording size a surface may be negotiated at.
pub const MAX_RECORDING_HEIGHT: u32 = 1080;

/// Errors produced while negotiating resolutions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("device reports no usable resolutions")]
    NoSizesAvailable,
}

/// A resolution advertised by a camera device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl DeviceSize {
    /// Creates a size from its dimensions.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixel count, widened so large sensors cannot overflow.
    #[inline]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Width over height as a single-precision ratio.
    ///
    /// Ratios are compared with exact equality, so 16:9 sizes whose
    /// division rounds differently do not match each other.
    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Returns true if both dimensions strictly exceed `floor`.
    #[inline]
    pub fn exceeds(&self, floor: &DeviceSize) -> bool {
        self.width > floor.width && self.height > floor.height
    }
}

impl std::fmt::Display for DeviceSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Preview and recording sizes chosen for the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewSizes {
    /// Size of the on-screen live view.
    pub preview: DeviceSize,
    /// Largest matching size no taller than [`MAX_RECORDING_HEIGHT`].
    pub recording: DeviceSize,
}

/// Every size a session needs, fixed once at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedSizes {
    /// Resolution of the analysis frames fed to the detector.
    pub capture: DeviceSize,
    /// Resolution of the live view.
    pub preview: DeviceSize,
    /// Resolution a recorder would use.
    pub recording: DeviceSize,
}

/// Picks the analysis capture size: the first size with maximal area.
pub fn compute_capture_size(sizes: &[DeviceSize]) -> Result<DeviceSize, ResolutionError> {
    let mut best: Option<DeviceSize> = None;
    for size in sizes {
        match best {
            Some(current) if size.area() <= current.area() => {}
            _ => best = Some(*size),
        }
    }
    best.ok_or(ResolutionError::NoSizesAvailable)
}

/// Picks preview and recording sizes for the surface.
///
/// Candidates share the capture size's aspect ratio exactly and exceed
/// `min_size` in both dimensions. With no candidates, the first advertised
/// size is used for both outputs. An empty `sizes` list is an error.
pub fn compute_preview_size(
    sizes: &[DeviceSize],
    min_size: DeviceSize,
    capture_size: DeviceSize,
) -> Result<PreviewSizes, ResolutionError> {
    let fallback = *sizes.first().ok_or(ResolutionError::NoSizesAvailable)?;
    let target_ratio = capture_size.aspect_ratio();

    let mut candidates: Vec<DeviceSize> = sizes
        .iter()
        .copied()
        .filter(|s| s.aspect_ratio() == target_ratio && s.exceeds(&min_size))
        .collect();

    if candidates.is_empty() {
        tracing::debug!(
            %capture_size,
            %min_size,
            %fallback,
            "No preview size matches capture ratio above floor, using first advertised size"
        );
        return Ok(PreviewSizes {
            preview: fallback,
            recording: fallback,
        });
    }

    // Stable sort keeps advertised order among equal areas.
    candidates.sort_by_key(DeviceSize::area);

    let preview = candidates[0];
    let recording = candidates
        .iter()
        .rev()
        .find(|s| s.height <= MAX_RECORDING_HEIGHT)
        .copied()
        .unwrap_or(preview);

    Ok(PreviewSizes { preview, recording })
}

/// Negotiates every session size from a device's advertised lists.
pub fn negotiate_sizes(
    capture_sizes: &[DeviceSize],
    preview_sizes: &[DeviceSize],
    quality: QualityTier,
) -> Result<NegotiatedSizes, ResolutionError> {
    let capture = compute_capture_size(capture_sizes)?;
    let PreviewSizes { preview, recording } =
        compute_preview_size(preview_sizes, quality.min_preview_size(), capture)?;

    tracing::debug!(
        %capture,
        %preview,
        %recording,
        ?quality,
        "Negotiated camera sizes"
    );

    Ok(NegotiatedSizes {
        capture,
        preview,
        recording,
    })
}
