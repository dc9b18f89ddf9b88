//! Camera abstraction for live frame capture.
//!
//! A [`CameraProvider`] enumerates devices and reports what each one can
//! do; opening a camera yields a [`CameraDevice`] handle that streams frames
//! into a registered callback until it is stopped or dropped. A stream that
//! dies on its own reports through the error callback instead. Dropping the
//! handle releases the device.

use super::resolution::DeviceSize;
use super::surface::SurfaceTexture;
use super::Frame;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    #[error("failed to open camera: {0}")]
    OpenFailed(String),
    #[error("failed to start camera stream: {0}")]
    StartFailed(String),
    #[error("camera does not support {0}")]
    Unsupported(&'static str),
    #[error("camera not initialized")]
    NotInitialized,
    #[error("camera disconnected: {0}")]
    Disconnected(String),
}

/// Direction a camera lens faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LensFacing {
    Front,
    Back,
    External,
}

/// Entry returned when enumerating cameras.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraDescription {
    /// Identifier accepted by [`CameraProvider::open`].
    pub name: String,
    /// Lens direction.
    pub lens_facing: LensFacing,
}

/// Static capabilities of a camera device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraCharacteristics {
    /// Lens direction.
    pub lens_facing: LensFacing,
    /// Sizes available for analysis frames.
    pub capture_sizes: Vec<DeviceSize>,
    /// Sizes available for the preview surface.
    pub preview_sizes: Vec<DeviceSize>,
    /// Clockwise sensor rotation relative to the display.
    pub sensor_orientation: u16,
}

/// Stream parameters handed to a device when it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Analysis frame size.
    pub capture: DeviceSize,
    /// Preview surface size.
    pub preview: DeviceSize,
    /// Lens direction, used for mirroring.
    pub lens_facing: LensFacing,
}

/// Callback invoked by a device for every captured frame.
///
/// Called on the device's own thread. Implementations must return quickly.
pub type FrameCallback = Arc<dyn Fn(Frame) + Send + Sync>;

/// Callback invoked at most once when a started stream ends unexpectedly.
///
/// Not called for streams ended by [`CameraDevice::stop`].
pub type ErrorCallback = Arc<dyn Fn(CameraError) + Send + Sync>;

/// Enumerates and opens camera devices.
pub trait CameraProvider: Send + Sync {
    /// Lists the cameras present on this system.
    fn available_cameras(&self) -> Result<Vec<CameraDescription>, CameraError>;

    /// Reports the capabilities of a camera without opening it.
    fn characteristics(&self, camera_id: &str) -> Result<CameraCharacteristics, CameraError>;

    /// Acquires a camera device.
    fn open(&self, camera_id: &str) -> Result<Box<dyn CameraDevice>, CameraError>;
}

/// An acquired camera device. Dropping it releases the device.
pub trait CameraDevice: Send {
    /// Starts the preview into `surface` and frame delivery into `on_frame`.
    ///
    /// Once started, a lost device is reported through `on_error`.
    fn start(
        &mut self,
        config: &StreamConfig,
        surface: &SurfaceTexture,
        on_frame: FrameCallback,
        on_error: ErrorCallback,
    ) -> Result<(), CameraError>;

    /// Halts the preview and frame delivery. Idempotent.
    fn stop(&mut self);

    /// Checks if the device is currently streaming.
    fn is_streaming(&self) -> bool;

    /// Toggles the torch, returning its new state.
    fn toggle_flash(&mut self) -> Result<bool, CameraError> {
        Err(CameraError::Unsupported("flash"))
    }
}
