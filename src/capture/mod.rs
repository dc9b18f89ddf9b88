//! Camera input, resolution negotiation and frame handling.
//!
//! This module provides the camera-facing collaborators of a scanning
//! session: device enumeration and acquisition, the preview surface
//! registry, negotiated sizes and the frames a device delivers.

mod camera;
mod config;
mod frame;
mod mock;
#[cfg(feature = "camera")]
mod native;
mod resolution;
mod surface;

pub use camera::{
    CameraCharacteristics, CameraDescription, CameraDevice, CameraError, CameraProvider,
    ErrorCallback, FrameCallback, LensFacing, StreamConfig,
};
pub use config::{ConfigError, DetectorConfig, FileConfig, OutputConfig, QualityTier, ScannerConfig};
pub use frame::{Frame, PixelFormat};
pub use mock::{MockCamera, MockCameraProvider, MockCameraSpec, MockSurfaceRegistry};
#[cfg(feature = "camera")]
pub use native::{NativeCamera, NativeCameraProvider};
pub use resolution::{
    compute_capture_size, compute_preview_size, negotiate_sizes, DeviceSize, NegotiatedSizes,
    PreviewSizes, ResolutionError, MAX_RECORDING_HEIGHT,
};
pub use surface::{SurfaceHandle, SurfaceRegistry, SurfaceTexture};
