//! In-memory camera and surface implementations.
//!
//! Frames are pushed explicitly, so the caller decides which thread plays
//! the role of the camera driver. The demo binary and the session tests
//! both drive sessions through these.

use super::camera::{
    CameraCharacteristics, CameraDescription, CameraDevice, CameraError, CameraProvider,
    ErrorCallback, FrameCallback, LensFacing, StreamConfig,
};
use super::resolution::DeviceSize;
use super::surface::{SurfaceHandle, SurfaceRegistry, SurfaceTexture};
use super::Frame;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Description of one simulated camera.
#[derive(Debug, Clone)]
pub struct MockCameraSpec {
    /// Identifier used to open it.
    pub name: String,
    /// Lens direction.
    pub lens_facing: LensFacing,
    /// Advertised analysis sizes.
    pub capture_sizes: Vec<DeviceSize>,
    /// Advertised preview sizes.
    pub preview_sizes: Vec<DeviceSize>,
}

impl MockCameraSpec {
    /// A back camera advertising common 4:3 and 16:9 sizes.
    pub fn back(name: &str) -> Self {
        let sizes = vec![
            DeviceSize::new(1920, 1080),
            DeviceSize::new(1280, 720),
            DeviceSize::new(1024, 768),
            DeviceSize::new(640, 480),
            DeviceSize::new(320, 240),
        ];
        Self {
            name: name.to_string(),
            lens_facing: LensFacing::Back,
            capture_sizes: sizes.clone(),
            preview_sizes: sizes,
        }
    }
}

#[derive(Default)]
struct MockState {
    callback: Option<FrameCallback>,
    on_error: Option<ErrorCallback>,
    config: Option<StreamConfig>,
    sequence: u64,
    open_count: u32,
    release_count: u32,
    fail_next_open: bool,
    fail_next_start: bool,
    flash: bool,
}

/// Camera provider backed by a list of simulated cameras.
///
/// Clones share state, so a test can keep one clone to push frames and
/// inspect device usage while the session owns another.
#[derive(Clone)]
pub struct MockCameraProvider {
    cameras: Arc<Vec<MockCameraSpec>>,
    state: Arc<Mutex<MockState>>,
}

impl MockCameraProvider {
    /// Creates a provider with a single back camera named `"0"`.
    pub fn new() -> Self {
        Self::with_cameras(vec![MockCameraSpec::back("0")])
    }

    /// Creates a provider with the given cameras.
    pub fn with_cameras(cameras: Vec<MockCameraSpec>) -> Self {
        Self {
            cameras: Arc::new(cameras),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next [`CameraProvider::open`] call fail.
    pub fn fail_next_open(&self) {
        self.state().fail_next_open = true;
    }

    /// Makes the next [`CameraDevice::start`] call fail.
    pub fn fail_next_start(&self) {
        self.state().fail_next_start = true;
    }

    /// Kills the streaming device as a driver failure would.
    ///
    /// Frame delivery ends and the device's error callback fires. Returns
    /// false if no device is streaming.
    pub fn fail_stream(&self, reason: &str) -> bool {
        let on_error = {
            let mut state = self.state();
            if state.callback.take().is_none() {
                return false;
            }
            state.config = None;
            state.on_error.take()
        };
        if let Some(on_error) = on_error {
            on_error(CameraError::Disconnected(reason.to_string()));
        }
        true
    }

    /// Pushes a synthetic frame at the configured capture size.
    ///
    /// Returns false if no device is streaming.
    pub fn push_frame(&self) -> bool {
        let (callback, frame) = {
            let mut state = self.state();
            let (Some(callback), Some(config)) = (state.callback.clone(), state.config) else {
                return false;
            };
            state.sequence += 1;
            let sequence = state.sequence;
            let size = config.capture;

            // Deterministic pattern mixed with the sequence number.
            let pixels: Vec<u8> = (0..size.area())
                .map(|i| ((i ^ sequence) % 256) as u8)
                .collect();
            (callback, Frame::new(pixels, size.width, size.height, sequence))
        };

        // The lock is released before the callback runs, as a driver thread would.
        callback(frame);
        true
    }

    /// Pushes a caller-supplied frame. Returns false if no device is streaming.
    pub fn push(&self, frame: Frame) -> bool {
        let callback = self.state().callback.clone();
        match callback {
            Some(callback) => {
                callback(frame);
                true
            }
            None => false,
        }
    }

    /// Returns true while a device is streaming.
    pub fn is_streaming(&self) -> bool {
        self.state().callback.is_some()
    }

    /// Number of devices acquired so far.
    pub fn open_count(&self) -> u32 {
        self.state().open_count
    }

    /// Number of devices released so far.
    pub fn release_count(&self) -> u32 {
        self.state().release_count
    }

    /// Stream configuration of the streaming device, if any.
    pub fn stream_config(&self) -> Option<StreamConfig> {
        self.state().config
    }

    fn spec(&self, camera_id: &str) -> Result<&MockCameraSpec, CameraError> {
        self.cameras
            .iter()
            .find(|c| c.name == camera_id)
            .ok_or_else(|| CameraError::DeviceNotFound(camera_id.to_string()))
    }
}

impl Default for MockCameraProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraProvider for MockCameraProvider {
    fn available_cameras(&self) -> Result<Vec<CameraDescription>, CameraError> {
        Ok(self
            .cameras
            .iter()
            .map(|c| CameraDescription {
                name: c.name.clone(),
                lens_facing: c.lens_facing,
            })
            .collect())
    }

    fn characteristics(&self, camera_id: &str) -> Result<CameraCharacteristics, CameraError> {
        let spec = self.spec(camera_id)?;
        Ok(CameraCharacteristics {
            lens_facing: spec.lens_facing,
            capture_sizes: spec.capture_sizes.clone(),
            preview_sizes: spec.preview_sizes.clone(),
            sensor_orientation: 90,
        })
    }

    fn open(&self, camera_id: &str) -> Result<Box<dyn CameraDevice>, CameraError> {
        self.spec(camera_id)?;
        let mut state = self.state();
        if std::mem::take(&mut state.fail_next_open) {
            return Err(CameraError::OpenFailed(format!(
                "camera {camera_id} is in use by another client"
            )));
        }
        state.open_count += 1;
        tracing::info!(camera_id, "MockCamera opened");
        Ok(Box::new(MockCamera {
            state: Arc::clone(&self.state),
            streaming: false,
        }))
    }
}

/// Device handle produced by [`MockCameraProvider`].
pub struct MockCamera {
    state: Arc<Mutex<MockState>>,
    streaming: bool,
}

impl MockCamera {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CameraDevice for MockCamera {
    fn start(
        &mut self,
        config: &StreamConfig,
        _surface: &SurfaceTexture,
        on_frame: FrameCallback,
        on_error: ErrorCallback,
    ) -> Result<(), CameraError> {
        let mut state = self.state();
        if std::mem::take(&mut state.fail_next_start) {
            return Err(CameraError::StartFailed("preview surface rejected".to_string()));
        }
        state.callback = Some(on_frame);
        state.on_error = Some(on_error);
        state.config = Some(*config);
        drop(state);
        self.streaming = true;
        Ok(())
    }

    fn stop(&mut self) {
        if self.streaming {
            self.streaming = false;
            let mut state = self.state();
            state.callback = None;
            state.on_error = None;
            state.config = None;
        }
    }

    fn is_streaming(&self) -> bool {
        self.streaming
    }

    fn toggle_flash(&mut self) -> Result<bool, CameraError> {
        let mut state = self.state();
        state.flash = !state.flash;
        Ok(state.flash)
    }
}

impl Drop for MockCamera {
    fn drop(&mut self) {
        self.stop();
        self.state().release_count += 1;
        tracing::info!("MockCamera closed");
    }
}

/// Texture registry that hands out sequential ids and tracks live ones.
#[derive(Debug, Default)]
pub struct MockSurfaceRegistry {
    next_id: AtomicI64,
    live: Mutex<HashSet<i64>>,
}

impl MockSurfaceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of textures created and not yet released.
    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl SurfaceRegistry for MockSurfaceRegistry {
    fn create_surface_texture(&self) -> SurfaceTexture {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
        SurfaceTexture {
            id,
            handle: SurfaceHandle(id as u64),
        }
    }

    fn release(&self, id: i64) {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}
