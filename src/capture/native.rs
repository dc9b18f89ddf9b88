//! Native camera backend built on nokhwa.
//!
//! nokhwa cameras are not `Send`, so each streaming device owns a capture
//! thread that opens the camera, reports whether that succeeded, and then
//! pulls frames until asked to stop or until the device fails.

use super::camera::{
    CameraCharacteristics, CameraDescription, CameraDevice, CameraError, CameraProvider,
    ErrorCallback, FrameCallback, LensFacing, StreamConfig,
};
use super::resolution::DeviceSize;
use super::surface::SurfaceTexture;
use super::Frame;
use nokhwa::pixel_format::LumaFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::Camera;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

fn camera_index(camera_id: &str) -> CameraIndex {
    camera_id
        .parse::<u32>()
        .map(CameraIndex::Index)
        .unwrap_or_else(|_| CameraIndex::String(camera_id.to_string()))
}

/// Provider for the cameras nokhwa can see on this system.
#[derive(Debug, Default)]
pub struct NativeCameraProvider;

impl NativeCameraProvider {
    /// Creates the provider.
    pub fn new() -> Self {
        Self
    }
}

impl CameraProvider for NativeCameraProvider {
    fn available_cameras(&self) -> Result<Vec<CameraDescription>, CameraError> {
        let cameras = nokhwa::query(ApiBackend::Auto)
            .map_err(|e| CameraError::DeviceNotFound(e.to_string()))?;
        Ok(cameras
            .iter()
            .map(|info| CameraDescription {
                name: info.index().as_string(),
                // Desktop backends do not report lens direction.
                lens_facing: LensFacing::External,
            })
            .collect())
    }

    fn characteristics(&self, camera_id: &str) -> Result<CameraCharacteristics, CameraError> {
        let requested =
            RequestedFormat::new::<LumaFormat>(RequestedFormatType::AbsoluteHighestResolution);
        let mut camera = Camera::new(camera_index(camera_id), requested)
            .map_err(|e| CameraError::DeviceNotFound(e.to_string()))?;
        let formats = camera
            .compatible_camera_formats()
            .map_err(|e| CameraError::OpenFailed(e.to_string()))?;

        let mut sizes: Vec<DeviceSize> = Vec::new();
        for format in formats {
            let size = DeviceSize::new(format.resolution().width(), format.resolution().height());
            if !sizes.contains(&size) {
                sizes.push(size);
            }
        }

        Ok(CameraCharacteristics {
            lens_facing: LensFacing::External,
            capture_sizes: sizes.clone(),
            preview_sizes: sizes,
            sensor_orientation: 0,
        })
    }

    fn open(&self, camera_id: &str) -> Result<Box<dyn CameraDevice>, CameraError> {
        tracing::info!(camera_id, "Native camera acquired");
        Ok(Box::new(NativeCamera {
            index: camera_index(camera_id),
            worker: None,
        }))
    }
}

struct CaptureWorker {
    stop_signal: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// A nokhwa camera streaming on its own capture thread.
pub struct NativeCamera {
    index: CameraIndex,
    worker: Option<CaptureWorker>,
}

impl CameraDevice for NativeCamera {
    fn start(
        &mut self,
        config: &StreamConfig,
        _surface: &SurfaceTexture,
        on_frame: FrameCallback,
        on_error: ErrorCallback,
    ) -> Result<(), CameraError> {
        if self.worker.is_some() {
            return Ok(());
        }

        let index = self.index.clone();
        let size = config.capture;
        let stop_signal = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop_signal);
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();

        let handle = thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || {
                let format = CameraFormat::new(
                    Resolution::new(size.width, size.height),
                    FrameFormat::YUYV,
                    30,
                );
                let requested =
                    RequestedFormat::new::<LumaFormat>(RequestedFormatType::Closest(format));
                let mut camera = match Camera::new(index, requested)
                    .and_then(|mut camera| camera.open_stream().map(|_| camera))
                {
                    Ok(camera) => camera,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                let mut sequence = 0u64;
                while !thread_stop.load(Ordering::Acquire) {
                    let image = match camera.frame().and_then(|b| b.decode_image::<LumaFormat>()) {
                        Ok(image) => image,
                        Err(e) => {
                            // A failed read after stop was requested is not a loss.
                            if !thread_stop.load(Ordering::Acquire) {
                                tracing::warn!(error = %e, "Camera frame capture failed");
                                on_error(CameraError::Disconnected(e.to_string()));
                            }
                            break;
                        }
                    };
                    sequence += 1;
                    let (width, height) = (image.width(), image.height());
                    on_frame(Frame::new(image.into_raw(), width, height, sequence));
                }

                if let Err(e) = camera.stop_stream() {
                    tracing::warn!(error = %e, "Failed to stop camera stream");
                }
                tracing::debug!(frames = sequence, "Capture thread exiting");
            })
            .map_err(|e| CameraError::StartFailed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(CaptureWorker {
                    stop_signal,
                    handle,
                });
                Ok(())
            }
            Ok(Err(message)) => {
                let _ = handle.join();
                Err(CameraError::StartFailed(message))
            }
            Err(_) => {
                let _ = handle.join();
                Err(CameraError::StartFailed("capture thread exited".to_string()))
            }
        }
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop_signal.store(true, Ordering::Release);
            if worker.handle.join().is_err() {
                tracing::warn!("Capture thread panicked");
            }
        }
    }

    fn is_streaming(&self) -> bool {
        self.worker
            .as_ref()
            .map(|w| !w.handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for NativeCamera {
    fn drop(&mut self) {
        self.stop();
    }
}
