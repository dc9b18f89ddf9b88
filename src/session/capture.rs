//! Capture session lifecycle.
//!
//! A session owns one camera device, one preview texture and one frame
//! pipeline. Sizes are negotiated when the session is created and reused
//! for every (re)open. All methods run on the host's command thread; only
//! the pipeline flags are touched from elsewhere. A device that dies while
//! open leaves the session `Stopped` until it is resumed or reinitialized.

use super::error::SessionError;
use super::events::ScanEvent;
use super::monitor::{effective_state, SessionView, StateCell};
use super::service::Platform;
use super::state::{LifecycleEvent, SessionState};
use crate::capture::{
    negotiate_sizes, CameraDevice, LensFacing, NegotiatedSizes, QualityTier, StreamConfig,
    SurfaceTexture,
};
use crate::detection::{CodeFormatSet, FramePipeline, PipelineCounters, PipelineStats};
use crate::permission::{Gate, PermissionGate, PermissionOutcome};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// What the host needs to display an opened session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenResult {
    /// Texture the preview renders into.
    pub texture_id: i64,
    /// Preview width in pixels.
    pub preview_width: u32,
    /// Preview height in pixels.
    pub preview_height: u32,
}

type OpenReply = oneshot::Sender<Result<OpenResult, SessionError>>;

/// The open continuation parked while permission is requested.
struct PendingOpen {
    reply: OpenReply,
}

/// Deferred open result, resolved once the permission outcome arrives.
#[derive(Debug)]
pub struct OpenTicket {
    rx: oneshot::Receiver<Result<OpenResult, SessionError>>,
}

impl OpenTicket {
    /// Waits for the session to open or fail.
    pub async fn opened(self) -> Result<OpenResult, SessionError> {
        self.rx.await.unwrap_or(Err(SessionError::SessionDisposed))
    }

    /// Returns the result if it has been delivered.
    pub fn try_opened(&mut self) -> Option<Result<OpenResult, SessionError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(SessionError::SessionDisposed)),
        }
    }
}

/// Outcome of [`CaptureSession::initialize`].
#[derive(Debug)]
pub enum Initialized {
    /// Permission was held and the camera is open.
    Opened(OpenResult),
    /// A permission prompt was issued; the ticket resolves later.
    PermissionPending(OpenTicket),
}

/// One camera, its preview texture and its detection pipeline.
pub struct CaptureSession {
    camera_id: String,
    lens_facing: LensFacing,
    quality: QualityTier,
    formats: CodeFormatSet,
    sizes: NegotiatedSizes,
    state: Arc<StateCell>,
    texture: Option<SurfaceTexture>,
    device: Option<Box<dyn CameraDevice>>,
    pipeline: FramePipeline,
    gate: PermissionGate<PendingOpen>,
    platform: Platform,
}

impl CaptureSession {
    /// Creates a session for `camera_id`, negotiating its sizes.
    ///
    /// Nothing is acquired yet; the device is opened by
    /// [`initialize`](Self::initialize).
    pub fn create(
        platform: Platform,
        camera_id: &str,
        quality: QualityTier,
        formats: CodeFormatSet,
        stats: Arc<PipelineStats>,
    ) -> Result<Self, SessionError> {
        let characteristics = platform.cameras.characteristics(camera_id)?;
        let sizes = negotiate_sizes(
            &characteristics.capture_sizes,
            &characteristics.preview_sizes,
            quality,
        )?;
        let detector = platform.detectors.create(&formats)?;
        let pipeline = FramePipeline::new(
            detector,
            Arc::clone(&platform.events),
            platform.runtime.clone(),
            platform.detection_timeout,
            stats,
        );

        info!(
            camera_id,
            lens_facing = ?characteristics.lens_facing,
            quality = quality.as_str(),
            formats = formats.native_mask(),
            capture = %sizes.capture,
            preview = %sizes.preview,
            "Capture session created"
        );

        Ok(Self {
            camera_id: camera_id.to_string(),
            lens_facing: characteristics.lens_facing,
            quality,
            formats,
            sizes,
            state: Arc::new(StateCell::new(SessionState::Created)),
            texture: None,
            device: None,
            pipeline,
            gate: PermissionGate::new(Arc::clone(&platform.permissions)),
            platform,
        })
    }

    /// Opens the camera, or requests permission and defers the open.
    pub fn initialize(&mut self) -> Result<Initialized, SessionError> {
        match self.state() {
            SessionState::Disposed => return Err(SessionError::SessionDisposed),
            SessionState::AwaitingPermission => return Err(SessionError::PermissionPending),
            state if state.is_open() => return Ok(Initialized::Opened(self.open_result()?)),
            _ => {}
        }

        let (reply, rx) = oneshot::channel();
        match self.gate.ensure_permission(PendingOpen { reply })? {
            Gate::Proceed(_) => {
                self.state.set(SessionState::Opening);
                self.open().map(Initialized::Opened)
            }
            Gate::Deferred => {
                self.state.set(SessionState::AwaitingPermission);
                info!(camera_id = %self.camera_id, "Waiting for camera permission");
                Ok(Initialized::PermissionPending(OpenTicket { rx }))
            }
        }
    }

    /// Resumes a deferred open with the platform's permission outcome.
    ///
    /// Returns `Ok(None)` if no open was waiting.
    pub fn on_permission_result(
        &mut self,
        outcome: PermissionOutcome,
    ) -> Result<Option<OpenResult>, SessionError> {
        let Some(pending) = self.gate.take_pending() else {
            debug!(?outcome, "Permission result with nothing pending");
            return Ok(None);
        };

        match outcome.into_result() {
            Ok(()) => {
                self.state.set(SessionState::Opening);
                let result = self.open();
                // The ticket may have been dropped by the host.
                let _ = pending.reply.send(result.clone());
                result.map(Some)
            }
            Err(e) => {
                let err = SessionError::from(e);
                self.state.set(SessionState::Stopped);
                warn!(camera_id = %self.camera_id, error = %err, "Camera permission refused");
                let _ = pending.reply.send(Err(err.clone()));
                Err(err)
            }
        }
    }

    /// Acquires the device, binds the preview and attaches the pipeline.
    fn open(&mut self) -> Result<OpenResult, SessionError> {
        self.release_device();
        let texture = match self.texture {
            Some(texture) => texture,
            None => {
                let texture = self.platform.surfaces.create_surface_texture();
                self.texture = Some(texture);
                texture
            }
        };

        match self.acquire(&texture) {
            Ok(device) => {
                self.device = Some(device);
                self.state.set(SessionState::Opened);
                info!(
                    camera_id = %self.camera_id,
                    texture_id = texture.id,
                    preview = %self.sizes.preview,
                    "Camera opened"
                );
                self.open_result()
            }
            Err(e) => {
                warn!(camera_id = %self.camera_id, error = %e, "Failed to open camera");
                self.platform.surfaces.release(texture.id);
                self.texture = None;
                self.state.set(SessionState::Stopped);
                Err(e)
            }
        }
    }

    fn acquire(&self, texture: &SurfaceTexture) -> Result<Box<dyn CameraDevice>, SessionError> {
        let mut device = self.platform.cameras.open(&self.camera_id)?;
        let config = StreamConfig {
            capture: self.sizes.capture,
            preview: self.sizes.preview,
            lens_facing: self.lens_facing,
        };
        self.pipeline.device_restarted();
        // A device that fails to start is released when dropped here.
        device.start(
            &config,
            texture,
            self.pipeline.frame_callback(),
            self.pipeline.error_callback(),
        )?;
        Ok(device)
    }

    fn release_device(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.stop();
        }
    }

    fn open_result(&self) -> Result<OpenResult, SessionError> {
        let texture = self.texture.ok_or(SessionError::SessionNotOpen)?;
        Ok(OpenResult {
            texture_id: texture.id,
            preview_width: self.sizes.preview.width,
            preview_height: self.sizes.preview.height,
        })
    }

    /// Lets frames through to the detector until one code is forwarded.
    pub fn start_scanning(&self) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Disposed => Err(SessionError::SessionDisposed),
            state if state.is_open() => {
                self.pipeline.start_scanning();
                Ok(())
            }
            _ => Err(SessionError::SessionNotOpen),
        }
    }

    /// Stops submissions and suppresses any in-flight result. Idempotent.
    pub fn stop_scanning(&self) -> Result<(), SessionError> {
        if self.state.get() == SessionState::Disposed {
            return Err(SessionError::SessionDisposed);
        }
        self.pipeline.stop_scanning();
        Ok(())
    }

    /// Releases the device but keeps the texture and negotiated sizes.
    pub fn suspend(&mut self) {
        if !self.state.get().is_open() {
            return;
        }
        self.pipeline.stop_scanning();
        self.release_device();
        self.state.set(SessionState::Stopped);
        info!(camera_id = %self.camera_id, "Camera suspended");
    }

    /// Re-acquires the device after [`suspend`](Self::suspend).
    ///
    /// No-op unless the session was suspended while open or lost its device.
    pub fn resume(&mut self) -> Result<(), SessionError> {
        let Some(texture) = self.texture else {
            return Ok(());
        };
        if self.state() != SessionState::Stopped {
            return Ok(());
        }

        self.release_device();
        match self.acquire(&texture) {
            Ok(device) => {
                self.device = Some(device);
                self.state.set(SessionState::Opened);
                info!(camera_id = %self.camera_id, preview = %self.sizes.preview, "Camera resumed");
                Ok(())
            }
            Err(e) => {
                warn!(camera_id = %self.camera_id, error = %e, "Failed to resume camera");
                self.state.set(SessionState::Stopped);
                Err(e)
            }
        }
    }

    /// Applies a host lifecycle notification.
    pub fn handle_lifecycle(&mut self, event: LifecycleEvent) -> Result<(), SessionError> {
        match event {
            LifecycleEvent::Suspend => {
                self.suspend();
                Ok(())
            }
            LifecycleEvent::Resume => self.resume(),
        }
    }

    /// Toggles the torch, returning its new state.
    pub fn toggle_flash(&mut self) -> Result<bool, SessionError> {
        match self.state() {
            SessionState::Disposed => return Err(SessionError::SessionDisposed),
            state if !state.is_open() => return Err(SessionError::SessionNotOpen),
            _ => {}
        }
        let device = self.device.as_mut().ok_or(SessionError::SessionNotOpen)?;
        Ok(device.toggle_flash()?)
    }

    /// Releases the pipeline, device and texture. Terminal and idempotent.
    pub fn dispose(&mut self) {
        if self.state.get() == SessionState::Disposed {
            return;
        }
        self.platform.events.emit(ScanEvent::CameraClosing);

        // Detach the pipeline first so a late completion touches nothing
        // released below.
        self.pipeline.dispose();
        self.release_device();
        if let Some(texture) = self.texture.take() {
            self.platform.surfaces.release(texture.id);
        }
        if let Some(pending) = self.gate.take_pending() {
            let _ = pending.reply.send(Err(SessionError::SessionDisposed));
        }

        self.state.set(SessionState::Disposed);
        info!(camera_id = %self.camera_id, "Capture session disposed");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        effective_state(self.state.get(), &self.pipeline)
    }

    pub(crate) fn view(&self) -> SessionView {
        SessionView {
            state: Arc::clone(&self.state),
            pipeline: self.pipeline.clone(),
        }
    }

    /// Camera this session was created for.
    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    /// Lens direction of the camera.
    pub fn lens_facing(&self) -> LensFacing {
        self.lens_facing
    }

    /// Quality tier fixed at creation.
    pub fn quality(&self) -> QualityTier {
        self.quality
    }

    /// Requested symbologies.
    pub fn formats(&self) -> &CodeFormatSet {
        &self.formats
    }

    /// Sizes negotiated at creation.
    pub fn sizes(&self) -> NegotiatedSizes {
        self.sizes
    }

    /// Preview texture id, while one is held.
    pub fn texture_id(&self) -> Option<i64> {
        self.texture.map(|t| t.id)
    }

    /// The session's frame pipeline.
    pub fn pipeline(&self) -> &FramePipeline {
        &self.pipeline
    }

    /// Cumulative pipeline counters.
    pub fn counters(&self) -> PipelineCounters {
        self.pipeline.counters()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("camera_id", &self.camera_id)
            .field("state", &self.state())
            .field("quality", &self.quality)
            .field("sizes", &self.sizes)
            .field("texture", &self.texture)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{DeviceSize, Frame};
    use crate::detection::{CodeFormat, DecodedResult};
    use crate::session::fixture::{settle, Fixture};

    fn session(fx: &Fixture) -> CaptureSession {
        CaptureSession::create(
            fx.platform.clone(),
            "0",
            QualityTier::Medium,
            CodeFormatSet::from_tags(["qr"]).unwrap(),
            Arc::new(PipelineStats::new()),
        )
        .unwrap()
    }

    fn small_frame(sequence: u64) -> Frame {
        Frame::new(vec![0u8; 16], 4, 4, sequence)
    }

    #[tokio::test]
    async fn test_granted_opens_immediately() {
        let fx = Fixture::new(true);
        let mut session = session(&fx);
        assert_eq!(session.state(), SessionState::Created);

        let Initialized::Opened(result) = session.initialize().unwrap() else {
            panic!("expected an open session");
        };
        assert_eq!(
            result,
            OpenResult {
                texture_id: 0,
                preview_width: 1280,
                preview_height: 720
            }
        );
        assert_eq!(session.state(), SessionState::Opened);
        assert_eq!(session.sizes().capture, DeviceSize::new(1920, 1080));
        assert_eq!(session.sizes().recording, DeviceSize::new(1920, 1080));

        let config = fx.cameras.stream_config().unwrap();
        assert_eq!(config.preview, DeviceSize::new(1280, 720));
        assert_eq!(config.lens_facing, LensFacing::Back);
        assert_eq!(fx.permissions.request_count(), 0);
    }

    #[tokio::test]
    async fn test_open_deferred_until_permission_granted() {
        let fx = Fixture::new(false);
        let mut session = session(&fx);

        let Initialized::PermissionPending(mut ticket) = session.initialize().unwrap() else {
            panic!("expected a pending permission");
        };
        assert_eq!(session.state(), SessionState::AwaitingPermission);
        assert_eq!(fx.permissions.request_count(), 1);
        assert_eq!(fx.cameras.open_count(), 0);
        assert!(ticket.try_opened().is_none());

        let opened = session
            .on_permission_result(PermissionOutcome::Granted)
            .unwrap()
            .unwrap();
        assert_eq!(session.state(), SessionState::Opened);
        assert_eq!(ticket.opened().await, Ok(opened));
        assert_eq!(fx.cameras.open_count(), 1);
    }

    #[tokio::test]
    async fn test_second_initialize_while_pending_fails() {
        let fx = Fixture::new(false);
        let mut session = session(&fx);

        session.initialize().unwrap();
        assert!(matches!(
            session.initialize(),
            Err(SessionError::PermissionPending)
        ));
        assert_eq!(fx.permissions.request_count(), 1);
    }

    #[tokio::test]
    async fn test_permission_denied_stops_session() {
        let fx = Fixture::new(false);
        let mut session = session(&fx);

        let Initialized::PermissionPending(ticket) = session.initialize().unwrap() else {
            panic!("expected a pending permission");
        };
        assert_eq!(
            session.on_permission_result(PermissionOutcome::DeniedPermanently),
            Err(SessionError::PermissionDeniedPermanently)
        );
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(
            ticket.opened().await,
            Err(SessionError::PermissionDeniedPermanently)
        );
        assert_eq!(fx.surfaces.live_count(), 0);

        // Nothing pending any more.
        assert_eq!(session.on_permission_result(PermissionOutcome::Granted), Ok(None));
    }

    #[tokio::test]
    async fn test_device_failure_stops_and_releases_texture() {
        let fx = Fixture::new(true);
        fx.cameras.fail_next_open();
        let mut session = session(&fx);

        assert!(matches!(
            session.initialize(),
            Err(SessionError::DeviceAccess(_))
        ));
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(fx.surfaces.live_count(), 0);

        // The host may retry.
        assert!(matches!(session.initialize(), Ok(Initialized::Opened(_))));
    }

    #[tokio::test]
    async fn test_start_failure_releases_device() {
        let fx = Fixture::new(true);
        fx.cameras.fail_next_start();
        let mut session = session(&fx);

        assert!(session.initialize().is_err());
        assert_eq!(fx.cameras.open_count(), 1);
        assert_eq!(fx.cameras.release_count(), 1);
    }

    #[tokio::test]
    async fn test_start_scanning_requires_open() {
        let fx = Fixture::new(false);
        let mut session = session(&fx);
        assert_eq!(session.start_scanning(), Err(SessionError::SessionNotOpen));

        session.initialize().unwrap();
        assert_eq!(session.start_scanning(), Err(SessionError::SessionNotOpen));
        assert_eq!(session.stop_scanning(), Ok(()));
    }

    #[tokio::test]
    async fn test_scan_delivers_one_code() {
        let mut fx = Fixture::new(true);
        let mut session = session(&fx);
        session.initialize().unwrap();

        session.start_scanning().unwrap();
        assert_eq!(session.state(), SessionState::Scanning);

        assert!(fx.cameras.push(small_frame(1)));
        assert!(fx.cameras.push(small_frame(2)));
        let detector = fx.detector(0);
        assert_eq!(detector.submissions(), 1);

        detector.complete(Ok(vec![
            DecodedResult::new("first", CodeFormat::Qr),
            DecodedResult::new("second", CodeFormat::Qr),
        ]));
        settle(session.pipeline()).await;

        assert_eq!(
            fx.events.try_recv().unwrap(),
            ScanEvent::Code {
                value: "first".to_string(),
                format: CodeFormat::Qr
            }
        );
        assert!(fx.events.try_recv().is_err());
        assert_eq!(session.state(), SessionState::Opened);
    }

    #[tokio::test]
    async fn test_suspend_and_resume_reuse_sizes() {
        let fx = Fixture::new(true);
        let mut session = session(&fx);
        session.initialize().unwrap();
        session.start_scanning().unwrap();
        let sizes = session.sizes();
        let texture_id = session.texture_id();

        session.handle_lifecycle(LifecycleEvent::Suspend).unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(!fx.cameras.is_streaming());
        assert_eq!(fx.cameras.release_count(), 1);
        assert_eq!(session.texture_id(), texture_id);

        session.handle_lifecycle(LifecycleEvent::Resume).unwrap();
        assert_eq!(session.state(), SessionState::Opened);
        assert_eq!(session.sizes(), sizes);
        assert_eq!(fx.cameras.open_count(), 2);
        assert_eq!(fx.cameras.stream_config().unwrap().preview, sizes.preview);
    }

    #[tokio::test]
    async fn test_device_loss_stops_session() {
        let mut fx = Fixture::new(true);
        let mut session = session(&fx);
        session.initialize().unwrap();
        session.start_scanning().unwrap();
        assert_eq!(session.state(), SessionState::Scanning);

        assert!(fx.cameras.fail_stream("usb reset"));
        assert_eq!(
            fx.events.try_recv().unwrap(),
            ScanEvent::Error {
                description: "camera disconnected: usb reset".to_string()
            }
        );
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(!session.pipeline().is_scanning());
        assert_eq!(session.start_scanning(), Err(SessionError::SessionNotOpen));
        assert_eq!(session.toggle_flash(), Err(SessionError::SessionNotOpen));

        // Frames from a stale callback never reach the detector.
        assert!(!fx.cameras.push(small_frame(1)));
        assert_eq!(fx.detector(0).submissions(), 0);

        let texture_id = session.texture_id();
        session.handle_lifecycle(LifecycleEvent::Resume).unwrap();
        assert_eq!(session.state(), SessionState::Opened);
        assert_eq!(session.texture_id(), texture_id);
        assert_eq!(fx.cameras.open_count(), 2);
        assert_eq!(fx.cameras.release_count(), 1);
        assert!(fx.cameras.is_streaming());

        session.start_scanning().unwrap();
        assert_eq!(session.state(), SessionState::Scanning);
        assert_eq!(session.counters().device_losses, 1);
    }

    #[tokio::test]
    async fn test_initialize_after_device_loss_reopens() {
        let mut fx = Fixture::new(true);
        let mut session = session(&fx);
        let Initialized::Opened(first) = session.initialize().unwrap() else {
            panic!("expected an open session");
        };

        fx.cameras.fail_stream("driver crashed");
        assert!(matches!(
            fx.events.try_recv().unwrap(),
            ScanEvent::Error { .. }
        ));

        let Initialized::Opened(second) = session.initialize().unwrap() else {
            panic!("expected an open session");
        };
        assert_eq!(second, first);
        assert_eq!(session.state(), SessionState::Opened);
        assert_eq!(fx.cameras.open_count(), 2);
        assert_eq!(fx.cameras.release_count(), 1);
        assert_eq!(fx.surfaces.live_count(), 1);
    }

    #[tokio::test]
    async fn test_resume_without_suspend_is_noop() {
        let fx = Fixture::new(false);
        let mut session = session(&fx);
        session.resume().unwrap();
        assert_eq!(session.state(), SessionState::Created);
        assert_eq!(fx.cameras.open_count(), 0);
    }

    #[tokio::test]
    async fn test_toggle_flash() {
        let fx = Fixture::new(true);
        let mut session = session(&fx);
        assert_eq!(session.toggle_flash(), Err(SessionError::SessionNotOpen));

        session.initialize().unwrap();
        assert_eq!(session.toggle_flash(), Ok(true));
        assert_eq!(session.toggle_flash(), Ok(false));
    }

    #[tokio::test]
    async fn test_dispose_releases_everything() {
        let mut fx = Fixture::new(true);
        let mut session = session(&fx);
        session.initialize().unwrap();
        assert_eq!(fx.surfaces.live_count(), 1);

        session.dispose();
        assert_eq!(session.state(), SessionState::Disposed);
        assert_eq!(fx.surfaces.live_count(), 0);
        assert_eq!(fx.cameras.release_count(), 1);
        assert!(fx.detector(0).is_closed());
        assert_eq!(fx.events.try_recv().unwrap(), ScanEvent::CameraClosing);

        session.dispose();
        assert!(fx.events.try_recv().is_err());
        assert_eq!(session.start_scanning(), Err(SessionError::SessionDisposed));
        assert_eq!(session.stop_scanning(), Err(SessionError::SessionDisposed));
        assert!(matches!(
            session.initialize(),
            Err(SessionError::SessionDisposed)
        ));
    }

    #[tokio::test]
    async fn test_dispose_while_pending_fails_ticket() {
        let fx = Fixture::new(false);
        let mut session = session(&fx);
        let Initialized::PermissionPending(ticket) = session.initialize().unwrap() else {
            panic!("expected a pending permission");
        };

        drop(session);
        assert_eq!(ticket.opened().await, Err(SessionError::SessionDisposed));
    }
}
