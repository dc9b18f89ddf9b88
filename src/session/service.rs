//! Host-facing scanner service.
//!
//! The service owns at most one capture session. Initializing a new
//! session disposes the previous one first, so only one camera device is
//! ever held.

use super::capture::{CaptureSession, Initialized, OpenResult};
use super::error::SessionError;
use super::events::EventSink;
use super::monitor::ScannerMonitor;
use super::state::{LifecycleEvent, SessionState};
use crate::capture::{
    CameraDescription, CameraProvider, DetectorConfig, QualityTier, SurfaceRegistry,
};
use crate::detection::{CodeFormatSet, DetectorFactory, PipelineCounters, PipelineStats};
use crate::permission::{PermissionOutcome, PermissionPlatform, PermissionStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info};

/// External collaborators a session is wired to.
#[derive(Clone)]
pub struct Platform {
    /// Camera enumeration and acquisition.
    pub cameras: Arc<dyn CameraProvider>,
    /// Preview texture registry.
    pub surfaces: Arc<dyn SurfaceRegistry>,
    /// Permission API.
    pub permissions: Arc<dyn PermissionPlatform>,
    /// Builds a detector for each session.
    pub detectors: Arc<dyn DetectorFactory>,
    /// Where events are pushed.
    pub events: Arc<dyn EventSink>,
    /// Runtime detections complete on.
    pub runtime: Handle,
    /// How long a single detection may run.
    pub detection_timeout: Duration,
}

impl Platform {
    /// Bundles the collaborators.
    pub fn new(
        cameras: Arc<dyn CameraProvider>,
        surfaces: Arc<dyn SurfaceRegistry>,
        permissions: Arc<dyn PermissionPlatform>,
        detectors: Arc<dyn DetectorFactory>,
        events: Arc<dyn EventSink>,
        runtime: Handle,
    ) -> Self {
        Self {
            cameras,
            surfaces,
            permissions,
            detectors,
            events,
            runtime,
            detection_timeout: DetectorConfig::default().timeout(),
        }
    }

    /// Overrides the detection timeout.
    pub fn with_detection_timeout(mut self, timeout: Duration) -> Self {
        self.detection_timeout = timeout;
        self
    }
}

/// Command surface exposed to the host.
pub struct ScannerService {
    platform: Platform,
    stats: Arc<PipelineStats>,
    session: Option<CaptureSession>,
    monitor: ScannerMonitor,
}

impl ScannerService {
    /// Creates a service with no session.
    pub fn new(platform: Platform) -> Self {
        let stats = Arc::new(PipelineStats::new());
        Self {
            platform,
            monitor: ScannerMonitor::new(Arc::clone(&stats)),
            stats,
            session: None,
        }
    }

    /// Lists the cameras present.
    pub fn available_cameras(&self) -> Result<Vec<CameraDescription>, SessionError> {
        Ok(self.platform.cameras.available_cameras()?)
    }

    /// Reports whether camera authorization is held.
    pub fn check_permission(&self) -> PermissionStatus {
        if self.platform.permissions.is_granted() {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        }
    }

    /// Prompts for camera authorization unless it is already held.
    ///
    /// The answer arrives through [`on_permission_result`](Self::on_permission_result).
    pub fn request_permission(&self) -> PermissionStatus {
        let status = self.check_permission();
        if status == PermissionStatus::Denied {
            self.platform.permissions.request();
        }
        status
    }

    /// Sends the user to the system settings, after a permanent denial.
    pub fn open_settings(&self) {
        self.platform.permissions.open_settings();
    }

    /// Creates and opens a session, replacing any existing one.
    ///
    /// The preset and formats are validated before anything changes. An
    /// existing session is disposed before the new camera is touched.
    pub fn initialize<S: AsRef<str>>(
        &mut self,
        camera_id: &str,
        quality: &str,
        code_formats: &[S],
    ) -> Result<Initialized, SessionError> {
        let quality: QualityTier = quality.parse()?;
        let formats = CodeFormatSet::from_tags(code_formats)?;

        if let Some(current) = &self.session {
            if current.state() == SessionState::AwaitingPermission {
                return Err(SessionError::PermissionPending);
            }
        }
        if let Some(mut previous) = self.session.take() {
            debug!(camera_id = previous.camera_id(), "Replacing capture session");
            previous.dispose();
        }

        let mut session = CaptureSession::create(
            self.platform.clone(),
            camera_id,
            quality,
            formats,
            Arc::clone(&self.stats),
        )?;
        self.monitor.attach(session.view());
        let result = session.initialize();
        self.session = Some(session);
        result
    }

    /// Routes a platform permission result to the waiting session.
    ///
    /// Returns `Ok(None)` if no session was waiting.
    pub fn on_permission_result(
        &mut self,
        outcome: PermissionOutcome,
    ) -> Result<Option<OpenResult>, SessionError> {
        match self.session.as_mut() {
            Some(session) => session.on_permission_result(outcome),
            None => {
                debug!(?outcome, "Permission result without a session");
                Ok(None)
            }
        }
    }

    /// Enables scanning for one code.
    pub fn start_scanning(&self) -> Result<(), SessionError> {
        self.session
            .as_ref()
            .ok_or(SessionError::SessionNotOpen)?
            .start_scanning()
    }

    /// Disables scanning. Succeeds without a session.
    pub fn stop_scanning(&self) -> Result<(), SessionError> {
        match &self.session {
            Some(session) => session.stop_scanning(),
            None => Ok(()),
        }
    }

    /// Toggles the torch of the open camera.
    pub fn toggle_flash(&mut self) -> Result<bool, SessionError> {
        self.session
            .as_mut()
            .ok_or(SessionError::SessionNotOpen)?
            .toggle_flash()
    }

    /// Forwards a host lifecycle notification to the session.
    pub fn handle_lifecycle(&mut self, event: LifecycleEvent) -> Result<(), SessionError> {
        match self.session.as_mut() {
            Some(session) => session.handle_lifecycle(event),
            None => Ok(()),
        }
    }

    /// Disposes the session. Later session calls fail with
    /// [`SessionError::SessionDisposed`] until the next `initialize`.
    pub fn dispose(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.dispose();
        } else {
            info!("Dispose without a session");
        }
    }

    /// State of the current session, if any.
    pub fn state(&self) -> Option<SessionState> {
        self.session.as_ref().map(CaptureSession::state)
    }

    /// The current session, if any.
    pub fn session(&self) -> Option<&CaptureSession> {
        self.session.as_ref()
    }

    /// Counters accumulated over every session of this service.
    pub fn counters(&self) -> PipelineCounters {
        self.stats.snapshot()
    }

    /// A view of this service that other threads can hold.
    pub fn monitor(&self) -> ScannerMonitor {
        self.monitor.clone()
    }
}

impl std::fmt::Debug for ScannerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerService")
            .field("session", &self.session)
            .finish()
    }
}
