//! Shared test wiring for sessions and the service.

use super::events::{self, ScanEvent};
use super::service::Platform;
use crate::capture::{MockCameraProvider, MockSurfaceRegistry};
use crate::detection::manual::ManualDetector;
use crate::detection::{CodeFormatSet, Detector, DetectorError, FramePipeline};
use crate::permission::MockPermissions;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;

pub(crate) struct Fixture {
    pub(crate) cameras: MockCameraProvider,
    pub(crate) surfaces: Arc<MockSurfaceRegistry>,
    pub(crate) permissions: Arc<MockPermissions>,
    pub(crate) events: UnboundedReceiver<ScanEvent>,
    pub(crate) platform: Platform,
    detectors: Arc<Mutex<Vec<Arc<ManualDetector>>>>,
}

impl Fixture {
    /// Builds a platform of mocks. Must be called inside a tokio runtime.
    pub(crate) fn new(granted: bool) -> Self {
        let cameras = MockCameraProvider::new();
        let surfaces = Arc::new(MockSurfaceRegistry::new());
        let permissions = Arc::new(MockPermissions::new(granted));
        let (tx, events) = events::channel();

        let detectors: Arc<Mutex<Vec<Arc<ManualDetector>>>> = Arc::default();
        let created = Arc::clone(&detectors);
        let factory = move |_: &CodeFormatSet| -> Result<Arc<dyn Detector>, DetectorError> {
            let detector = ManualDetector::new();
            created
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Arc::clone(&detector));
            let detector: Arc<dyn Detector> = detector;
            Ok(detector)
        };

        let platform = Platform::new(
            Arc::new(cameras.clone()),
            surfaces.clone(),
            permissions.clone(),
            Arc::new(factory),
            Arc::new(tx),
            Handle::current(),
        );

        Self {
            cameras,
            surfaces,
            permissions,
            events,
            platform,
            detectors,
        }
    }

    /// The `index`-th detector created, in session creation order.
    pub(crate) fn detector(&self, index: usize) -> Arc<ManualDetector> {
        Arc::clone(&self.detectors.lock().unwrap_or_else(PoisonError::into_inner)[index])
    }

    pub(crate) fn detector_count(&self) -> usize {
        self.detectors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Runs the completion task until the pipeline is idle again.
pub(crate) async fn settle(pipeline: &FramePipeline) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while pipeline.is_busy() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("completion task did not run");
}
