//! Optical Scan Library
//!
//! Live camera sessions with a back-pressured barcode/QR detection
//! pipeline. A host opens one camera at a time, toggles scanning on and
//! off, and receives decoded values and lifecycle notices as events.
//!
//! # Architecture
//!
//! The system follows an explicit data flow:
//!
//! ```text
//! host → permission gate → capture session → frames → pipeline → detector
//!                               ↓                                   ↓
//!                      resolution selector               event sink ← first code
//! ```
//!
//! # Design Principles
//!
//! - **Single-flight**: at most one frame is ever inside the detector; the rest are dropped
//! - **One code per activation**: scanning stops after the first forwarded value
//! - **Never blocks**: permission prompts and detections complete later, through tickets and events
//! - **One camera**: a new session releases the previous device before opening its own
//!
//! # Example
//!
//! ```no_run
//! use optical_scan::{
//!     capture::{MockCameraProvider, MockSurfaceRegistry},
//!     detection::{CodeFormatSet, DecodedResult, Detector, DetectorError, ScriptedDetector},
//!     permission::AlwaysGranted,
//!     session::{events, Initialized, Platform, ScanEvent, ScannerService},
//! };
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let cameras = MockCameraProvider::new();
//! let (tx, mut rx) = events::channel();
//! let factory = |formats: &CodeFormatSet| -> Result<Arc<dyn Detector>, DetectorError> {
//!     let payload = vec![DecodedResult::new("hello", formats.primary())];
//!     Ok(Arc::new(ScriptedDetector::every(3, payload)))
//! };
//!
//! let mut service = ScannerService::new(Platform::new(
//!     Arc::new(cameras.clone()),
//!     Arc::new(MockSurfaceRegistry::new()),
//!     Arc::new(AlwaysGranted),
//!     Arc::new(factory),
//!     Arc::new(tx),
//!     tokio::runtime::Handle::current(),
//! ));
//!
//! if let Initialized::Opened(opened) = service.initialize("0", "medium", &["qr"])? {
//!     println!("preview {}x{}", opened.preview_width, opened.preview_height);
//! }
//! service.start_scanning()?;
//!
//! while !matches!(rx.try_recv(), Ok(ScanEvent::Code { .. })) {
//!     cameras.push_frame();
//!     tokio::task::yield_now().await;
//! }
//! service.dispose();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod detection;
pub mod metrics;
pub mod permission;
pub mod session;

// Re-export commonly used types at crate root
pub use capture::{DeviceSize, FileConfig, Frame, QualityTier};
pub use detection::{CodeFormat, CodeFormatSet, DecodedResult, Detector, FramePipeline};
pub use permission::{PermissionGate, PermissionOutcome};
pub use session::{CaptureSession, ScanEvent, ScannerService, SessionError, SessionState};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
