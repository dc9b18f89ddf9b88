//! Detector service contract.
//!
//! A detector turns one frame into zero or more decoded payloads,
//! asynchronously. The pipeline never awaits a detector on the camera
//! thread; it spawns the returned future and handles completion there.

use super::formats::{CodeFormat, CodeFormatSet};
use crate::capture::Frame;
use futures::future::{self, BoxFuture, FutureExt};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// A payload decoded from a frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedResult {
    /// Decoded text.
    pub raw_value: String,
    /// Symbology it was decoded from.
    pub format: CodeFormat,
}

impl DecodedResult {
    /// Creates a result.
    pub fn new(raw_value: impl Into<String>, format: CodeFormat) -> Self {
        Self {
            raw_value: raw_value.into(),
            format,
        }
    }
}

/// Errors reported by a detector.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectorError {
    #[error("detection failed: {0}")]
    Failed(String),
    #[error("detector is closed")]
    Closed,
    #[error("detection aborted: {0}")]
    Aborted(String),
}

/// Future returned by [`Detector::submit`].
pub type DetectionFuture = BoxFuture<'static, Result<Vec<DecodedResult>, DetectorError>>;

/// Asynchronous code detector.
///
/// Implementations need not be reentrant; the pipeline keeps at most one
/// submission in flight.
pub trait Detector: Send + Sync {
    /// Starts detection on `frame`.
    fn submit(&self, frame: Frame) -> DetectionFuture;

    /// Releases native resources. Later submissions fail with
    /// [`DetectorError::Closed`].
    fn close(&self);
}

/// Creates a detector for a session's requested formats.
pub trait DetectorFactory: Send + Sync {
    /// Builds a detector restricted to `formats`.
    fn create(&self, formats: &CodeFormatSet) -> Result<Arc<dyn Detector>, DetectorError>;
}

impl<F> DetectorFactory for F
where
    F: Fn(&CodeFormatSet) -> Result<Arc<dyn Detector>, DetectorError> + Send + Sync,
{
    fn create(&self, formats: &CodeFormatSet) -> Result<Arc<dyn Detector>, DetectorError> {
        self(formats)
    }
}

/// Detector that decodes a fixed payload on every `every`-th submission.
#[derive(Debug)]
pub struct ScriptedDetector {
    every: u64,
    payload: Vec<DecodedResult>,
    submissions: AtomicU64,
    closed: AtomicBool,
}

impl ScriptedDetector {
    /// Decodes `payload` on submissions `every`, `2 * every`, ... and
    /// nothing otherwise.
    pub fn every(every: u64, payload: Vec<DecodedResult>) -> Self {
        Self {
            every: every.max(1),
            payload,
            submissions: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of frames submitted so far.
    pub fn submissions(&self) -> u64 {
        self.submissions.load(Ordering::SeqCst)
    }

    /// Returns true once closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Detector for ScriptedDetector {
    fn submit(&self, _frame: Frame) -> DetectionFuture {
        if self.is_closed() {
            return future::ready(Err(DetectorError::Closed)).boxed();
        }
        let n = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        let results = if n % self.every == 0 {
            self.payload.clone()
        } else {
            Vec::new()
        };
        future::ready(Ok(results)).boxed()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
pub(crate) mod manual {
    //! Detector whose submissions complete only when the test says so.

    use super::*;
    use std::sync::{Mutex, PoisonError};
    use tokio::sync::oneshot;

    type Reply = oneshot::Sender<Result<Vec<DecodedResult>, DetectorError>>;

    #[derive(Default)]
    pub(crate) struct ManualDetector {
        pending: Mutex<Vec<Reply>>,
        submissions: AtomicU64,
        closed: AtomicBool,
    }

    impl ManualDetector {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub(crate) fn submissions(&self) -> u64 {
            self.submissions.load(Ordering::SeqCst)
        }

        pub(crate) fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        /// Completes the oldest outstanding submission.
        pub(crate) fn complete(&self, result: Result<Vec<DecodedResult>, DetectorError>) -> bool {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if pending.is_empty() {
                return false;
            }
            pending.remove(0).send(result).is_ok()
        }
    }

    impl Detector for ManualDetector {
        fn submit(&self, _frame: Frame) -> DetectionFuture {
            self.submissions.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = oneshot::channel();
            self.pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(tx);
            async move {
                rx.await
                    .unwrap_or_else(|_| Err(DetectorError::Aborted("reply dropped".to_string())))
            }
            .boxed()
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame::new(vec![0u8; 4], 2, 2, 1)
    }

    #[tokio::test]
    async fn test_scripted_detector_cadence() {
        let detector = ScriptedDetector::every(2, vec![DecodedResult::new("hi", CodeFormat::Qr)]);

        assert!(detector.submit(frame()).await.unwrap().is_empty());
        let second = detector.submit(frame()).await.unwrap();
        assert_eq!(second, vec![DecodedResult::new("hi", CodeFormat::Qr)]);
        assert_eq!(detector.submissions(), 2);
    }

    #[tokio::test]
    async fn test_closed_detector_rejects() {
        let detector = ScriptedDetector::every(1, Vec::new());
        detector.close();
        assert_eq!(detector.submit(frame()).await, Err(DetectorError::Closed));
    }

    #[test]
    fn test_closure_factory() {
        let factory = |_: &CodeFormatSet| -> Result<Arc<dyn Detector>, DetectorError> {
            Ok(Arc::new(ScriptedDetector::every(1, Vec::new())))
        };
        let formats = CodeFormatSet::from_tags(["qr"]).unwrap();
        assert!(DetectorFactory::create(&factory, &formats).is_ok());
    }

    #[test]
    fn test_decoded_result_serializes_camel_case() {
        let json = serde_json::to_value(DecodedResult::new("4006381333931", CodeFormat::Ean13))
            .unwrap();
        assert_eq!(json["rawValue"], "4006381333931");
        assert_eq!(json["format"], "ean13");
    }
}
