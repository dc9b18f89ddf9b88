//! Code detection.
//!
//! Requested symbologies, the asynchronous detector contract, an rqrr
//! QR detector and the single-flight pipeline that feeds it frames.

mod detector;
mod formats;
mod pipeline;
mod qr;

pub use detector::{
    DecodedResult, DetectionFuture, Detector, DetectorError, DetectorFactory, ScriptedDetector,
};
pub use formats::{CodeFormat, CodeFormatSet, FormatError};
pub use pipeline::{FramePipeline, PipelineCounters, PipelineStats};
pub use qr::QrDetector;

#[cfg(test)]
pub(crate) use detector::manual;
