//! Event channel to the host.
//!
//! Decoded values, per-frame errors and lifecycle notices are pushed, never
//! polled. Sinks must not block: they are called from detector completion
//! tasks.

use crate::detection::CodeFormat;
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Message pushed to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ScanEvent {
    /// A decoded value.
    Code {
        /// Decoded text.
        value: String,
        /// Symbology it was decoded from.
        format: CodeFormat,
    },
    /// A non-fatal error, e.g. a failed detection.
    Error {
        /// Human-readable description.
        description: String,
    },
    /// The camera is about to be released.
    CameraClosing,
}

/// Receiver of [`ScanEvent`]s.
pub trait EventSink: Send + Sync {
    /// Delivers one event. Must not block.
    fn emit(&self, event: ScanEvent);
}

impl EventSink for UnboundedSender<ScanEvent> {
    fn emit(&self, event: ScanEvent) {
        if self.send(event).is_err() {
            tracing::trace!("Event listener gone, dropping event");
        }
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ScanEvent) {}
}

/// Creates a channel-backed sink and the receiver the host listens on.
pub fn channel() -> (UnboundedSender<ScanEvent>, UnboundedReceiver<ScanEvent>) {
    mpsc::unbounded_channel()
}
