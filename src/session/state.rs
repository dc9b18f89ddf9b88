//! Session lifecycle states.

use serde::Serialize;

/// Lifecycle state of a capture session.
///
/// `Scanning` is `Opened` with the pipeline's scanning flag set; the two
/// differ only in whether frames reach the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// Constructed, nothing acquired.
    Created,
    /// Waiting for the platform permission result.
    AwaitingPermission,
    /// Acquiring the device and binding the preview.
    Opening,
    /// Previewing, not scanning.
    Opened,
    /// Previewing and feeding frames to the detector.
    Scanning,
    /// Device released; may be resumed or re-initialized.
    Stopped,
    /// Terminal.
    Disposed,
}

impl SessionState {
    /// Numeric code exported as a gauge.
    pub const fn code(self) -> i64 {
        match self {
            SessionState::Created => 0,
            SessionState::AwaitingPermission => 1,
            SessionState::Opening => 2,
            SessionState::Opened => 3,
            SessionState::Scanning => 4,
            SessionState::Stopped => 5,
            SessionState::Disposed => 6,
        }
    }

    /// Returns true while a device is acquired and previewing.
    pub const fn is_open(self) -> bool {
        matches!(self, SessionState::Opened | SessionState::Scanning)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::AwaitingPermission => "awaiting_permission",
            SessionState::Opening => "opening",
            SessionState::Opened => "opened",
            SessionState::Scanning => "scanning",
            SessionState::Stopped => "stopped",
            SessionState::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Host lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The host went to the background.
    Suspend,
    /// The host came back to the foreground.
    Resume,
}
