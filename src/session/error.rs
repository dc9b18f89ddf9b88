//! Host-facing session errors.

use crate::capture::{CameraError, ConfigError, ResolutionError};
use crate::detection::{DetectorError, FormatError};
use crate::permission::PermissionError;
use thiserror::Error;

/// Errors surfaced to the host by session operations.
///
/// Cloneable so the same error can be returned to the caller and delivered
/// through a pending open ticket.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("camera access failed: {0}")]
    DeviceAccess(String),
    #[error("unknown quality preset: {0}")]
    InvalidPreset(String),
    #[error("invalid code formats: {0}")]
    InvalidFormats(#[from] FormatError),
    #[error("camera reports no usable resolutions")]
    NoSizesAvailable,
    #[error("camera permission request already pending")]
    PermissionPending,
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("camera permission permanently denied, enable it in settings")]
    PermissionDeniedPermanently,
    #[error("no open camera session")]
    SessionNotOpen,
    #[error("camera session disposed")]
    SessionDisposed,
    #[error("detector unavailable: {0}")]
    Detector(String),
}

impl SessionError {
    /// Stable error code for the host boundary.
    pub const fn code(&self) -> &'static str {
        match self {
            SessionError::DeviceAccess(_) | SessionError::NoSizesAvailable => "cameraAccess",
            SessionError::InvalidPreset(_) | SessionError::InvalidFormats(_) => "invalidPreset",
            SessionError::PermissionPending
            | SessionError::PermissionDenied
            | SessionError::PermissionDeniedPermanently => "cameraPermission",
            SessionError::SessionNotOpen => "sessionNotOpen",
            SessionError::SessionDisposed => "sessionDisposed",
            SessionError::Detector(_) => "detector",
        }
    }

    /// Returns true if repeating the operation later may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::DeviceAccess(_)
                | SessionError::PermissionPending
                | SessionError::PermissionDenied
                | SessionError::SessionNotOpen
        )
    }
}

impl From<CameraError> for SessionError {
    fn from(err: CameraError) -> Self {
        SessionError::DeviceAccess(err.to_string())
    }
}

impl From<ResolutionError> for SessionError {
    fn from(err: ResolutionError) -> Self {
        match err {
            ResolutionError::NoSizesAvailable => SessionError::NoSizesAvailable,
        }
    }
}

impl From<PermissionError> for SessionError {
    fn from(err: PermissionError) -> Self {
        match err {
            PermissionError::RequestAlreadyPending => SessionError::PermissionPending,
            PermissionError::Denied => SessionError::PermissionDenied,
            PermissionError::DeniedPermanently => SessionError::PermissionDeniedPermanently,
        }
    }
}

impl From<ConfigError> for SessionError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::UnknownPreset(preset) => SessionError::InvalidPreset(preset),
            other => SessionError::InvalidPreset(other.to_string()),
        }
    }
}

impl From<DetectorError> for SessionError {
    fn from(err: DetectorError) -> Self {
        SessionError::Detector(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_errors_map() {
        assert_eq!(
            SessionError::from(PermissionError::DeniedPermanently),
            SessionError::PermissionDeniedPermanently
        );
        assert_eq!(SessionError::PermissionDenied.code(), "cameraPermission");
        assert!(SessionError::PermissionDenied.is_retryable());
        assert!(!SessionError::PermissionDeniedPermanently.is_retryable());
    }

    #[test]
    fn test_camera_error_becomes_device_access() {
        let err = SessionError::from(CameraError::OpenFailed("busy".to_string()));
        assert_eq!(
            err,
            SessionError::DeviceAccess("failed to open camera: busy".to_string())
        );
        assert_eq!(err.code(), "cameraAccess");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_preset_error() {
        let err = SessionError::from("ultra".parse::<crate::capture::QualityTier>().unwrap_err());
        assert_eq!(err, SessionError::InvalidPreset("ultra".to_string()));
        assert_eq!(err.code(), "invalidPreset");
        assert!(!SessionError::SessionDisposed.is_retryable());
    }
}
