//! Permission-gated continuation.
//!
//! The gate holds at most one pending continuation. When authorization is
//! already held the continuation is handed straight back; otherwise it is
//! parked, a platform request is issued, and the owner takes it back once
//! the platform reports an outcome.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by the permission gate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    #[error("camera permission request already pending")]
    RequestAlreadyPending,
    #[error("camera permission denied")]
    Denied,
    #[error("camera permission permanently denied")]
    DeniedPermanently,
}

/// Current authorization, as reported by a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// Result of a platform permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionOutcome {
    #[serde(rename = "granted")]
    Granted,
    /// The user declined but may be asked again.
    #[serde(rename = "denied")]
    Denied,
    /// The user declined and asked not to be prompted again.
    #[serde(rename = "dismissedForever")]
    DeniedPermanently,
}

impl PermissionOutcome {
    /// Classifies a raw platform result.
    ///
    /// A denial after which the platform will no longer show a rationale
    /// means the user chose "don't ask again".
    pub fn from_request(granted: bool, should_show_rationale: bool) -> Self {
        match (granted, should_show_rationale) {
            (true, _) => PermissionOutcome::Granted,
            (false, true) => PermissionOutcome::Denied,
            (false, false) => PermissionOutcome::DeniedPermanently,
        }
    }

    /// Converts the outcome into a result.
    pub fn into_result(self) -> Result<(), PermissionError> {
        match self {
            PermissionOutcome::Granted => Ok(()),
            PermissionOutcome::Denied => Err(PermissionError::Denied),
            PermissionOutcome::DeniedPermanently => Err(PermissionError::DeniedPermanently),
        }
    }
}

/// Platform permission API.
///
/// `request` only issues the prompt; the platform's answer is delivered
/// later by the host through the service.
pub trait PermissionPlatform: Send + Sync {
    /// Returns true if camera authorization is held.
    fn is_granted(&self) -> bool;

    /// Issues a camera permission request.
    fn request(&self);

    /// Sends the user to the system settings for this application.
    fn open_settings(&self) {}
}

/// Platform without a runtime permission concept.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysGranted;

impl PermissionPlatform for AlwaysGranted {
    fn is_granted(&self) -> bool {
        true
    }

    fn request(&self) {}
}

/// Scriptable permission platform.
#[derive(Debug, Default)]
pub struct MockPermissions {
    granted: AtomicBool,
    requests: AtomicUsize,
    settings_opened: AtomicUsize,
}

impl MockPermissions {
    /// Creates a platform with the given initial authorization.
    pub fn new(granted: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
            ..Default::default()
        }
    }

    /// Changes the authorization, as the user would in a prompt.
    pub fn set_granted(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }

    /// Number of requests issued.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Number of redirects to system settings.
    pub fn settings_count(&self) -> usize {
        self.settings_opened.load(Ordering::SeqCst)
    }
}

impl PermissionPlatform for MockPermissions {
    fn is_granted(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    fn request(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }

    fn open_settings(&self) {
        self.settings_opened.fetch_add(1, Ordering::SeqCst);
    }
}

/// What the caller should do after [`PermissionGate::ensure_permission`].
#[derive(Debug)]
pub enum Gate<C> {
    /// Authorization is held; run the continuation now.
    Proceed(C),
    /// A request was issued; the continuation is parked in the gate.
    Deferred,
}

/// Defers a continuation until camera authorization is confirmed.
pub struct PermissionGate<C> {
    platform: Arc<dyn PermissionPlatform>,
    pending: Option<C>,
}

impl<C> PermissionGate<C> {
    /// Creates a gate over the given platform.
    pub fn new(platform: Arc<dyn PermissionPlatform>) -> Self {
        Self {
            platform,
            pending: None,
        }
    }

    /// Hands `continuation` back if authorized, otherwise parks it and
    /// issues a platform request.
    pub fn ensure_permission(&mut self, continuation: C) -> Result<Gate<C>, PermissionError> {
        if self.pending.is_some() {
            return Err(PermissionError::RequestAlreadyPending);
        }
        if self.platform.is_granted() {
            return Ok(Gate::Proceed(continuation));
        }

        self.pending = Some(continuation);
        self.platform.request();
        tracing::debug!("Camera permission requested, continuation deferred");
        Ok(Gate::Deferred)
    }

    /// Returns true while a continuation is parked.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Takes the parked continuation, if any.
    pub fn take_pending(&mut self) -> Option<C> {
        self.pending.take()
    }
}
