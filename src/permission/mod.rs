//! Camera authorization.
//!
//! Camera acquisition is deferred until the platform confirms access.
//! The gate never blocks: a missing permission parks the work and returns.

mod gate;

pub use gate::{
    AlwaysGranted, Gate, MockPermissions, PermissionError, PermissionGate, PermissionOutcome,
    PermissionPlatform, PermissionStatus,
};
