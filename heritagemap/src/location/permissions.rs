//! Location permission seam.
//!
//! The platform permissions API is an external collaborator. The tracker only
//! needs "granted or not" per scope; denial is remembered as state and is not
//! re-requested behind the user's back.

use std::future::Future;
use std::pin::Pin;

/// Outcome of a permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionStatus {
    /// Not asked yet.
    #[default]
    Undetermined,
    Granted,
    Denied,
}

impl PermissionStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, PermissionStatus::Denied)
    }
}

/// Persistent permission state held by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PermissionState {
    pub foreground: PermissionStatus,
    pub background: PermissionStatus,
}

impl PermissionState {
    /// True once foreground access has been refused.
    pub fn denied(&self) -> bool {
        self.foreground.is_denied()
    }
}

/// Boxed future returned by [`PermissionProvider`] methods.
pub type PermissionFuture<'a> = Pin<Box<dyn Future<Output = PermissionStatus> + Send + 'a>>;

/// Platform permissions API.
pub trait PermissionProvider: Send + Sync + 'static {
    /// Prompt for (or look up) foreground location access.
    fn request_foreground(&self) -> PermissionFuture<'_>;

    /// Prompt for (or look up) background location access.
    fn request_background(&self) -> PermissionFuture<'_>;
}

/// Permission provider with fixed answers.
///
/// Used by the CLI (a desktop host has no prompt) and by tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticPermissions {
    foreground: PermissionStatus,
    background: PermissionStatus,
}

impl StaticPermissions {
    pub fn new(foreground: PermissionStatus, background: PermissionStatus) -> Self {
        Self {
            foreground,
            background,
        }
    }

    /// Grant both scopes.
    pub fn granted() -> Self {
        Self::new(PermissionStatus::Granted, PermissionStatus::Granted)
    }

    /// Foreground only.
    pub fn foreground_only() -> Self {
        Self::new(PermissionStatus::Granted, PermissionStatus::Denied)
    }

    /// Deny both scopes.
    pub fn denied() -> Self {
        Self::new(PermissionStatus::Denied, PermissionStatus::Denied)
    }
}

impl PermissionProvider for StaticPermissions {
    fn request_foreground(&self) -> PermissionFuture<'_> {
        let status = self.foreground;
        Box::pin(async move { status })
    }

    fn request_background(&self) -> PermissionFuture<'_> {
        let status = self.background;
        Box::pin(async move { status })
    }
}
