//! Position tracking
//!
//! Acquires location permission and runs one of two samplers:
//!
//! - **Foreground**: continuous watch, samples closer than a minimum movement
//!   threshold to the last delivered one are dropped.
//! - **Background**: periodic single samples on a fixed interval, guarded by a
//!   named task so it can never be started twice.
//!
//! Accepted samples are published on the [`EventBus`](crate::events::EventBus)
//! as [`CoreEvent::PositionChanged`](crate::events::CoreEvent::PositionChanged).
//!
//! # Example
//!
//! ```ignore
//! use heritagemap::location::{PositionTracker, ScriptedSource, StaticPermissions, TrackerConfig};
//!
//! let tracker = PositionTracker::new(TrackerConfig::default(), source, permissions, bus.clone());
//! if tracker.request_permission().await {
//!     tracker.start_foreground(|position| println!("now at {}", position));
//! }
//! ```

mod permissions;
mod source;
mod tasks;
mod tracker;

pub use permissions::{
    PermissionFuture, PermissionProvider, PermissionState, PermissionStatus, StaticPermissions,
};
pub use source::{
    load_track, parse_track, LocationError, LocationSource, SampleFuture, SampleStream,
    ScriptedSource,
};
pub use tasks::TaskRegistry;
pub use tracker::{
    AppLifecycle, PositionCallback, PositionTracker, SamplerStart, TrackerConfig,
    BACKGROUND_TASK, DEFAULT_BACKGROUND_INTERVAL, DEFAULT_FOREGROUND_MIN_DISTANCE_M,
    FOREGROUND_TASK,
};
