//! Position tracker with foreground and background sampling.
//!
//! # Modes
//!
//! ```text
//!             on_lifecycle(Active)                 on_lifecycle(Background)
//!   ┌──────────────────────────────┐      ┌──────────────────────────────────┐
//!   │ stop background sampler      │      │ stop foreground sampler          │
//!   │ start foreground (watch)     │      │ start background (interval)      │
//!   │   min-distance filtered      │      │   named task, idempotent start   │
//!   └──────────────────────────────┘      └──────────────────────────────────┘
//! ```
//!
//! The two samplers never run at the same time once lifecycle transitions
//! drive them. Every accepted sample updates `latest()` and is published as
//! [`CoreEvent::PositionChanged`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::events::{CoreEvent, EventBus};
use crate::geo::Position;

use super::permissions::{PermissionProvider, PermissionState, PermissionStatus};
use super::source::{LocationSource, SampleStream};
use super::tasks::TaskRegistry;

/// Task name guarding the foreground sampler.
pub const FOREGROUND_TASK: &str = "heritagemap.foreground-location";

/// Task name guarding the background sampler.
pub const BACKGROUND_TASK: &str = "heritagemap.background-location";

/// Default minimum movement before a foreground sample is delivered.
pub const DEFAULT_FOREGROUND_MIN_DISTANCE_M: f64 = 10.0;

/// Default background sampling interval.
pub const DEFAULT_BACKGROUND_INTERVAL: Duration = Duration::from_secs(60);

/// Callback invoked with each delivered foreground sample.
pub type PositionCallback = Arc<dyn Fn(Position) + Send + Sync>;

/// Tracker configuration.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Minimum distance (metres) between delivered foreground samples.
    pub foreground_min_distance_m: f64,
    /// Interval between background samples.
    pub background_interval: Duration,
    /// Also ask for background access in `request_permission()`.
    pub request_background: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            foreground_min_distance_m: DEFAULT_FOREGROUND_MIN_DISTANCE_M,
            background_interval: DEFAULT_BACKGROUND_INTERVAL,
            request_background: true,
        }
    }
}

/// Host process lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppLifecycle {
    Active,
    Background,
}

/// Result of asking a sampler to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerStart {
    Started,
    /// A sampler of this kind is already alive; nothing was spawned.
    AlreadyRunning,
    /// The required permission is not granted.
    PermissionDenied,
}

#[derive(Default)]
struct TrackerState {
    permission: PermissionState,
    latest: Option<Position>,
    foreground_callback: Option<PositionCallback>,
}

struct TrackerInner {
    config: TrackerConfig,
    source: Arc<dyn LocationSource>,
    permissions: Arc<dyn PermissionProvider>,
    bus: EventBus,
    state: Mutex<TrackerState>,
}

impl TrackerInner {
    fn deliver(&self, position: Position) {
        self.state.lock().latest = Some(position);
        self.bus.publish(CoreEvent::PositionChanged(position));
    }
}

/// Owns permission state and the two location samplers.
///
/// Cheap to clone; clones share the same samplers and state. Samplers are
/// cancelled when the last clone is dropped.
#[derive(Clone)]
pub struct PositionTracker {
    inner: Arc<TrackerInner>,
    tasks: Arc<TaskRegistry>,
}

impl std::fmt::Debug for PositionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("PositionTracker")
            .field("config", &self.inner.config)
            .field("permission", &state.permission)
            .field("latest", &state.latest)
            .field("tasks", &self.tasks)
            .finish()
    }
}

impl PositionTracker {
    pub fn new(
        config: TrackerConfig,
        source: Arc<dyn LocationSource>,
        permissions: Arc<dyn PermissionProvider>,
        bus: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                config,
                source,
                permissions,
                bus,
                state: Mutex::new(TrackerState::default()),
            }),
            tasks: Arc::new(TaskRegistry::new()),
        }
    }

    /// Ask for location access. Returns whether foreground access is granted.
    ///
    /// The answer is stored; a change is published once as
    /// [`CoreEvent::PermissionChanged`]. Denial is never retried here.
    pub async fn request_permission(&self) -> bool {
        let previous = self.permission_state();
        let foreground = self.inner.permissions.request_foreground().await;

        let background = if self.inner.config.request_background && foreground.is_granted() {
            self.inner.permissions.request_background().await
        } else {
            previous.background
        };

        let new_state = PermissionState {
            foreground,
            background,
        };

        let changed = {
            let mut state = self.inner.state.lock();
            let changed = state.permission != new_state;
            state.permission = new_state;
            changed
        };

        if changed {
            if foreground.is_denied() {
                warn!("Foreground location permission denied");
            } else {
                info!(
                    foreground = ?foreground,
                    background = ?background,
                    "Location permission updated"
                );
            }
            self.inner.bus.publish(CoreEvent::PermissionChanged(new_state));
        }

        foreground.is_granted()
    }

    /// Current permission state.
    pub fn permission_state(&self) -> PermissionState {
        self.inner.state.lock().permission
    }

    /// Most recently delivered position.
    pub fn latest(&self) -> Option<Position> {
        self.inner.state.lock().latest
    }

    /// Start continuous foreground sampling, delivering to `callback`.
    ///
    /// The callback is remembered so that a later `on_lifecycle(Active)` can
    /// resume foreground sampling.
    pub fn start_foreground<F>(&self, callback: F) -> SamplerStart
    where
        F: Fn(Position) + Send + Sync + 'static,
    {
        let callback: PositionCallback = Arc::new(callback);
        self.inner.state.lock().foreground_callback = Some(Arc::clone(&callback));
        self.spawn_foreground(callback)
    }

    fn spawn_foreground(&self, callback: PositionCallback) -> SamplerStart {
        if !self.permission_state().foreground.is_granted() {
            debug!("Foreground sampling not started: permission not granted");
            return SamplerStart::PermissionDenied;
        }

        let inner = Arc::clone(&self.inner);
        let spawned = self.tasks.spawn_unique(FOREGROUND_TASK, move |token| {
            let samples = inner.source.watch();
            run_foreground(inner, samples, callback, token)
        });

        if spawned {
            info!(
                min_distance_m = self.inner.config.foreground_min_distance_m,
                "Foreground location sampling started"
            );
            SamplerStart::Started
        } else {
            SamplerStart::AlreadyRunning
        }
    }

    /// Start periodic background sampling.
    ///
    /// Guarded by [`BACKGROUND_TASK`]: calling this while the sampler is alive
    /// returns [`SamplerStart::AlreadyRunning`] and spawns nothing.
    pub fn start_background(&self) -> SamplerStart {
        if self.permission_state().background != PermissionStatus::Granted {
            debug!("Background sampling not started: permission not granted");
            return SamplerStart::PermissionDenied;
        }

        let inner = Arc::clone(&self.inner);
        let spawned = self
            .tasks
            .spawn_unique(BACKGROUND_TASK, move |token| run_background(inner, token));

        if spawned {
            info!(
                interval_secs = self.inner.config.background_interval.as_secs_f64(),
                "Background location sampling started"
            );
            SamplerStart::Started
        } else {
            debug!("Background sampler already running");
            SamplerStart::AlreadyRunning
        }
    }

    /// Stop foreground sampling. Returns `true` if a sampler was running.
    pub fn stop_foreground(&self) -> bool {
        let stopped = self.tasks.stop(FOREGROUND_TASK);
        if stopped {
            info!("Foreground location sampling stopped");
        }
        stopped
    }

    /// Stop background sampling. Returns `true` if a sampler was running.
    pub fn stop_background(&self) -> bool {
        let stopped = self.tasks.stop(BACKGROUND_TASK);
        if stopped {
            info!("Background location sampling stopped");
        }
        stopped
    }

    pub fn is_foreground_running(&self) -> bool {
        self.tasks.is_running(FOREGROUND_TASK)
    }

    pub fn is_background_running(&self) -> bool {
        self.tasks.is_running(BACKGROUND_TASK)
    }

    /// React to a host lifecycle transition.
    ///
    /// The samplers are mutually exclusive: becoming active hands over from
    /// background to foreground, backgrounding hands over the other way.
    pub fn on_lifecycle(&self, lifecycle: AppLifecycle) {
        debug!(?lifecycle, "Lifecycle transition");
        match lifecycle {
            AppLifecycle::Active => {
                self.stop_background();
                let callback = self.inner.state.lock().foreground_callback.clone();
                if let Some(callback) = callback {
                    self.spawn_foreground(callback);
                }
            }
            AppLifecycle::Background => {
                self.stop_foreground();
                self.start_background();
            }
        }
    }

    /// Stop both samplers.
    pub fn shutdown(&self) {
        self.tasks.stop_all();
    }
}

async fn run_foreground(
    inner: Arc<TrackerInner>,
    mut samples: SampleStream,
    callback: PositionCallback,
    token: CancellationToken,
) {
    let min_distance = inner.config.foreground_min_distance_m;
    let mut last_delivered: Option<Position> = None;

    loop {
        let sample = tokio::select! {
            _ = token.cancelled() => break,
            sample = samples.recv() => sample,
        };

        match sample {
            None => {
                debug!("Foreground location stream ended");
                break;
            }
            Some(Err(e)) => {
                warn!(error = %e, "Foreground location sample failed");
            }
            Some(Ok(position)) => {
                if let Some(previous) = last_delivered {
                    let moved = previous.distance_to(&position);
                    if moved < min_distance {
                        trace!(moved_m = moved, "Foreground sample below movement threshold");
                        continue;
                    }
                }
                last_delivered = Some(position);
                inner.deliver(position);
                callback(position);
            }
        }
    }
}

async fn run_background(inner: Arc<TrackerInner>, token: CancellationToken) {
    let mut ticker = tokio::time::interval(inner.config.background_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let sample = tokio::select! {
            _ = token.cancelled() => break,
            sample = inner.source.current() => sample,
        };

        match sample {
            Ok(position) => inner.deliver(position),
            Err(e) => warn!(error = %e, "Background location sample failed"),
        }
    }
}
