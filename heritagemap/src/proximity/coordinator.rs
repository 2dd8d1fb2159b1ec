//! Debounced, race-safe nearby query coordinator.
//!
//! # Flow
//!
//! ```text
//! on_position_changed ──► displacement gate (≥ 50 m from last fetch) ──┐
//! on_radius_changed ────────────────────────────────────────────────────┼─► debounce (300 ms, restartable)
//! refresh ──────────────────────────────────────────────────────────────┘          │
//!                                                                                   ▼
//!                                              auth check ─► epoch += 1 ─► spawn query task
//!                                                                                   │
//!                              settle: captured epoch == current ? publish : discard
//! ```
//!
//! The compare and the publish happen under one lock acquisition, so no newer
//! epoch can be issued between them. Loading is an in-flight count released
//! by a drop guard, which means it settles even if a query task is aborted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::events::{CoreEvent, EventBus};
use crate::geo::Position;

use super::client::{AccessTokenProvider, NearbyClient, QueryError};
use super::model::{NearbyQuery, NearbySnapshot, PointOfInterest, RequestEpoch};

/// Default quiet period before a trigger fires.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Default minimum displacement from the last fetched position.
pub const DEFAULT_MIN_DISPLACEMENT_M: f64 = 50.0;

/// Default search radius.
pub const DEFAULT_RADIUS_M: u32 = 500;

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct ProximityConfig {
    pub debounce: Duration,
    pub min_displacement_m: f64,
    pub default_radius_m: u32,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            min_displacement_m: DEFAULT_MIN_DISPLACEMENT_M,
            default_radius_m: DEFAULT_RADIUS_M,
        }
    }
}

/// Point-in-time copy of the coordinator counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProximityStats {
    /// Queries sent to the client.
    pub issued: u64,
    /// Responses published.
    pub accepted: u64,
    /// Responses discarded because a newer query was issued.
    pub stale: u64,
    /// Queries that failed in the client.
    pub failed: u64,
    /// Triggers rejected locally for lack of an access token.
    pub rejected: u64,
}

#[derive(Debug, Default)]
struct Counters {
    issued: AtomicU64,
    accepted: AtomicU64,
    stale: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

struct CoordinatorState {
    radius_m: u32,
    position: Option<Position>,
    last_fetched: Option<Position>,
    epoch: RequestEpoch,
    in_flight: usize,
    pending: Option<JoinHandle<()>>,
    /// Bumped on every arm and cancel; a timer only fires if it still
    /// carries the current value.
    generation: u64,
    latest: Option<Arc<NearbySnapshot>>,
}

struct CoordinatorInner {
    config: ProximityConfig,
    client: Arc<dyn NearbyClient>,
    auth: Arc<dyn AccessTokenProvider>,
    bus: EventBus,
    state: Mutex<CoordinatorState>,
    counters: Counters,
}

/// Releases one in-flight slot when dropped.
struct InFlightGuard {
    inner: Arc<CoordinatorInner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let settled = {
            let mut state = self.inner.state.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            state.in_flight == 0
        };
        if settled {
            self.inner.bus.publish(CoreEvent::LoadingChanged(false));
        }
    }
}

impl CoordinatorInner {
    /// Debounce expired: issue a query for the latest position and radius.
    ///
    /// `abort()` cannot stop a timer that is already running this, so a
    /// timer superseded by a later arm or a cancel bails out here.
    fn fire(self: &Arc<Self>, generation: u64) {
        let token = self.auth.access_token();

        let mut state = self.state.lock();
        if state.generation != generation {
            trace!(generation, current = state.generation, "Superseded trigger");
            return;
        }
        state.pending = None;

        let Some(position) = state.position else {
            debug!("Nearby trigger fired without a known position");
            return;
        };

        let Some(token) = token else {
            drop(state);
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            warn!("Nearby query rejected: no authentication context");
            self.bus.publish(CoreEvent::QueryFailed {
                epoch: None,
                error: QueryError::NoAuthContext,
            });
            return;
        };

        state.epoch = state.epoch.next();
        let epoch = state.epoch;
        state.last_fetched = Some(position);
        let query = NearbyQuery {
            position,
            radius_m: state.radius_m,
        };
        let became_loading = state.in_flight == 0;
        state.in_flight += 1;
        drop(state);

        if became_loading {
            self.bus.publish(CoreEvent::LoadingChanged(true));
        }
        self.counters.issued.fetch_add(1, Ordering::Relaxed);
        info!(
            epoch = epoch.value(),
            latitude = position.latitude,
            longitude = position.longitude,
            radius_m = query.radius_m,
            "Issuing nearby query"
        );

        let guard = InFlightGuard {
            inner: Arc::clone(self),
        };
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            let result = inner.client.nearby(&query, &token).await;
            inner.settle(epoch, query, result);
        });
    }

    fn settle(
        &self,
        epoch: RequestEpoch,
        query: NearbyQuery,
        result: Result<Vec<PointOfInterest>, QueryError>,
    ) {
        let mut state = self.state.lock();
        let current = state.epoch;

        if epoch != current {
            drop(state);
            self.counters.stale.fetch_add(1, Ordering::Relaxed);
            debug!(
                epoch = epoch.value(),
                current = current.value(),
                ok = result.is_ok(),
                "Discarding stale nearby response"
            );
            return;
        }

        match result {
            Ok(points) => {
                let snapshot = Arc::new(NearbySnapshot {
                    epoch,
                    position: query.position,
                    radius_m: query.radius_m,
                    points,
                    received_at: Utc::now(),
                });
                state.latest = Some(Arc::clone(&snapshot));
                // Published under the lock: nothing can bump the epoch in between
                self.bus
                    .publish(CoreEvent::DatasetChanged(Arc::clone(&snapshot)));
                drop(state);

                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                info!(
                    epoch = epoch.value(),
                    points = snapshot.points.len(),
                    "Nearby result accepted"
                );
            }
            Err(error) => {
                // Let the next position change re-query from the last good fetch
                state.last_fetched = state.latest.as_ref().map(|s| s.position);
                drop(state);

                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    epoch = epoch.value(),
                    error = %error,
                    "Nearby query failed, keeping last dataset"
                );
                self.bus.publish(CoreEvent::QueryFailed {
                    epoch: Some(epoch),
                    error,
                });
            }
        }
    }
}

/// Turns position and radius changes into at most one accepted result set
/// per trigger.
///
/// Cheap to clone; clones share state. Must be used from within a Tokio
/// runtime.
#[derive(Clone)]
pub struct ProximityCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl std::fmt::Debug for ProximityCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ProximityCoordinator")
            .field("config", &self.inner.config)
            .field("radius_m", &state.radius_m)
            .field("epoch", &state.epoch)
            .field("in_flight", &state.in_flight)
            .field("pending", &state.pending.is_some())
            .finish_non_exhaustive()
    }
}

impl ProximityCoordinator {
    pub fn new(
        config: ProximityConfig,
        client: Arc<dyn NearbyClient>,
        auth: Arc<dyn AccessTokenProvider>,
        bus: EventBus,
    ) -> Self {
        let state = CoordinatorState {
            radius_m: config.default_radius_m,
            position: None,
            last_fetched: None,
            epoch: RequestEpoch::default(),
            in_flight: 0,
            pending: None,
            generation: 0,
            latest: None,
        };
        Self {
            inner: Arc::new(CoordinatorInner {
                config,
                client,
                auth,
                bus,
                state: Mutex::new(state),
                counters: Counters::default(),
            }),
        }
    }

    /// Set the radius without triggering a query.
    pub fn configure(&self, radius_m: u32) {
        self.inner.state.lock().radius_m = radius_m;
    }

    /// Record a new position; re-arms the trigger unless the position is
    /// within the displacement threshold of the last fetched one.
    pub fn on_position_changed(&self, position: Position) {
        let should_arm = {
            let mut state = self.inner.state.lock();
            state.position = Some(position);
            match state.last_fetched {
                Some(fetched) => {
                    let moved = fetched.distance_to(&position);
                    if moved < self.inner.config.min_displacement_m {
                        trace!(moved_m = moved, "Position change below displacement gate");
                        false
                    } else {
                        true
                    }
                }
                None => true,
            }
        };

        if should_arm {
            self.arm();
        }
    }

    /// Record a new radius and re-arm the trigger. An unchanged radius is
    /// ignored.
    pub fn on_radius_changed(&self, radius_m: u32) {
        {
            let mut state = self.inner.state.lock();
            if state.radius_m == radius_m {
                trace!(radius_m, "Radius unchanged");
                return;
            }
            state.radius_m = radius_m;
        }
        debug!(radius_m, "Search radius changed");
        self.arm();
    }

    /// Re-arm the trigger regardless of displacement (e.g. after sign-in).
    pub fn refresh(&self) {
        self.arm();
    }

    fn arm(&self) {
        let inner = Arc::clone(&self.inner);
        let debounce = self.inner.config.debounce;

        let mut state = self.inner.state.lock();
        if let Some(pending) = state.pending.take() {
            pending.abort();
            trace!("Debounce restarted");
        }
        state.generation += 1;
        let generation = state.generation;
        state.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            inner.fire(generation);
        }));
    }

    /// Most recently accepted result set.
    pub fn latest(&self) -> Option<Arc<NearbySnapshot>> {
        self.inner.state.lock().latest.clone()
    }

    /// Whether any issued query is still unsettled.
    pub fn is_loading(&self) -> bool {
        self.inner.state.lock().in_flight > 0
    }

    pub fn current_epoch(&self) -> RequestEpoch {
        self.inner.state.lock().epoch
    }

    pub fn radius(&self) -> u32 {
        self.inner.state.lock().radius_m
    }

    /// Cancel a pending (not yet fired) trigger.
    pub fn cancel_pending(&self) {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }
    }

    pub fn stats(&self) -> ProximityStats {
        let c = &self.inner.counters;
        ProximityStats {
            issued: c.issued.load(Ordering::Relaxed),
            accepted: c.accepted.load(Ordering::Relaxed),
            stale: c.stale.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
        }
    }
}
