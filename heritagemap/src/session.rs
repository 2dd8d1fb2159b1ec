//! Map session
//!
//! Wires one instance of each core component together:
//!
//! ```text
//! PositionTracker ──PositionChanged──► MapSession ──► bridge (USER_LOCATION_UPDATE)
//!                                          │
//!                                          └─► ProximityCoordinator
//! ProximityCoordinator ──DatasetChanged──► MapSession ──► bridge (NEARBY_HERITAGES)
//! MapBridge ──BridgeEvent──► MapSession ──► panels / SessionEvent
//! ```
//!
//! All component output arrives on the [`EventBus`] and the bridge event
//! broadcast; the session loop is the only place that turns it into bridge
//! traffic, so each change yields exactly one outbound message.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::bridge::{BridgeError, BridgeEvent, MapBridge, Viewport, ViewportRequestId};
use crate::events::{CoreEvent, EventBus};
use crate::geo::Position;
use crate::location::{AppLifecycle, PermissionState, PositionTracker, SamplerStart};
use crate::panel::{PanelConfig, PanelKind, PanelSet, PanelState};
use crate::proximity::{NearbySnapshot, PointOfInterest, ProximityCoordinator, QueryError};
use crate::route::{RouteDescriptor, RouteKind, RouteRenderer};

/// Capacity of the session event broadcast.
const SESSION_EVENT_CAPACITY: usize = 64;

/// Something the host UI should react to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Markers were tapped on the map; the nearby list now shows these sites.
    Selected(Vec<PointOfInterest>),
    /// The surface reported its viewport.
    Viewport(Viewport),
    Loading(bool),
    QueryFailed(QueryError),
    PermissionChanged(PermissionState),
}

/// The components a session drives.
#[derive(Debug)]
pub struct SessionComponents {
    pub bus: EventBus,
    pub tracker: PositionTracker,
    pub coordinator: ProximityCoordinator,
    pub bridge: Arc<MapBridge>,
    pub panels: PanelConfig,
}

struct SessionShared {
    tracker: PositionTracker,
    coordinator: ProximityCoordinator,
    bridge: Arc<MapBridge>,
    renderer: RouteRenderer,
    panels: Mutex<PanelSet>,
    selection: Mutex<Vec<PointOfInterest>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionShared {
    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn log_bridge_error(&self, what: &str, result: Result<(), BridgeError>) {
        if let Err(e) = result {
            warn!(error = %e, what, "Bridge send failed");
        }
    }

    fn on_core_event(&self, event: CoreEvent) {
        match event {
            CoreEvent::PositionChanged(position) => {
                let radius = self.coordinator.radius();
                self.log_bridge_error("position", self.bridge.send_position(position, radius));
                self.coordinator.on_position_changed(position);
            }
            CoreEvent::DatasetChanged(snapshot) => {
                debug!(
                    epoch = %snapshot.epoch,
                    points = snapshot.points.len(),
                    "Forwarding nearby dataset"
                );
                self.log_bridge_error("dataset", self.bridge.send_dataset(&snapshot.points));
            }
            CoreEvent::LoadingChanged(loading) => self.emit(SessionEvent::Loading(loading)),
            CoreEvent::QueryFailed { error, .. } => self.emit(SessionEvent::QueryFailed(error)),
            CoreEvent::PermissionChanged(state) => {
                self.emit(SessionEvent::PermissionChanged(state))
            }
        }
    }

    fn on_bridge_event(&self, event: BridgeEvent) {
        match event {
            BridgeEvent::SurfaceReady => {
                info!("Map surface ready, sending current state");
                self.resync(true);
            }
            BridgeEvent::MarkerTapped { ids, position } => self.on_marker_tapped(&ids, position),
            BridgeEvent::ViewportReported(viewport) => {
                trace!(request_id = ?viewport.request_id, "Viewport reported");
                self.emit(SessionEvent::Viewport(viewport));
            }
        }
    }

    fn on_marker_tapped(&self, ids: &[u64], position: Position) {
        let points = self
            .coordinator
            .latest()
            .map(|snapshot| snapshot.find_all(ids))
            .unwrap_or_default();

        if points.is_empty() {
            debug!(?ids, "Tap on markers not in the current dataset");
            return;
        }

        debug!(count = points.len(), at = %position, "Markers selected");
        {
            let mut panels = self.panels.lock();
            panels.set_shown(PanelKind::NearbyList, true);
            panels
                .panel_mut(PanelKind::NearbyList)
                .snap_to(PanelState::Middle);
        }
        *self.selection.lock() = points.clone();
        self.emit(SessionEvent::Selected(points));
    }

    /// Send the latest position and dataset again, and optionally the route.
    fn resync(&self, redraw_route: bool) {
        if let Some(position) = self.tracker.latest() {
            let radius = self.coordinator.radius();
            self.log_bridge_error("position", self.bridge.send_position(position, radius));
            self.coordinator.on_position_changed(position);
        }
        if let Some(snapshot) = self.coordinator.latest() {
            self.log_bridge_error("dataset", self.bridge.send_dataset(&snapshot.points));
        }
        if redraw_route && self.renderer.active_kind() != RouteKind::Empty {
            if let Err(e) = self.renderer.redraw() {
                warn!(error = %e, "Route redraw failed");
            }
        }
    }
}

/// A running map session.
pub struct MapSession {
    shared: Arc<SessionShared>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for MapSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapSession")
            .field("running", &!self.task.is_finished())
            .field("route", &self.shared.renderer.active_kind())
            .finish_non_exhaustive()
    }
}

impl MapSession {
    /// Start the session loop. Must be called from within a tokio runtime.
    ///
    /// The loop runs until `shutdown` is cancelled or [`MapSession::shutdown`]
    /// is called.
    pub fn start(components: SessionComponents, shutdown: &CancellationToken) -> Self {
        let SessionComponents {
            bus,
            tracker,
            coordinator,
            bridge,
            panels,
        } = components;

        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        let shared = Arc::new(SessionShared {
            renderer: RouteRenderer::new(Arc::clone(&bridge)),
            tracker,
            coordinator,
            bridge,
            panels: Mutex::new(PanelSet::new(panels)),
            selection: Mutex::new(Vec::new()),
            events,
        });

        let shutdown = shutdown.child_token();
        let core_rx = bus.subscribe();
        let bridge_rx = shared.bridge.subscribe();
        let task = tokio::spawn(run_session(
            Arc::clone(&shared),
            core_rx,
            bridge_rx,
            shutdown.clone(),
        ));

        info!("Map session started");
        Self {
            shared,
            shutdown,
            task,
        }
    }

    /// Subscribe to host-facing events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Ask for location permission and start foreground tracking.
    pub async fn start_tracking(&self) -> SamplerStart {
        if !self.shared.tracker.request_permission().await {
            warn!("Location permission denied; tracking not started");
            return SamplerStart::PermissionDenied;
        }
        self.shared
            .tracker
            .start_foreground(|position| trace!(%position, "Foreground sample delivered"))
    }

    pub fn on_lifecycle(&self, lifecycle: AppLifecycle) {
        self.shared.tracker.on_lifecycle(lifecycle);
    }

    /// Change the search radius: redraws the circle and re-queries.
    pub fn set_radius(&self, radius_m: u32) -> Result<(), BridgeError> {
        if radius_m == self.shared.coordinator.radius() {
            return Ok(());
        }
        self.shared.coordinator.on_radius_changed(radius_m);
        self.shared.bridge.send_radius(radius_m)
    }

    /// Show a route (or clear it with [`RouteDescriptor::Empty`]).
    pub fn set_route(&self, route: &RouteDescriptor) -> Result<RouteKind, BridgeError> {
        let kind = self.shared.renderer.set_route(route)?;
        self.shared
            .panels
            .lock()
            .set_shown(PanelKind::RouteSummary, kind != RouteKind::Empty);
        Ok(kind)
    }

    pub fn active_route(&self) -> RouteKind {
        self.shared.renderer.active_kind()
    }

    /// Highlight one site and centre the map on it.
    pub fn focus_poi(&self, poi: &PointOfInterest) -> Result<(), BridgeError> {
        self.shared.bridge.focus_marker(poi)?;
        self.shared.bridge.recenter(poi.position())
    }

    pub fn unfocus_poi(&self) -> Result<(), BridgeError> {
        self.shared.bridge.unfocus_marker()
    }

    /// Open or close the full-screen detail view (suppresses all panels).
    pub fn set_detail_open(&self, open: bool) {
        self.shared.panels.lock().set_detail_open(open);
    }

    pub fn request_viewport(&self) -> Result<ViewportRequestId, BridgeError> {
        self.shared.bridge.request_viewport()
    }

    /// Re-query the current position, bypassing the displacement gate.
    pub fn refresh(&self) {
        self.shared.coordinator.refresh();
    }

    /// Run `f` against the panels, e.g. to feed drag gestures.
    pub fn with_panels<R>(&self, f: impl FnOnce(&mut PanelSet) -> R) -> R {
        f(&mut self.shared.panels.lock())
    }

    pub fn panel_state(&self, kind: PanelKind) -> PanelState {
        self.shared.panels.lock().state(kind)
    }

    /// Sites picked by the last marker tap.
    pub fn selection(&self) -> Vec<PointOfInterest> {
        self.shared.selection.lock().clone()
    }

    pub fn position(&self) -> Option<Position> {
        self.shared.tracker.latest()
    }

    pub fn dataset(&self) -> Option<Arc<NearbySnapshot>> {
        self.shared.coordinator.latest()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.coordinator.is_loading()
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.shared.tracker
    }

    pub fn coordinator(&self) -> &ProximityCoordinator {
        &self.shared.coordinator
    }

    pub fn bridge(&self) -> &MapBridge {
        &self.shared.bridge
    }

    /// Stop the loop, the samplers and any pending query trigger.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.shared.tracker.shutdown();
        self.shared.coordinator.cancel_pending();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Session task ended abnormally");
        }
        info!("Map session stopped");
    }
}

async fn run_session(
    shared: Arc<SessionShared>,
    mut core_rx: broadcast::Receiver<CoreEvent>,
    mut bridge_rx: broadcast::Receiver<BridgeEvent>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                debug!("Session loop cancelled");
                break;
            }

            event = core_rx.recv() => match event {
                Ok(event) => shared.on_core_event(event),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Session lagged behind core events, resyncing");
                    shared.resync(false);
                }
                Err(RecvError::Closed) => {
                    debug!("Core event bus closed");
                    break;
                }
            },

            event = bridge_rx.recv() => match event {
                Ok(event) => shared.on_bridge_event(event),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Session lagged behind bridge events");
                }
                Err(RecvError::Closed) => {
                    debug!("Bridge event channel closed");
                    break;
                }
            },
        }
    }
}
