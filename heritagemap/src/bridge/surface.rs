//! In-process reference surface.
//!
//! Applies bridge messages to a [`SceneState`] the way a map view would,
//! recording what would be drawn. Used by tests and by `heritagemap simulate`.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::link::FrameLink;
use super::protocol::{DecodeError, InboundMessage, OutboundMessage, ViewportRequestId};
use crate::geo::{bounds_around, Position};
use crate::proximity::PointOfInterest;
use crate::route::{StopMarker, StopRole, TransitItinerary, TransitMode};

/// Radius used for the viewport box before the host has sent one.
const FALLBACK_VIEW_RADIUS_M: u32 = 1000;

/// Line style of a drawn polyline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    pub color: &'static str,
    pub width: f32,
    pub dashed: bool,
}

impl StrokeStyle {
    pub const CAR: StrokeStyle = StrokeStyle {
        color: "#1E6FD9",
        width: 6.0,
        dashed: false,
    };
    pub const WALK: StrokeStyle = StrokeStyle {
        color: "#2FA84F",
        width: 5.0,
        dashed: true,
    };
    pub const TRANSIT_WALK: StrokeStyle = StrokeStyle {
        color: "#8A8A8A",
        width: 4.0,
        dashed: true,
    };
    pub const TRANSIT_BUS: StrokeStyle = StrokeStyle {
        color: "#3CB44B",
        width: 6.0,
        dashed: false,
    };
    pub const TRANSIT_RAIL: StrokeStyle = StrokeStyle {
        color: "#0052A4",
        width: 6.0,
        dashed: false,
    };

    /// Style of a transit leg. Rail modes share one style, road modes another.
    pub fn for_mode(mode: TransitMode) -> StrokeStyle {
        match mode {
            TransitMode::Walk => StrokeStyle::TRANSIT_WALK,
            TransitMode::Bus | TransitMode::ExpressBus | TransitMode::Ferry => {
                StrokeStyle::TRANSIT_BUS
            }
            TransitMode::Subway | TransitMode::Train => StrokeStyle::TRANSIT_RAIL,
        }
    }
}

/// A drawn polyline.
#[derive(Debug, Clone, PartialEq)]
pub struct Polyline {
    pub points: Vec<Position>,
    pub style: StrokeStyle,
}

/// A marker on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub id: Option<u64>,
    pub label: String,
    pub position: Position,
    pub role: Option<StopRole>,
}

/// Everything the surface currently shows.
///
/// Read-only to the outside; only the surface mutates it, and only through
/// its clear/add operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneState {
    user_marker: Option<Position>,
    radius_m: Option<u32>,
    center: Option<Position>,
    poi_markers: Vec<Marker>,
    route_polylines: Vec<Polyline>,
    route_markers: Vec<Marker>,
    focused_marker: Option<Marker>,
}

impl SceneState {
    pub fn user_marker(&self) -> Option<Position> {
        self.user_marker
    }

    pub fn radius_m(&self) -> Option<u32> {
        self.radius_m
    }

    pub fn center(&self) -> Option<Position> {
        self.center
    }

    pub fn poi_markers(&self) -> &[Marker] {
        &self.poi_markers
    }

    pub fn route_polylines(&self) -> &[Polyline] {
        &self.route_polylines
    }

    pub fn route_markers(&self) -> &[Marker] {
        &self.route_markers
    }

    pub fn focused_marker(&self) -> Option<&Marker> {
        self.focused_marker.as_ref()
    }

    fn set_user_marker(&mut self, position: Position) {
        self.user_marker = Some(position);
    }

    fn set_radius(&mut self, radius_m: u32) {
        self.radius_m = Some(radius_m);
    }

    fn set_center(&mut self, position: Position) {
        self.center = Some(position);
    }

    fn clear_poi_markers(&mut self) {
        self.poi_markers.clear();
    }

    fn add_poi_marker(&mut self, poi: &PointOfInterest) {
        self.poi_markers.push(Marker {
            id: Some(poi.id),
            label: poi.name.clone(),
            position: poi.position(),
            role: None,
        });
    }

    fn clear_route(&mut self) {
        self.route_polylines.clear();
        self.route_markers.clear();
    }

    fn add_polyline(&mut self, points: Vec<Position>, style: StrokeStyle) {
        self.route_polylines.push(Polyline { points, style });
    }

    fn add_route_marker(&mut self, label: &str, position: Position, role: StopRole) {
        self.route_markers.push(Marker {
            id: None,
            label: label.to_string(),
            position,
            role: Some(role),
        });
    }

    fn show_focused_marker(&mut self, marker: Marker) {
        self.focused_marker = Some(marker);
    }

    fn clear_focused_marker(&mut self) {
        self.focused_marker = None;
    }

    /// Apply one host message. Each message replaces all prior state of its
    /// kind, so applying the same message twice is a no-op.
    fn apply(&mut self, message: &OutboundMessage) {
        match message {
            OutboundMessage::UserLocationUpdate {
                latitude,
                longitude,
                radius,
            } => {
                let position = Position::new(*latitude, *longitude);
                self.set_user_marker(position);
                self.set_radius(*radius);
                self.set_center(position);
            }
            OutboundMessage::UpdateRadius { radius } => self.set_radius(*radius),
            OutboundMessage::NearbyHeritages { points } => {
                self.clear_poi_markers();
                for poi in points {
                    self.add_poi_marker(poi);
                }
            }
            OutboundMessage::DrawCarRoute { route, points } => {
                self.draw_path(route, points, StrokeStyle::CAR)
            }
            OutboundMessage::DrawWalkRoute { route, points } => {
                self.draw_path(route, points, StrokeStyle::WALK)
            }
            OutboundMessage::DrawTransitRoute { itineraries } => {
                self.clear_route();
                if let Some(itinerary) = itineraries.first() {
                    self.draw_transit(itinerary);
                }
            }
            OutboundMessage::ClearRoute {} => self.clear_route(),
            OutboundMessage::RecenterToCoord {
                latitude,
                longitude,
            } => self.set_center(Position::new(*latitude, *longitude)),
            OutboundMessage::ShowSingleMarker {
                id,
                name,
                latitude,
                longitude,
            } => self.show_focused_marker(Marker {
                id: Some(*id),
                label: name.clone(),
                position: Position::new(*latitude, *longitude),
                role: None,
            }),
            OutboundMessage::HideSingleMarker {} => self.clear_focused_marker(),
            OutboundMessage::GetMapCenterAndBounds { .. } => {}
        }
    }

    fn draw_path(&mut self, route: &[Position], stops: &[StopMarker], style: StrokeStyle) {
        self.clear_route();
        self.add_polyline(route.to_vec(), style);
        for stop in stops {
            self.add_route_marker(
                &stop.name,
                Position::new(stop.latitude, stop.longitude),
                stop.role,
            );
        }
    }

    fn draw_transit(&mut self, itinerary: &TransitItinerary) {
        for leg in &itinerary.legs {
            self.add_polyline(leg.path.clone(), StrokeStyle::for_mode(leg.mode));
        }
        if let Some(origin) = itinerary.origin() {
            self.add_route_marker(&origin.name, origin.position(), StopRole::Start);
        }
        if let Some(destination) = itinerary.destination() {
            self.add_route_marker(&destination.name, destination.position(), StopRole::End);
        }
    }

    /// Viewport reply for a centre/bounds request.
    fn viewport_reply(&self, request_id: Option<ViewportRequestId>) -> Option<InboundMessage> {
        let center = self.center.or(self.user_marker)?;
        let radius = self.radius_m.unwrap_or(FALLBACK_VIEW_RADIUS_M);
        Some(InboundMessage::MapCenterAndBounds {
            center,
            bounds: bounds_around(&center, f64::from(radius)),
            request_id,
        })
    }
}

/// Handle to a running reference surface.
#[derive(Debug)]
pub struct SceneSurface {
    scene: Arc<Mutex<SceneState>>,
    outbound: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl SceneSurface {
    /// Start a surface on the surface end of `link`.
    ///
    /// Announces readiness with `REQUEST_LOCATION`, then applies every host
    /// frame to the scene until the link closes or `shutdown` is cancelled.
    pub fn spawn(link: FrameLink, shutdown: &CancellationToken) -> Self {
        let scene = Arc::new(Mutex::new(SceneState::default()));
        let outbound = link.outbound.clone();

        let task = tokio::spawn(run_surface(
            link,
            Arc::clone(&scene),
            shutdown.child_token(),
        ));

        Self {
            scene,
            outbound,
            task,
        }
    }

    /// Copy of the current scene.
    pub fn scene(&self) -> SceneState {
        self.scene.lock().clone()
    }

    /// Report a tap on the markers `ids`, located at the first one.
    /// Returns `false` if none of them is on the map.
    pub fn tap_markers(&self, ids: &[u64]) -> bool {
        let position = {
            let scene = self.scene.lock();
            ids.iter().find_map(|id| {
                scene
                    .poi_markers
                    .iter()
                    .find(|m| m.id == Some(*id))
                    .map(|m| m.position)
            })
        };
        let Some(position) = position else {
            return false;
        };
        self.send(&InboundMessage::HeritageMarkerClicked {
            heritages: ids.to_vec(),
            latitude: position.latitude,
            longitude: position.longitude,
        })
    }

    /// Send a raw frame to the host as-is.
    pub fn send_raw(&self, frame: impl Into<String>) -> bool {
        self.outbound.send(frame.into()).is_ok()
    }

    fn send(&self, message: &InboundMessage) -> bool {
        match message.to_frame() {
            Ok(frame) => self.send_raw(frame),
            Err(e) => {
                warn!(error = %e, "Failed to encode surface message");
                false
            }
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SceneSurface {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Decode a host frame.
pub fn decode_outbound(frame: &str) -> Result<OutboundMessage, DecodeError> {
    serde_json::from_str(frame).map_err(|e| DecodeError::Json(e.to_string()))
}

async fn run_surface(
    mut link: FrameLink,
    scene: Arc<Mutex<SceneState>>,
    shutdown: CancellationToken,
) {
    if let Ok(frame) = (InboundMessage::RequestLocation {}).to_frame() {
        let _ = link.outbound.send(frame);
    }

    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            frame = link.inbound.recv() => frame,
        };
        let Some(frame) = frame else {
            debug!("Host link closed, surface stopping");
            break;
        };

        let message = match decode_outbound(&frame) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Surface ignoring malformed frame");
                continue;
            }
        };

        let reply = {
            let mut scene = scene.lock();
            scene.apply(&message);
            match message {
                OutboundMessage::GetMapCenterAndBounds { request_id } => {
                    scene.viewport_reply(request_id)
                }
                _ => None,
            }
        };

        if let Some(reply) = reply {
            match reply.to_frame() {
                Ok(frame) => {
                    let _ = link.outbound.send(frame);
                }
                Err(e) => warn!(error = %e, "Failed to encode viewport reply"),
            }
        }
    }
}
