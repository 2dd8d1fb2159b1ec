//! Wire format of the map bridge.
//!
//! Every frame is a JSON object `{"type": "...", "payload": {...}}`. Outbound
//! messages are typed enum values serialized with serde. Inbound frames are
//! parsed once, by `type`, into [`BridgeEvent`]s.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::geo::{GeoBounds, Position};
use crate::proximity::PointOfInterest;
use crate::route::{RouteDescriptor, StopMarker, TransitItinerary};

pub const REQUEST_LOCATION: &str = "REQUEST_LOCATION";
pub const HERITAGE_MARKER_CLICKED: &str = "HERITAGE_MARKER_CLICKED";
pub const MAP_CENTER_AND_BOUNDS: &str = "MAP_CENTER_AND_BOUNDS";

/// Errors decoding a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid JSON frame: {0}")]
    Json(String),

    #[error("unknown message type '{0}'")]
    UnknownType(String),

    #[error("invalid {kind} payload: {reason}")]
    Payload { kind: &'static str, reason: String },
}

/// Correlation id of a viewport request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewportRequestId(pub u64);

impl std::fmt::Display for ViewportRequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "viewport-{}", self.0)
    }
}

/// Host → surface messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE"
)]
pub enum OutboundMessage {
    UserLocationUpdate {
        latitude: f64,
        longitude: f64,
        radius: u32,
    },
    UpdateRadius {
        radius: u32,
    },
    NearbyHeritages {
        points: Vec<PointOfInterest>,
    },
    DrawCarRoute {
        route: Vec<Position>,
        points: Vec<StopMarker>,
    },
    DrawWalkRoute {
        route: Vec<Position>,
        points: Vec<StopMarker>,
    },
    DrawTransitRoute {
        itineraries: Vec<TransitItinerary>,
    },
    ClearRoute {},
    RecenterToCoord {
        latitude: f64,
        longitude: f64,
    },
    ShowSingleMarker {
        id: u64,
        name: String,
        latitude: f64,
        longitude: f64,
    },
    HideSingleMarker {},
    GetMapCenterAndBounds {
        #[serde(
            rename = "requestId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        request_id: Option<ViewportRequestId>,
    },
}

impl OutboundMessage {
    /// The wire `type` of this message.
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundMessage::UserLocationUpdate { .. } => "USER_LOCATION_UPDATE",
            OutboundMessage::UpdateRadius { .. } => "UPDATE_RADIUS",
            OutboundMessage::NearbyHeritages { .. } => "NEARBY_HERITAGES",
            OutboundMessage::DrawCarRoute { .. } => "DRAW_CAR_ROUTE",
            OutboundMessage::DrawWalkRoute { .. } => "DRAW_WALK_ROUTE",
            OutboundMessage::DrawTransitRoute { .. } => "DRAW_TRANSIT_ROUTE",
            OutboundMessage::ClearRoute {} => "CLEAR_ROUTE",
            OutboundMessage::RecenterToCoord { .. } => "RECENTER_TO_COORD",
            OutboundMessage::ShowSingleMarker { .. } => "SHOW_SINGLE_MARKER",
            OutboundMessage::HideSingleMarker {} => "HIDE_SINGLE_MARKER",
            OutboundMessage::GetMapCenterAndBounds { .. } => "GET_MAP_CENTER_AND_BOUNDS",
        }
    }

    /// Draw message for a route, or `None` when there is nothing to draw
    /// (empty descriptor, or no drawable geometry left after dropping
    /// connector segments).
    pub fn draw_route(route: &RouteDescriptor) -> Option<Self> {
        match route {
            RouteDescriptor::Car(path) | RouteDescriptor::Walk(path) => {
                let geometry = path.path_geometry();
                if geometry.is_empty() {
                    return None;
                }
                let points = path.stop_markers();
                Some(if matches!(route, RouteDescriptor::Car(_)) {
                    OutboundMessage::DrawCarRoute {
                        route: geometry,
                        points,
                    }
                } else {
                    OutboundMessage::DrawWalkRoute {
                        route: geometry,
                        points,
                    }
                })
            }
            RouteDescriptor::Transit(itinerary) if !itinerary.legs.is_empty() => {
                Some(OutboundMessage::DrawTransitRoute {
                    itineraries: vec![itinerary.clone()],
                })
            }
            RouteDescriptor::Transit(_) | RouteDescriptor::Empty => None,
        }
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Surface → host messages, as the surface encodes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE"
)]
pub enum InboundMessage {
    RequestLocation {},
    HeritageMarkerClicked {
        heritages: Vec<u64>,
        latitude: f64,
        longitude: f64,
    },
    MapCenterAndBounds {
        center: Position,
        bounds: GeoBounds,
        #[serde(
            rename = "requestId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        request_id: Option<ViewportRequestId>,
    },
}

impl InboundMessage {
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Viewport reported by the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub center: Position,
    pub bounds: GeoBounds,
    pub request_id: Option<ViewportRequestId>,
}

/// Typed inbound event delivered to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// The surface finished loading and wants the current location.
    SurfaceReady,
    /// One or more co-located markers were tapped.
    MarkerTapped { ids: Vec<u64>, position: Position },
    ViewportReported(Viewport),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(flatten)]
    rest: serde_json::Map<String, Value>,
}

/// A tapped marker is referenced by bare id or by the marker object.
#[derive(Deserialize)]
#[serde(untagged)]
enum MarkerRef {
    Id(u64),
    Object { id: u64 },
}

impl MarkerRef {
    fn id(&self) -> u64 {
        match self {
            MarkerRef::Id(id) | MarkerRef::Object { id } => *id,
        }
    }
}

#[derive(Deserialize)]
struct MarkerClicked {
    heritages: Vec<MarkerRef>,
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct CenterAndBounds {
    center: Position,
    bounds: GeoBounds,
    #[serde(rename = "requestId", default)]
    request_id: Option<ViewportRequestId>,
}

fn payload<T: serde::de::DeserializeOwned>(
    kind: &'static str,
    value: Value,
) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|e| DecodeError::Payload {
        kind,
        reason: e.to_string(),
    })
}

fn valid_position(kind: &'static str, lat: f64, lon: f64) -> Result<Position, DecodeError> {
    Position::try_new(lat, lon).map_err(|e| DecodeError::Payload {
        kind,
        reason: e.to_string(),
    })
}

/// Decode one inbound frame.
///
/// Fields may be nested under `payload` or sit beside `type`; both layouts
/// are seen from surfaces in the field.
pub fn decode_inbound(frame: &str) -> Result<BridgeEvent, DecodeError> {
    let envelope: Envelope =
        serde_json::from_str(frame).map_err(|e| DecodeError::Json(e.to_string()))?;
    let body = envelope
        .payload
        .unwrap_or(Value::Object(envelope.rest));

    match envelope.kind.as_str() {
        REQUEST_LOCATION => Ok(BridgeEvent::SurfaceReady),
        HERITAGE_MARKER_CLICKED => {
            let clicked: MarkerClicked = payload(HERITAGE_MARKER_CLICKED, body)?;
            if clicked.heritages.is_empty() {
                return Err(DecodeError::Payload {
                    kind: HERITAGE_MARKER_CLICKED,
                    reason: "no heritages".to_string(),
                });
            }
            let position =
                valid_position(HERITAGE_MARKER_CLICKED, clicked.latitude, clicked.longitude)?;
            Ok(BridgeEvent::MarkerTapped {
                ids: clicked.heritages.iter().map(MarkerRef::id).collect(),
                position,
            })
        }
        MAP_CENTER_AND_BOUNDS => {
            let reported: CenterAndBounds = payload(MAP_CENTER_AND_BOUNDS, body)?;
            let center = valid_position(
                MAP_CENTER_AND_BOUNDS,
                reported.center.latitude,
                reported.center.longitude,
            )?;
            Ok(BridgeEvent::ViewportReported(Viewport {
                center,
                bounds: reported.bounds,
                request_id: reported.request_id,
            }))
        }
        other => Err(DecodeError::UnknownType(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{PathRoute, PathSegment, RouteStop, StopRole};
    use serde_json::json;

    #[test]
    fn test_location_update_encoding() {
        let msg = OutboundMessage::UserLocationUpdate {
            latitude: 37.5,
            longitude: 127.0,
            radius: 500,
        };
        let value: Value = serde_json::from_str(&msg.to_frame().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "USER_LOCATION_UPDATE",
                "payload": {"latitude": 37.5, "longitude": 127.0, "radius": 500}
            })
        );
    }

    #[test]
    fn test_empty_payload_messages() {
        let clear = serde_json::to_value(OutboundMessage::ClearRoute {}).unwrap();
        assert_eq!(clear, json!({"type": "CLEAR_ROUTE", "payload": {}}));

        let hide = serde_json::to_value(OutboundMessage::HideSingleMarker {}).unwrap();
        assert_eq!(hide, json!({"type": "HIDE_SINGLE_MARKER", "payload": {}}));
    }

    #[test]
    fn test_viewport_request_id_optional() {
        let with_id = serde_json::to_value(OutboundMessage::GetMapCenterAndBounds {
            request_id: Some(ViewportRequestId(4)),
        })
        .unwrap();
        assert_eq!(with_id["payload"]["requestId"], 4);

        let without = serde_json::to_value(OutboundMessage::GetMapCenterAndBounds {
            request_id: None,
        })
        .unwrap();
        assert_eq!(without["payload"], json!({}));
    }

    #[test]
    fn test_type_name_matches_wire() {
        let messages = [
            OutboundMessage::UpdateRadius { radius: 1 },
            OutboundMessage::NearbyHeritages { points: vec![] },
            OutboundMessage::RecenterToCoord {
                latitude: 0.0,
                longitude: 0.0,
            },
            OutboundMessage::ShowSingleMarker {
                id: 1,
                name: "x".into(),
                latitude: 0.0,
                longitude: 0.0,
            },
        ];
        for msg in messages {
            let value = serde_json::to_value(&msg).unwrap();
            assert_eq!(value["type"], msg.type_name());
        }
    }

    #[test]
    fn test_draw_route_car() {
        let route = RouteDescriptor::Car(PathRoute::new(
            vec![PathSegment::path(vec![
                Position::new(37.0, 127.0),
                Position::new(37.1, 127.1),
            ])],
            vec![
                RouteStop::new("A", Position::new(37.0, 127.0)),
                RouteStop::new("B", Position::new(37.1, 127.1)),
            ],
        ));
        let msg = OutboundMessage::draw_route(&route).unwrap();
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "DRAW_CAR_ROUTE");
        assert_eq!(value["payload"]["route"][1]["latitude"], 37.1);
        assert_eq!(value["payload"]["points"][1]["role"], "end");
        match msg {
            OutboundMessage::DrawCarRoute { points, .. } => {
                assert_eq!(points[0].role, StopRole::Start)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_draw_route_nothing_to_draw() {
        assert_eq!(OutboundMessage::draw_route(&RouteDescriptor::Empty), None);
        let only_connectors = RouteDescriptor::Walk(PathRoute::new(
            vec![PathSegment::connector(vec![Position::new(0.0, 0.0)])],
            vec![],
        ));
        assert_eq!(OutboundMessage::draw_route(&only_connectors), None);
    }

    #[test]
    fn test_decode_request_location_with_or_without_payload() {
        assert_eq!(
            decode_inbound(r#"{"type":"REQUEST_LOCATION"}"#).unwrap(),
            BridgeEvent::SurfaceReady
        );
        assert_eq!(
            decode_inbound(r#"{"type":"REQUEST_LOCATION","payload":{}}"#).unwrap(),
            BridgeEvent::SurfaceReady
        );
    }

    #[test]
    fn test_decode_marker_click_ids_and_objects() {
        let frame = json!({
            "type": "HERITAGE_MARKER_CLICKED",
            "payload": {
                "heritages": [3, {"id": 5, "name": "Hall"}],
                "latitude": 37.5,
                "longitude": 127.0
            }
        })
        .to_string();
        assert_eq!(
            decode_inbound(&frame).unwrap(),
            BridgeEvent::MarkerTapped {
                ids: vec![3, 5],
                position: Position::new(37.5, 127.0)
            }
        );
    }

    #[test]
    fn test_decode_flat_layout() {
        let frame = r#"{"type":"HERITAGE_MARKER_CLICKED","heritages":[1],"latitude":1.0,"longitude":2.0}"#;
        assert!(matches!(
            decode_inbound(frame).unwrap(),
            BridgeEvent::MarkerTapped { .. }
        ));
    }

    #[test]
    fn test_decode_viewport() {
        let frame = InboundMessage::MapCenterAndBounds {
            center: Position::new(37.5, 127.0),
            bounds: GeoBounds::new(37.4, 37.6, 126.9, 127.1),
            request_id: Some(ViewportRequestId(9)),
        }
        .to_frame()
        .unwrap();
        match decode_inbound(&frame).unwrap() {
            BridgeEvent::ViewportReported(viewport) => {
                assert_eq!(viewport.request_id, Some(ViewportRequestId(9)));
                assert_eq!(viewport.bounds.north, 37.6);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(matches!(
            decode_inbound("not json"),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            decode_inbound(r#"{"payload":{}}"#),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            decode_inbound(r#"{"type":"SELF_DESTRUCT"}"#),
            Err(DecodeError::UnknownType(t)) if t == "SELF_DESTRUCT"
        ));
        assert!(matches!(
            decode_inbound(r#"{"type":"HERITAGE_MARKER_CLICKED","payload":{"heritages":[]}}"#),
            Err(DecodeError::Payload { .. })
        ));
        assert!(matches!(
            decode_inbound(
                r#"{"type":"HERITAGE_MARKER_CLICKED","payload":{"heritages":[],"latitude":1,"longitude":1}}"#
            ),
            Err(DecodeError::Payload { .. })
        ));
        assert!(matches!(
            decode_inbound(
                r#"{"type":"HERITAGE_MARKER_CLICKED","payload":{"heritages":[1],"latitude":95,"longitude":1}}"#
            ),
            Err(DecodeError::Payload { .. })
        ));
    }
}
