//! Route data handed over by the routing provider.
//!
//! The provider itself (HTTP calls for car, walk and transit directions) is
//! an external collaborator; only the shape of its answer lives here.

use serde::{Deserialize, Serialize};

use crate::geo::Position;

/// The route currently shown on the map. Exactly one variant is active.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RouteDescriptor {
    Car(PathRoute),
    Walk(PathRoute),
    Transit(TransitItinerary),
    #[default]
    Empty,
}

impl RouteDescriptor {
    pub fn kind(&self) -> RouteKind {
        match self {
            RouteDescriptor::Car(_) => RouteKind::Car,
            RouteDescriptor::Walk(_) => RouteKind::Walk,
            RouteDescriptor::Transit(_) => RouteKind::Transit,
            RouteDescriptor::Empty => RouteKind::Empty,
        }
    }
}

/// Discriminant of [`RouteDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RouteKind {
    Car,
    Walk,
    Transit,
    #[default]
    Empty,
}

impl std::fmt::Display for RouteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RouteKind::Car => "car",
            RouteKind::Walk => "walk",
            RouteKind::Transit => "transit",
            RouteKind::Empty => "empty",
        };
        f.write_str(name)
    }
}

/// Kind of a geometry segment in a point-to-point route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    /// Drivable or walkable path.
    Path,
    /// Virtual line joining a stop to the nearest road; never drawn.
    Connector,
}

/// One geometry segment of a car or walk route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSegment {
    pub kind: SegmentKind,
    pub coordinates: Vec<Position>,
}

impl PathSegment {
    pub fn path(coordinates: Vec<Position>) -> Self {
        Self {
            kind: SegmentKind::Path,
            coordinates,
        }
    }

    pub fn connector(coordinates: Vec<Position>) -> Self {
        Self {
            kind: SegmentKind::Connector,
            coordinates,
        }
    }
}

/// A stop (origin, waypoint or destination) along a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStop {
    pub name: String,
    pub position: Position,
}

impl RouteStop {
    pub fn new(name: impl Into<String>, position: Position) -> Self {
        Self {
            name: name.into(),
            position,
        }
    }
}

/// Role of a stop, derived from its place in the stop sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopRole {
    Start,
    Via,
    End,
}

/// Stop marker as sent to the surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopMarker {
    pub latitude: f64,
    pub longitude: f64,
    pub name: String,
    pub role: StopRole,
}

/// Point-to-point route (car or walk).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PathRoute {
    pub segments: Vec<PathSegment>,
    pub stops: Vec<RouteStop>,
    /// Total distance in metres, if the provider reported it.
    #[serde(default)]
    pub distance_m: Option<f64>,
    /// Total duration in seconds, if the provider reported it.
    #[serde(default)]
    pub duration_s: Option<u32>,
}

impl PathRoute {
    pub fn new(segments: Vec<PathSegment>, stops: Vec<RouteStop>) -> Self {
        Self {
            segments,
            stops,
            distance_m: None,
            duration_s: None,
        }
    }

    /// Drawable geometry: all path segments in order, connectors removed.
    ///
    /// Where a segment starts exactly where the previous one ended, the shared
    /// vertex is emitted once.
    pub fn path_geometry(&self) -> Vec<Position> {
        let mut geometry: Vec<Position> = Vec::new();
        for segment in self
            .segments
            .iter()
            .filter(|s| s.kind == SegmentKind::Path)
        {
            let mut coords = segment.coordinates.iter();
            if let (Some(last), Some(first)) = (geometry.last(), segment.coordinates.first()) {
                if last == first {
                    coords.next();
                }
            }
            geometry.extend(coords.copied());
        }
        geometry
    }

    /// One marker per stop: first is start, last is end, the rest are via.
    pub fn stop_markers(&self) -> Vec<StopMarker> {
        let last = self.stops.len().saturating_sub(1);
        self.stops
            .iter()
            .enumerate()
            .map(|(i, stop)| {
                let role = if i == 0 {
                    StopRole::Start
                } else if i == last {
                    StopRole::End
                } else {
                    StopRole::Via
                };
                StopMarker {
                    latitude: stop.position.latitude,
                    longitude: stop.position.longitude,
                    name: stop.name.clone(),
                    role,
                }
            })
            .collect()
    }
}

/// Mode of a transit leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransitMode {
    Walk,
    Bus,
    #[serde(rename = "EXPRESSBUS")]
    ExpressBus,
    Subway,
    Train,
    Ferry,
}

/// Endpoint of a transit leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitPlace {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl TransitPlace {
    pub fn new(name: impl Into<String>, position: Position) -> Self {
        Self {
            name: name.into(),
            latitude: position.latitude,
            longitude: position.longitude,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.latitude, self.longitude)
    }
}

/// One leg of a multimodal itinerary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitLeg {
    pub mode: TransitMode,
    /// Line name ("Line 3", "472"); absent for walking legs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_name: Option<String>,
    pub start: TransitPlace,
    pub end: TransitPlace,
    pub path: Vec<Position>,
    /// Metres.
    pub distance: f64,
    /// Seconds.
    pub duration: u32,
}

/// A complete multimodal trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitItinerary {
    pub legs: Vec<TransitLeg>,
    /// Seconds.
    pub total_time: u32,
    #[serde(default)]
    pub transfer_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fare: Option<u32>,
}

impl TransitItinerary {
    /// Trip origin (start of the first leg).
    pub fn origin(&self) -> Option<&TransitPlace> {
        self.legs.first().map(|leg| &leg.start)
    }

    /// Trip destination (end of the last leg).
    pub fn destination(&self) -> Option<&TransitPlace> {
        self.legs.last().map(|leg| &leg.end)
    }
}

/// All itineraries the provider offered for one transit request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransitPlan {
    pub itineraries: Vec<TransitItinerary>,
}

impl TransitPlan {
    /// Route for the itinerary at `index`, or `None` if out of range.
    pub fn choose(&self, index: usize) -> Option<RouteDescriptor> {
        self.itineraries
            .get(index)
            .cloned()
            .map(RouteDescriptor::Transit)
    }

    /// Route for the itinerary with the shortest total time.
    pub fn fastest(&self) -> Option<RouteDescriptor> {
        self.itineraries
            .iter()
            .min_by_key(|it| it.total_time)
            .cloned()
            .map(RouteDescriptor::Transit)
    }
}
