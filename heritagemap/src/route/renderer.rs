use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::model::{RouteDescriptor, RouteKind};
use crate::bridge::{BridgeError, MapBridge};

/// Puts one route at a time on the map.
///
/// Every change clears the previous route first, so a stale polyline can
/// never survive a switch between route kinds.
#[derive(Debug)]
pub struct RouteRenderer {
    bridge: Arc<MapBridge>,
    current: Mutex<RouteDescriptor>,
}

impl RouteRenderer {
    pub fn new(bridge: Arc<MapBridge>) -> Self {
        Self {
            bridge,
            current: Mutex::new(RouteDescriptor::Empty),
        }
    }

    /// Replace the route on the map.
    ///
    /// Sends `CLEAR_ROUTE`, then the draw message if the route has drawable
    /// geometry. Returns the kind now shown. On a bridge error the active
    /// route is left as it was.
    pub fn set_route(&self, route: &RouteDescriptor) -> Result<RouteKind, BridgeError> {
        let mut current = self.current.lock();
        self.replace(&mut current, route)
    }

    /// Send and record under the caller's lock, so concurrent changes reach
    /// the surface in the same order they are recorded.
    fn replace(
        &self,
        current: &mut RouteDescriptor,
        route: &RouteDescriptor,
    ) -> Result<RouteKind, BridgeError> {
        self.bridge.clear_route()?;
        let drawn = self.bridge.send_route(route)?;

        let shown = if drawn {
            route.clone()
        } else {
            if route.kind() != RouteKind::Empty {
                info!(kind = %route.kind(), "Route has no drawable geometry, cleared only");
            }
            RouteDescriptor::Empty
        };
        let kind = shown.kind();
        *current = shown;
        debug!(kind = %kind, "Route updated");
        Ok(kind)
    }

    pub fn clear(&self) -> Result<(), BridgeError> {
        self.set_route(&RouteDescriptor::Empty).map(|_| ())
    }

    /// Send the active route again, e.g. after the surface reloaded.
    pub fn redraw(&self) -> Result<RouteKind, BridgeError> {
        let mut current = self.current.lock();
        let route = current.clone();
        self.replace(&mut current, &route)
    }

    pub fn active_kind(&self) -> RouteKind {
        self.current.lock().kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{BridgeConfig, FrameLink};
    use crate::geo::Position;
    use crate::route::{
        PathRoute, PathSegment, RouteStop, TransitItinerary, TransitLeg, TransitMode,
        TransitPlace,
    };
    use serde_json::Value;
    use tokio_util::sync::CancellationToken;

    struct Harness {
        renderer: RouteRenderer,
        surface: FrameLink,
        _shutdown: CancellationToken,
    }

    impl Harness {
        fn new() -> Self {
            let (host, surface) = FrameLink::pair();
            let shutdown = CancellationToken::new();
            let bridge = Arc::new(MapBridge::attach(
                host,
                &BridgeConfig::default(),
                &shutdown,
            ));
            Self {
                renderer: RouteRenderer::new(bridge),
                surface,
                _shutdown: shutdown,
            }
        }

        fn drain(&mut self) -> Vec<Value> {
            let mut frames = Vec::new();
            while let Ok(frame) = self.surface.inbound.try_recv() {
                frames.push(serde_json::from_str(&frame).unwrap());
            }
            frames
        }
    }

    fn types(frames: &[Value]) -> Vec<&str> {
        frames.iter().map(|f| f["type"].as_str().unwrap()).collect()
    }

    fn walk_route() -> RouteDescriptor {
        RouteDescriptor::Walk(PathRoute::new(
            vec![
                PathSegment::connector(vec![Position::new(37.50, 127.00)]),
                PathSegment::path(vec![
                    Position::new(37.50, 127.00),
                    Position::new(37.51, 127.01),
                ]),
            ],
            vec![
                RouteStop::new("Station", Position::new(37.50, 127.00)),
                RouteStop::new("Gate", Position::new(37.51, 127.01)),
            ],
        ))
    }

    fn transit_route() -> RouteDescriptor {
        let place = |name: &str, lon: f64| TransitPlace::new(name, Position::new(37.5, lon));
        RouteDescriptor::Transit(TransitItinerary {
            legs: vec![TransitLeg {
                mode: TransitMode::Subway,
                route_name: Some("Line 3".to_string()),
                start: place("A", 127.0),
                end: place("B", 127.1),
                path: vec![Position::new(37.5, 127.0), Position::new(37.5, 127.1)],
                distance: 9000.0,
                duration: 900,
            }],
            total_time: 900,
            transfer_count: 0,
            fare: Some(1400),
        })
    }

    #[tokio::test]
    async fn test_clear_always_precedes_draw() {
        let mut h = Harness::new();

        assert_eq!(h.renderer.set_route(&walk_route()).unwrap(), RouteKind::Walk);
        assert_eq!(h.renderer.set_route(&transit_route()).unwrap(), RouteKind::Transit);
        assert_eq!(h.renderer.set_route(&RouteDescriptor::Empty).unwrap(), RouteKind::Empty);

        let frames = h.drain();
        assert_eq!(
            types(&frames),
            vec![
                "CLEAR_ROUTE",
                "DRAW_WALK_ROUTE",
                "CLEAR_ROUTE",
                "DRAW_TRANSIT_ROUTE",
                "CLEAR_ROUTE",
            ]
        );
        assert_eq!(frames[1]["payload"]["route"].as_array().unwrap().len(), 2);
        assert_eq!(frames[1]["payload"]["points"][0]["role"], "start");
        assert_eq!(
            frames[3]["payload"]["itineraries"][0]["legs"][0]["routeName"],
            "Line 3"
        );
        assert_eq!(h.renderer.active_kind(), RouteKind::Empty);
    }

    #[tokio::test]
    async fn test_route_without_geometry_clears_only() {
        let mut h = Harness::new();
        let only_connectors = RouteDescriptor::Car(PathRoute::new(
            vec![PathSegment::connector(vec![Position::new(1.0, 1.0)])],
            vec![RouteStop::new("X", Position::new(1.0, 1.0))],
        ));

        assert_eq!(h.renderer.set_route(&only_connectors).unwrap(), RouteKind::Empty);
        assert_eq!(types(&h.drain()), vec!["CLEAR_ROUTE"]);
    }

    #[tokio::test]
    async fn test_redraw_resends_active_route() {
        let mut h = Harness::new();
        h.renderer.set_route(&walk_route()).unwrap();
        h.drain();

        assert_eq!(h.renderer.redraw().unwrap(), RouteKind::Walk);
        assert_eq!(types(&h.drain()), vec!["CLEAR_ROUTE", "DRAW_WALK_ROUTE"]);
    }

    #[tokio::test]
    async fn test_bridge_error_keeps_active_kind() {
        let h = Harness::new();
        h.renderer.set_route(&walk_route()).unwrap();

        drop(h.surface);
        assert!(matches!(
            h.renderer.set_route(&transit_route()),
            Err(BridgeError::Disconnected)
        ));
        assert_eq!(h.renderer.active_kind(), RouteKind::Walk);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_changes_match_what_the_surface_shows() {
        let mut h = Harness::new();
        let routes = [walk_route(), transit_route()];

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let renderer = &h.renderer;
                let routes = &routes;
                scope.spawn(move || {
                    for i in 0..50 {
                        renderer.set_route(&routes[(worker + i) % 2]).unwrap();
                    }
                });
            }
        });

        let frames = h.drain();
        let types = types(&frames);
        assert_eq!(types.len(), 400);
        for pair in types.chunks(2) {
            assert_eq!(pair[0], "CLEAR_ROUTE");
            assert_ne!(pair[1], "CLEAR_ROUTE");
        }
        let expected = match types[types.len() - 1] {
            "DRAW_WALK_ROUTE" => RouteKind::Walk,
            "DRAW_TRANSIT_ROUTE" => RouteKind::Transit,
            other => panic!("unexpected last frame {}", other),
        };
        assert_eq!(h.renderer.active_kind(), expected);
    }
}
