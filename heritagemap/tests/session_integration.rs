//! Integration tests for a full map session.
//!
//! These tests drive the real tracker, coordinator, bridge and panels against
//! a scripted location source, a mock nearby endpoint and the reference
//! scene surface:
//! - position updates reach the map exactly once per accepted sample
//! - nearby datasets show up as markers, stale replies never do
//! - marker taps select sites and raise the nearby list
//! - malformed surface frames are dropped without side effects
//! - routes are always cleared before they are drawn
//!
//! Run with: `cargo test --test session_integration`

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use heritagemap::bridge::surface::{decode_outbound, SceneSurface, StrokeStyle};
use heritagemap::bridge::{BridgeConfig, FrameLink, MapBridge, OutboundMessage};
use heritagemap::events::EventBus;
use heritagemap::geo::Position;
use heritagemap::location::{
    PositionTracker, SamplerStart, ScriptedSource, StaticPermissions, TrackerConfig,
};
use heritagemap::panel::{PanelConfig, PanelKind, PanelState};
use heritagemap::proximity::{
    NearbyClient, NearbyFuture, NearbyQuery, PointOfInterest, ProximityConfig,
    ProximityCoordinator, QueryError, TokenStore,
};
use heritagemap::route::{PathRoute, PathSegment, RouteDescriptor, RouteKind, RouteStop};
use heritagemap::session::{MapSession, SessionComponents, SessionEvent};

// ============================================================================
// Helper Functions
// ============================================================================

/// Seoul city hall.
const CITY_HALL: Position = Position {
    latitude: 37.5665,
    longitude: 126.9780,
};

/// Gyeongbokgung, roughly 1.5 km north of city hall.
const PALACE: Position = Position {
    latitude: 37.5796,
    longitude: 126.9770,
};

type Reply = (Duration, Result<Vec<PointOfInterest>, QueryError>);

/// Nearby endpoint that records queries and answers per call index.
struct MockNearby {
    calls: Mutex<Vec<NearbyQuery>>,
    replies: Box<dyn Fn(usize) -> Reply + Send + Sync>,
}

impl MockNearby {
    fn new(replies: impl Fn(usize) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            replies: Box::new(replies),
        })
    }

    fn calls(&self) -> Vec<NearbyQuery> {
        self.calls.lock().clone()
    }
}

impl NearbyClient for MockNearby {
    fn nearby<'a>(&'a self, query: &'a NearbyQuery, _token: &'a str) -> NearbyFuture<'a> {
        let index = {
            let mut calls = self.calls.lock();
            calls.push(*query);
            calls.len() - 1
        };
        let (delay, result) = (self.replies)(index);
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            result
        })
    }
}

fn sites() -> Vec<PointOfInterest> {
    vec![
        PointOfInterest::new(1, "Deoksugung", 37.5658, 126.9751),
        PointOfInterest::new(2, "Seoul Cathedral", 37.5633, 126.9873),
    ]
}

fn instant(points: Vec<PointOfInterest>) -> Reply {
    (Duration::ZERO, Ok(points))
}

struct Harness {
    session: MapSession,
    client: Arc<MockNearby>,
    shutdown: CancellationToken,
}

/// Build a session on the host end of `link`.
fn start_session(
    link: FrameLink,
    track: Vec<Position>,
    client: Arc<MockNearby>,
    shutdown: &CancellationToken,
) -> Harness {
    let bus = EventBus::default();
    let tracker = PositionTracker::new(
        TrackerConfig::default(),
        Arc::new(ScriptedSource::from_positions(track, Duration::from_secs(5))),
        Arc::new(StaticPermissions::granted()),
        bus.clone(),
    );
    let coordinator = ProximityCoordinator::new(
        ProximityConfig::default(),
        Arc::clone(&client) as Arc<dyn NearbyClient>,
        Arc::new(TokenStore::new(Some("token".to_string()))),
        bus.clone(),
    );
    let bridge = Arc::new(MapBridge::attach(link, &BridgeConfig::default(), shutdown));

    let session = MapSession::start(
        SessionComponents {
            bus,
            tracker,
            coordinator,
            bridge,
            panels: PanelConfig::default(),
        },
        shutdown,
    );

    Harness {
        session,
        client,
        shutdown: shutdown.clone(),
    }
}

/// Poll `condition` while virtual time advances in 10 ms steps.
async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..1_000 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Let every spawned task run to quiescence.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

async fn next_selected(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<PointOfInterest> {
    loop {
        match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
            Ok(Ok(SessionEvent::Selected(points))) => return points,
            Ok(Ok(_)) => continue,
            other => panic!("no selection event: {:?}", other),
        }
    }
}

fn drain_frames(surface: &mut FrameLink) -> Vec<OutboundMessage> {
    let mut frames = Vec::new();
    while let Ok(frame) = surface.inbound.try_recv() {
        frames.push(decode_outbound(&frame).unwrap());
    }
    frames
}

// ============================================================================
// Integration Tests
// ============================================================================

/// A sample flows tracker → session → bridge → surface, and the nearby
/// dataset for it follows after the debounce.
#[tokio::test(start_paused = true)]
async fn test_position_and_dataset_reach_the_surface() {
    let shutdown = CancellationToken::new();
    let (host, surface_end) = FrameLink::pair();
    let h = start_session(
        host,
        vec![CITY_HALL],
        MockNearby::new(|_| instant(sites())),
        &shutdown,
    );
    let surface = SceneSurface::spawn(surface_end, &shutdown);

    assert_eq!(h.session.start_tracking().await, SamplerStart::Started);

    assert!(wait_until(|| surface.scene().user_marker() == Some(CITY_HALL)).await);
    assert_eq!(surface.scene().radius_m(), Some(500));

    assert!(wait_until(|| surface.scene().poi_markers().len() == 2).await);
    let ids: Vec<Option<u64>> = surface.scene().poi_markers().iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![Some(1), Some(2)]);

    let calls = h.client.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].position, CITY_HALL);
    assert_eq!(calls[0].radius_m, 500);
    assert_eq!(h.session.position(), Some(CITY_HALL));
    assert!(!h.session.is_loading());

    h.session.shutdown().await;
    h.shutdown.cancel();
}

/// Tapping a marker selects the matching sites and raises the nearby list.
#[tokio::test(start_paused = true)]
async fn test_marker_tap_selects_sites() {
    let shutdown = CancellationToken::new();
    let (host, surface_end) = FrameLink::pair();
    let h = start_session(
        host,
        vec![CITY_HALL],
        MockNearby::new(|_| instant(sites())),
        &shutdown,
    );
    let surface = SceneSurface::spawn(surface_end, &shutdown);
    let mut events = h.session.subscribe();

    h.session.start_tracking().await;
    assert!(wait_until(|| surface.scene().poi_markers().len() == 2).await);

    // Push the list down first so the tap visibly raises it
    h.session
        .with_panels(|panels| panels.panel_mut(PanelKind::NearbyList).snap_to(PanelState::Bottom));

    assert!(surface.tap_markers(&[2]));
    let selected = next_selected(&mut events).await;
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].name, "Seoul Cathedral");
    assert_eq!(h.session.selection(), selected);
    assert_eq!(h.session.panel_state(PanelKind::NearbyList), PanelState::Middle);

    h.session.shutdown().await;
}

/// Garbage from the surface is counted and dropped; the session keeps working.
#[tokio::test(start_paused = true)]
async fn test_malformed_surface_frames_are_ignored() {
    let shutdown = CancellationToken::new();
    let (host, surface_end) = FrameLink::pair();
    let h = start_session(
        host,
        vec![CITY_HALL],
        MockNearby::new(|_| instant(sites())),
        &shutdown,
    );
    let surface = SceneSurface::spawn(surface_end, &shutdown);
    let mut events = h.session.subscribe();

    h.session.start_tracking().await;
    assert!(wait_until(|| surface.scene().poi_markers().len() == 2).await);
    let before = surface.scene();

    assert!(surface.send_raw("{not json"));
    assert!(surface.send_raw(r#"{"type":"TELEPORT","payload":{}}"#));
    assert!(surface.send_raw(
        r#"{"type":"HERITAGE_MARKER_CLICKED","payload":{"heritages":[],"latitude":37.5,"longitude":127.0}}"#
    ));
    settle().await;

    assert_eq!(h.session.bridge().stats().dropped, 3);
    assert_eq!(surface.scene(), before);
    assert!(h.session.selection().is_empty());
    assert!(h.session.bridge().is_connected());

    // A valid tap still goes through afterwards
    assert!(surface.tap_markers(&[1]));
    assert_eq!(next_selected(&mut events).await[0].id, 1);

    h.session.shutdown().await;
}

/// Taps on ids outside the current dataset select nothing.
#[tokio::test(start_paused = true)]
async fn test_tap_on_unknown_marker_is_ignored() {
    let shutdown = CancellationToken::new();
    let (host, surface_end) = FrameLink::pair();
    let h = start_session(
        host,
        vec![CITY_HALL],
        MockNearby::new(|_| instant(sites())),
        &shutdown,
    );
    let surface = SceneSurface::spawn(surface_end, &shutdown);

    h.session.start_tracking().await;
    assert!(wait_until(|| surface.scene().poi_markers().len() == 2).await);

    assert!(surface.send_raw(
        r#"{"type":"HERITAGE_MARKER_CLICKED","payload":{"heritages":[99],"latitude":37.5,"longitude":127.0}}"#
    ));
    settle().await;

    assert!(h.session.selection().is_empty());
    assert_eq!(h.session.panel_state(PanelKind::NearbyList), PanelState::Middle);

    h.session.shutdown().await;
}

/// A slow reply to an older query never replaces the newer dataset.
#[tokio::test(start_paused = true)]
async fn test_stale_reply_never_reaches_the_surface() {
    let shutdown = CancellationToken::new();
    let (host, surface_end) = FrameLink::pair();
    let h = start_session(
        host,
        vec![CITY_HALL],
        MockNearby::new(|index| match index {
            0 => (
                Duration::from_secs(3),
                Ok(vec![PointOfInterest::new(10, "stale", 37.56, 126.97)]),
            ),
            _ => instant(vec![PointOfInterest::new(20, "fresh", 37.57, 126.98)]),
        }),
        &shutdown,
    );
    let surface = SceneSurface::spawn(surface_end, &shutdown);

    h.session.start_tracking().await;
    assert!(wait_until(|| h.client.calls().len() == 1).await);

    // Second query goes out while the first is still in flight
    h.session.set_radius(1000).unwrap();
    assert!(wait_until(|| h.client.calls().len() == 2).await);
    assert!(wait_until(|| surface.scene().poi_markers().len() == 1).await);

    tokio::time::sleep(Duration::from_secs(5)).await;
    let scene = surface.scene();
    assert_eq!(scene.poi_markers().len(), 1);
    assert_eq!(scene.poi_markers()[0].id, Some(20));
    assert_eq!(scene.radius_m(), Some(1000));
    assert_eq!(h.session.dataset().unwrap().radius_m, 1000);

    h.session.shutdown().await;
}

/// Moving far enough triggers a new query; the scene follows the user.
#[tokio::test(start_paused = true)]
async fn test_walk_to_new_area_requeries() {
    let shutdown = CancellationToken::new();
    let (host, surface_end) = FrameLink::pair();
    let h = start_session(
        host,
        vec![CITY_HALL, PALACE],
        MockNearby::new(|index| match index {
            0 => instant(sites()),
            _ => instant(vec![PointOfInterest::new(3, "Gyeongbokgung", 37.5796, 126.9770)]),
        }),
        &shutdown,
    );
    let surface = SceneSurface::spawn(surface_end, &shutdown);

    h.session.start_tracking().await;
    assert!(wait_until(|| surface.scene().user_marker() == Some(PALACE)).await);
    assert!(wait_until(|| {
        surface.scene().poi_markers().first().and_then(|m| m.id) == Some(3)
    })
    .await);

    let calls = h.client.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].position, PALACE);

    h.session.shutdown().await;
}

/// Routes: every draw is preceded by a clear, and the route summary panel
/// follows whether a route is shown.
#[tokio::test(start_paused = true)]
async fn test_route_is_cleared_before_every_draw() {
    let shutdown = CancellationToken::new();
    let (host, mut surface_end) = FrameLink::pair();
    let h = start_session(
        host,
        vec![CITY_HALL],
        MockNearby::new(|_| instant(sites())),
        &shutdown,
    );

    let walk = RouteDescriptor::Walk(PathRoute::new(
        vec![PathSegment::path(vec![CITY_HALL, PALACE])],
        vec![
            RouteStop::new("City Hall", CITY_HALL),
            RouteStop::new("Gyeongbokgung", PALACE),
        ],
    ));

    assert_eq!(h.session.set_route(&walk).unwrap(), RouteKind::Walk);
    assert!(h
        .session
        .with_panels(|panels| panels.panel(PanelKind::RouteSummary).is_visible()));

    let frames = drain_frames(&mut surface_end);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0], OutboundMessage::ClearRoute {});
    assert!(matches!(&frames[1], OutboundMessage::DrawWalkRoute { route, points }
        if route.len() == 2 && points.len() == 2));

    assert_eq!(
        h.session.set_route(&RouteDescriptor::Empty).unwrap(),
        RouteKind::Empty
    );
    assert_eq!(drain_frames(&mut surface_end), vec![OutboundMessage::ClearRoute {}]);
    assert_eq!(h.session.active_route(), RouteKind::Empty);
    assert!(!h
        .session
        .with_panels(|panels| panels.panel(PanelKind::RouteSummary).is_visible()));

    h.session.shutdown().await;
}

/// A surface that reloads gets the current position, dataset and route again.
#[tokio::test(start_paused = true)]
async fn test_surface_reload_restores_the_scene() {
    let shutdown = CancellationToken::new();
    let (host, surface_end) = FrameLink::pair();
    let h = start_session(
        host,
        vec![CITY_HALL],
        MockNearby::new(|_| instant(sites())),
        &shutdown,
    );
    let surface = SceneSurface::spawn(surface_end, &shutdown);

    h.session.start_tracking().await;
    assert!(wait_until(|| surface.scene().poi_markers().len() == 2).await);

    let car = RouteDescriptor::Car(PathRoute::new(
        vec![PathSegment::path(vec![CITY_HALL, PALACE])],
        vec![
            RouteStop::new("City Hall", CITY_HALL),
            RouteStop::new("Gyeongbokgung", PALACE),
        ],
    ));
    h.session.set_route(&car).unwrap();
    assert!(wait_until(|| surface.scene().route_polylines().len() == 1).await);
    let before = surface.scene();
    assert_eq!(before.route_polylines()[0].style, StrokeStyle::CAR);

    // Announce readiness again, as a reloaded page would
    assert!(surface.send_raw(r#"{"type":"REQUEST_LOCATION"}"#));
    settle().await;

    assert_eq!(surface.scene(), before);
    assert_eq!(h.client.calls().len(), 1);

    h.session.shutdown().await;
}

/// The surface answers viewport requests with the id it was asked with.
#[tokio::test(start_paused = true)]
async fn test_viewport_request_round_trip() {
    let shutdown = CancellationToken::new();
    let (host, surface_end) = FrameLink::pair();
    let h = start_session(
        host,
        vec![CITY_HALL],
        MockNearby::new(|_| instant(sites())),
        &shutdown,
    );
    let _surface = SceneSurface::spawn(surface_end, &shutdown);
    let mut events = h.session.subscribe();

    h.session.start_tracking().await;
    settle().await;

    let id = h.session.request_viewport().unwrap();
    let viewport = loop {
        match tokio::time::timeout(Duration::from_secs(1), events.recv()).await {
            Ok(Ok(SessionEvent::Viewport(viewport))) => break viewport,
            Ok(Ok(_)) => continue,
            other => panic!("no viewport event: {:?}", other),
        }
    };
    assert_eq!(viewport.request_id, Some(id));
    assert_eq!(viewport.center, CITY_HALL);
    assert!(viewport.bounds.contains(&CITY_HALL));

    h.session.shutdown().await;
}
