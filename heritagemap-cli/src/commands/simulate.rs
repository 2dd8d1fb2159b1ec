//! Simulate command - run a whole session offline.
//!
//! Replays a track against a local sites file instead of the nearby API and
//! renders into the in-process reference surface, then prints what the map
//! would show.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use console::style;
use heritagemap::bridge::{FrameLink, SceneState, SceneSurface};
use heritagemap::geo::haversine_m;
use heritagemap::location::load_track;
use heritagemap::proximity::{
    decode_nearby_body, NearbyClient, NearbyFuture, NearbyQuery, PointOfInterest, QueryError,
};
use tokio_util::sync::CancellationToken;

use super::common::{describe_event, start_session, SessionInputs};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Token handed to the offline client; it never leaves the process.
const OFFLINE_TOKEN: &str = "offline";

/// Extra time after the last sample for the final query to settle.
const SETTLE_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Track to replay (one "latitude,longitude" per line)
    #[arg(long)]
    pub track: PathBuf,

    /// JSON list of sites, in the nearby API's response format
    #[arg(long)]
    pub sites: PathBuf,

    /// Milliseconds between track samples
    #[arg(long, default_value_t = 1000)]
    pub cadence_ms: u64,

    /// Search radius in metres [default: proximity.default_radius_m]
    #[arg(long)]
    pub radius: Option<u32>,

    /// Tap these marker ids once the track is done
    #[arg(long, value_delimiter = ',')]
    pub tap: Vec<u64>,
}

/// Answers nearby queries from a fixed list, by distance.
#[derive(Debug, Clone)]
pub struct StaticNearbyClient {
    points: Arc<Vec<PointOfInterest>>,
}

impl StaticNearbyClient {
    pub fn new(points: Vec<PointOfInterest>) -> Self {
        Self {
            points: Arc::new(points),
        }
    }

    pub fn load(path: &Path) -> Result<Self, CliError> {
        let body = std::fs::read(path)?;
        let points = decode_nearby_body(&body)
            .map_err(|e| CliError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(Self::new(points))
    }

    /// Points within the query radius, nearest first.
    pub fn within(&self, query: &NearbyQuery) -> Vec<PointOfInterest> {
        let radius = f64::from(query.radius_m);
        let mut hits: Vec<(f64, &PointOfInterest)> = self
            .points
            .iter()
            .map(|p| (haversine_m(&query.position, &p.position()), p))
            .filter(|(distance, _)| *distance <= radius)
            .collect();
        hits.sort_by(|a, b| a.0.total_cmp(&b.0));
        hits.into_iter().map(|(_, p)| p.clone()).collect()
    }
}

impl NearbyClient for StaticNearbyClient {
    fn nearby<'a>(&'a self, query: &'a NearbyQuery, _token: &'a str) -> NearbyFuture<'a> {
        Box::pin(async move { Ok::<_, QueryError>(self.within(query)) })
    }
}

pub fn run(args: SimulateArgs) -> Result<(), CliError> {
    let runner = CliRunner::new()?;
    runner.log_startup("simulate");

    let mut config = runner.config().clone();
    if let Some(radius) = args.radius {
        config.proximity.default_radius_m = radius;
    }

    let track = load_track(&args.track)?;
    if track.is_empty() {
        return Err(CliError::Track(format!(
            "{} contains no positions",
            args.track.display()
        )));
    }
    let client = StaticNearbyClient::load(&args.sites)?;
    let cadence = Duration::from_millis(args.cadence_ms.max(1));
    let duration = replay_duration(cadence, track.len(), config.proximity_config().debounce)?;

    println!(
        "Simulating {} positions against {} sites ({} m radius)",
        track.len(),
        client.points.len(),
        config.proximity.default_radius_m
    );
    println!();

    let inputs = SessionInputs {
        track,
        cadence,
        client: Arc::new(client),
        access_token: Some(OFFLINE_TOKEN.to_string()),
    };

    let runtime = runner.runtime()?;
    let scene = runtime.block_on(async move {
        let shutdown = CancellationToken::new();
        let (host, surface_end) = FrameLink::pair();
        let session = start_session(&config, host, inputs, &shutdown);
        let surface = SceneSurface::spawn(surface_end, &shutdown);
        let mut events = session.subscribe();

        session.start_tracking().await;

        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                event = events.recv() => {
                    if let Ok(event) = event {
                        println!("{}", describe_event(&event));
                    }
                }
            }
        }

        if !args.tap.is_empty() {
            if surface.tap_markers(&args.tap) {
                tokio::time::sleep(SETTLE_GRACE).await;
                while let Ok(event) = events.try_recv() {
                    println!("{}", describe_event(&event));
                }
            } else {
                println!("{} no marker with ids {:?}", style("tap").yellow(), args.tap);
            }
        }

        let scene = surface.scene();
        session.shutdown().await;
        shutdown.cancel();
        scene
    });

    println!();
    print!("{}", render_scene(&scene));
    Ok(())
}

/// How long to run so every sample is replayed and the last query settles.
fn replay_duration(
    cadence: Duration,
    samples: usize,
    debounce: Duration,
) -> Result<Duration, CliError> {
    u32::try_from(samples.saturating_sub(1))
        .ok()
        .and_then(|gaps| cadence.checked_mul(gaps))
        .and_then(|replay| replay.checked_add(debounce))
        .and_then(|total| total.checked_add(SETTLE_GRACE))
        .ok_or_else(|| {
            CliError::Config(format!(
                "{} samples at {:?} apart is too long to simulate",
                samples, cadence
            ))
        })
}

/// Plain-text rendering of what the surface shows.
fn render_scene(scene: &SceneState) -> String {
    let mut out = String::from("Map\n───\n");
    match scene.user_marker() {
        Some(position) => out.push_str(&format!("  User:    {}\n", position)),
        None => out.push_str("  User:    (none)\n"),
    }
    if let Some(radius) = scene.radius_m() {
        out.push_str(&format!("  Radius:  {} m\n", radius));
    }
    out.push_str(&format!("  Markers: {}\n", scene.poi_markers().len()));
    for marker in scene.poi_markers() {
        out.push_str(&format!("    - {} at {}\n", marker.label, marker.position));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use heritagemap::geo::Position;

    fn sites() -> StaticNearbyClient {
        StaticNearbyClient::new(vec![
            PointOfInterest::new(1, "Far", 37.6000, 126.9780),
            PointOfInterest::new(2, "Near", 37.5670, 126.9780),
            PointOfInterest::new(3, "Middle", 37.5700, 126.9780),
        ])
    }

    #[test]
    fn test_within_filters_and_sorts_by_distance() {
        let query = NearbyQuery {
            position: Position::new(37.5665, 126.9780),
            radius_m: 500,
        };
        let names: Vec<String> = sites().within(&query).into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Near".to_string(), "Middle".to_string()]);
    }

    #[tokio::test]
    async fn test_client_answers_queries() {
        let client = sites();
        let query = NearbyQuery {
            position: Position::new(37.6000, 126.9780),
            radius_m: 100,
        };
        let points = client.nearby(&query, OFFLINE_TOKEN).await.unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].id, 1);
    }

    #[test]
    fn test_load_sites_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sites.json");
        std::fs::write(
            &path,
            r#"[{"id": 7, "name": "Jongmyo", "latitude": 37.5747, "longitude": 126.9940}]"#,
        )
        .unwrap();
        let client = StaticNearbyClient::load(&path).unwrap();
        assert_eq!(client.points.len(), 1);

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            StaticNearbyClient::load(&path),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn test_replay_duration_covers_track_and_settling() {
        let duration = replay_duration(
            Duration::from_millis(1000),
            4,
            Duration::from_millis(300),
        )
        .unwrap();
        assert_eq!(duration, Duration::from_millis(3000 + 300) + SETTLE_GRACE);

        let single = replay_duration(Duration::from_millis(1000), 1, Duration::ZERO).unwrap();
        assert_eq!(single, SETTLE_GRACE);
    }

    #[test]
    fn test_replay_duration_rejects_overflow() {
        assert!(matches!(
            replay_duration(Duration::from_millis(u64::MAX), 3, Duration::ZERO),
            Err(CliError::Config(_))
        ));
        assert!(matches!(
            replay_duration(Duration::from_secs(1), usize::MAX, Duration::ZERO),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn test_render_empty_scene() {
        let text = render_scene(&SceneState::default());
        assert!(text.contains("User:    (none)"));
        assert!(text.contains("Markers: 0"));
    }
}
