//! Run command - serve a map surface over WebSocket.
//!
//! Waits for one surface to connect, then replays a track as the device
//! position against the configured nearby endpoint until Ctrl+C or the
//! surface disconnects.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use console::style;
use heritagemap::bridge::websocket;
use heritagemap::config::ConfigFile;
use heritagemap::geo::Position;
use heritagemap::location::{load_track, SamplerStart};
use heritagemap::proximity::HttpNearbyClient;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::common::{describe_event, install_ctrlc, start_session, SessionInputs};
use crate::error::CliError;
use crate::runner::CliRunner;

/// How often the connection is checked.
const CONNECTION_CHECK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Track to replay as the device position (one "latitude,longitude" per line)
    #[arg(long)]
    pub track: PathBuf,

    /// Seconds between track samples
    #[arg(long, default_value_t = 5)]
    pub cadence_secs: u64,

    /// Address to accept the map surface on [default: bridge.listen_addr]
    #[arg(long)]
    pub listen: Option<String>,

    /// Search radius in metres [default: proximity.default_radius_m]
    #[arg(long)]
    pub radius: Option<u32>,

    /// Nearby API base URL [default: api.base_url]
    #[arg(long)]
    pub api_url: Option<String>,

    /// API access token [default: api.access_token]
    #[arg(long)]
    pub token: Option<String>,
}

/// Apply command-line overrides on top of the config file.
fn apply_overrides(config: &mut ConfigFile, args: &RunArgs) {
    if let Some(listen) = &args.listen {
        config.bridge.listen_addr = listen.clone();
    }
    if let Some(radius) = args.radius {
        config.proximity.default_radius_m = radius;
    }
    if let Some(url) = &args.api_url {
        config.api.base_url = url.clone();
    }
    if let Some(token) = &args.token {
        config.api.access_token = Some(token.clone());
    }
}

pub fn run(args: RunArgs) -> Result<(), CliError> {
    let runner = CliRunner::new()?;
    runner.log_startup("run");

    let mut config = runner.config().clone();
    apply_overrides(&mut config, &args);

    let track = load_track(&args.track)?;
    if track.is_empty() {
        return Err(CliError::Track(format!(
            "{} contains no positions",
            args.track.display()
        )));
    }
    let client = HttpNearbyClient::new(&config.api_config())?;

    println!("HeritageMap v{}", heritagemap::VERSION);
    println!("==================");
    println!();
    println!("Track:    {} ({} positions)", args.track.display(), track.len());
    println!("API:      {}", config.api.base_url);
    println!("Radius:   {} m", config.proximity.default_radius_m);
    if config.api.access_token.is_none() {
        println!(
            "{}",
            style("No access token configured; nearby queries will fail").yellow()
        );
    }
    println!();

    let shutdown = CancellationToken::new();
    install_ctrlc(shutdown.clone())?;

    let inputs = SessionInputs {
        track,
        cadence: Duration::from_secs(args.cadence_secs.max(1)),
        client: Arc::new(client),
        access_token: config.api.access_token.clone(),
    };

    let runtime = runner.runtime()?;
    runtime.block_on(serve(config, inputs, shutdown))
}

async fn serve(
    config: ConfigFile,
    inputs: SessionInputs,
    shutdown: CancellationToken,
) -> Result<(), CliError> {
    let listener = TcpListener::bind(&config.bridge.listen_addr).await?;
    println!(
        "Waiting for map surface on ws://{}  (Ctrl+C to exit)",
        listener.local_addr()?
    );

    let link = tokio::select! {
        link = websocket::accept(&listener) => link?,
        _ = shutdown.cancelled() => return Ok(()),
    };
    println!("{}", style("Map surface connected").green());

    let session = start_session(&config, link, inputs, &shutdown);
    let mut events = session.subscribe();

    match session.start_tracking().await {
        SamplerStart::Started | SamplerStart::AlreadyRunning => {}
        SamplerStart::PermissionDenied => {
            warn!("Tracking not started: permission denied");
        }
    }

    let mut check = tokio::time::interval(CONNECTION_CHECK_INTERVAL);
    let mut last_position: Option<Position> = None;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            _ = check.tick() => {
                if !session.bridge().is_connected() {
                    println!("{}", style("Map surface disconnected").yellow());
                    break;
                }
                let position = session.position();
                if position != last_position {
                    if let Some(p) = position {
                        println!("{} {}", style("position").blue(), p);
                    }
                    last_position = position;
                }
            }

            event = events.recv() => match event {
                Ok(event) => println!("{}", describe_event(&event)),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
        }
    }

    let proximity = session.coordinator().stats();
    let bridge = session.bridge().stats();
    session.shutdown().await;

    println!();
    println!("Session Summary");
    println!("───────────────");
    println!(
        "  Queries:  {} issued, {} accepted, {} stale, {} failed, {} rejected",
        proximity.issued,
        proximity.accepted,
        proximity.stale,
        proximity.failed,
        proximity.rejected
    );
    println!(
        "  Messages: {} sent, {} received, {} dropped",
        bridge.sent, bridge.received, bridge.dropped
    );
    Ok(())
}
