//! Session wiring shared by `run` and `simulate`.

use std::sync::Arc;
use std::time::Duration;

use console::style;
use heritagemap::bridge::{FrameLink, MapBridge};
use heritagemap::config::ConfigFile;
use heritagemap::events::EventBus;
use heritagemap::geo::Position;
use heritagemap::location::{PositionTracker, ScriptedSource, StaticPermissions};
use heritagemap::proximity::{NearbyClient, ProximityCoordinator, TokenStore};
use heritagemap::session::{MapSession, SessionComponents, SessionEvent};
use tokio_util::sync::CancellationToken;

use crate::error::CliError;

/// What a session needs besides the config and the surface link.
pub struct SessionInputs {
    /// Positions replayed as the device location.
    pub track: Vec<Position>,
    pub cadence: Duration,
    pub client: Arc<dyn NearbyClient>,
    pub access_token: Option<String>,
}

/// Build every component from `config` and start a session on `link`.
///
/// Must be called from within a tokio runtime.
pub fn start_session(
    config: &ConfigFile,
    link: FrameLink,
    inputs: SessionInputs,
    shutdown: &CancellationToken,
) -> MapSession {
    let bus = EventBus::default();
    let tracker = PositionTracker::new(
        config.tracker_config(),
        Arc::new(ScriptedSource::from_positions(inputs.track, inputs.cadence)),
        Arc::new(StaticPermissions::granted()),
        bus.clone(),
    );
    let coordinator = ProximityCoordinator::new(
        config.proximity_config(),
        inputs.client,
        Arc::new(TokenStore::new(inputs.access_token)),
        bus.clone(),
    );
    let bridge = Arc::new(MapBridge::attach(link, &config.bridge_config(), shutdown));

    MapSession::start(
        SessionComponents {
            bus,
            tracker,
            coordinator,
            bridge,
            panels: config.panel_config(),
        },
        shutdown,
    )
}

/// Cancel `shutdown` on Ctrl+C.
pub fn install_ctrlc(shutdown: CancellationToken) -> Result<(), CliError> {
    ctrlc::set_handler(move || {
        println!();
        println!("Received shutdown signal, stopping...");
        shutdown.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))
}

/// One-line description of a session event for the terminal.
pub fn describe_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Selected(points) => {
            let names: Vec<&str> = points.iter().map(|p| p.name.as_str()).collect();
            format!("{} {}", style("selected").green().bold(), names.join(", "))
        }
        SessionEvent::Viewport(viewport) => format!(
            "{} center {} ({:.5}..{:.5}, {:.5}..{:.5})",
            style("viewport").cyan(),
            viewport.center,
            viewport.bounds.south,
            viewport.bounds.north,
            viewport.bounds.west,
            viewport.bounds.east
        ),
        SessionEvent::Loading(true) => format!("{} nearby sites...", style("loading").dim()),
        SessionEvent::Loading(false) => format!("{}", style("loaded").dim()),
        SessionEvent::QueryFailed(error) => {
            format!("{} {}", style("query failed").red().bold(), error)
        }
        SessionEvent::PermissionChanged(state) => format!(
            "{} foreground={:?} background={:?}",
            style("permission").yellow(),
            state.foreground,
            state.background
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heritagemap::proximity::{PointOfInterest, QueryError};

    #[test]
    fn test_describe_selection_lists_names() {
        console::set_colors_enabled(false);
        let event = SessionEvent::Selected(vec![
            PointOfInterest::new(1, "Deoksugung", 37.5658, 126.9751),
            PointOfInterest::new(2, "Seoul Cathedral", 37.5633, 126.9873),
        ]);
        assert_eq!(describe_event(&event), "selected Deoksugung, Seoul Cathedral");
    }

    #[test]
    fn test_describe_query_failure() {
        console::set_colors_enabled(false);
        let event = SessionEvent::QueryFailed(QueryError::NoAuthContext);
        assert_eq!(
            describe_event(&event),
            "query failed no authentication context"
        );
    }
}
