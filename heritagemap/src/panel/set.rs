//! The set of overlay panels, each with its own position controller, gated by the detail view.

use std::time::Duration;

use super::controller::{PanelConfig, PanelPositionController, PanelState};

/// The overlay panels of the map screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelKind {
    /// List of nearby sites.
    NearbyList,
    /// Summary of the active route.
    RouteSummary,
}

impl PanelKind {
    pub const ALL: [PanelKind; 2] = [PanelKind::NearbyList, PanelKind::RouteSummary];
}

/// One controller per panel plus the visibility gates around them.
///
/// A panel is interactive only when it is shown and no full-screen detail
/// view covers the map.
#[derive(Debug, Clone)]
pub struct PanelSet {
    nearby: PanelPositionController,
    route: PanelPositionController,
    nearby_shown: bool,
    route_shown: bool,
    detail_open: bool,
}

impl PanelSet {
    /// The nearby list starts shown; the route summary appears with a route.
    pub fn new(config: PanelConfig) -> Self {
        let mut set = Self {
            nearby: PanelPositionController::new(config),
            route: PanelPositionController::new(config),
            nearby_shown: true,
            route_shown: false,
            detail_open: false,
        };
        set.apply_visibility();
        set
    }

    pub fn panel(&self, kind: PanelKind) -> &PanelPositionController {
        match kind {
            PanelKind::NearbyList => &self.nearby,
            PanelKind::RouteSummary => &self.route,
        }
    }

    pub fn panel_mut(&mut self, kind: PanelKind) -> &mut PanelPositionController {
        match kind {
            PanelKind::NearbyList => &mut self.nearby,
            PanelKind::RouteSummary => &mut self.route,
        }
    }

    pub fn state(&self, kind: PanelKind) -> PanelState {
        self.panel(kind).state()
    }

    pub fn set_shown(&mut self, kind: PanelKind, shown: bool) {
        match kind {
            PanelKind::NearbyList => self.nearby_shown = shown,
            PanelKind::RouteSummary => self.route_shown = shown,
        }
        self.apply_visibility();
    }

    /// Open or close the full-screen detail view. While open, every panel is
    /// suppressed.
    pub fn set_detail_open(&mut self, open: bool) {
        self.detail_open = open;
        self.apply_visibility();
    }

    pub fn is_detail_open(&self) -> bool {
        self.detail_open
    }

    /// Advance every panel's animation. Returns `true` while any still moves.
    pub fn tick(&mut self, dt: Duration) -> bool {
        let nearby = self.nearby.tick(dt);
        let route = self.route.tick(dt);
        nearby || route
    }

    fn apply_visibility(&mut self) {
        let nearby = self.nearby_shown && !self.detail_open;
        let route = self.route_shown && !self.detail_open;
        self.nearby.set_visible(nearby);
        self.route.set_visible(route);
    }
}

impl Default for PanelSet {
    fn default() -> Self {
        Self::new(PanelConfig::default())
    }
}
