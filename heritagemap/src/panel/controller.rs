//! Drag state machine for one overlay panel.
//!
//! # State Machine
//!
//! ```text
//!            drag down > threshold        drag down > threshold
//!      TOP ------------------------> MIDDLE ------------------------> BOTTOM
//!          <------------------------        <------------------------
//!            drag up > threshold          drag up > threshold
//! ```
//!
//! Offsets are pixels from the top of the viewport, so TOP is the smallest
//! offset. A drag that stays within the threshold snaps to whichever state
//! is nearest to the release offset. The move to the resulting state is
//! animated by a spring that a new drag interrupts.

use std::time::Duration;

use super::spring::{Spring, SpringParams};

/// Default drag distance (px) that counts as a deliberate step.
pub const DEFAULT_DRAG_THRESHOLD_PX: f64 = 50.0;

/// Canonical resting positions of a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PanelState {
    Top,
    #[default]
    Middle,
    Bottom,
}

impl PanelState {
    /// One step down, saturating at `Bottom`.
    pub fn step_down(self) -> Self {
        match self {
            PanelState::Top => PanelState::Middle,
            PanelState::Middle | PanelState::Bottom => PanelState::Bottom,
        }
    }

    /// One step up, saturating at `Top`.
    pub fn step_up(self) -> Self {
        match self {
            PanelState::Bottom => PanelState::Middle,
            PanelState::Middle | PanelState::Top => PanelState::Top,
        }
    }
}

impl std::fmt::Display for PanelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PanelState::Top => "TOP",
            PanelState::Middle => "MIDDLE",
            PanelState::Bottom => "BOTTOM",
        };
        f.write_str(name)
    }
}

/// Geometry and feel of a panel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanelConfig {
    /// Viewport height in pixels.
    pub viewport_height: f64,
    /// Canonical offsets as fractions of the viewport height.
    pub top_fraction: f64,
    pub middle_fraction: f64,
    pub bottom_fraction: f64,
    pub drag_threshold_px: f64,
    pub spring: SpringParams,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            viewport_height: 800.0,
            top_fraction: 0.2,
            middle_fraction: 0.6,
            bottom_fraction: 0.82,
            drag_threshold_px: DEFAULT_DRAG_THRESHOLD_PX,
            spring: SpringParams::default(),
        }
    }
}

impl PanelConfig {
    /// Offset (px) of a canonical state.
    pub fn offset_of(&self, state: PanelState) -> f64 {
        let fraction = match state {
            PanelState::Top => self.top_fraction,
            PanelState::Middle => self.middle_fraction,
            PanelState::Bottom => self.bottom_fraction,
        };
        fraction * self.viewport_height
    }

    /// Canonical state nearest to `offset`, by midpoint bucketing.
    pub fn nearest_state(&self, offset: f64) -> PanelState {
        let top = self.offset_of(PanelState::Top);
        let middle = self.offset_of(PanelState::Middle);
        let bottom = self.offset_of(PanelState::Bottom);
        if offset <= (top + middle) / 2.0 {
            PanelState::Top
        } else if offset <= (middle + bottom) / 2.0 {
            PanelState::Middle
        } else {
            PanelState::Bottom
        }
    }

    fn clamp(&self, offset: f64) -> f64 {
        offset.clamp(
            self.offset_of(PanelState::Top),
            self.offset_of(PanelState::Bottom),
        )
    }
}

/// Position controller for one draggable panel.
///
/// Purely gesture driven: it never looks at positions, datasets or bridge
/// traffic. Several panels each get their own instance.
#[derive(Debug, Clone)]
pub struct PanelPositionController {
    config: PanelConfig,
    state: PanelState,
    offset: f64,
    drag_origin: Option<f64>,
    spring: Option<Spring>,
    visible: bool,
}

impl PanelPositionController {
    /// New panel resting at `MIDDLE`.
    pub fn new(config: PanelConfig) -> Self {
        Self {
            state: PanelState::Middle,
            offset: config.offset_of(PanelState::Middle),
            config,
            drag_origin: None,
            spring: None,
            visible: true,
        }
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    /// Canonical state the panel rests at or is moving to.
    pub fn state(&self) -> PanelState {
        self.state
    }

    /// Live offset in pixels.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_origin.is_some()
    }

    pub fn is_animating(&self) -> bool {
        self.spring.is_some()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Begin a drag from the current live offset, interrupting any spring.
    /// Ignored (returns `false`) while hidden.
    pub fn drag_start(&mut self) -> bool {
        if !self.visible {
            return false;
        }
        self.spring = None;
        self.drag_origin = Some(self.offset);
        true
    }

    /// Follow the finger: `dy` is the total displacement since drag start,
    /// positive downwards.
    pub fn drag_move(&mut self, dy: f64) {
        if let Some(origin) = self.drag_origin {
            self.offset = self.config.clamp(origin + dy);
        }
    }

    /// Release the drag and pick the resting state.
    pub fn drag_end(&mut self, dy: f64) -> PanelState {
        let Some(origin) = self.drag_origin.take() else {
            return self.state;
        };

        let release = self.config.clamp(origin + dy);
        let was = self.config.nearest_state(origin);
        let threshold = self.config.drag_threshold_px;

        let target = if dy > threshold {
            was.step_down()
        } else if dy < -threshold {
            was.step_up()
        } else {
            self.config.nearest_state(release)
        };

        tracing::trace!(from = %was, to = %target, dy, "Panel drag resolved");
        self.offset = release;
        self.animate_to(target);
        target
    }

    /// Move to `state` without a gesture (e.g. a marker tap opening a list).
    /// Cancels a drag in progress.
    pub fn snap_to(&mut self, state: PanelState) {
        self.drag_origin = None;
        self.animate_to(state);
    }

    /// Advance the settle animation. Returns `true` while still moving.
    pub fn tick(&mut self, dt: Duration) -> bool {
        let Some(spring) = self.spring.as_mut() else {
            return false;
        };
        let settled = spring.step(dt);
        self.offset = spring.position();
        if settled {
            self.spring = None;
        }
        !settled
    }

    /// Show or hide the panel. Hiding ends any drag in progress.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        if !visible && self.drag_origin.take().is_some() {
            let state = self.config.nearest_state(self.offset);
            self.animate_to(state);
        }
    }

    fn animate_to(&mut self, state: PanelState) {
        self.state = state;
        let target = self.config.offset_of(state);
        self.spring = Some(Spring::new(self.offset, target, self.config.spring));
    }
}

impl Default for PanelPositionController {
    fn default() -> Self {
        Self::new(PanelConfig::default())
    }
}
