//! Draggable overlay panels
//!
//! Each panel rests at one of three canonical heights ([`PanelState`]) and is
//! moved between them by drag gestures. [`PanelPositionController`] is the
//! single implementation; [`PanelSet`] holds one instance per panel.

mod controller;
mod set;
mod spring;

pub use controller::{PanelConfig, PanelPositionController, PanelState, DEFAULT_DRAG_THRESHOLD_PX};
pub use set::{PanelKind, PanelSet};
pub use spring::{SpringParams, REST_DISTANCE_PX, REST_SPEED_PX};
