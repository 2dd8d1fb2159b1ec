//! HeritageMap - location-to-map synchronization core
//!
//! Keeps an embedded map surface in step with the user's position:
//!
//! - [`location`] tracks the device position in the foreground and background.
//! - [`proximity`] fetches nearby heritage sites for the current position and
//!   radius, discarding stale replies.
//! - [`bridge`] exchanges JSON messages with the isolated map surface.
//! - [`route`] draws car, walk and transit routes on that surface.
//! - [`panel`] drives the draggable overlay panels.
//! - [`session`] wires one of each together.

pub mod bridge;
pub mod config;
pub mod events;
pub mod geo;
pub mod location;
pub mod logging;
pub mod panel;
pub mod proximity;
pub mod route;
pub mod session;

/// Crate version, as reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
