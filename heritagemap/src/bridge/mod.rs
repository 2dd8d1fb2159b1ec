//! Map bridge
//!
//! The map is rendered by an isolated surface (a web view) that owns its own
//! scene. The host talks to it only through serialized `{type, payload}`
//! messages:
//!
//! ```text
//! MapBridge ──OutboundMessage (JSON text)──► FrameLink ──► surface
//!     ▲                                                      │
//!     └──── BridgeEvent ◄── decode ◄── JSON text ◄───────────┘
//! ```
//!
//! The [`FrameLink`] is either in-process ([`FrameLink::pair`]) or a
//! WebSocket connection ([`websocket::accept`]). [`SceneSurface`] is a
//! reference surface that records the scene instead of drawing it.

mod host;
mod link;
mod protocol;
pub mod surface;
pub mod websocket;

pub use host::{
    BridgeConfig, BridgeError, BridgeStats, MapBridge, DEFAULT_BRIDGE_EVENT_CAPACITY,
    DEFAULT_LISTEN_ADDR,
};
pub use link::FrameLink;
pub use protocol::{
    decode_inbound, BridgeEvent, DecodeError, InboundMessage, OutboundMessage, Viewport,
    ViewportRequestId,
};
pub use surface::{SceneState, SceneSurface};
