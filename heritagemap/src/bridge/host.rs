//! Host side of the map bridge.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::link::FrameLink;
use super::protocol::{decode_inbound, BridgeEvent, OutboundMessage, ViewportRequestId};
use crate::geo::Position;
use crate::proximity::PointOfInterest;
use crate::route::RouteDescriptor;

/// Default capacity of the bridge event broadcast.
pub const DEFAULT_BRIDGE_EVENT_CAPACITY: usize = 64;

/// Default address the WebSocket transport listens on.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8765";

/// Errors from the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The surface end of the link is gone.
    #[error("surface link is closed")]
    Disconnected,

    #[error("failed to encode {kind}: {reason}")]
    Encode { kind: &'static str, reason: String },

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bridge settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Address the WebSocket transport binds to.
    pub listen_addr: String,
    /// Capacity of the inbound event broadcast.
    pub event_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            event_capacity: DEFAULT_BRIDGE_EVENT_CAPACITY,
        }
    }
}

/// Frame counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub sent: u64,
    pub received: u64,
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct BridgeCounters {
    sent: AtomicU64,
    received: AtomicU64,
    dropped: AtomicU64,
}

/// Typed message channel to the rendering surface.
///
/// Outbound messages are serialized and queued in call order. Inbound frames
/// are decoded by a pump task and broadcast to subscribers. The bridge keeps
/// no domain state.
#[derive(Debug)]
pub struct MapBridge {
    outbound: mpsc::UnboundedSender<String>,
    events: broadcast::Sender<BridgeEvent>,
    counters: Arc<BridgeCounters>,
    next_viewport_request: AtomicU64,
    pump_cancel: CancellationToken,
}

impl MapBridge {
    /// Attach to the host end of a link and start the inbound pump.
    ///
    /// The pump stops when `shutdown` is cancelled, the link closes or the
    /// bridge is dropped. Must be called from within a tokio runtime.
    pub fn attach(link: FrameLink, config: &BridgeConfig, shutdown: &CancellationToken) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let counters = Arc::new(BridgeCounters::default());
        let pump_cancel = shutdown.child_token();

        tokio::spawn(pump_inbound(
            link.inbound,
            events.clone(),
            Arc::clone(&counters),
            pump_cancel.clone(),
        ));

        Self {
            outbound: link.outbound,
            events,
            counters,
            next_viewport_request: AtomicU64::new(1),
            pump_cancel,
        }
    }

    /// Subscribe to inbound events.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        !self.outbound.is_closed()
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            sent: self.counters.sent.load(Ordering::Relaxed),
            received: self.counters.received.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Serialize and enqueue one message.
    pub fn send(&self, message: &OutboundMessage) -> Result<(), BridgeError> {
        let kind = message.type_name();
        let frame = message.to_frame().map_err(|e| BridgeError::Encode {
            kind,
            reason: e.to_string(),
        })?;
        self.outbound
            .send(frame)
            .map_err(|_| BridgeError::Disconnected)?;
        self.counters.sent.fetch_add(1, Ordering::Relaxed);
        trace!(kind, "Bridge message queued");
        Ok(())
    }

    pub fn send_position(&self, position: Position, radius_m: u32) -> Result<(), BridgeError> {
        self.send(&OutboundMessage::UserLocationUpdate {
            latitude: position.latitude,
            longitude: position.longitude,
            radius: radius_m,
        })
    }

    pub fn send_radius(&self, radius_m: u32) -> Result<(), BridgeError> {
        self.send(&OutboundMessage::UpdateRadius { radius: radius_m })
    }

    pub fn send_dataset(&self, points: &[PointOfInterest]) -> Result<(), BridgeError> {
        self.send(&OutboundMessage::NearbyHeritages {
            points: points.to_vec(),
        })
    }

    /// Send the draw message for `route`. Returns `false` when the route has
    /// nothing to draw and no message was sent.
    pub fn send_route(&self, route: &RouteDescriptor) -> Result<bool, BridgeError> {
        match OutboundMessage::draw_route(route) {
            Some(message) => self.send(&message).map(|()| true),
            None => Ok(false),
        }
    }

    pub fn clear_route(&self) -> Result<(), BridgeError> {
        self.send(&OutboundMessage::ClearRoute {})
    }

    pub fn focus_marker(&self, poi: &PointOfInterest) -> Result<(), BridgeError> {
        self.send(&OutboundMessage::ShowSingleMarker {
            id: poi.id,
            name: poi.name.clone(),
            latitude: poi.latitude,
            longitude: poi.longitude,
        })
    }

    pub fn unfocus_marker(&self) -> Result<(), BridgeError> {
        self.send(&OutboundMessage::HideSingleMarker {})
    }

    pub fn recenter(&self, position: Position) -> Result<(), BridgeError> {
        self.send(&OutboundMessage::RecenterToCoord {
            latitude: position.latitude,
            longitude: position.longitude,
        })
    }

    /// Ask the surface for its centre and bounds. The reply arrives as
    /// [`BridgeEvent::ViewportReported`], echoing the returned id if the
    /// surface supports correlation.
    pub fn request_viewport(&self) -> Result<ViewportRequestId, BridgeError> {
        let id = ViewportRequestId(self.next_viewport_request.fetch_add(1, Ordering::Relaxed));
        self.send(&OutboundMessage::GetMapCenterAndBounds {
            request_id: Some(id),
        })?;
        Ok(id)
    }
}

impl Drop for MapBridge {
    fn drop(&mut self) {
        self.pump_cancel.cancel();
    }
}

async fn pump_inbound(
    mut inbound: mpsc::UnboundedReceiver<String>,
    events: broadcast::Sender<BridgeEvent>,
    counters: Arc<BridgeCounters>,
    shutdown: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                debug!("Bridge inbound pump cancelled");
                break;
            }

            frame = inbound.recv() => frame,
        };

        let Some(frame) = frame else {
            info!("Surface link closed");
            break;
        };

        match decode_inbound(&frame) {
            Ok(event) => {
                counters.received.fetch_add(1, Ordering::Relaxed);
                debug!(event = ?event, "Bridge event received");
                // No subscribers is fine; events are fire-and-forget.
                let _ = events.send(event);
            }
            Err(e) => {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Dropping malformed bridge message");
            }
        }
    }
}
