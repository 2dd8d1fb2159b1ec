//! Text-frame transport between host and surface.

use tokio::sync::mpsc;

/// One end of a bidirectional text-frame link.
///
/// `outbound` carries frames to the peer, `inbound` yields frames from it.
/// The link is considered closed once either channel is closed.
#[derive(Debug)]
pub struct FrameLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

impl FrameLink {
    /// Two cross-connected in-process ends: `(host, surface)`.
    pub fn pair() -> (FrameLink, FrameLink) {
        let (to_surface, from_host) = mpsc::unbounded_channel();
        let (to_host, from_surface) = mpsc::unbounded_channel();
        (
            FrameLink {
                outbound: to_surface,
                inbound: from_surface,
            },
            FrameLink {
                outbound: to_host,
                inbound: from_host,
            },
        )
    }
}
