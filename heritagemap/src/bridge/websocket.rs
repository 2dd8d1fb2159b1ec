//! WebSocket transport for the bridge.
//!
//! The surface (a web view hosting the map) connects over WebSocket; text
//! messages map one-to-one onto bridge frames.

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::host::BridgeError;
use super::link::FrameLink;

/// Accept one surface connection on `listener`.
///
/// Returns the host end of a [`FrameLink`] backed by the connection. The
/// link closes when the socket does.
pub async fn accept(listener: &TcpListener) -> Result<FrameLink, BridgeError> {
    let (stream, peer) = listener.accept().await?;
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| BridgeError::WebSocket(e.to_string()))?;
    info!(peer = %peer, "Map surface connected");
    Ok(spawn_pumps(ws))
}

/// Connect to a host at `url` (`ws://host:port`) as a surface.
pub async fn connect(url: &str) -> Result<FrameLink, BridgeError> {
    let (ws, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| BridgeError::WebSocket(e.to_string()))?;
    debug!(url, "Connected to bridge host");
    Ok(spawn_pumps(ws))
}

fn spawn_pumps<S>(ws: WebSocketStream<S>) -> FrameLink
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut stream) = ws.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();

    // Reader exit ends the writer too, which closes the host's sender
    let closed = CancellationToken::new();
    let writer_closed = closed.clone();

    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                _ = writer_closed.cancelled() => break,
                frame = outbound_rx.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };
            if let Err(e) = sink.send(Message::Text(frame.into())).await {
                warn!(error = %e, "WebSocket send failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    tokio::spawn(async move {
        let _closed = closed.drop_guard();
        while let Some(message) = stream.next().await {
            let frame = match message {
                Ok(Message::Text(text)) => text.to_string(),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => text,
                    Err(_) => {
                        warn!("Dropping non-UTF-8 binary frame");
                        continue;
                    }
                },
                Ok(Message::Close(_)) => {
                    info!("Map surface disconnected");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = %e, "WebSocket receive failed");
                    break;
                }
            };
            if inbound_tx.send(frame).is_err() {
                break;
            }
        }
    });

    FrameLink {
        outbound: outbound_tx,
        inbound: inbound_rx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_cross_the_socket_both_ways() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move { accept(&listener).await });
        let mut surface = connect(&format!("ws://{}", addr)).await.unwrap();
        let mut host = server.await.unwrap().unwrap();

        host.outbound
            .send(r#"{"type":"CLEAR_ROUTE","payload":{}}"#.to_string())
            .unwrap();
        assert_eq!(
            surface.inbound.recv().await.as_deref(),
            Some(r#"{"type":"CLEAR_ROUTE","payload":{}}"#)
        );

        surface
            .outbound
            .send(r#"{"type":"REQUEST_LOCATION"}"#.to_string())
            .unwrap();
        assert_eq!(
            host.inbound.recv().await.as_deref(),
            Some(r#"{"type":"REQUEST_LOCATION"}"#)
        );
    }

    #[tokio::test]
    async fn test_link_closes_when_peer_leaves() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move { accept(&listener).await });
        let surface = connect(&format!("ws://{}", addr)).await.unwrap();
        let mut host = server.await.unwrap().unwrap();

        drop(surface);
        assert_eq!(host.inbound.recv().await, None);

        // The writer follows, so the host sees the link as closed
        tokio::time::timeout(std::time::Duration::from_secs(5), host.outbound.closed())
            .await
            .unwrap();
        assert!(host.outbound.is_closed());
    }
}
