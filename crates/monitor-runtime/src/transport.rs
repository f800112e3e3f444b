//! Streaming transport.
//!
//! A [`TransportLink`] is a pair of channels backed by a reader and a writer
//! task. The manager never sees the socket: it sends [`OutboundFrame`]s and
//! receives [`TransportEvent`]s. [`Connector`] is the seam that opens links;
//! [`WsConnector`] does so over a real WebSocket.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use monitor_core::error::{MonitorError, Result};

/// What the reader task reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(String),
    /// The peer closed; `None` when no close frame was received.
    Closed(Option<u16>),
    Error(String),
}

/// What the writer task accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    /// Send a normal-closure close frame and stop.
    Close,
}

// ── TransportLink ─────────────────────────────────────────────────────────────

/// Handle to one open transport.
///
/// Dropping the link aborts both tasks. [`TransportLink::close`] instead lets
/// the writer deliver a close frame first.
pub struct TransportLink {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl TransportLink {
    pub fn new(
        outbound: mpsc::UnboundedSender<OutboundFrame>,
        inbound: mpsc::UnboundedReceiver<TransportEvent>,
        reader: Option<JoinHandle<()>>,
        writer: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            reader,
            writer,
        }
    }

    /// A link without background tasks, plus the peer end of its channels.
    pub fn channel() -> (Self, TransportPeer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            Self::new(out_tx, in_rx, None, None),
            TransportPeer {
                outbound: out_rx,
                inbound: in_tx,
            },
        )
    }

    /// Queue a text frame.
    pub fn send(&self, text: String) -> Result<()> {
        self.outbound
            .send(OutboundFrame::Text(text))
            .map_err(|_| MonitorError::Transport("transport writer has stopped".to_string()))
    }

    /// Next event from the reader, `None` once the reader is gone.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.inbound.recv().await
    }

    /// Close with a normal-closure frame and stop reading.
    pub fn close(mut self) {
        let _ = self.outbound.send(OutboundFrame::Close);
        // Detach the writer so it can flush the close frame.
        self.writer.take();
    }
}

impl Drop for TransportLink {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }
}

/// The far end of [`TransportLink::channel`].
pub struct TransportPeer {
    /// Frames the link sent.
    pub outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    /// Events to deliver to the link.
    pub inbound: mpsc::UnboundedSender<TransportEvent>,
}

// ── Connector ─────────────────────────────────────────────────────────────────

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<TransportLink>;
}

/// [`Connector`] over `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<TransportLink> {
        tracing::debug!(%url, "opening websocket");
        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| MonitorError::Transport(e.to_string()))?;
        let (mut sink, mut source) = stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundFrame>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<TransportEvent>();

        let reader = tokio::spawn(async move {
            while let Some(message) = source.next().await {
                let event = match message {
                    Ok(Message::Text(text)) => TransportEvent::Frame(text.as_str().to_owned()),
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => TransportEvent::Frame(text),
                        Err(_) => {
                            tracing::debug!(len = bytes.len(), "dropping non-UTF-8 binary frame");
                            continue;
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        let code = frame.map(|f| u16::from(f.code));
                        let _ = in_tx.send(TransportEvent::Closed(code));
                        return;
                    }
                    // Ping/pong are answered by tungstenite.
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = in_tx.send(TransportEvent::Error(e.to_string()));
                        return;
                    }
                };
                if in_tx.send(event).is_err() {
                    return;
                }
            }
            let _ = in_tx.send(TransportEvent::Closed(None));
        });

        let writer = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                match frame {
                    OutboundFrame::Text(text) => {
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            tracing::debug!(error = %e, "websocket write failed");
                            return;
                        }
                    }
                    OutboundFrame::Close => {
                        let close = CloseFrame {
                            code: CloseCode::Normal,
                            reason: "client disconnect".into(),
                        };
                        if let Err(e) = sink.send(Message::Close(Some(close))).await {
                            tracing::debug!(error = %e, "failed to send close frame");
                        }
                        let _ = sink.close().await;
                        return;
                    }
                }
            }
        });

        Ok(TransportLink::new(out_tx, in_rx, Some(reader), Some(writer)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    // ── channel link ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_channel_link_round_trip() {
        let (mut link, mut peer) = TransportLink::channel();
        link.send("hello".to_string()).unwrap();
        assert_eq!(
            peer.outbound.recv().await,
            Some(OutboundFrame::Text("hello".to_string()))
        );

        peer.inbound
            .send(TransportEvent::Frame("world".to_string()))
            .unwrap();
        assert_eq!(
            link.recv().await,
            Some(TransportEvent::Frame("world".to_string()))
        );
    }

    #[tokio::test]
    async fn test_channel_link_close_sends_close_frame() {
        let (link, mut peer) = TransportLink::channel();
        link.close();
        assert_eq!(peer.outbound.recv().await, Some(OutboundFrame::Close));
        assert_eq!(peer.outbound.recv().await, None);
    }

    #[tokio::test]
    async fn test_send_after_peer_gone_is_error() {
        let (link, peer) = TransportLink::channel();
        drop(peer);
        assert!(matches!(
            link.send("x".to_string()),
            Err(MonitorError::Transport(_))
        ));
    }

    // ── websocket connector ───────────────────────────────────────────────────

    #[tokio::test]
    async fn test_ws_connector_against_loopback_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let first = ws.next().await.unwrap().unwrap();
            ws.send(Message::Text(r#"{"type":"keepalive"}"#.into()))
                .await
                .unwrap();
            // Wait for the client's close frame.
            let mut close_code = None;
            while let Some(Ok(message)) = ws.next().await {
                if let Message::Close(frame) = message {
                    close_code = frame.map(|f| u16::from(f.code));
                    break;
                }
            }
            (first, close_code)
        });

        let url = Url::parse(&format!("ws://{addr}/ws/monitor")).unwrap();
        let mut link = WsConnector.connect(&url).await.unwrap();
        link.send(r#"{"type":"ping"}"#.to_string()).unwrap();
        assert_eq!(
            link.recv().await,
            Some(TransportEvent::Frame(r#"{"type":"keepalive"}"#.to_string()))
        );
        link.close();

        let (first, close_code) = server.await.unwrap();
        assert_eq!(first, Message::Text(r#"{"type":"ping"}"#.into()));
        assert_eq!(close_code, Some(1000));
    }

    #[tokio::test]
    async fn test_ws_connector_reports_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("ws://{addr}/ws/monitor")).unwrap();
        assert!(matches!(
            WsConnector.connect(&url).await,
            Err(MonitorError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_ws_connector_reports_server_close_code() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let frame = CloseFrame {
                code: CloseCode::Error,
                reason: "internal".into(),
            };
            let _ = ws.close(Some(frame)).await;
        });

        let url = Url::parse(&format!("ws://{addr}/ws/monitor")).unwrap();
        let mut link = WsConnector.connect(&url).await.unwrap();
        assert_eq!(link.recv().await, Some(TransportEvent::Closed(Some(1011))));
    }
}
