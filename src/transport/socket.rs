//! Socket abstraction and the tokio-tungstenite implementation.
//!
//! The event loop only talks to [`Connector`] and [`Socket`] trait objects,
//! so the reconnect logic runs unchanged against a real backend or an
//! in-memory peer.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::manager::options::DEFAULT_OPEN_TIMEOUT;

// ============================================================================
// Frame
// ============================================================================

/// What a socket yields to the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text frame.
    Text(String),
    /// The peer closed the connection, optionally with a reason.
    Close(Option<String>),
}

// ============================================================================
// Traits
// ============================================================================

/// An open, bidirectional text transport.
#[async_trait]
pub trait Socket: Send {
    /// Writes one text frame.
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Waits for the next frame. `None` means the stream ended.
    async fn next_frame(&mut self) -> Option<Result<Frame>>;

    /// Closes the socket.
    async fn close(&mut self) -> Result<()>;
}

/// Opens sockets to an endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Opens a socket to `url`, completing the handshake.
    async fn open(&self, url: &str) -> Result<Box<dyn Socket>>;
}

// ============================================================================
// WsConnector
// ============================================================================

/// Opens WebSocket connections with `tokio-tungstenite`.
#[derive(Debug, Clone, Copy)]
pub struct WsConnector {
    /// Handshake deadline.
    open_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(DEFAULT_OPEN_TIMEOUT)
    }
}

impl WsConnector {
    /// Creates a connector with the given handshake deadline.
    #[inline]
    #[must_use]
    pub const fn new(open_timeout: Duration) -> Self {
        Self { open_timeout }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> Result<Box<dyn Socket>> {
        debug!(url, "Opening WebSocket");

        let (stream, response) = timeout(self.open_timeout, connect_async(url))
            .await
            .map_err(|_| Error::connection_timeout(self.open_timeout.as_millis() as u64))?
            .map_err(|e| Error::connection(e.to_string()))?;

        debug!(status = %response.status(), "WebSocket handshake completed");

        Ok(Box::new(WsSocket { stream }))
    }
}

// ============================================================================
// WsSocket
// ============================================================================

/// A `tokio-tungstenite` client stream.
struct WsSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Socket for WsSocket {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text.to_string()))),

                Ok(Message::Close(frame)) => {
                    // The close reply is only queued by the read; push it out.
                    if let Err(e) = self.stream.flush().await
                        && !matches!(e, WsError::ConnectionClosed | WsError::AlreadyClosed)
                    {
                        debug!(error = %e, "Failed to send close reply");
                    }

                    let reason = frame.and_then(|f| {
                        (!f.reason.is_empty())
                            .then(|| format!("{} (code {})", f.reason, u16::from(f.code)))
                    });
                    return Some(Ok(Frame::Close(reason)));
                }

                // Binary, Ping, Pong
                Ok(other) => trace!(len = other.len(), "Ignoring non-text frame"),

                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return None,

                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
