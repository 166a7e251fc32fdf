//! Socket layer under the diff stream
//!
//! [`BinanceDiffStream`](crate::BinanceDiffStream) only needs to open a
//! socket, write control frames and read text frames, so that is all
//! [`Transport`] covers. Ping/pong stays inside [`WsTransport`].
//!
//! ```no_run
//! use binance_ws::transport::{Transport, TransportError, WsTransport};
//!
//! async fn example() -> Result<(), TransportError> {
//!     let mut transport = WsTransport::new("wss://stream.binance.com/stream");
//!     transport.connect().await?;
//!     transport
//!         .send(r#"{"method":"SUBSCRIBE","params":["btcusdt@depth"],"id":1}"#)
//!         .await?;
//!     while let Some(frame) = transport.recv().await? {
//!         println!("{}", frame);
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument, trace};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket-level failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Handshake failed
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    /// Handshake did not finish in time
    #[error("no handshake within {0:?}")]
    Timeout(Duration),

    /// Used before `connect` or after `close`
    #[error("socket not connected")]
    NotConnected,

    /// Writing a frame failed
    #[error("write failed: {0}")]
    Write(String),

    /// Reading a frame failed
    #[error("read failed: {0}")]
    Read(String),

    /// Socket ended without a close frame
    #[error("connection closed without a close frame")]
    ConnectionClosed,

    /// Binary frame that is not UTF-8 text
    #[error("binary frame is not UTF-8: {0}")]
    InvalidUtf8(String),
}

/// Text-frame socket
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the socket
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Write one text frame
    async fn send(&mut self, message: &str) -> Result<(), TransportError>;

    /// Next text frame; `None` once the server has sent a close frame
    async fn recv(&mut self) -> Result<Option<String>, TransportError>;

    /// Send a close frame and drop the socket
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// tokio-tungstenite socket
pub struct WsTransport {
    url: String,
    socket: Option<Socket>,
    connect_timeout: Duration,
}

impl WsTransport {
    /// Transport for `url`, not yet connected
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            socket: None,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Set the handshake timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// URL this transport connects to
    pub fn url(&self) -> &str {
        &self.url
    }

    fn socket(&mut self) -> Result<&mut Socket, TransportError> {
        self.socket.as_mut().ok_or(TransportError::NotConnected)
    }
}

#[async_trait]
impl Transport for WsTransport {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn connect(&mut self) -> Result<(), TransportError> {
        let handshake = tokio::time::timeout(self.connect_timeout, connect_async(&self.url)).await;
        let (socket, _) = match handshake {
            Err(_) => return Err(TransportError::Timeout(self.connect_timeout)),
            Ok(Err(e)) => {
                return Err(TransportError::Connect {
                    url: self.url.clone(),
                    reason: e.to_string(),
                })
            }
            Ok(Ok(connected)) => connected,
        };

        debug!("Socket open");
        self.socket = Some(socket);
        Ok(())
    }

    async fn send(&mut self, message: &str) -> Result<(), TransportError> {
        trace!(frame = message, "Sending");
        self.socket()?
            .send(Message::Text(message.to_owned()))
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            let frame = match self.socket()?.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(TransportError::Read(e.to_string())),
                None => {
                    self.socket = None;
                    return Err(TransportError::ConnectionClosed);
                }
            };

            match frame {
                Message::Text(text) => return Ok(Some(text)),
                Message::Binary(bytes) => {
                    return String::from_utf8(bytes)
                        .map(Some)
                        .map_err(|e| TransportError::InvalidUtf8(e.to_string()))
                }
                // Unanswered pings get the connection dropped
                Message::Ping(payload) => {
                    self.socket()?
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|e| TransportError::Write(e.to_string()))?;
                }
                Message::Close(reason) => {
                    debug!(?reason, "Server closed socket");
                    self.socket = None;
                    return Ok(None);
                }
                Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.socket.take() {
            Some(mut socket) => socket
                .close(None)
                .await
                .map_err(|e| TransportError::Write(e.to_string())),
            None => Ok(()),
        }
    }
}

/// Frames written by a [`MockTransport`], readable after it moved into a task
#[cfg(any(test, feature = "test-utils"))]
pub type SentLog = std::sync::Arc<parking_lot::Mutex<Vec<String>>>;

#[cfg(any(test, feature = "test-utils"))]
enum Scripted {
    Frame(String),
    Close,
    Error(TransportError),
}

/// Scripted in-memory transport
///
/// `recv` replays the queued script in order. Once it runs out the socket
/// reports `ConnectionClosed`, or stays silent forever if
/// [`held_open`](Self::held_open).
#[cfg(any(test, feature = "test-utils"))]
pub struct MockTransport {
    url: String,
    open: bool,
    script: std::collections::VecDeque<Scripted>,
    sent: SentLog,
    refuse_connect: bool,
    refuse_send: bool,
    hold_open: bool,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockTransport {
    /// Empty script for `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            open: false,
            script: std::collections::VecDeque::new(),
            sent: SentLog::default(),
            refuse_connect: false,
            refuse_send: false,
            hold_open: false,
        }
    }

    /// Stay silent instead of closing once the script is consumed
    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Fail every `connect`
    pub fn refusing_connect(mut self) -> Self {
        self.refuse_connect = true;
        self
    }

    /// Fail every `send`
    pub fn refusing_send(mut self) -> Self {
        self.refuse_send = true;
        self
    }

    /// Queue a text frame
    pub fn push_response(&mut self, frame: impl Into<String>) {
        self.script.push_back(Scripted::Frame(frame.into()));
    }

    /// Queue several text frames
    pub fn push_responses(&mut self, frames: impl IntoIterator<Item = impl Into<String>>) {
        for frame in frames {
            self.push_response(frame);
        }
    }

    /// Queue a server close frame
    pub fn push_close(&mut self) {
        self.script.push_back(Scripted::Close);
    }

    /// Queue a read error
    pub fn push_error(&mut self, error: TransportError) {
        self.script.push_back(Scripted::Error(error));
    }

    /// Shared handle on the sent frames
    pub fn sent_log(&self) -> SentLog {
        std::sync::Arc::clone(&self.sent)
    }

    /// Drain the frames sent so far
    pub fn take_sent(&mut self) -> Vec<String> {
        std::mem::take(&mut *self.sent.lock())
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.refuse_connect {
            return Err(TransportError::Connect {
                url: self.url.clone(),
                reason: "refused by mock".into(),
            });
        }
        self.open = true;
        Ok(())
    }

    async fn send(&mut self, message: &str) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotConnected);
        }
        if self.refuse_send {
            return Err(TransportError::Write("refused by mock".into()));
        }
        self.sent.lock().push(message.to_owned());
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        if !self.open {
            return Err(TransportError::NotConnected);
        }
        match self.script.pop_front() {
            Some(Scripted::Frame(frame)) => Ok(Some(frame)),
            Some(Scripted::Close) => {
                self.open = false;
                Ok(None)
            }
            Some(Scripted::Error(error)) => Err(error),
            None if self.hold_open => std::future::pending().await,
            None => Err(TransportError::ConnectionClosed),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.open = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_replays_script_and_logs_sends() {
        let mut transport = MockTransport::new("wss://mock.test");
        transport.push_responses([r#"{"result":null,"id":1}"#, "second"]);
        let log = transport.sent_log();

        transport.connect().await.unwrap();
        transport
            .send(r#"{"method":"SUBSCRIBE","params":["btcusdt@depth"],"id":1}"#)
            .await
            .unwrap();
        assert!(log.lock()[0].contains("SUBSCRIBE"));

        assert_eq!(
            transport.recv().await.unwrap().as_deref(),
            Some(r#"{"result":null,"id":1}"#)
        );
        assert_eq!(transport.recv().await.unwrap().as_deref(), Some("second"));
        assert_eq!(
            transport.recv().await.unwrap_err(),
            TransportError::ConnectionClosed
        );
    }

    #[tokio::test]
    async fn test_mock_refuses_connect() {
        let mut transport = MockTransport::new("wss://mock.test").refusing_connect();
        assert!(matches!(
            transport.connect().await,
            Err(TransportError::Connect { .. })
        ));
        assert_eq!(
            transport.recv().await.unwrap_err(),
            TransportError::NotConnected
        );
    }

    #[tokio::test]
    async fn test_mock_close_frame_then_not_connected() {
        let mut transport = MockTransport::new("wss://mock.test");
        transport.push_close();
        transport.connect().await.unwrap();

        assert!(transport.recv().await.unwrap().is_none());
        assert_eq!(
            transport.recv().await.unwrap_err(),
            TransportError::NotConnected
        );
    }

    #[tokio::test]
    async fn test_mock_scripted_error() {
        let mut transport = MockTransport::new("wss://mock.test");
        transport.push_error(TransportError::Read("reset".into()));
        transport.connect().await.unwrap();

        assert_eq!(
            transport.recv().await.unwrap_err(),
            TransportError::Read("reset".into())
        );
    }

    #[tokio::test]
    async fn test_mock_held_open_stays_silent() {
        let mut transport = MockTransport::new("wss://mock.test").held_open();
        transport.connect().await.unwrap();

        let pending = tokio::time::timeout(Duration::from_millis(20), transport.recv()).await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let mut transport = MockTransport::new("wss://mock.test").refusing_send();
        assert_eq!(
            transport.send("{}").await.unwrap_err(),
            TransportError::NotConnected
        );

        transport.connect().await.unwrap();
        assert!(matches!(
            transport.send("{}").await,
            Err(TransportError::Write(_))
        ));
        assert!(transport.take_sent().is_empty());
    }

    #[test]
    fn test_ws_transport_url() {
        let transport = WsTransport::new("wss://stream.binance.com/stream");
        assert_eq!(transport.url(), "wss://stream.binance.com/stream");
    }
}
