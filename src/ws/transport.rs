//! Transport seam between the connection logic and the socket library.
//!
//! [`WebSocketClient`](crate::ws::client::WebSocketClient) never touches
//! sockets directly. It asks a [`Connector`] for a fresh pair of socket halves
//! on every handshake, which lets tests script inbound frames without a
//! network and lets callers plug in a custom TLS or proxy setup.

use std::future::Future;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_with_config};

use crate::error::{BinanceWsError, Result};

// ---------------------------------------------------------------------------
// Connect options
// ---------------------------------------------------------------------------

/// Options forwarded verbatim to the [`Connector`] on every handshake,
/// including the ones performed by automatic reconnects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Extra HTTP headers sent with the upgrade request.
    pub headers: Vec<(String, String)>,
    /// Upper bound on the opening handshake.
    pub handshake_timeout: Option<Duration>,
    /// Set `TCP_NODELAY` on the underlying socket.
    pub disable_nagle: bool,
}

impl ConnectOptions {
    /// Empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an HTTP header to the upgrade request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Fail the handshake if it takes longer than `timeout`.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    /// Enable or disable Nagle's algorithm. Default: enabled.
    pub fn disable_nagle(mut self, disable: bool) -> Self {
        self.disable_nagle = disable;
        self
    }
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// Opens WebSocket connections.
pub trait Connector: Send + Sync + 'static {
    /// Write half of an open connection.
    type Sink: Sink<Message, Error = tungstenite::Error> + Unpin + Send + 'static;
    /// Read half of an open connection.
    type Stream: Stream<Item = std::result::Result<Message, tungstenite::Error>>
        + Unpin
        + Send
        + 'static;

    /// Perform the opening handshake against `url`.
    fn connect(
        &self,
        url: &str,
        options: &ConnectOptions,
    ) -> impl Future<Output = Result<(Self::Sink, Self::Stream)>> + Send;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default [`Connector`] backed by `tokio-tungstenite` (rustls + webpki roots).
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    type Sink = SplitSink<WsStream, Message>;
    type Stream = SplitStream<WsStream>;

    async fn connect(
        &self,
        url: &str,
        options: &ConnectOptions,
    ) -> Result<(Self::Sink, Self::Stream)> {
        let mut request = url.into_client_request()?;
        for (name, value) in &options.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                BinanceWsError::InvalidArgument(format!("header name {name:?}: {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                BinanceWsError::InvalidArgument(format!("header value for {name}: {e}"))
            })?;
            request.headers_mut().insert(name, value);
        }

        let handshake = connect_async_with_config(request, None, options.disable_nagle);
        let (ws, _resp) = match options.handshake_timeout {
            Some(limit) => tokio::time::timeout(limit, handshake)
                .await
                .map_err(|_| BinanceWsError::Timeout(limit))??,
            None => handshake.await?,
        };

        Ok(ws.split())
    }
}
