//! Binance combined-stream WebSocket client.
//!
//! Keeps an ordered set of stream identifiers and connects to all of them at
//! once through the combined-stream endpoint:
//!
//! ```text
//! wss://stream.binance.com:9443/stream?streams=btcusdt@trade/ethusdt@trade
//! ```
//!
//! The combined form is used even for a single stream so that every payload
//! arrives in the same `{"stream": ..., "data": ...}` envelope. Because the
//! URL encodes the whole subscription set, an automatic reconnect restores
//! every stream with one handshake; nothing is re-sent.
//!
//! # Example
//!
//! ```no_run
//! use binance_ws::ws::binance::BinanceWebSocketClientBuilder;
//! use binance_ws::ws::streams::StreamType;
//! use binance_ws::ws::transport::ConnectOptions;
//!
//! # #[tokio::main]
//! # async fn main() -> binance_ws::Result<()> {
//! let mut client = BinanceWebSocketClientBuilder::new(|raw: bytes::Bytes| {
//!     println!("{}", String::from_utf8_lossy(&raw));
//! })
//! .build()?;
//!
//! client.subscribe("BTCUSDT", StreamType::Trade);
//! client.add_stream("ethusdt@trade");
//! client.connect(true, ConnectOptions::new()).await?;
//!
//! // Runs until the reconnect bound is exhausted or the handler fails.
//! client.join().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::clock::{Clock, LiveClock};
use crate::constants::{
    BINANCE_WS_BASE_URL, COMBINED_STREAM_PATH, MAX_RETRY_CONNECTION, STREAM_SEPARATOR,
    US_REGION_FROM, US_REGION_TO,
};
use crate::error::{BinanceWsError, Result};
use crate::ws::client::{ConnectionHealth, ConnectionState, WebSocketClient, WebSocketClientConfig};
use crate::ws::handler::MessageHandler;
use crate::ws::streams::StreamType;
use crate::ws::transport::{ConnectOptions, Connector, TungsteniteConnector};

/// Resolve the effective endpoint.
///
/// The Binance US rewrite applies whenever the effective endpoint is the
/// built-in default, whether it was left out or passed explicitly. Any other
/// endpoint is used as given.
pub fn resolve_base_url(base_url: Option<String>, us: bool) -> String {
    let url = base_url
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| BINANCE_WS_BASE_URL.to_owned());

    if !us {
        return url;
    }
    if url == BINANCE_WS_BASE_URL {
        return url.replace(US_REGION_FROM, US_REGION_TO);
    }
    tracing::debug!(base_url = %url, "Custom endpoint given, ignoring US flag");
    url
}

/// Streaming client for Binance combined market streams.
///
/// Streams are registered with [`add_stream`](Self::add_stream) (or
/// [`subscribe`](Self::subscribe)) before calling
/// [`connect`](Self::connect). Every payload is handed, unmodified and in
/// arrival order, to the handler given at construction. Transport failures
/// are retried up to [`MAX_RETRY_CONNECTION`] times.
pub struct BinanceWebSocketClient<C: Connector = TungsteniteConnector> {
    inner: WebSocketClient<C>,
    base_url: String,
    streams: Vec<String>,
    options: ConnectOptions,
}

impl BinanceWebSocketClient<TungsteniteConnector> {
    /// Create a client using the default `tokio-tungstenite` transport.
    ///
    /// `base_url` overrides [`BINANCE_WS_BASE_URL`]; `us` selects the
    /// Binance US endpoint when no override is given.
    pub fn new(
        runtime: Handle,
        clock: Arc<dyn Clock>,
        handler: impl MessageHandler,
        base_url: Option<String>,
        us: bool,
    ) -> Self {
        Self::with_connector(runtime, TungsteniteConnector, clock, handler, base_url, us)
    }
}

impl<C: Connector> BinanceWebSocketClient<C> {
    /// Create a client on top of a custom [`Connector`].
    pub fn with_connector(
        runtime: Handle,
        connector: C,
        clock: Arc<dyn Clock>,
        handler: impl MessageHandler,
        base_url: Option<String>,
        us: bool,
    ) -> Self {
        Self::from_config(
            runtime,
            connector,
            clock,
            handler,
            resolve_base_url(base_url, us),
            WebSocketClientConfig::default(),
        )
    }

    fn from_config(
        runtime: Handle,
        connector: C,
        clock: Arc<dyn Clock>,
        handler: impl MessageHandler,
        base_url: String,
        config: WebSocketClientConfig,
    ) -> Self {
        let config = config.max_retry_connection(MAX_RETRY_CONNECTION);
        let span = tracing::info_span!("binance_ws", base_url = %base_url);
        let inner = WebSocketClient::new(runtime, connector, clock, handler, config).with_span(span);

        Self {
            inner,
            base_url,
            streams: Vec::new(),
            options: ConnectOptions::default(),
        }
    }

    /// The effective endpoint (after the US rewrite, if any).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Register a stream identifier such as `"btcusdt@trade"`.
    ///
    /// Duplicates are ignored; insertion order is kept and decides the order
    /// of streams in the connection URL. A stream added while connected is
    /// only picked up by the next [`connect`](Self::connect) or
    /// [`reconnect`](Self::reconnect).
    pub fn add_stream(&mut self, stream: impl Into<String>) {
        let stream = stream.into();
        if self.streams.contains(&stream) {
            tracing::debug!(stream = %stream, "Stream already subscribed");
            return;
        }

        if self.inner.is_connected() {
            tracing::debug!(stream = %stream, "Stream added while connected, applies on next connect");
        } else {
            tracing::debug!(stream = %stream, "Stream added");
        }
        self.streams.push(stream);
    }

    /// Register the `stream_type` stream for `symbol`.
    pub fn subscribe(&mut self, symbol: &str, stream_type: StreamType) {
        self.add_stream(stream_type.stream_name(symbol));
    }

    /// A copy of the registered stream identifiers, in insertion order.
    pub fn subscriptions(&self) -> Vec<String> {
        self.streams.clone()
    }

    /// Whether at least one stream is registered.
    pub fn has_subscriptions(&self) -> bool {
        !self.streams.is_empty()
    }

    /// The combined-stream URL for the current subscriptions.
    pub fn combined_stream_url(&self) -> Result<String> {
        if self.streams.is_empty() {
            return Err(BinanceWsError::IllegalState(
                "no subscriptions for connection".into(),
            ));
        }

        Ok(format!(
            "{}{COMBINED_STREAM_PATH}{}",
            self.base_url,
            self.streams.join(STREAM_SEPARATOR)
        ))
    }

    // -----------------------------------------------------------------------
    // Connection
    // -----------------------------------------------------------------------

    /// Connect to every registered stream.
    ///
    /// Fails with [`BinanceWsError::IllegalState`] before any network I/O if
    /// no stream is registered. `options` are forwarded to the transport and
    /// reused by automatic reconnects.
    pub async fn connect(&mut self, start: bool, options: ConnectOptions) -> Result<()> {
        let url = self.combined_stream_url()?;
        url::Url::parse(&url)?;

        tracing::info!(streams = self.streams.len(), "Connecting to combined streams");
        self.options = options.clone();
        self.inner.connect(&url, start, options).await
    }

    /// Start the receive loop after `connect(false, ..)`.
    pub fn start(&mut self) -> Result<()> {
        self.inner.start()
    }

    /// Close the connection and connect again with the current
    /// subscriptions, including any added since the last connect.
    pub async fn reconnect(&mut self) -> Result<()> {
        if self.inner.url().is_none() {
            return Err(BinanceWsError::IllegalState(
                "cannot reconnect, never connected".into(),
            ));
        }
        self.combined_stream_url()?;

        self.inner.disconnect().await?;
        let options = self.options.clone();
        self.connect(true, options).await
    }

    /// Stop the receive loop and close the socket.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.inner.disconnect().await
    }

    /// Wait for the receive loop to end and return its outcome.
    pub async fn join(&mut self) -> Result<()> {
        self.inner.join().await
    }

    /// Send a raw payload on the open connection.
    pub async fn send(&self, raw: impl Into<Bytes>) -> Result<()> {
        self.inner.send(raw.into()).await
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Subscribe to lifecycle state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.watch_state()
    }

    /// Whether a connection is open.
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Health snapshot of the underlying connection.
    pub fn health(&self) -> ConnectionHealth {
        self.inner.health()
    }

    /// The underlying connection.
    pub fn inner(&self) -> &WebSocketClient<C> {
        &self.inner
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for a [`BinanceWebSocketClient`].
///
/// # Example
///
/// ```no_run
/// use binance_ws::ws::binance::BinanceWebSocketClientBuilder;
///
/// # #[tokio::main]
/// # async fn main() -> binance_ws::Result<()> {
/// let client = BinanceWebSocketClientBuilder::new(|_raw: bytes::Bytes| {})
///     .us(true)
///     .reconnect_delay_ms(500)
///     .streams(["btcusdt@trade", "btcusdt@depth"])
///     .build()?;
/// assert_eq!(client.base_url(), "wss://stream.binance.us:9443");
/// # Ok(())
/// # }
/// ```
pub struct BinanceWebSocketClientBuilder<H> {
    handler: H,
    runtime: Option<Handle>,
    clock: Option<Arc<dyn Clock>>,
    base_url: Option<String>,
    us: bool,
    streams: Vec<String>,
    config: WebSocketClientConfig,
}

impl<H: MessageHandler> BinanceWebSocketClientBuilder<H> {
    /// Create a builder delivering payloads to `handler`.
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            runtime: None,
            clock: None,
            base_url: None,
            us: false,
            streams: Vec::new(),
            config: WebSocketClientConfig::default(),
        }
    }

    /// Runtime the receive loop is spawned on. Default: the current runtime.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Clock used for health timestamps. Default: [`LiveClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Override the endpoint. Default: [`BINANCE_WS_BASE_URL`].
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Use the Binance US endpoint (ignored with a custom endpoint). Default: false.
    pub fn us(mut self, us: bool) -> Self {
        self.us = us;
        self
    }

    /// Register streams up front.
    pub fn streams<I, S>(mut self, streams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.streams.extend(streams.into_iter().map(Into::into));
        self
    }

    /// Set the reconnect delay in milliseconds. Default: 1,000.
    pub fn reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.config = self.config.reconnect_delay_ms(ms);
        self
    }

    /// Log every outbound payload at `debug`. Default: false.
    pub fn log_send(mut self, enable: bool) -> Self {
        self.config = self.config.log_send(enable);
        self
    }

    /// Log every inbound payload at `debug`. Default: false.
    pub fn log_recv(mut self, enable: bool) -> Self {
        self.config = self.config.log_recv(enable);
        self
    }

    /// Build with the default `tokio-tungstenite` transport.
    pub fn build(self) -> Result<BinanceWebSocketClient> {
        self.build_with_connector(TungsteniteConnector)
    }

    /// Build on top of a custom [`Connector`].
    ///
    /// Fails if no runtime was given and none is current.
    pub fn build_with_connector<C: Connector>(self, connector: C) -> Result<BinanceWebSocketClient<C>> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| {
                BinanceWsError::IllegalState(format!("no Tokio runtime available: {e}"))
            })?,
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(LiveClock));

        let mut client = BinanceWebSocketClient::from_config(
            runtime,
            connector,
            clock,
            self.handler,
            resolve_base_url(self.base_url, self.us),
            self.config,
        );
        for stream in self.streams {
            client.add_stream(stream);
        }
        Ok(client)
    }
}
