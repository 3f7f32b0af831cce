//! Auto-reconnecting WebSocket connection with a callback receive loop.
//!
//! [`WebSocketClient`] owns the socket lifecycle: opening handshake, the
//! receive loop that feeds every payload to a [`MessageHandler`], bounded
//! reconnects after transport failures, outbound sends and shutdown.
//!
//! # Lifecycle
//!
//! ```text
//!  Unconnected ──connect()──▶ Connecting ──handshake ok──▶ Connected
//!                                  │                         │ start()
//!                                  │ start = true            ▼
//!                                  └──────────────────▶  Streaming ◀──┐
//!                                                            │        │ re-handshake ok
//!                                              transport     ▼        │
//!                                              failure   Reconnecting ┘
//!                                                            │
//!                                            bound reached   ▼
//!                                                          Failed
//!
//!  any state ──disconnect()──▶ Closed
//! ```
//!
//! The receive loop runs in its own Tokio task on the runtime handle given at
//! construction. Frames are delivered in the exact order the transport yields
//! them; nothing is buffered or reordered.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::{FutureExt, SinkExt, StreamExt};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{Instrument, Span};

use crate::clock::Clock;
use crate::constants::DEFAULT_RECONNECT_DELAY_MS;
use crate::error::{BinanceWsError, Result};
use crate::ws::handler::MessageHandler;
use crate::ws::transport::{ConnectOptions, Connector, TungsteniteConnector};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for a [`WebSocketClient`].
#[derive(Debug, Clone)]
pub struct WebSocketClientConfig {
    /// Reconnect attempts allowed after a transport failure before the client
    /// gives up. `0` disables reconnection entirely.
    pub max_retry_connection: u32,
    /// Delay before each reconnect attempt (milliseconds).
    pub reconnect_delay_ms: u64,
    /// Application-level pong payload. Matching frames are dropped instead of
    /// being handed to the handler.
    pub pong_msg: Option<Bytes>,
    /// Log every outbound payload at `debug`.
    pub log_send: bool,
    /// Log every inbound payload at `debug`.
    pub log_recv: bool,
}

impl Default for WebSocketClientConfig {
    fn default() -> Self {
        Self {
            max_retry_connection: 0,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            pong_msg: None,
            log_send: false,
            log_recv: false,
        }
    }
}

impl WebSocketClientConfig {
    /// Set the reconnect bound. Default: 0 (no reconnects).
    pub fn max_retry_connection(mut self, n: u32) -> Self {
        self.max_retry_connection = n;
        self
    }

    /// Set the reconnect delay in milliseconds. Default: 1,000.
    pub fn reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.reconnect_delay_ms = ms;
        self
    }

    /// Set the pong payload to filter out. Default: none.
    pub fn pong_msg(mut self, msg: impl Into<Bytes>) -> Self {
        self.pong_msg = Some(msg.into());
        self
    }

    /// Enable or disable logging of outbound payloads. Default: false.
    pub fn log_send(mut self, enable: bool) -> Self {
        self.log_send = enable;
        self
    }

    /// Enable or disable logging of inbound payloads. Default: false.
    pub fn log_recv(mut self, enable: bool) -> Self {
        self.log_recv = enable;
        self
    }
}

// ---------------------------------------------------------------------------
// State & health
// ---------------------------------------------------------------------------

/// Lifecycle state of a [`WebSocketClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// No connection has been opened yet.
    Unconnected,
    /// Opening handshake in progress.
    Connecting,
    /// Handshake complete, receive loop not started (`start = false`).
    Connected,
    /// Receive loop active.
    Streaming,
    /// Transport failed; re-handshaking.
    Reconnecting,
    /// Reconnect bound exceeded, or the handler failed.
    Failed,
    /// Shut down by the caller.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unconnected => "UNCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Streaming => "STREAMING",
            Self::Reconnecting => "RECONNECTING",
            Self::Failed => "FAILED",
            Self::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// Point-in-time health snapshot of a [`WebSocketClient`].
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionHealth {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Whether the receive loop task is alive.
    pub is_alive: bool,
    /// Successful reconnects since construction.
    pub reconnect_count: u64,
    /// Payloads handed to the handler since construction.
    pub messages_received: u64,
    /// Time of the latest successful handshake.
    pub connected_at: Option<DateTime<Utc>>,
    /// Time of the latest delivered payload.
    pub last_message_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Stats {
    reconnect_count: u64,
    messages_received: u64,
    connected_at: Option<DateTime<Utc>>,
    last_message_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// URL and options of the latest `connect`, replayed on every reconnect.
#[derive(Debug, Clone)]
struct Target {
    url: String,
    options: ConnectOptions,
}

/// State shared between the client and its receive loop task.
struct Shared<C: Connector> {
    connector: C,
    config: WebSocketClientConfig,
    clock: Arc<dyn Clock>,
    handler: Mutex<Box<dyn MessageHandler>>,
    writer: tokio::sync::Mutex<Option<C::Sink>>,
    state: watch::Sender<ConnectionState>,
    stats: Mutex<Stats>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Poisoning only means a handler panicked mid-call; the data is intact.
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl<C: Connector> Shared<C> {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "Connection state changed");
        }
    }

    fn mark_connected(&self) {
        lock(&self.stats).connected_at = Some(self.clock.utc_now());
    }

    /// Hand one payload to the handler.
    fn deliver(&self, payload: Bytes) -> Result<()> {
        if self.config.pong_msg.as_ref() == Some(&payload) {
            tracing::trace!("Received pong");
            return Ok(());
        }
        if self.config.log_recv {
            tracing::debug!(len = payload.len(), "[RECV] {}", String::from_utf8_lossy(&payload));
        }

        {
            let mut stats = lock(&self.stats);
            stats.messages_received += 1;
            stats.last_message_at = Some(self.clock.utc_now());
        }

        lock(&self.handler)
            .on_message(payload)
            .map_err(BinanceWsError::Handler)
    }
}

// ---------------------------------------------------------------------------
// Receive loop
// ---------------------------------------------------------------------------

/// Outcome of waiting for the next inbound frame.
enum Next {
    Stop,
    Failure(BinanceWsError),
}

struct ReceiveLoop<C: Connector> {
    shared: Arc<Shared<C>>,
    reader: C::Stream,
    target: Target,
    stop: oneshot::Receiver<()>,
}

impl<C: Connector> ReceiveLoop<C> {
    async fn run(mut self) -> Result<()> {
        tracing::debug!(url = %self.target.url, "Receive loop started");

        loop {
            let failure = match self.read_until_failure().await {
                Ok(Next::Stop) => break,
                Ok(Next::Failure(failure)) => failure,
                Err(e) => {
                    tracing::error!(error = %e, "Receive loop terminated by handler");
                    self.shared.set_state(ConnectionState::Failed);
                    return Err(e);
                }
            };

            match self.recover(failure).await {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Receive loop failed");
                    self.shared.set_state(ConnectionState::Failed);
                    return Err(e);
                }
            }
        }

        tracing::debug!("Receive loop stopped");
        Ok(())
    }

    /// Deliver frames until the transport fails or a stop is requested.
    ///
    /// `Err` is a handler failure, which is never retried.
    async fn read_until_failure(&mut self) -> Result<Next> {
        loop {
            tokio::select! {
                biased;
                _ = &mut self.stop => return Ok(Next::Stop),
                frame = self.reader.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        self.shared.deliver(Bytes::copy_from_slice(text.as_str().as_bytes()))?;
                    }
                    Some(Ok(Message::Binary(data))) => self.shared.deliver(data)?,
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "WebSocket closed by server");
                        return Ok(Next::Failure(BinanceWsError::ConnectionClosed));
                    }
                    // Ping/pong handled automatically by tungstenite
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "WebSocket error");
                        return Ok(Next::Failure(BinanceWsError::WebSocket(e)));
                    }
                    None => {
                        tracing::info!("WebSocket stream ended");
                        return Ok(Next::Failure(BinanceWsError::ConnectionClosed));
                    }
                },
            }
        }
    }

    /// Re-handshake after `failure`, within the retry bound.
    ///
    /// Returns `Ok(true)` once streaming again, `Ok(false)` if a stop was
    /// requested meanwhile, and `Err` once the bound is exhausted.
    async fn recover(&mut self, mut failure: BinanceWsError) -> Result<bool> {
        let max = self.shared.config.max_retry_connection;
        if max == 0 {
            return Err(failure);
        }

        let delay = Duration::from_millis(self.shared.config.reconnect_delay_ms);
        let mut attempts = 0u32;

        loop {
            if attempts >= max {
                return Err(BinanceWsError::MaxRetriesExceeded {
                    attempts,
                    source: Box::new(failure),
                });
            }
            attempts += 1;

            self.shared.set_state(ConnectionState::Reconnecting);
            tracing::warn!(
                attempt = attempts,
                max_attempts = max,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "Attempting reconnect..."
            );

            tokio::select! {
                biased;
                _ = &mut self.stop => return Ok(false),
                _ = tokio::time::sleep(delay) => {}
            }

            let handshake = self
                .shared
                .connector
                .connect(&self.target.url, &self.target.options);
            let opened = tokio::select! {
                biased;
                _ = &mut self.stop => return Ok(false),
                opened = handshake => opened,
            };

            match opened {
                Ok((sink, stream)) => {
                    *self.shared.writer.lock().await = Some(sink);
                    self.reader = stream;
                    self.shared.mark_connected();
                    lock(&self.shared.stats).reconnect_count += 1;
                    self.shared.set_state(ConnectionState::Streaming);
                    tracing::info!(attempt = attempts, "Reconnected successfully");
                    return Ok(true);
                }
                Err(e) => {
                    tracing::error!(attempt = attempts, error = %e, "Reconnection failed");
                    failure = e;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// WebSocketClient
// ---------------------------------------------------------------------------

/// Auto-reconnecting WebSocket connection delivering payloads to a handler.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use binance_ws::clock::LiveClock;
/// use binance_ws::ws::client::{WebSocketClient, WebSocketClientConfig};
/// use binance_ws::ws::transport::{ConnectOptions, TungsteniteConnector};
///
/// # #[tokio::main]
/// # async fn main() -> binance_ws::Result<()> {
/// let mut client = WebSocketClient::new(
///     tokio::runtime::Handle::current(),
///     TungsteniteConnector,
///     Arc::new(LiveClock),
///     |raw: bytes::Bytes| println!("{} bytes", raw.len()),
///     WebSocketClientConfig::default().max_retry_connection(3),
/// );
/// client
///     .connect("wss://echo.example.org", true, ConnectOptions::new())
///     .await?;
/// client.join().await?;
/// # Ok(())
/// # }
/// ```
pub struct WebSocketClient<C: Connector = TungsteniteConnector> {
    runtime: Handle,
    shared: Arc<Shared<C>>,
    span: Span,
    target: Option<Target>,
    /// Read half parked between `connect(start = false)` and `start()`.
    reader: Option<C::Stream>,
    task: Option<JoinHandle<Result<()>>>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl<C: Connector> WebSocketClient<C> {
    /// Create an unconnected client. No I/O happens until
    /// [`connect`](Self::connect).
    pub fn new(
        runtime: Handle,
        connector: C,
        clock: Arc<dyn Clock>,
        handler: impl MessageHandler,
        config: WebSocketClientConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Unconnected);
        let shared = Shared {
            connector,
            config,
            clock,
            handler: Mutex::new(Box::new(handler)),
            writer: tokio::sync::Mutex::new(None),
            state,
            stats: Mutex::new(Stats::default()),
        };

        Self {
            runtime,
            shared: Arc::new(shared),
            span: tracing::info_span!("websocket"),
            target: None,
            reader: None,
            task: None,
            stop_tx: None,
        }
    }

    /// Run the receive loop inside `span` instead of the default one.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Open a connection to `url`.
    ///
    /// When `start` is true the receive loop is spawned right after the
    /// handshake; otherwise call [`start`](Self::start) later. `options` are
    /// reused verbatim by every automatic reconnect.
    pub async fn connect(&mut self, url: &str, start: bool, options: ConnectOptions) -> Result<()> {
        if self.is_running() || self.reader.is_some() {
            return Err(BinanceWsError::IllegalState(
                "already connected, disconnect first".into(),
            ));
        }
        self.task = None;
        self.stop_tx = None;

        tracing::debug!(url, "Connecting WebSocket");
        self.shared.set_state(ConnectionState::Connecting);

        let (sink, stream) = match self.shared.connector.connect(url, &options).await {
            Ok(halves) => halves,
            Err(e) => {
                tracing::error!(url, error = %e, "WebSocket handshake failed");
                self.shared.set_state(ConnectionState::Unconnected);
                return Err(e);
            }
        };

        *self.shared.writer.lock().await = Some(sink);
        self.reader = Some(stream);
        self.target = Some(Target {
            url: url.to_owned(),
            options,
        });
        self.shared.mark_connected();
        self.shared.set_state(ConnectionState::Connected);

        tracing::info!(url, "WebSocket connected");

        if start {
            self.start()?;
        }
        Ok(())
    }

    /// Spawn the receive loop for a connection opened with `start = false`.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(BinanceWsError::IllegalState(
                "receive loop already running".into(),
            ));
        }
        let (reader, target) = match (self.reader.take(), self.target.clone()) {
            (Some(reader), Some(target)) => (reader, target),
            _ => {
                return Err(BinanceWsError::IllegalState(
                    "no open connection to start".into(),
                ));
            }
        };

        let (stop_tx, stop) = oneshot::channel();
        let receive = ReceiveLoop {
            shared: Arc::clone(&self.shared),
            reader,
            target,
            stop,
        };

        // Record a handler panic before it unwinds the task.
        let shared = Arc::clone(&self.shared);
        let guarded = async move {
            match AssertUnwindSafe(receive.run()).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => {
                    tracing::error!("Message handler panicked, receive loop terminated");
                    shared.set_state(ConnectionState::Failed);
                    std::panic::resume_unwind(panic)
                }
            }
        };

        self.shared.set_state(ConnectionState::Streaming);
        self.task = Some(self.runtime.spawn(guarded.instrument(self.span.clone())));
        self.stop_tx = Some(stop_tx);
        Ok(())
    }

    /// Send a payload. UTF-8 payloads go out as text frames, anything else
    /// as binary.
    pub async fn send(&self, raw: Bytes) -> Result<()> {
        if self.shared.config.log_send {
            tracing::debug!(len = raw.len(), "[SEND] {}", String::from_utf8_lossy(&raw));
        }
        let msg = match String::from_utf8(raw.to_vec()) {
            Ok(text) => Message::text(text),
            Err(_) => Message::Binary(raw),
        };

        let mut guard = self.shared.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| BinanceWsError::IllegalState("not connected".into()))?;
        writer.send(msg).await?;
        Ok(())
    }

    /// Stop the receive loop and close the socket. Idempotent.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(stop) = self.stop_tx.take() {
            // The loop may already have ended on its own.
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Receive loop had already failed"),
                Err(e) => tracing::warn!(error = %e, "Receive loop task did not finish cleanly"),
            }
        }

        if let Some(mut writer) = self.shared.writer.lock().await.take() {
            if let Err(e) = writer.send(Message::Close(None)).await {
                tracing::debug!(error = %e, "Failed to send close frame");
            }
            let _ = writer.close().await;
        }
        self.reader = None;

        if self.state() != ConnectionState::Closed {
            self.shared.set_state(ConnectionState::Closed);
            tracing::info!("WebSocket disconnected");
        }
        Ok(())
    }

    /// Close the current connection and open a new one to the same URL with
    /// the same options, starting the receive loop.
    pub async fn reconnect(&mut self) -> Result<()> {
        let target = self.target.clone().ok_or_else(|| {
            BinanceWsError::IllegalState("cannot reconnect, never connected".into())
        })?;

        self.disconnect().await?;
        self.connect(&target.url, true, target.options).await
    }

    /// Wait for the receive loop to finish and return its outcome.
    ///
    /// A panic inside the handler is resumed on the caller, after the state
    /// has moved to [`ConnectionState::Failed`].
    pub async fn join(&mut self) -> Result<()> {
        let task = self.task.take().ok_or_else(|| {
            BinanceWsError::IllegalState("receive loop not running".into())
        })?;

        match task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(BinanceWsError::IllegalState(
                "receive loop was cancelled".into(),
            )),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Subscribe to lifecycle state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Whether a connection is open (handshake done, not failed or closed).
    pub fn is_connected(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connected | ConnectionState::Streaming
        )
    }

    /// URL of the latest `connect` call.
    pub fn url(&self) -> Option<&str> {
        self.target.as_ref().map(|t| t.url.as_str())
    }

    /// Get the configuration.
    pub fn config(&self) -> &WebSocketClientConfig {
        &self.shared.config
    }

    /// Health snapshot.
    pub fn health(&self) -> ConnectionHealth {
        let stats = lock(&self.shared.stats);
        ConnectionHealth {
            state: self.state(),
            is_alive: self.is_running(),
            reconnect_count: stats.reconnect_count,
            messages_received: stats.messages_received,
            connected_at: stats.connected_at,
            last_message_at: stats.last_message_at,
        }
    }

    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl<C: Connector> Drop for WebSocketClient<C> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
