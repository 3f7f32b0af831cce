//! Error types for the `binance-ws` crate.
//!
//! All fallible operations in this crate return [`Result<T>`], which is an
//! alias for `std::result::Result<T, BinanceWsError>`.
//!
//! [`BinanceWsError`] covers:
//! - **Illegal state** — e.g. connecting without any subscription
//! - **WebSocket errors** — handshake, TLS and framing failures
//! - **Closed connections** — the server ended the stream
//! - **Timeouts** — handshake took longer than allowed
//! - **Retry exhaustion** — the reconnect bound was reached
//! - **Handler failures** — the message handler returned an error
//! - **URL errors** — malformed connection target
//! - **Invalid arguments** — bad connection options

use std::time::Duration;

use crate::ws::handler::HandlerError;

/// All possible errors produced by the `binance-ws` clients.
#[derive(Debug, thiserror::Error)]
pub enum BinanceWsError {
    /// The operation is not allowed in the current client state.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// A WebSocket-level error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The server closed the connection, or the stream ended.
    #[error("WebSocket connection closed")]
    ConnectionClosed,

    /// The opening handshake did not complete in time.
    #[error("WebSocket handshake timed out after {0:?}")]
    Timeout(Duration),

    /// The reconnect bound was exhausted.
    #[error("max reconnect attempts exceeded ({attempts}): {source}")]
    MaxRetriesExceeded {
        /// Number of reconnect attempts made.
        attempts: u32,
        /// The transport failure that triggered the last attempt.
        source: Box<BinanceWsError>,
    },

    /// The message handler failed while processing a frame.
    #[error("Message handler failed: {0}")]
    Handler(HandlerError),

    /// An error building or parsing a URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// The caller provided an invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl BinanceWsError {
    /// Whether this is a transport failure the connection may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::WebSocket(_) | Self::ConnectionClosed | Self::Timeout(_)
        )
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BinanceWsError>;
