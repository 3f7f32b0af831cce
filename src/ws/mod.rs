//! WebSocket modules for real-time market streams.
//!
//! ## [`binance`] — Combined-stream client
//!
//! Tracks an ordered set of stream identifiers (`btcusdt@trade`, ...) and
//! connects to all of them through
//! `wss://stream.binance.com:9443/stream?streams=<s1>/<s2>/...`.
//!
//! ## [`client`] — Persistent connection
//!
//! Generic auto-reconnecting connection: handshake, a receive loop that
//! hands each payload to a [`handler::MessageHandler`] in arrival order,
//! bounded reconnects, sends and shutdown.
//!
//! ## [`transport`] — Socket seam
//!
//! The [`transport::Connector`] trait the connection opens sockets through,
//! with a `tokio-tungstenite` default.
//!
//! ## [`streams`] — Identifier helpers
//!
//! Builds `<symbol>@<channel>` identifiers.

pub mod binance;
pub mod client;
pub mod handler;
pub mod streams;
pub mod transport;
