//! # binance-ws
//!
//! An auto-reconnecting client for [Binance combined market streams](https://developers.binance.com/docs/binance-spot-api-docs/web-socket-streams).
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use binance_ws::BinanceWebSocketClient;
//! use binance_ws::clock::LiveClock;
//! use binance_ws::ws::transport::ConnectOptions;
//!
//! #[tokio::main]
//! async fn main() -> binance_ws::Result<()> {
//!     let mut client = BinanceWebSocketClient::new(
//!         tokio::runtime::Handle::current(),
//!         Arc::new(LiveClock),
//!         |raw: bytes::Bytes| println!("{}", String::from_utf8_lossy(&raw)),
//!         None,
//!         false,
//!     );
//!     client.add_stream("btcusdt@trade");
//!     client.connect(true, ConnectOptions::new()).await?;
//!     client.join().await
//! }
//! ```

pub mod clock;
pub mod constants;
pub mod error;
pub mod ws;

/// Re-export the main client type at crate root for convenience.
pub use ws::binance::BinanceWebSocketClient;
/// Re-export the error type and Result alias.
pub use error::{BinanceWsError, Result};
