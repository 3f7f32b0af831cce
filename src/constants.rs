//! Constants for the Binance streaming WebSocket API.
//!
//! Contains the default endpoint, the combined-stream URL convention and the
//! reconnect bounds. These are used internally by
//! [`BinanceWebSocketClient`](crate::ws::binance::BinanceWebSocketClient), but
//! are also exported for advanced usage.

// ---------------------------------------------------------------------------
// WebSocket URLs
// ---------------------------------------------------------------------------

/// Default WebSocket endpoint for Binance market streams.
pub const BINANCE_WS_BASE_URL: &str = "wss://stream.binance.com:9443";

/// Substring of [`BINANCE_WS_BASE_URL`] replaced to select the Binance US variant.
pub const US_REGION_FROM: &str = "com";

/// Replacement for [`US_REGION_FROM`] (gives `wss://stream.binance.us:9443`).
pub const US_REGION_TO: &str = "us";

// ---------------------------------------------------------------------------
// Combined streams
// ---------------------------------------------------------------------------

/// Path and query prefix of a combined-stream connection target.
pub const COMBINED_STREAM_PATH: &str = "/stream?streams=";

/// Separator between stream identifiers in a combined-stream target.
pub const STREAM_SEPARATOR: &str = "/";

// ---------------------------------------------------------------------------
// Reconnect
// ---------------------------------------------------------------------------

/// Reconnect attempts allowed before the stream client gives up.
pub const MAX_RETRY_CONNECTION: u32 = 10;

/// Pause between two reconnect attempts (milliseconds).
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;
