//! Stream identifier helpers.
//!
//! Binance names every market stream `<symbol>@<channel>` with a lowercase
//! symbol. The client treats identifiers as opaque strings; these helpers
//! only save callers from formatting them by hand.
//!
//! | Stream | Identifier |
//! |---|---|
//! | Trade | `btcusdt@trade` |
//! | Aggregate trade | `btcusdt@aggTrade` |
//! | 24h ticker | `btcusdt@ticker` |
//! | 24h mini ticker | `btcusdt@miniTicker` |
//! | Best bid/ask | `btcusdt@bookTicker` |
//! | Diff depth | `btcusdt@depth` |
//! | Partial depth | `btcusdt@depth20` |
//! | Kline | `btcusdt@kline_1m` |

/// A market stream channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamType {
    /// Raw trades (`<symbol>@trade`).
    Trade,
    /// Aggregate trades (`<symbol>@aggTrade`).
    AggTrade,
    /// Rolling 24h ticker (`<symbol>@ticker`).
    Ticker,
    /// Rolling 24h mini ticker (`<symbol>@miniTicker`).
    MiniTicker,
    /// Best bid/ask updates (`<symbol>@bookTicker`).
    BookTicker,
    /// Diff depth (`<symbol>@depth`).
    Depth,
    /// Top-of-book snapshot with 5, 10 or 20 levels (`<symbol>@depth<N>`).
    PartialDepth { levels: u8 },
    /// Candlesticks (`<symbol>@kline_<interval>`), e.g. `"1m"`, `"1h"`.
    Kline { interval: &'static str },
}

impl StreamType {
    /// Build the stream identifier for `symbol`.
    pub fn stream_name(&self, symbol: &str) -> String {
        let symbol = symbol.to_lowercase();
        match self {
            Self::Trade => format!("{symbol}@trade"),
            Self::AggTrade => format!("{symbol}@aggTrade"),
            Self::Ticker => format!("{symbol}@ticker"),
            Self::MiniTicker => format!("{symbol}@miniTicker"),
            Self::BookTicker => format!("{symbol}@bookTicker"),
            Self::Depth => format!("{symbol}@depth"),
            Self::PartialDepth { levels } => format!("{symbol}@depth{levels}"),
            Self::Kline { interval } => format!("{symbol}@kline_{interval}"),
        }
    }
}
