//! Binary to connect to Binance combined market streams and print every
//! payload for a few seconds, for inspecting live data.
//!
//! # Usage
//!
//! ```sh
//! export BINANCE_STREAMS="btcusdt@trade,ethusdt@bookTicker"  # optional
//! export BINANCE_US=1                                        # optional
//! export BINANCE_WS_URL="wss://testnet.binance.vision"       # optional
//! cargo run --bin ws_check --features cli
//! ```

use std::env;
use std::time::Duration;

use binance_ws::ws::binance::BinanceWebSocketClientBuilder;
use binance_ws::ws::transport::ConnectOptions;
use tokio::time;

const DEFAULT_STREAMS: &str = "btcusdt@trade,ethusdt@trade";

#[tokio::main]
async fn main() -> binance_ws::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let streams = env::var("BINANCE_STREAMS").unwrap_or_else(|_| DEFAULT_STREAMS.to_owned());
    let us = env::var("BINANCE_US").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));

    let mut builder = BinanceWebSocketClientBuilder::new(|raw: bytes::Bytes| {
        println!("{}", String::from_utf8_lossy(&raw));
    })
    .us(us)
    .streams(streams.split(',').map(str::trim).filter(|s| !s.is_empty()));
    if let Ok(url) = env::var("BINANCE_WS_URL") {
        builder = builder.base_url(url);
    }
    let mut client = builder.build()?;

    println!("Connecting to {}…", client.combined_stream_url()?);
    client
        .connect(
            true,
            ConnectOptions::new().handshake_timeout(Duration::from_secs(10)),
        )
        .await?;

    println!("Listening for events for 10 seconds…\n");

    let deadline = time::sleep(Duration::from_secs(10));
    tokio::pin!(deadline);
    let mut state = client.watch_state();

    loop {
        tokio::select! {
            _ = &mut deadline => {
                println!("\n10 seconds elapsed — disconnecting…");
                break;
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                println!("State: {current}");
            }
        }
    }

    client.disconnect().await?;

    match serde_json::to_string_pretty(&client.health()) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Failed to serialize health: {e}"),
    }
    println!("Done.");

    Ok(())
}
