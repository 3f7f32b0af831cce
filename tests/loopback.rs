//! End-to-end tests over a real socket against a local WebSocket server.
//!
//! The server records the request target of every upgrade, pushes scripted
//! frames, and can drop the connection to exercise automatic reconnects.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use binance_ws::ws::binance::BinanceWebSocketClientBuilder;
use binance_ws::ws::client::ConnectionState;
use binance_ws::ws::transport::ConnectOptions;
use common::{channel_handler, init_tracing, recv_n};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

/// What the server does with each accepted connection, in order.
#[derive(Clone, Copy)]
enum Session {
    /// Send the frames, then wait for the client to close.
    Serve(&'static [&'static str]),
    /// Send the frames, then drop the socket.
    Hangup(&'static [&'static str]),
}

struct TestServer {
    addr: SocketAddr,
    targets: mpsc::UnboundedReceiver<String>,
}

async fn start_server(sessions: Vec<Session>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, targets) = mpsc::unbounded_channel();
    let sessions = Arc::new(Mutex::new(sessions.into_iter()));

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let Some(session) = sessions.lock().await.next() else {
                break;
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    let _ = tx.send(req.uri().to_string());
                    Ok(resp)
                };
                let Ok(mut ws) = accept_hdr_async(stream, callback).await else {
                    return;
                };

                let (frames, keep_open) = match session {
                    Session::Serve(frames) => (frames, true),
                    Session::Hangup(frames) => (frames, false),
                };
                for frame in frames {
                    if ws.send(Message::text(frame.to_string())).await.is_err() {
                        return;
                    }
                }
                if keep_open {
                    while let Some(Ok(msg)) = ws.next().await {
                        if msg.is_close() {
                            break;
                        }
                    }
                }
            });
        }
    });

    TestServer { addr, targets }
}

#[tokio::test]
async fn test_combined_stream_roundtrip() {
    init_tracing();
    let mut server = start_server(vec![Session::Serve(&[
        r#"{"stream":"btcusdt@trade","data":{"p":"1"}}"#,
        r#"{"stream":"ethusdt@trade","data":{"p":"2"}}"#,
        r#"{"stream":"btcusdt@trade","data":{"p":"3"}}"#,
    ])])
    .await;

    let (handler, mut rx) = channel_handler();
    let mut client = BinanceWebSocketClientBuilder::new(handler)
        .base_url(format!("ws://{}", server.addr))
        .us(true)
        .streams(["btcusdt@trade", "ethusdt@trade"])
        .build()
        .unwrap();

    client
        .connect(
            true,
            ConnectOptions::new().handshake_timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap();

    let target = server.targets.recv().await.unwrap();
    assert_eq!(target, "/stream?streams=btcusdt@trade/ethusdt@trade");

    let received = recv_n(&mut rx, 3).await;
    let prices: Vec<String> = received
        .iter()
        .map(|raw| {
            let value: serde_json::Value = serde_json::from_slice(raw).unwrap();
            value["data"]["p"].as_str().unwrap().to_owned()
        })
        .collect();
    assert_eq!(prices, vec!["1", "2", "3"]);

    client.disconnect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(client.health().messages_received, 3);
}

#[tokio::test]
async fn test_server_drop_triggers_reconnect() {
    init_tracing();
    let mut server = start_server(vec![
        Session::Hangup(&["first"]),
        Session::Serve(&["second"]),
    ])
    .await;

    let (handler, mut rx) = channel_handler();
    let mut client = BinanceWebSocketClientBuilder::new(handler)
        .base_url(format!("ws://{}", server.addr))
        .reconnect_delay_ms(10)
        .streams(["btcusdt@bookTicker"])
        .build()
        .unwrap();

    client.connect(true, ConnectOptions::new()).await.unwrap();

    assert_eq!(recv_n(&mut rx, 2).await, vec!["first", "second"]);
    let first = server.targets.recv().await.unwrap();
    let second = server.targets.recv().await.unwrap();
    assert_eq!(first, "/stream?streams=btcusdt@bookTicker");
    assert_eq!(first, second);
    assert_eq!(client.health().reconnect_count, 1);

    client.disconnect().await.unwrap();
}
