//! Shared fixtures: a scripted in-memory [`Connector`] and handler helpers.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use binance_ws::error::BinanceWsError;
use binance_ws::ws::transport::{ConnectOptions, Connector};
use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::{Sink, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// How long tests wait for an expected event before failing.
pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

// ===================================================================
// Recording sink
// ===================================================================

/// Write half that records every outbound message.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub sent: Arc<Mutex<Vec<Message>>>,
}

impl Sink<Message> for RecordingSink {
    type Error = WsError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), WsError> {
        self.sent.lock().unwrap().push(item);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        Poll::Ready(Ok(()))
    }
}

// ===================================================================
// Scripted connector
// ===================================================================

/// What the read half does after its scripted frames run out.
#[derive(Debug, Clone, Copy)]
pub enum End {
    /// Stay open without further frames.
    Pending,
    /// The stream ends (server went away).
    Eof,
    /// A read error.
    Error,
}

/// Outcome of one handshake.
#[derive(Debug, Clone)]
pub enum Script {
    Accept(Vec<Message>, End),
    Refuse,
}

impl Script {
    pub fn texts(frames: &[&str], end: End) -> Self {
        Self::Accept(
            frames.iter().map(|f| Message::text(f.to_string())).collect(),
            end,
        )
    }
}

#[derive(Default)]
struct Inner {
    scripts: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<(String, ConnectOptions)>>,
    sink: RecordingSink,
}

/// In-memory connector playing back one [`Script`] per handshake.
///
/// Handshakes beyond the scripted ones are refused.
#[derive(Clone, Default)]
pub struct FakeConnector {
    inner: Arc<Inner>,
}

impl FakeConnector {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        let connector = Self::default();
        connector
            .inner
            .scripts
            .lock()
            .unwrap()
            .extend(scripts);
        connector
    }

    /// URLs of every handshake attempted so far.
    pub fn urls(&self) -> Vec<String> {
        self.inner
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    /// Options of every handshake attempted so far.
    pub fn options(&self) -> Vec<ConnectOptions> {
        self.inner
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, options)| options.clone())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.inner.calls.lock().unwrap().len()
    }

    /// Messages written through any connection.
    pub fn sent(&self) -> Vec<Message> {
        self.inner.sink.sent.lock().unwrap().clone()
    }
}

impl Connector for FakeConnector {
    type Sink = RecordingSink;
    type Stream = BoxStream<'static, Result<Message, WsError>>;

    async fn connect(
        &self,
        url: &str,
        options: &ConnectOptions,
    ) -> binance_ws::Result<(Self::Sink, Self::Stream)> {
        self.inner
            .calls
            .lock()
            .unwrap()
            .push((url.to_owned(), options.clone()));
        let script = self
            .inner
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Refuse);

        match script {
            Script::Refuse => Err(BinanceWsError::WebSocket(WsError::Io(
                std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            ))),
            Script::Accept(frames, end) => {
                let frames = stream::iter(frames.into_iter().map(Ok::<Message, WsError>));
                let reader = match end {
                    End::Pending => frames.chain(stream::pending()).boxed(),
                    End::Eof => frames.boxed(),
                    End::Error => frames
                        .chain(stream::iter([Err(WsError::ConnectionClosed)]))
                        .boxed(),
                };
                Ok((self.inner.sink.clone(), reader))
            }
        }
    }
}

// ===================================================================
// Handler helpers
// ===================================================================

/// A handler forwarding every payload into a channel.
pub fn channel_handler() -> (
    impl FnMut(Bytes) + Send + 'static,
    mpsc::UnboundedReceiver<Bytes>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = move |raw: Bytes| {
        let _ = tx.send(raw);
    };
    (handler, rx)
}

/// Receive `n` payloads or panic after [`WAIT`].
pub async fn recv_n(rx: &mut mpsc::UnboundedReceiver<Bytes>, n: usize) -> Vec<Bytes> {
    let mut received = Vec::with_capacity(n);
    for _ in 0..n {
        let raw = tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for a payload")
            .expect("handler channel closed");
        received.push(raw);
    }
    received
}
