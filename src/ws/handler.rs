//! Message handler invoked by the receive loop.

use bytes::Bytes;

/// Error type a [`MessageHandler`] may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives every inbound payload, in arrival order, unmodified.
///
/// Closures of shape `FnMut(Bytes)` implement this trait directly. Implement
/// it on your own type when processing can fail: returning `Err` stops the
/// receive loop and surfaces [`BinanceWsError::Handler`](crate::error::BinanceWsError::Handler).
pub trait MessageHandler: Send + 'static {
    /// Called once per inbound text or binary frame.
    fn on_message(&mut self, raw: Bytes) -> Result<(), HandlerError>;
}

impl<F> MessageHandler for F
where
    F: FnMut(Bytes) + Send + 'static,
{
    fn on_message(&mut self, raw: Bytes) -> Result<(), HandlerError> {
        self(raw);
        Ok(())
    }
}
