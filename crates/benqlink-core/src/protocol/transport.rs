//! Transport abstraction
//!
//! The engine talks to the projector through a [`Transport`]: a
//! fire-and-forget writer for framed commands plus a single callback slot
//! for whole, already-delimited incoming messages. Framing, connection
//! management and reconnects belong to the transport implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;

use super::ProtocolError;

/// Callback invoked with each delimited message received from the projector
pub type ReceiveHandler = Box<dyn Fn(&str) + Send + Sync>;

/// Link to the projector
pub trait Transport: Send + Sync {
    /// Write a framed message. Must not block waiting for a reply.
    fn send(&self, frame: &str) -> Result<(), ProtocolError>;

    /// Install the receive callback, replacing any previous one
    fn on_receive(&self, handler: ReceiveHandler);
}

struct ChannelInner {
    outgoing: mpsc::UnboundedSender<String>,
    handler: RwLock<Option<ReceiveHandler>>,
    failing: AtomicBool,
}

/// In-process transport backed by a tokio channel.
///
/// Frames written by the engine appear on the receiver returned from
/// [`ChannelTransport::new`]; incoming messages are injected with
/// [`ChannelTransport::deliver`]. Clones share the same link.
#[derive(Clone)]
pub struct ChannelTransport {
    inner: Arc<ChannelInner>,
}

impl ChannelTransport {
    /// Create a transport and the receiver carrying everything it sends
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            inner: Arc::new(ChannelInner {
                outgoing: tx,
                handler: RwLock::new(None),
                failing: AtomicBool::new(false),
            }),
        };
        (transport, rx)
    }

    /// Hand a received message to the installed handler.
    ///
    /// Returns `false` when no handler is installed.
    pub fn deliver(&self, raw: &str) -> bool {
        let handler = self
            .inner
            .handler
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match handler.as_ref() {
            Some(handler) => {
                handler(raw);
                true
            }
            None => false,
        }
    }

    /// Check if a receive handler is installed
    pub fn has_handler(&self) -> bool {
        self.inner
            .handler
            .read()
            .map(|h| h.is_some())
            .unwrap_or(false)
    }

    /// Make subsequent sends fail, to simulate a broken link
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }
}

impl Transport for ChannelTransport {
    fn send(&self, frame: &str) -> Result<(), ProtocolError> {
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(ProtocolError::Transport("link is down".to_string()));
        }
        self.inner
            .outgoing
            .send(frame.to_string())
            .map_err(|_| ProtocolError::Transport("outgoing channel closed".to_string()))
    }

    fn on_receive(&self, handler: ReceiveHandler) {
        *self
            .inner
            .handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_send_reaches_receiver() {
        let (transport, mut rx) = ChannelTransport::new();
        transport.send("\r*POW=?#\r").unwrap();
        assert_eq!(rx.try_recv().unwrap(), "\r*POW=?#\r");
    }

    #[test]
    fn test_deliver_without_handler() {
        let (transport, _rx) = ChannelTransport::new();
        assert!(!transport.has_handler());
        assert!(!transport.deliver("*POW=ON#"));
    }

    #[test]
    fn test_handler_is_replaced() {
        let (transport, _rx) = ChannelTransport::new();
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));

        transport.on_receive(Box::new(|_: &str| panic!("replaced handler must not run")));
        let sink = Arc::clone(&seen);
        transport.on_receive(Box::new(move |raw: &str| sink.lock().unwrap().push(raw.to_string())));

        assert!(transport.deliver("*LTIM=10#"));
        assert_eq!(*seen.lock().unwrap(), vec!["*LTIM=10#".to_string()]);
    }

    #[test]
    fn test_failing_send() {
        let (transport, _rx) = ChannelTransport::new();
        transport.set_failing(true);
        assert!(matches!(
            transport.send("x"),
            Err(ProtocolError::Transport(_))
        ));
    }

    #[test]
    fn test_closed_receiver() {
        let (transport, rx) = ChannelTransport::new();
        drop(rx);
        assert!(transport.send("x").is_err());
    }
}
