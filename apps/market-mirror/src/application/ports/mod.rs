//! Port Interfaces
//!
//! Contracts between the transport and the book layers, following the
//! Hexagonal Architecture pattern. The transport drives a
//! [`StreamHandler`]; the handler sends control frames back through an
//! [`OutboundSink`]; connection headers come from an opaque
//! [`HeaderProvider`] collaborator.
//!
//! The handler contract replaces subclass-and-override: the transport
//! knows nothing about market semantics, the book layer knows nothing
//! about sockets.

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Best-effort outbound send primitive for one active connection.
///
/// Cloneable handle over the connection's write channel. Once the
/// connection dies the channel closes and sends become no-ops; callers
/// must not assume delivery - subscription state is reasserted on
/// reconnect instead.
#[derive(Debug, Clone)]
pub struct OutboundSink {
    tx: mpsc::Sender<String>,
}

impl OutboundSink {
    /// Wrap a connection's outbound channel.
    #[must_use]
    pub const fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }

    /// Enqueue a text frame for the active connection.
    ///
    /// Returns `true` if the frame was enqueued. `false` means the
    /// connection is gone or the queue is full; the frame is dropped.
    pub fn send(&self, frame: String) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Dropping outbound frame, no active connection");
                false
            }
        }
    }
}

/// Inbound contract the transport drives.
///
/// `on_connected` fires once per successful connection, including the
/// first; `on_message` fires once per received frame, in arrival order.
/// After `stop()` returns on the transport, neither fires again.
#[async_trait]
pub trait StreamHandler: Send + Sync {
    /// A connection was established. Implementations (re)issue the
    /// current subscription set over `outbound`.
    async fn on_connected(&self, outbound: OutboundSink);

    /// A text frame arrived on the active connection.
    async fn on_message(&self, raw: &str);

    /// Application-level ping frame to send instead of a WebSocket
    /// ping, for feeds whose liveness runs above the socket layer.
    fn ping_frame(&self) -> Option<String> {
        None
    }
}

/// Opaque supplier of connection headers (auth tokens, signatures).
///
/// The REST/auth component that produces credentials is an external
/// collaborator; the transport only needs the resulting headers at
/// connect time.
pub trait HeaderProvider: Send + Sync {
    /// Headers to attach to the WebSocket handshake.
    ///
    /// # Errors
    ///
    /// Returns an error when credentials cannot be produced; the
    /// transport treats this as a transient connection failure.
    fn headers(&self) -> anyhow::Result<Vec<(String, String)>>;
}

/// Header provider for endpoints that need no authentication.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAuth;

impl HeaderProvider for NoAuth {
    fn headers(&self) -> anyhow::Result<Vec<(String, String)>> {
        Ok(Vec::new())
    }
}

/// Fixed header set, built once from configuration.
#[derive(Debug, Clone)]
pub struct StaticHeaders {
    headers: Vec<(String, String)>,
}

impl StaticHeaders {
    /// Create a provider that always returns `headers`.
    #[must_use]
    pub const fn new(headers: Vec<(String, String)>) -> Self {
        Self { headers }
    }
}

impl HeaderProvider for StaticHeaders {
    fn headers(&self) -> anyhow::Result<Vec<(String, String)>> {
        Ok(self.headers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sink_send_succeeds_while_channel_open() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = OutboundSink::new(tx);

        assert!(sink.send("frame".to_string()));
        assert_eq!(rx.recv().await, Some("frame".to_string()));
    }

    #[tokio::test]
    async fn sink_send_is_noop_after_channel_closed() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let sink = OutboundSink::new(tx);

        assert!(!sink.send("frame".to_string()));
    }

    #[test]
    fn no_auth_produces_no_headers() {
        assert!(NoAuth.headers().unwrap().is_empty());
    }

    #[test]
    fn static_headers_round_trip() {
        let provider =
            StaticHeaders::new(vec![("authorization".to_string(), "Bearer x".to_string())]);
        let headers = provider.headers().unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].0, "authorization");
    }
}
