//! Resilient WebSocket Transport
//!
//! Owns the full connection lifecycle for one exchange feed: connect,
//! dispatch, heartbeat, reconnect with exponential backoff, and
//! graceful shutdown. Market semantics live entirely behind the
//! [`StreamHandler`] port; the transport moves frames.
//!
//! # Lifecycle
//!
//! [`FeedClient::start`] validates configuration and spawns the
//! connection loop. Every established connection triggers
//! `on_connected` on the handler so it can reassert subscriptions.
//! [`FeedClient::stop`] cancels the loop and waits (bounded) for it to
//! wind down. Send is best-effort: frames offered while disconnected
//! are dropped, never queued.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{HeaderProvider, OutboundSink, StreamHandler};

pub mod heartbeat;
pub mod reconnect;

use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatMonitor, HeartbeatState};
use reconnect::{ReconnectConfig, ReconnectPolicy};

/// How long `stop` waits for the connection loop before aborting it.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Outbound frame queue depth per connection.
const OUTBOUND_QUEUE: usize = 64;

type FeedSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Errors that can occur in the feed client.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// The configured URL is not a valid WebSocket URL.
    #[error("invalid WebSocket URL `{url}`: {detail}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Parse failure detail.
        detail: String,
    },

    /// The client was already started.
    #[error("client already started")]
    AlreadyStarted,

    /// Connection headers could not be produced.
    #[error("header provider failed: {0}")]
    Headers(String),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,

    /// Connection closed by the server or by heartbeat timeout.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Connection lifecycle events emitted by the client.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Connection established and handler notified.
    Connected,
    /// Connection lost.
    Disconnected,
    /// Reconnection attempt scheduled.
    Reconnecting {
        /// Reconnection attempt number.
        attempt: u32,
    },
}

/// Configuration for the feed client.
#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    /// WebSocket URL.
    pub url: String,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
}

impl FeedClientConfig {
    /// Create a configuration with default reconnect and heartbeat
    /// behavior.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

/// Resilient WebSocket client for one exchange feed.
///
/// Manages the connection lifecycle:
/// - Handshake with provider-supplied headers
/// - Heartbeat monitoring (WebSocket or application-level pings)
/// - Automatic reconnection with exponential backoff
/// - Handler dispatch in frame arrival order
pub struct FeedClient {
    config: FeedClientConfig,
    handler: Arc<dyn StreamHandler>,
    headers: Arc<dyn HeaderProvider>,
    event_tx: mpsc::Sender<FeedEvent>,
    cancel: CancellationToken,
    outbound: RwLock<Option<OutboundSink>>,
    heartbeat_state: Arc<HeartbeatState>,
    task: Mutex<Option<JoinHandle<Result<(), FeedClientError>>>>,
}

impl FeedClient {
    /// Create a new feed client.
    #[must_use]
    pub fn new(
        config: FeedClientConfig,
        handler: Arc<dyn StreamHandler>,
        headers: Arc<dyn HeaderProvider>,
        event_tx: mpsc::Sender<FeedEvent>,
    ) -> Self {
        Self {
            config,
            handler,
            headers,
            event_tx,
            cancel: CancellationToken::new(),
            outbound: RwLock::new(None),
            heartbeat_state: Arc::new(HeartbeatState::new()),
            task: Mutex::new(None),
        }
    }

    /// Start the connection loop.
    ///
    /// Validates the URL up front and fails fast on configuration
    /// errors; connection failures after this point feed the retry
    /// loop instead.
    ///
    /// # Errors
    ///
    /// Returns [`FeedClientError::InvalidUrl`] for an unparseable URL
    /// and [`FeedClientError::AlreadyStarted`] on a second call.
    pub fn start(self: &Arc<Self>) -> Result<(), FeedClientError> {
        self.config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| FeedClientError::InvalidUrl {
                url: self.config.url.clone(),
                detail: e.to_string(),
            })?;

        let mut task = self.task.lock();
        if task.is_some() {
            return Err(FeedClientError::AlreadyStarted);
        }

        let client = Arc::clone(self);
        *task = Some(tokio::spawn(client.run()));
        Ok(())
    }

    /// Stop the client and wait for the connection loop to wind down.
    ///
    /// Idempotent; returns once the loop has exited or the grace
    /// period elapsed, in which case the task is aborted.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let handle = self.task.lock().take();
        let Some(mut handle) = handle else {
            return;
        };

        match tokio::time::timeout(STOP_GRACE, &mut handle).await {
            Ok(Ok(Ok(()))) => tracing::info!("Feed client stopped"),
            Ok(Ok(Err(e))) => tracing::warn!(error = %e, "Feed client stopped with error"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Feed client task panicked"),
            Err(_) => {
                handle.abort();
                tracing::warn!(
                    grace_secs = STOP_GRACE.as_secs(),
                    "Feed client aborted after grace period"
                );
            }
        }
    }

    /// Best-effort send of a raw text frame on the active connection.
    ///
    /// Returns `false` when no connection is active or the outbound
    /// queue is full; the frame is dropped.
    pub fn send(&self, frame: String) -> bool {
        self.outbound
            .read()
            .as_ref()
            .is_some_and(|sink| sink.send(frame))
    }

    /// Connection loop: connect, dispatch until failure, back off,
    /// repeat. Runs until cancelled or retries are exhausted.
    async fn run(self: Arc<Self>) -> Result<(), FeedClientError> {
        let mut reconnect_policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Feed client cancelled");
                return Ok(());
            }

            let result = self.connect_and_run(&mut reconnect_policy).await;
            *self.outbound.write() = None;

            match result {
                Ok(()) => {
                    tracing::info!("Feed connection closed gracefully");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Feed connection error");
                    let _ = self.event_tx.send(FeedEvent::Disconnected).await;

                    if let Some(delay) = reconnect_policy.next_delay() {
                        let attempt = reconnect_policy.attempt_count();
                        tracing::info!(
                            attempt,
                            delay_ms = delay.as_millis(),
                            "Reconnecting to feed"
                        );
                        let _ = self.event_tx.send(FeedEvent::Reconnecting { attempt }).await;

                        tokio::select! {
                            () = self.cancel.cancelled() => {
                                tracing::info!("Feed client cancelled during reconnect delay");
                                return Ok(());
                            }
                            () = tokio::time::sleep(delay) => {}
                        }
                    } else {
                        return Err(FeedClientError::MaxReconnectAttemptsExceeded);
                    }
                }
            }
        }
    }

    /// One connection: handshake, handler notification, dispatch until
    /// error or cancellation.
    async fn connect_and_run(
        &self,
        reconnect_policy: &mut ReconnectPolicy,
    ) -> Result<(), FeedClientError> {
        tracing::info!(url = %self.config.url, "Connecting to feed");

        let request = self.build_request()?;
        let (ws_stream, _response) = tokio_tungstenite::connect_async(request).await?;

        // Handshake succeeded: the backoff schedule starts over.
        reconnect_policy.reset();

        let (mut write, mut read) = ws_stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
        let sink = OutboundSink::new(outbound_tx);
        *self.outbound.write() = Some(sink.clone());

        // One state across connections; reset so a pong still owed by
        // the previous connection is not counted against this one.
        self.heartbeat_state.reset();
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(10);
        let heartbeat_cancel = CancellationToken::new();
        let heartbeat_monitor = HeartbeatMonitor::new(
            self.config.heartbeat.clone(),
            Arc::clone(&self.heartbeat_state),
            heartbeat_tx,
            heartbeat_cancel.clone(),
        );
        let heartbeat_handle = tokio::spawn(heartbeat_monitor.run());

        self.handler.on_connected(sink).await;
        let _ = self.event_tx.send(FeedEvent::Connected).await;

        let result = self
            .dispatch(&mut write, &mut read, &mut outbound_rx, &mut heartbeat_rx)
            .await;

        // Every exit, including write failures, lands here: the monitor
        // goes down with the connection.
        heartbeat_cancel.cancel();
        let _ = heartbeat_handle.await;

        result
    }

    /// Pump frames for one established connection until it fails, the
    /// server closes it, or the client is cancelled.
    async fn dispatch(
        &self,
        write: &mut SplitSink<FeedSocket, Message>,
        read: &mut SplitStream<FeedSocket>,
        outbound_rx: &mut mpsc::Receiver<String>,
        heartbeat_rx: &mut mpsc::Receiver<HeartbeatEvent>,
    ) -> Result<(), FeedClientError> {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                heartbeat_event = heartbeat_rx.recv() => {
                    match heartbeat_event {
                        Some(HeartbeatEvent::SendPing) => {
                            self.heartbeat_state.mark_ping_sent();
                            match self.handler.ping_frame() {
                                Some(frame) => write.send(Message::Text(frame.into())).await?,
                                None => write.send(Message::Ping(vec![].into())).await?,
                            }
                        }
                        Some(HeartbeatEvent::Timeout) => {
                            tracing::warn!("Heartbeat timeout");
                            return Err(FeedClientError::ConnectionClosed);
                        }
                        None => {
                            tracing::debug!("Heartbeat channel closed");
                        }
                    }
                }
                Some(frame) = outbound_rx.recv() => {
                    write.send(Message::Text(frame.into())).await?;
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.heartbeat_state.record_activity();
                            self.handler.on_message(&text).await;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.heartbeat_state.record_activity();
                        }
                        Some(Ok(Message::Ping(data))) => {
                            self.heartbeat_state.record_activity();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("Server sent close frame");
                            return Err(FeedClientError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {
                            // Binary and raw frames are not part of any
                            // supported feed protocol.
                        }
                        Some(Err(e)) => {
                            return Err(e.into());
                        }
                        None => {
                            tracing::info!("WebSocket stream ended");
                            return Err(FeedClientError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }

    /// Build the handshake request with provider-supplied headers.
    fn build_request(
        &self,
    ) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, FeedClientError> {
        let mut request = self.config.url.as_str().into_client_request().map_err(|e| {
            FeedClientError::InvalidUrl {
                url: self.config.url.clone(),
                detail: e.to_string(),
            }
        })?;

        let headers = self
            .headers
            .headers()
            .map_err(|e| FeedClientError::Headers(e.to_string()))?;
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| FeedClientError::Headers(e.to_string()))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| FeedClientError::Headers(e.to_string()))?;
            request.headers_mut().insert(name, value);
        }

        Ok(request)
    }
}
