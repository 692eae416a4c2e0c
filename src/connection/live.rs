//! WebSocket transport with bounded, fixed-delay reconnection

use super::{ConnectionError, ConnectionEvent, ConnectionState, QueryRequest, QuerySink};
use crate::protocol::{decode_server_event, encode_client_event, ClientEvent, QueryPayload};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Live connection configuration
#[derive(Debug, Clone)]
pub struct LiveConnectionConfig {
    /// Socket URL (ws:// or wss://)
    pub url: Url,
    /// Consecutive failed attempts tolerated before giving up
    pub reconnect_attempts: u32,
    /// Fixed delay between attempts
    pub reconnect_delay: Duration,
    /// Per-attempt connect timeout
    pub connect_timeout: Duration,
}

impl LiveConnectionConfig {
    pub fn new(url: &str) -> Result<Self, ConnectionError> {
        let url = Url::parse(url).map_err(|e| ConnectionError::InvalidUrl(e.to_string()))?;

        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(ConnectionError::InvalidUrl(format!(
                "URL must use ws:// or wss:// scheme, got: {}",
                url.scheme()
            )));
        }

        Ok(Self {
            url,
            reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
        })
    }

    pub fn with_reconnect(mut self, attempts: u32, delay: Duration) -> Self {
        self.reconnect_attempts = attempts;
        self.reconnect_delay = delay;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

/// Handle to the background connection task
pub struct LiveConnection {
    outbound: mpsc::Sender<ClientEvent>,
    state: watch::Receiver<ConnectionState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl LiveConnection {
    /// Start connecting in the background
    ///
    /// Returns the handle and the stream of inbound events. Dropping the
    /// handle tears the connection down.
    pub fn spawn(config: LiveConnectionConfig) -> (Self, mpsc::Receiver<ConnectionEvent>) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run_connection(
            config,
            outbound_rx,
            event_tx,
            state_tx,
            shutdown_rx,
        ));

        let connection = Self {
            outbound: outbound_tx,
            state: state_rx,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        };

        (connection, event_rx)
    }

    /// Close the socket and wait for the background task to end
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("Connection task failed: {}", e);
            }
        }
    }
}

impl QuerySink for LiveConnection {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn submit_query(&self, request: QueryRequest) -> Result<(), ConnectionError> {
        if !self.is_connected() {
            return Err(ConnectionError::NotConnected);
        }

        let event = ClientEvent::Query(QueryPayload {
            document_id: request.document_id,
            query: request.query,
            session_id: request.session_id,
            user_id: request.user_id,
        });

        self.outbound.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ConnectionError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ConnectionError::Closed,
        })
    }
}

/// Why a connected session ended
#[derive(Debug, PartialEq, Eq)]
enum PumpExit {
    /// Socket dropped, reconnect
    Dropped,
    /// Explicit teardown
    Shutdown,
}

async fn run_connection(
    config: LiveConnectionConfig,
    mut outbound_rx: mpsc::Receiver<ClientEvent>,
    events: mpsc::Sender<ConnectionEvent>,
    state: watch::Sender<ConnectionState>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut failures: u32 = 0;
    let mut retrying = false;

    loop {
        // A drop or a failed attempt stays in Connecting through the delay
        let attempt = failures + 1;
        state.send_replace(ConnectionState::Connecting);
        emit(&events, ConnectionEvent::Connecting { attempt }).await;

        if retrying {
            tokio::select! {
                _ = sleep(config.reconnect_delay) => {}
                _ = &mut shutdown_rx => {
                    tracing::info!("Reconnection to {} cancelled", config.url);
                    disconnected(&state, &events).await;
                    return;
                }
            }
        }
        retrying = true;

        tracing::info!("Connecting to {} (attempt {})", config.url, attempt);

        match timeout(config.connect_timeout, connect_async(config.url.as_str())).await {
            Ok(Ok((ws, _response))) => {
                tracing::info!("Connected to {}", config.url);
                failures = 0;
                state.send_replace(ConnectionState::Connected);
                emit(&events, ConnectionEvent::Connected).await;

                if pump(ws, &mut outbound_rx, &events, &mut shutdown_rx).await == PumpExit::Shutdown
                {
                    tracing::info!("Connection to {} closed", config.url);
                    disconnected(&state, &events).await;
                    return;
                }
                tracing::warn!("Connection to {} dropped, reconnecting", config.url);
            }
            Ok(Err(e)) => {
                tracing::warn!("Failed to connect to {}: {}", config.url, e);
                failures += 1;
            }
            Err(_) => {
                tracing::warn!(
                    "Timed out connecting to {} after {:?}",
                    config.url,
                    config.connect_timeout
                );
                failures += 1;
            }
        }

        if failures > config.reconnect_attempts {
            tracing::warn!(
                "Giving up on {} after {} failed attempts",
                config.url,
                failures
            );
            disconnected(&state, &events).await;
            return;
        }
    }
}

/// Terminal transition: teardown or retries exhausted
async fn disconnected(
    state: &watch::Sender<ConnectionState>,
    events: &mpsc::Sender<ConnectionEvent>,
) {
    state.send_replace(ConnectionState::Disconnected);
    emit(events, ConnectionEvent::Disconnected).await;
}

/// Shuttle frames until the socket drops or teardown is requested
async fn pump(
    ws: WsStream,
    outbound_rx: &mut mpsc::Receiver<ClientEvent>,
    events: &mpsc::Sender<ConnectionEvent>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> PumpExit {
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            _ = &mut *shutdown_rx => {
                close(&mut write).await;
                return PumpExit::Shutdown;
            }

            outbound = outbound_rx.recv() => {
                let Some(event) = outbound else {
                    // Every handle dropped
                    close(&mut write).await;
                    return PumpExit::Shutdown;
                };

                match encode_client_event(&event) {
                    Ok(frame) => {
                        if let Err(e) = write.send(Message::Text(frame)).await {
                            tracing::warn!("Failed to send {}: {}", event.name(), e);
                            return PumpExit::Dropped;
                        }
                        tracing::debug!("Sent {} event", event.name());
                    }
                    Err(e) => tracing::error!("Failed to encode {}: {}", event.name(), e),
                }
            }

            inbound = read.next() => {
                if let Some(exit) = handle_inbound(inbound, events).await {
                    return exit;
                }
            }
        }
    }
}

async fn handle_inbound(
    inbound: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
    events: &mpsc::Sender<ConnectionEvent>,
) -> Option<PumpExit> {
    match inbound {
        Some(Ok(Message::Text(text))) => {
            match decode_server_event(&text) {
                Ok(event) => {
                    tracing::debug!("Received {} event", event.name());
                    if let Some(event) = ConnectionEvent::from_server_event(event) {
                        emit(events, event).await;
                    }
                }
                Err(e) => tracing::warn!("Dropping inbound frame: {}", e),
            }
            None
        }
        Some(Ok(Message::Close(frame))) => {
            tracing::info!("Server closed the connection: {:?}", frame);
            Some(PumpExit::Dropped)
        }
        Some(Ok(_)) => None,
        Some(Err(e)) => {
            tracing::warn!("WebSocket error: {}", e);
            Some(PumpExit::Dropped)
        }
        None => Some(PumpExit::Dropped),
    }
}

async fn close(write: &mut SplitSink<WsStream, Message>) {
    if let Err(e) = write.send(Message::Close(None)).await {
        tracing::debug!("Close frame not sent: {}", e);
    }
}

async fn emit(events: &mpsc::Sender<ConnectionEvent>, event: ConnectionEvent) {
    if events.send(event).await.is_err() {
        tracing::debug!("Connection event receiver dropped");
    }
}
