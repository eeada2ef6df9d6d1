//! WebSocket client for the sensor gateway
//!
//! A single driver task owns the socket for its whole life: it connects,
//! pumps frames into the [`SensorHub`], and on any close or error resets the
//! devices and schedules exactly one reconnect. Because no other task ever
//! holds a socket, events from a replaced connection cannot reach the hub.

use super::{ConnectionState, ReconnectPolicy};
use crate::config::HubConfig;
use crate::error::{HubError, Result};
use crate::events::{Notification, NotificationBus};
use crate::hub::SensorHub;
use crate::protocol::OutboundMessage;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientStats {
    /// Text frames received across all connections
    pub frames_received: u64,

    /// Frames that failed to parse and were dropped
    pub malformed_frames: u64,

    /// Reconnects scheduled since the client started
    pub reconnect_attempts: u64,

    /// When the current (or last) connection opened
    pub connected_since: Option<DateTime<Utc>>,

    /// Last frame received timestamp
    pub last_frame_at: Option<DateTime<Utc>>,
}

struct Shared {
    state: Mutex<ConnectionState>,
    stats: Mutex<ClientStats>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
}

impl Shared {
    fn set_state(&self, bus: &NotificationBus, next: ConnectionState) {
        let previous = std::mem::replace(&mut *self.state.lock(), next);
        if previous == next {
            return;
        }
        debug!(from = %previous, to = %next, "Connection state changed");
        bus.emit(Notification::ConnectionChanged { state: next });
    }
}

enum SessionEnd {
    Cancelled,
    Dropped(String),
}

/// Persistent gateway connection feeding a [`SensorHub`]
pub struct GatewayClient {
    config: HubConfig,
    hub: SensorHub,
    session_id: String,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("gateway_url", &self.config.gateway_url.as_str())
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .finish()
    }
}

impl GatewayClient {
    pub fn new(config: HubConfig, hub: SensorHub) -> Self {
        Self {
            config,
            hub,
            session_id: Uuid::new_v4().to_string(),
            shared: Arc::new(Shared {
                state: Mutex::new(ConnectionState::Disconnected),
                stats: Mutex::new(ClientStats::default()),
                outbound: Mutex::new(None),
            }),
            cancel: CancellationToken::new(),
            driver: Mutex::new(None),
        }
    }

    /// Start the connection driver. Calling this while a driver is already
    /// running is a no-op, so there is never more than one live socket.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(HubError::connection("Gateway client has been shut down"));
        }
        let runtime = Handle::try_current().map_err(|e| {
            HubError::connection(format!("No Tokio runtime to drive the gateway: {e}"))
        })?;

        let mut driver = self.driver.lock();
        if driver.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Gateway driver already running");
            return Ok(());
        }

        let task = Driver {
            url: self.config.gateway_url.clone(),
            client_name: self.config.client_name.clone(),
            session_id: self.session_id.clone(),
            connect_timeout: self.config.connect_timeout,
            policy: ReconnectPolicy::from(&self.config.reconnect),
            hub: self.hub.clone(),
            shared: self.shared.clone(),
            cancel: self.cancel.clone(),
        };
        *driver = Some(runtime.spawn(task.run()));
        Ok(())
    }

    /// Queue a JSON message for the gateway. Returns false, without
    /// queueing anything, unless the transport is connected.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        match self.try_send(message) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Dropping outbound message");
                false
            }
        }
    }

    /// Like [`send`](Self::send) but says why nothing was queued
    pub fn try_send<T: Serialize + ?Sized>(&self, message: &T) -> Result<()> {
        if self.state() != ConnectionState::Connected {
            return Err(HubError::not_connected(format!(
                "gateway transport is {}",
                self.state()
            )));
        }

        let text = serde_json::to_string(message)?;
        let outbound = self.shared.outbound.lock();
        let tx = outbound
            .as_ref()
            .ok_or_else(|| HubError::not_connected("gateway session is closing"))?;
        tx.send(Message::Text(text))
            .map_err(|_| HubError::not_connected("gateway session has ended"))
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    pub fn stats(&self) -> ClientStats {
        self.shared.stats.lock().clone()
    }

    /// Session id carried in the identification frame
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn hub(&self) -> &SensorHub {
        &self.hub
    }

    /// Stop reconnecting, close the socket and wait for the driver to exit
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.driver.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Gateway driver task failed: {}", e);
            }
        }
        self.shared
            .set_state(self.hub.bus(), ConnectionState::Disconnected);
        info!("Gateway client shut down");
    }
}

impl Drop for GatewayClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Driver {
    url: Url,
    client_name: String,
    session_id: String,
    connect_timeout: Duration,
    policy: ReconnectPolicy,
    hub: SensorHub,
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

impl Driver {
    async fn run(mut self) {
        loop {
            self.set_state(ConnectionState::Connecting);
            info!(url = %self.url, "Connecting to gateway");

            let opened = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.open() => result,
            };

            let end = match opened {
                Ok(stream) => {
                    self.policy.reset();
                    self.run_session(stream).await
                }
                Err(e) => {
                    warn!(error = %e, "Gateway connection failed");
                    SessionEnd::Dropped(e.to_string())
                }
            };

            self.shared.outbound.lock().take();
            self.set_state(ConnectionState::Disconnected);

            let reason = match end {
                SessionEnd::Cancelled => {
                    self.hub.reset_all("client shut down");
                    break;
                }
                SessionEnd::Dropped(reason) => reason,
            };
            self.hub.reset_all(&reason);

            let Some(delay) = self.policy.next_delay() else {
                error!(
                    attempts = self.policy.attempts(),
                    "Max reconnection attempts exceeded, giving up"
                );
                break;
            };
            self.shared.stats.lock().reconnect_attempts += 1;
            info!(
                attempt = self.policy.attempts(),
                delay_ms = delay.as_millis() as u64,
                %reason,
                "Scheduling gateway reconnect"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        self.shared.outbound.lock().take();
        self.set_state(ConnectionState::Disconnected);
        debug!("Gateway driver stopped");
    }

    fn set_state(&self, next: ConnectionState) {
        self.shared.set_state(self.hub.bus(), next);
    }

    async fn open(&self) -> Result<WsStream> {
        let (stream, response) =
            tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()))
                .await
                .map_err(|_| {
                    HubError::timeout(format!(
                        "connecting to {} took longer than {:?}",
                        self.url, self.connect_timeout
                    ))
                })??;

        debug!("Gateway handshake complete: {:?}", response.status());
        Ok(stream)
    }

    async fn run_session(&self, stream: WsStream) -> SessionEnd {
        let (mut sink, mut incoming) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel();
        *self.shared.outbound.lock() = Some(tx);
        self.shared.stats.lock().connected_since = Some(Utc::now());
        self.set_state(ConnectionState::Connected);
        info!(url = %self.url, "Connected to gateway");

        let greeting = [
            OutboundMessage::Hello {
                client: self.client_name.clone(),
                session: self.session_id.clone(),
            },
            OutboundMessage::StatusRequest,
        ];
        for message in &greeting {
            let text = match serde_json::to_string(message) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to serialize greeting: {}", e);
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text)).await {
                return SessionEnd::Dropped(format!("greeting failed: {e}"));
            }
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    // Best effort; the socket is dropped either way
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Cancelled;
                }
                Some(outgoing) = rx.recv() => {
                    if let Err(e) = sink.send(outgoing).await {
                        warn!("Failed to send to gateway: {}", e);
                        return SessionEnd::Dropped(format!("send failed: {e}"));
                    }
                }
                frame = incoming.next() => match frame {
                    Some(Ok(message)) => {
                        if let Some(end) = self.process_message(message) {
                            return end;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("Gateway WebSocket error: {}", e);
                        return SessionEnd::Dropped(e.to_string());
                    }
                    None => {
                        info!("Gateway stream ended");
                        return SessionEnd::Dropped("stream ended".to_string());
                    }
                },
            }
        }
    }

    fn process_message(&self, message: Message) -> Option<SessionEnd> {
        match message {
            Message::Text(text) => {
                self.handle_text(&text);
                None
            }
            Message::Binary(data) => {
                debug!("Ignoring binary frame: {} bytes", data.len());
                None
            }
            Message::Ping(_) | Message::Pong(_) => {
                debug!("Received ping/pong");
                None
            }
            Message::Close(frame) => {
                let reason = match frame {
                    Some(frame) => format!("closed by gateway: {} {}", frame.code, frame.reason),
                    None => "closed by gateway".to_string(),
                };
                info!("{}", reason);
                Some(SessionEnd::Dropped(reason))
            }
            Message::Frame(_) => None,
        }
    }

    fn handle_text(&self, text: &str) {
        {
            let mut stats = self.shared.stats.lock();
            stats.frames_received += 1;
            stats.last_frame_at = Some(Utc::now());
        }

        if self.hub.try_handle_frame(text).is_err() {
            self.shared.stats.lock().malformed_frames += 1;
        }
    }
}
