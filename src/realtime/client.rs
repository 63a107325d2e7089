//! Realtime WebSocket client.
//!
//! One driver task per client owns the socket: it serializes outbound
//! events, parses inbound frames, fans them out to listeners, and redials
//! with exponential backoff when the connection drops abnormally. A server
//! close with code 1000 or an explicit [`RealtimeClient::disconnect`] ends
//! the driver instead of scheduling a retry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::protocol::{ClientEvent, ConnectionState, ServerEvent};
use crate::realtime::listeners::{ListenerId, ListenerRegistry, dispatch};
use crate::realtime::reconnect::ReconnectPolicy;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Realtime channel configuration.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// WebSocket endpoint, e.g. `ws://localhost:3001`.
    pub url: String,
    pub reconnect: ReconnectPolicy,
    /// Application-level ping cadence. Zero disables the heartbeat.
    pub heartbeat_interval: Duration,
}

impl RealtimeConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectPolicy::default(),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// How one established connection ended.
enum ConnExit {
    /// Server closed with code 1000; no reconnect.
    Normal,
    /// Dropped, errored, or closed with any other code; reconnect.
    Abnormal,
    /// Local disconnect; no reconnect.
    Shutdown,
}

struct ClientShared {
    config: RealtimeConfig,
    state: watch::Sender<ConnectionState>,
    listeners: Mutex<ListenerRegistry>,
    /// Present only while a connection is established.
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    manual_close: AtomicBool,
    /// Replaced on every `connect` so stale permits cannot leak across
    /// driver generations.
    shutdown: Mutex<Arc<Notify>>,
    driver: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the realtime channel. Cheap to clone; all clones share one
/// driver and listener set.
#[derive(Clone)]
pub struct RealtimeClient {
    shared: Arc<ClientShared>,
}

impl RealtimeClient {
    #[must_use]
    pub fn new(config: RealtimeConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(ClientShared {
                config,
                state,
                listeners: Mutex::new(ListenerRegistry::new()),
                outbound: Mutex::new(None),
                manual_close: AtomicBool::new(false),
                shutdown: Mutex::new(Arc::new(Notify::new())),
                driver: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// Start the connection driver. No-op while a driver is already
    /// running, whether connected or between reconnect attempts.
    pub async fn connect(&self) {
        let mut driver = self.shared.driver.lock().await;
        if let Some(handle) = driver.as_ref()
            && !handle.is_finished()
        {
            tracing::debug!("realtime connect ignored, driver already running");
            return;
        }

        self.shared.manual_close.store(false, Ordering::SeqCst);
        let shutdown = Arc::new(Notify::new());
        if let Ok(mut slot) = self.shared.shutdown.lock() {
            *slot = Arc::clone(&shutdown);
        }

        let shared = Arc::clone(&self.shared);
        *driver = Some(tokio::spawn(drive(shared, shutdown)));
    }

    /// Stop the driver: send a clean close if connected, cancel any pending
    /// reconnect, and wait for the driver to finish. Idempotent.
    pub async fn disconnect(&self) {
        self.shared.manual_close.store(true, Ordering::SeqCst);
        if let Ok(slot) = self.shared.shutdown.lock() {
            slot.notify_one();
        }

        let handle = self.shared.driver.lock().await.take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
            && !e.is_cancelled()
        {
            tracing::warn!(error = %e, "realtime driver task failed");
        }
    }

    /// Queue an event for delivery. When the channel is not connected the
    /// event is dropped with a warning; callers never see an error.
    pub fn send(&self, event: &ClientEvent) {
        if *self.shared.state.borrow() != ConnectionState::Connected {
            tracing::warn!(event = event.kind(), "realtime not connected, dropping outbound event");
            return;
        }

        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(event = event.kind(), error = %e, "failed to serialize outbound event");
                return;
            }
        };

        let delivered = self
            .shared
            .outbound
            .lock()
            .ok()
            .and_then(|outbound| {
                outbound
                    .as_ref()
                    .map(|tx| tx.send(Message::Text(json.into())).is_ok())
            })
            .unwrap_or(false);

        if !delivered {
            tracing::warn!(event = event.kind(), "realtime not connected, dropping outbound event");
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watch connection state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Register an event listener. Listeners run on the driver task in
    /// registration order, for every event, while registered.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        match self.shared.listeners.lock() {
            Ok(mut registry) => registry.add(listener),
            Err(poisoned) => poisoned.into_inner().add(listener),
        }
    }

    /// Deregister an event listener. Unknown ids are ignored.
    pub fn remove_listener(&self, id: ListenerId) {
        if let Ok(mut registry) = self.shared.listeners.lock() {
            registry.remove(id);
        }
    }
}

async fn drive(shared: Arc<ClientShared>, shutdown: Arc<Notify>) {
    let policy = shared.config.reconnect.clone();
    let mut attempt: u32 = 0;

    loop {
        if shared.manual_close.load(Ordering::SeqCst) {
            break;
        }

        shared.state.send_replace(ConnectionState::Connecting);
        tracing::debug!(url = %shared.config.url, "dialing realtime endpoint");

        let dialed = tokio::select! {
            result = connect_async(shared.config.url.as_str()) => Some(result),
            () = shutdown.notified() => None,
        };

        let exit = match dialed {
            None => break,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "realtime connect failed");
                ConnExit::Abnormal
            }
            Some(Ok((stream, _response))) => {
                attempt = 0;
                let (out_tx, out_rx) = mpsc::unbounded_channel();
                if let Ok(mut outbound) = shared.outbound.lock() {
                    *outbound = Some(out_tx);
                }
                shared.state.send_replace(ConnectionState::Connected);
                tracing::info!(url = %shared.config.url, "realtime connected");

                let exit = run_connection(&shared, stream, out_rx, &shutdown).await;

                shared.state.send_replace(ConnectionState::Disconnected);
                if let Ok(mut outbound) = shared.outbound.lock() {
                    *outbound = None;
                }
                exit
            }
        };

        match exit {
            ConnExit::Normal => {
                tracing::info!("realtime closed cleanly");
                break;
            }
            ConnExit::Shutdown => break,
            ConnExit::Abnormal => {}
        }

        attempt += 1;
        if !policy.should_retry(attempt) {
            tracing::warn!(
                attempts = attempt - 1,
                "reconnect attempts exhausted, staying disconnected"
            );
            break;
        }

        let delay = policy.delay_for_attempt(attempt);
        tracing::info!(
            attempt,
            max_attempts = policy.max_attempts,
            delay = ?delay,
            "scheduling reconnect"
        );
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = shutdown.notified() => break,
        }
    }

    shared.state.send_replace(ConnectionState::Disconnected);
    tracing::debug!("realtime driver stopped");
}

async fn run_connection(
    shared: &Arc<ClientShared>,
    stream: WsStream,
    mut out_rx: mpsc::UnboundedReceiver<Message>,
    shutdown: &Notify,
) -> ConnExit {
    let (mut sink, mut stream) = stream.split();

    let heartbeat_enabled = !shared.config.heartbeat_interval.is_zero();
    let period = if heartbeat_enabled {
        shared.config.heartbeat_interval
    } else {
        Duration::from_secs(3600)
    };
    let mut heartbeat =
        tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            () = shutdown.notified() => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "client disconnect".into(),
                };
                if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                    tracing::debug!(error = %e, "close frame not delivered");
                }
                return ConnExit::Shutdown;
            }
            outgoing = out_rx.recv() => {
                let Some(message) = outgoing else { return ConnExit::Shutdown };
                if let Err(e) = sink.send(message).await {
                    tracing::warn!(error = %e, "realtime send failed");
                    return ConnExit::Abnormal;
                }
            }
            _ = heartbeat.tick(), if heartbeat_enabled => {
                match serde_json::to_string(&ClientEvent::ping_now()) {
                    Ok(json) => {
                        if let Err(e) = sink.send(Message::Text(json.into())).await {
                            tracing::warn!(error = %e, "heartbeat send failed");
                            return ConnExit::Abnormal;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "heartbeat serialization failed"),
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => handle_text(shared, text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    let clean = frame.as_ref().is_some_and(|f| f.code == CloseCode::Normal);
                    if let Some(f) = &frame {
                        tracing::info!(code = %f.code, reason = %f.reason, "realtime closed by server");
                    } else {
                        tracing::info!("realtime closed by server without close frame");
                    }
                    return if clean { ConnExit::Normal } else { ConnExit::Abnormal };
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(other)) => {
                    tracing::trace!(len = other.len(), "ignoring non-text frame");
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "realtime read failed");
                    return ConnExit::Abnormal;
                }
                None => {
                    tracing::info!("realtime stream ended");
                    return ConnExit::Abnormal;
                }
            },
        }
    }
}

fn handle_text(shared: &ClientShared, text: &str) {
    match serde_json::from_str::<ServerEvent>(text) {
        Ok(event) => {
            tracing::trace!(event = event.kind(), "server event");
            let listeners = shared
                .listeners
                .lock()
                .map(|registry| registry.snapshot())
                .unwrap_or_default();
            dispatch(&listeners, &event);
        }
        Err(e) => tracing::debug!(error = %e, "dropping unparseable server event"),
    }
}
