//! Self-healing WebSocket channel keyed by a resource identifier.
//!
//! A [`ResilientChannel`] owns at most one session at a time. Each session is
//! a background task that connects, sends a liveness probe on a fixed
//! interval, forwards inbound envelopes to the current handler, and after an
//! unexpected close reconnects with bounded exponential [`Backoff`].
//!
//! Every session carries a generation number. Connecting to another resource
//! or disconnecting bumps the generation before the old session is told to
//! stop, so a superseded session can never publish state or deliver messages.

mod backoff;
mod envelope;

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, instrument, trace, warn};

use tether_core::{Error, Result};
use tether_core::error::TransportError;

use crate::config::ChannelConfig;
use crate::error::from_websocket;

pub use backoff::Backoff;
pub use envelope::{
    ChatMessage, Envelope, LIVENESS_ACK, LIVENESS_PROBE, MessageId, NEW_MESSAGE, Sender,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Receives every inbound envelope except liveness acknowledgements.
pub type MessageHandler = Arc<dyn Fn(Envelope) + Send + Sync>;

/// Lifecycle of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Never connected.
    Idle,
    /// Opening a socket (first connect or reconnect).
    Connecting,
    /// Socket open and heartbeating.
    Open,
    /// Not connected; a reconnect may be pending unless torn down or
    /// exhausted.
    Closed,
}

/// How an open socket ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseKind {
    /// We were told to stop.
    Intentional,
    /// The server closed with a normal status.
    Clean,
    /// Anything else: errors, EOF, abnormal close codes.
    Unexpected,
}

/// State shared between the channel handle and its session tasks.
struct Shared {
    generation: AtomicU64,
    attempts: AtomicU32,
    state: watch::Sender<ChannelState>,
    handler: RwLock<MessageHandler>,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn publish(&self, generation: u64, state: ChannelState) {
        if self.is_current(generation) {
            self.state.send_replace(state);
        }
    }

    fn record_attempts(&self, generation: u64, attempts: u32) {
        if self.is_current(generation) {
            self.attempts.store(attempts, Ordering::SeqCst);
        }
    }

    fn handler(&self) -> MessageHandler {
        Arc::clone(&self.handler.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn deliver(&self, generation: u64, text: &str) {
        match serde_json::from_str::<Envelope>(text) {
            Ok(envelope) if envelope.is_liveness_ack() => trace!("Liveness acknowledged"),
            Ok(envelope) => {
                if self.is_current(generation) {
                    (self.handler())(envelope);
                }
            }
            Err(e) => warn!(error = %e, "Discarding unparseable frame"),
        }
    }
}

/// Handle to a running session task.
struct Session {
    resource_id: String,
    outbound: mpsc::UnboundedSender<Message>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Session {
    /// Stop timers, close the socket cleanly and wait for the task to end.
    async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            warn!(error = %e, "Channel session task failed");
        }
    }
}

/// A WebSocket connection to one resource at a time that heals itself.
///
/// Cheap to clone; clones control the same connection. Dropping the last
/// clone closes the socket.
///
/// # Example
///
/// ```no_run
/// use tether_core::Endpoint;
/// use tether_http::{ChannelConfig, ResilientChannel};
///
/// # async fn example() -> Result<(), tether_core::Error> {
/// let config = ChannelConfig::new(Endpoint::new("wss://api.example.com/ws/chat")?);
/// let channel = ResilientChannel::new(config, |envelope| println!("{}", envelope.kind));
/// channel.connect("thread-42").await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ResilientChannel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    config: ChannelConfig,
    shared: Arc<Shared>,
    session: Mutex<Option<Session>>,
}

impl ResilientChannel {
    pub fn new(config: ChannelConfig, handler: impl Fn(Envelope) + Send + Sync + 'static) -> Self {
        let (state, _) = watch::channel(ChannelState::Idle);
        Self {
            inner: Arc::new(ChannelInner {
                config,
                shared: Arc::new(Shared {
                    generation: AtomicU64::new(0),
                    attempts: AtomicU32::new(0),
                    state,
                    handler: RwLock::new(Arc::new(handler)),
                }),
                session: Mutex::new(None),
            }),
        }
    }

    /// Replace the message handler without touching the connection.
    pub fn set_handler(&self, handler: impl Fn(Envelope) + Send + Sync + 'static) {
        let mut current = self
            .inner
            .shared
            .handler
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *current = Arc::new(handler);
    }

    /// Connect to `resource_id`, tearing down any session for another one.
    ///
    /// Calling this for the resource whose session is still running (open,
    /// connecting or waiting out a backoff delay) is a no-op. Once that
    /// session has ended, after a clean close or with its attempt budget
    /// spent, a fresh session starts with a fresh budget.
    #[instrument(skip(self, resource_id), fields(resource = tracing::field::Empty))]
    pub async fn connect(&self, resource_id: impl Into<String>) {
        let resource_id = resource_id.into();
        tracing::Span::current().record("resource", resource_id.as_str());

        let mut session = self.inner.session.lock().await;

        if let Some(current) = session.as_ref() {
            if current.resource_id == resource_id && !current.task.is_finished() {
                debug!("Session for resource still running");
                return;
            }
        }

        let shared = &self.inner.shared;
        let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(previous) = session.take() {
            debug!(previous = %previous.resource_id, "Tearing down previous session");
            previous.shutdown().await;
        }

        shared.attempts.store(0, Ordering::SeqCst);
        shared.state.send_replace(ChannelState::Connecting);

        let url = self.inner.config.endpoint.websocket_url(&resource_id);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_session(
            Arc::clone(shared),
            self.inner.config.clone(),
            generation,
            url,
            outbound_rx,
            shutdown_rx,
        ));

        *session = Some(Session {
            resource_id,
            outbound,
            shutdown,
            task,
        });
    }

    /// Tear down the current session: cancel its timers, close the socket
    /// with a normal status and never reconnect.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) {
        let mut session = self.inner.session.lock().await;
        let shared = &self.inner.shared;
        shared.generation.fetch_add(1, Ordering::SeqCst);

        if let Some(previous) = session.take() {
            info!(resource = %previous.resource_id, "Disconnecting");
            previous.shutdown().await;
            shared.state.send_replace(ChannelState::Closed);
        }
    }

    /// Send an envelope on the open socket.
    ///
    /// # Errors
    ///
    /// Fails when the channel is not open.
    pub async fn send(&self, envelope: &Envelope) -> Result<()> {
        let text = serde_json::to_string(envelope)?;
        let session = self.inner.session.lock().await;

        let not_open = || TransportError::Connection {
            message: "channel is not open".to_string(),
        };

        match session.as_ref() {
            Some(current) if self.is_open() => current
                .outbound
                .send(Message::text(text))
                .map_err(|_| Error::from(not_open())),
            _ => Err(Error::from(not_open())),
        }
    }

    /// True while the socket is open.
    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    pub fn state(&self) -> ChannelState {
        *self.inner.shared.state.borrow()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.shared.state.subscribe()
    }

    /// Reconnects consumed since the socket last opened.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.shared.attempts.load(Ordering::SeqCst)
    }

    /// Resource of the current session, if any.
    pub async fn resource_id(&self) -> Option<String> {
        self.inner
            .session
            .lock()
            .await
            .as_ref()
            .map(|s| s.resource_id.clone())
    }
}

impl fmt::Debug for ResilientChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientChannel")
            .field("endpoint", &self.inner.config.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

#[instrument(skip_all, fields(url = %url, generation = generation))]
async fn run_session(
    shared: Arc<Shared>,
    config: ChannelConfig,
    generation: u64,
    url: String,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut backoff = Backoff::new(config.base_delay, config.max_delay, config.max_attempts);

    loop {
        shared.publish(generation, ChannelState::Connecting);

        let connected = tokio::select! {
            biased;
            _ = &mut shutdown => {
                debug!("Stopped while connecting");
                return;
            }
            result = connect_async(url.as_str()) => result,
        };

        let close = match connected {
            Ok((socket, _)) => {
                info!("Channel open");
                backoff.reset();
                shared.record_attempts(generation, 0);
                shared.publish(generation, ChannelState::Open);
                run_open(&shared, &config, generation, socket, &mut outbound, &mut shutdown).await
            }
            Err(e) => {
                warn!(error = %from_websocket(e), "Channel connect failed");
                CloseKind::Unexpected
            }
        };

        match close {
            CloseKind::Intentional => return,
            CloseKind::Clean => {
                info!("Channel closed by server");
                shared.publish(generation, ChannelState::Closed);
                return;
            }
            CloseKind::Unexpected => {
                shared.publish(generation, ChannelState::Closed);

                let Some(delay) = backoff.next_delay() else {
                    warn!(attempts = backoff.attempts(), "Reconnect attempts exhausted");
                    return;
                };
                shared.record_attempts(generation, backoff.attempts());
                info!(
                    attempt = backoff.attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnect"
                );

                tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        debug!("Pending reconnect cancelled");
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

async fn run_open(
    shared: &Shared,
    config: &ChannelConfig,
    generation: u64,
    mut socket: Socket,
    outbound: &mut mpsc::UnboundedReceiver<Message>,
    shutdown: &mut oneshot::Receiver<()>,
) -> CloseKind {
    let period = config.heartbeat_interval.max(Duration::from_millis(1));
    let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let close = loop {
        tokio::select! {
            biased;
            _ = &mut *shutdown => break CloseKind::Intentional,
            _ = heartbeat.tick() => {
                trace!("Sending liveness probe");
                if let Err(e) = socket.send(Message::text(LIVENESS_PROBE)).await {
                    warn!(error = %e, "Liveness probe failed");
                    break CloseKind::Unexpected;
                }
            }
            Some(message) = outbound.recv() => {
                if let Err(e) = socket.send(message).await {
                    warn!(error = %e, "Outbound send failed");
                    break CloseKind::Unexpected;
                }
            }
            frame = socket.next() => match frame {
                Some(Ok(Message::Text(text))) => shared.deliver(generation, text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    let normal = frame.as_ref().is_some_and(|f| f.code == CloseCode::Normal);
                    debug!(?frame, "Close frame received");
                    break if normal { CloseKind::Clean } else { CloseKind::Unexpected };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Channel read failed");
                    break CloseKind::Unexpected;
                }
                None => {
                    debug!("Channel stream ended");
                    break CloseKind::Unexpected;
                }
            },
        }
    };

    // The heartbeat must not outlive the socket it probes.
    drop(heartbeat);

    if close == CloseKind::Intentional {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "client teardown".into(),
        };
        if let Err(e) = socket.close(Some(frame)).await {
            debug!(error = %e, "Close handshake incomplete");
        }
    }

    close
}
