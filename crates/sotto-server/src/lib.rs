//! Sotto relay server.
//!
//! A confidentiality-preserving group chat relay: the server fans out opaque
//! ciphertext among connected peers without ever possessing plaintext or the
//! shared key, and retains a short, time-windowed buffer of recent
//! (still-encrypted) messages so a newly joined peer can catch up.
//!
//! # Architecture
//!
//! The [`RelayDriver`] is pure logic in the action pattern: it consumes
//! [`RelayEvent`]s and returns [`RelayAction`]s, never performing I/O.
//! [`Server`] is the production runtime that executes those actions using
//! Quinn QUIC and the Tokio async runtime.
//!
//! # Concurrency
//!
//! One `tokio::sync::Mutex` guards the driver together with the map of
//! per-connection outbound queues. Every mutation - connect (including
//! snapshot delivery), inbound payload (stamp + append + fan-out enqueue),
//! disconnect, eviction tick - runs under a single acquisition of that
//! mutex, which serializes the relay step and makes broadcast order equal
//! history order for every connection.
//!
//! Fan-out is decoupled from delivery: the relay step only enqueues frames
//! onto bounded per-connection queues, each drained by its own writer task.
//! A slow or dead peer fills its own queue (frames for it are dropped with
//! a warning) without stalling the relay or the other peers.
//!
//! # Components
//!
//! - [`RelayDriver`]: registry + history orchestration (pure logic, no I/O)
//! - [`Server`]: production runtime executing relay actions
//! - [`QuicTransport`]: QUIC transport via the Quinn library
//! - [`SystemEnv`]: production environment (real time, OS RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod env;
mod error;
mod history;
mod registry;
mod relay;
mod transport;

use std::{collections::HashMap, sync::Arc, time::Duration};

use bytes::BytesMut;
pub use env::{Environment, SystemEnv};
pub use error::ServerError;
pub use history::{DEFAULT_WINDOW, HistoryBuffer};
pub use registry::{ANONYMOUS, ConnectionRegistry, ConnectionState, SessionId};
pub use relay::{LogLevel, RelayAction, RelayConfig, RelayDriver, RelayEvent};
use sotto_proto::{Frame, FrameHeader, Payload};
use tokio::sync::{Mutex, mpsc};
pub use transport::{QuicConnection, QuicTransport};

/// Capacity of each per-connection outbound queue.
///
/// When a consumer falls this far behind, further frames for it are dropped
/// (delivery is best-effort and isolated per recipient).
const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Default eviction period (60 seconds).
pub const DEFAULT_EVICT_INTERVAL: Duration = Duration::from_secs(60);

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:4433").
    pub bind_address: String,
    /// Path to TLS certificate (PEM format).
    pub cert_path: Option<String>,
    /// Path to TLS private key (PEM format).
    pub key_path: Option<String>,
    /// Period of the history eviction task.
    pub evict_interval: Duration,
    /// Relay configuration (history window, connection limit).
    pub relay: RelayConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4433".to_string(),
            cert_path: None,
            key_path: None,
            evict_interval: DEFAULT_EVICT_INTERVAL,
            relay: RelayConfig::default(),
        }
    }
}

/// Relay state shared across connection tasks.
///
/// The driver and the outbound queue map live under ONE mutex: snapshot
/// delivery for a connecting session and live fan-out for everyone else
/// must observe the same consistent point in the total order, which only
/// holds if queue registration and event processing are atomic together.
struct Shared {
    /// The relay driver (registry + history).
    relay: RelayDriver<SystemEnv>,
    /// Per-session outbound queues, drained by writer tasks.
    outbound: HashMap<SessionId, mpsc::Sender<Frame>>,
}

/// Production sotto relay server.
///
/// Wraps [`RelayDriver`] with Quinn QUIC transport, per-connection writer
/// tasks, and the periodic eviction task.
pub struct Server {
    /// Relay state shared across tasks.
    shared: Arc<Mutex<Shared>>,
    /// QUIC endpoint.
    transport: QuicTransport,
    /// Environment (time, RNG).
    env: SystemEnv,
    /// Eviction task period.
    evict_interval: Duration,
}

impl Server {
    /// Create and bind a new server.
    pub fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let env = SystemEnv::new();
        let relay = RelayDriver::new(env, config.relay);

        let transport =
            QuicTransport::bind(&config.bind_address, config.cert_path, config.key_path)?;

        Ok(Self {
            shared: Arc::new(Mutex::new(Shared { relay, outbound: HashMap::new() })),
            transport,
            env,
            evict_interval: config.evict_interval,
        })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Run the server, accepting connections and relaying frames.
    ///
    /// Runs until the endpoint closes. The eviction task lives exactly as
    /// long as this call.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("relay listening on {}", self.transport.local_addr()?);

        let evictor = tokio::spawn(run_eviction(Arc::clone(&self.shared), self.evict_interval));

        while let Some(conn) = self.transport.accept().await {
            let shared = Arc::clone(&self.shared);
            let env = self.env;

            tokio::spawn(async move {
                if let Err(e) = handle_connection(conn, shared, env).await {
                    tracing::debug!("connection error: {e}");
                }
            });
        }

        evictor.abort();
        tracing::info!("relay endpoint closed, shutting down");

        Ok(())
    }
}

/// Periodic eviction task.
///
/// Shares the relay mutex with connection handling, so an eviction pass and
/// an append can never interleave.
async fn run_eviction(shared: Arc<Mutex<Shared>>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let mut state = shared.lock().await;
        match state.relay.process_event(RelayEvent::Tick) {
            Ok(actions) => execute_actions(&mut state, actions),
            Err(e) => tracing::error!("eviction tick failed: {e}"),
        }
    }
}

/// Handle a single QUIC connection for its whole lifetime.
async fn handle_connection(
    conn: QuicConnection,
    shared: Arc<Mutex<Shared>>,
    env: SystemEnv,
) -> Result<(), ServerError> {
    let session_id = {
        let mut buf = [0u8; 8];
        env.random_bytes(&mut buf);
        SessionId::from_le_bytes(buf)
    };

    tracing::debug!("new connection from {} as session {session_id}", conn.remote_addr());

    // All outbound traffic for this connection goes through one ordered
    // unidirectional stream, drained from the session's queue by a writer
    // task. Opening it before processing the connect event means even a
    // client that never sends anything receives its history snapshot.
    let outbound_stream = conn.open_uni().await?;

    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
    tokio::spawn(run_writer(session_id, outbound_stream, outbound_rx));

    {
        let mut state = shared.lock().await;
        state.outbound.insert(session_id, outbound_tx);

        let actions = match state.relay.process_event(RelayEvent::Connected { session_id }) {
            Ok(actions) => actions,
            Err(e) => {
                state.outbound.remove(&session_id);
                return Err(e);
            },
        };
        execute_actions(&mut state, actions);

        if !state.relay.is_connected(session_id) {
            // Rejected (connection limit); the CloseSession action already
            // dropped the outbound queue.
            drop(state);
            conn.close(1u32.into(), b"max connections exceeded");
            return Ok(());
        }
    }

    // The client sends all of its events on a single bidirectional stream;
    // we read from its receive half (the other half stays unused).
    let result = match conn.accept_bi().await {
        Ok((client_send, recv)) => {
            drop(client_send);
            read_frames(session_id, recv, &shared).await
        },
        Err(e) => {
            tracing::debug!("session {session_id} closed before opening a stream: {e}");
            Ok(())
        },
    };

    {
        let mut state = shared.lock().await;
        state.outbound.remove(&session_id);

        let actions = state.relay.process_event(RelayEvent::Disconnected { session_id })?;
        execute_actions(&mut state, actions);
    }

    result
}

/// Read frames from the session stream until it closes.
async fn read_frames(
    session_id: SessionId,
    mut recv: quinn::RecvStream,
    shared: &Arc<Mutex<Shared>>,
) -> Result<(), ServerError> {
    let mut buf = BytesMut::with_capacity(4096);

    loop {
        buf.clear();
        buf.resize(FrameHeader::SIZE, 0);

        if recv.read_exact(&mut buf[..FrameHeader::SIZE]).await.is_err() {
            // Stream finished or connection lost: normal disconnect.
            break;
        }

        let payload_size = match FrameHeader::from_bytes(&buf[..FrameHeader::SIZE]) {
            Ok(header) => header.payload_size() as usize,
            Err(e) => {
                // Framing is lost; the connection cannot be resynchronized.
                tracing::warn!("invalid frame header from session {session_id}: {e}");
                break;
            },
        };

        if payload_size > 0 {
            buf.resize(FrameHeader::SIZE + payload_size, 0);
            if let Err(e) = recv.read_exact(&mut buf[FrameHeader::SIZE..]).await {
                tracing::debug!("payload read failed for session {session_id}: {e}");
                break;
            }
        }

        let frame = match Frame::decode(&buf) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("frame decode failed for session {session_id}: {e}");
                break;
            },
        };

        let payload = match Payload::from_frame(&frame) {
            Ok(payload) => payload,
            Err(e) => {
                // Framing is intact, only this payload is bad: drop the
                // frame, keep the connection.
                tracing::warn!("undecodable payload from session {session_id}: {e}, dropped");
                continue;
            },
        };

        // Stamp + append + fan-out enqueue happen under one lock
        // acquisition: this is the serialized relay step.
        let mut state = shared.lock().await;
        match state.relay.process_event(RelayEvent::PayloadReceived { session_id, payload }) {
            Ok(actions) => execute_actions(&mut state, actions),
            Err(e) => tracing::warn!("relay rejected payload from session {session_id}: {e}"),
        }
    }

    Ok(())
}

/// Writer task: drain one session's outbound queue onto its stream.
///
/// Exits when the queue's sender is dropped (disconnect) or a write fails.
/// A write failure stops delivery to this recipient only; the relay and the
/// other connections are unaffected.
async fn run_writer(session_id: SessionId, mut send: quinn::SendStream, mut rx: mpsc::Receiver<Frame>) {
    let mut buf = Vec::with_capacity(4096);

    while let Some(frame) = rx.recv().await {
        buf.clear();
        if let Err(e) = frame.encode(&mut buf) {
            tracing::error!("outbound frame encode failed for session {session_id}: {e}");
            continue;
        }

        if let Err(e) = send.write_all(&buf).await {
            tracing::debug!("outbound write failed for session {session_id}: {e}");
            break;
        }
    }

    let _ = send.finish();
}

/// Execute relay actions against the shared runtime state.
///
/// Called while holding the relay mutex, so the enqueue order seen by every
/// per-connection queue matches the relay's processing order.
fn execute_actions(state: &mut Shared, actions: Vec<RelayAction>) {
    for action in actions {
        match action {
            RelayAction::SendToSession { session_id, frame } => {
                if let Some(tx) = state.outbound.get(&session_id) {
                    enqueue(session_id, tx, frame);
                } else {
                    tracing::debug!("no outbound queue for session {session_id}");
                }
            },

            RelayAction::Broadcast { frame } => {
                for (&session_id, tx) in &state.outbound {
                    enqueue(session_id, tx, frame.clone());
                }
            },

            RelayAction::CloseSession { session_id, reason } => {
                tracing::info!("closing session {session_id}: {reason}");
                state.outbound.remove(&session_id);
            },

            RelayAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{message}"),
                LogLevel::Info => tracing::info!("{message}"),
                LogLevel::Warn => tracing::warn!("{message}"),
                LogLevel::Error => tracing::error!("{message}"),
            },
        }
    }
}

/// Enqueue a frame on one session's outbound queue without blocking.
///
/// A full queue means the consumer is too slow: the frame is dropped for
/// that recipient only, never retried.
fn enqueue(session_id: SessionId, tx: &mpsc::Sender<Frame>, frame: Frame) {
    match tx.try_send(frame) {
        Ok(()) => {},
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!("outbound queue full for session {session_id}, dropping frame");
        },
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::debug!("outbound queue closed for session {session_id}");
        },
    }
}
