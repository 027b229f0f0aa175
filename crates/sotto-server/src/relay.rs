//! Broadcast relay driver.
//!
//! Ties together the connection registry and the history buffer behind a
//! single event entry point. The driver follows the action pattern: the
//! runtime feeds it transport events and executes the actions it returns.
//! No I/O happens here, which keeps the ordering and windowing invariants
//! testable without a network.
//!
//! # State Machine (per connection)
//!
//! ```text
//! ┌───────────┐  SetUsername  ┌────────┐
//! │ Connected │──────────────>│ Named  │──┐ SetUsername (overwrite)
//! └───────────┘               └────────┘<─┘
//!       │                          │
//!       │ Disconnected             │ Disconnected
//!       ↓                          ↓
//! ┌──────────────┐          ┌──────────────┐
//! │ Disconnected │          │ Disconnected │
//! └──────────────┘          └──────────────┘
//! ```
//!
//! Messages are accepted in either live state; a payload from a session the
//! driver does not know is rejected with a warning and no state change.
//!
//! # Ordering
//!
//! `process_event` is the single serialized step: for an inbound message it
//! resolves the sender name, stamps the envelope, appends to history, and
//! emits the broadcast as one unit. Every connection therefore observes
//! messages in exactly the order the relay processed them, and that order
//! is history order. The runtime must call `process_event` under one lock
//! (see `Server::run`) for this to hold.

use std::time::Duration;

use sotto_proto::{
    Frame, Payload,
    payloads::{History, StampedEnvelope},
};

use crate::{
    env::Environment,
    error::ServerError,
    history::{DEFAULT_WINDOW, HistoryBuffer},
    registry::{ConnectionRegistry, SessionId},
};

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// History retention window.
    pub history_window: Duration,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { history_window: DEFAULT_WINDOW, max_connections: 10_000 }
    }
}

/// Events the relay driver processes.
///
/// Produced by the runtime from transport callbacks and the eviction timer.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A new connection was accepted.
    Connected {
        /// Unique connection ID assigned by the runtime.
        session_id: SessionId,
    },

    /// A payload was received from a connection.
    PayloadReceived {
        /// Connection that sent the payload.
        session_id: SessionId,
        /// The decoded payload.
        payload: Payload,
    },

    /// A connection was closed (by peer or error).
    Disconnected {
        /// Connection that was closed.
        session_id: SessionId,
    },

    /// Periodic tick driving history eviction.
    Tick,
}

/// Actions the relay driver produces.
///
/// Executed by runtime-specific code; the driver never performs I/O itself.
#[derive(Debug, Clone)]
pub enum RelayAction {
    /// Send a frame to one specific session.
    SendToSession {
        /// Target session ID.
        session_id: SessionId,
        /// Frame to send.
        frame: Frame,
    },

    /// Send a frame to every live connection, including the message's
    /// sender.
    Broadcast {
        /// Frame to broadcast.
        frame: Frame,
    },

    /// Close a connection.
    CloseSession {
        /// Session to close.
        session_id: SessionId,
        /// Reason for closure.
        reason: String,
    },

    /// Log a message.
    Log {
        /// Log level.
        level: LogLevel,
        /// Message to log.
        message: String,
    },
}

/// Log levels for relay actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational message.
    Info,
    /// Warning.
    Warn,
    /// Error.
    Error,
}

/// Action-based broadcast relay.
///
/// Owns the two shared resources - registry and history - and is their only
/// writer. Connection-handling code never touches them directly.
pub struct RelayDriver<E: Environment> {
    /// Live connections and their declared usernames.
    registry: ConnectionRegistry,
    /// Windowed buffer of recent stamped envelopes.
    history: HistoryBuffer,
    /// Time source for stamping and eviction.
    env: E,
    /// Relay configuration.
    config: RelayConfig,
}

impl<E: Environment> RelayDriver<E> {
    /// Create a new relay driver.
    pub fn new(env: E, config: RelayConfig) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            history: HistoryBuffer::new(config.history_window),
            env,
            config,
        }
    }

    /// Process a relay event and return actions to execute.
    ///
    /// This is the single entry point for all state mutation.
    pub fn process_event(&mut self, event: RelayEvent) -> Result<Vec<RelayAction>, ServerError> {
        match event {
            RelayEvent::Connected { session_id } => self.handle_connected(session_id),
            RelayEvent::PayloadReceived { session_id, payload } => {
                self.handle_payload(session_id, payload)
            },
            RelayEvent::Disconnected { session_id } => Ok(self.handle_disconnected(session_id)),
            RelayEvent::Tick => Ok(self.handle_tick()),
        }
    }

    /// Whether a session is currently registered.
    pub fn is_connected(&self, session_id: SessionId) -> bool {
        self.registry.contains(session_id)
    }

    /// The registry, for inspection in tests and telemetry.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// The history buffer, for inspection in tests and telemetry.
    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    /// Handle a newly accepted connection: register it and deliver the
    /// history snapshot to it (and only it).
    fn handle_connected(&mut self, session_id: SessionId) -> Result<Vec<RelayAction>, ServerError> {
        if self.registry.len() >= self.config.max_connections {
            return Ok(vec![
                RelayAction::CloseSession {
                    session_id,
                    reason: "max connections exceeded".to_string(),
                },
                RelayAction::Log {
                    level: LogLevel::Warn,
                    message: format!(
                        "rejecting session {session_id}: {} connections at limit",
                        self.registry.len()
                    ),
                },
            ]);
        }

        self.registry.connect(session_id);

        // The snapshot is taken inside the same serialized step that
        // registers the connection, so it reflects a consistent point in
        // the total order: nothing broadcast after this event is missing
        // from it, nothing in it will be re-broadcast to this session.
        let snapshot = self.history.snapshot();
        let snapshot_len = snapshot.len();
        let frame = Payload::History(History { messages: snapshot }).into_frame()?;

        Ok(vec![
            RelayAction::SendToSession { session_id, frame },
            RelayAction::Log {
                level: LogLevel::Debug,
                message: format!(
                    "session {session_id} connected, sent {snapshot_len} history entries"
                ),
            },
        ])
    }

    /// Handle a payload received from a connection.
    fn handle_payload(
        &mut self,
        session_id: SessionId,
        payload: Payload,
    ) -> Result<Vec<RelayAction>, ServerError> {
        if !self.registry.contains(session_id) {
            // Payload before connect (or after disconnect): explicitly
            // rejected, no state change.
            return Ok(vec![RelayAction::Log {
                level: LogLevel::Warn,
                message: format!("payload from unknown session {session_id}, dropped"),
            }]);
        }

        match payload {
            Payload::SetUsername(declare) => {
                let message =
                    format!("session {session_id} set username: {:?}", declare.username);
                self.registry.register(session_id, declare.username);

                // No broadcast: a name declaration has no observable effect
                // on other connections.
                Ok(vec![RelayAction::Log { level: LogLevel::Debug, message }])
            },

            Payload::Message(envelope) => {
                // Stamp, append, broadcast - one serialized step. The name
                // is resolved exactly once, here; later register/remove
                // calls do not touch envelopes already stamped.
                let stamped = StampedEnvelope {
                    nonce: envelope.nonce,
                    ciphertext: envelope.ciphertext,
                    from_user: self.registry.resolve(session_id).to_string(),
                    timestamp_ms: self.env.wall_clock_ms(),
                };

                let frame = Payload::Broadcast(stamped.clone()).into_frame()?;
                self.history.append(stamped);

                Ok(vec![RelayAction::Broadcast { frame }])
            },

            Payload::History(_) | Payload::Broadcast(_) => {
                // Server-to-client opcodes arriving inbound: protocol
                // misuse, rejected without state change.
                Ok(vec![RelayAction::Log {
                    level: LogLevel::Warn,
                    message: format!(
                        "session {session_id} sent a server-only payload, dropped"
                    ),
                }])
            },
        }
    }

    /// Handle a closed connection: registry cleanup only. Not an error.
    fn handle_disconnected(&mut self, session_id: SessionId) -> Vec<RelayAction> {
        self.registry.remove(session_id);

        vec![RelayAction::Log {
            level: LogLevel::Debug,
            message: format!("session {session_id} disconnected"),
        }]
    }

    /// Handle an eviction tick.
    fn handle_tick(&mut self) -> Vec<RelayAction> {
        let evicted = self.history.evict(self.env.wall_clock_ms());

        if evicted == 0 {
            Vec::new()
        } else {
            vec![RelayAction::Log {
                level: LogLevel::Debug,
                message: format!("evicted {evicted} stale history entries"),
            }]
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    };

    use sotto_proto::payloads::{Envelope, SetUsername};

    use super::*;

    /// Test environment with a manually advanced clock.
    #[derive(Clone, Default)]
    struct FixedClock {
        now_ms: Arc<AtomicU64>,
    }

    impl FixedClock {
        fn at(now_ms: u64) -> Self {
            Self { now_ms: Arc::new(AtomicU64::new(now_ms)) }
        }

        fn advance(&self, delta_ms: u64) {
            self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
        }
    }

    impl Environment for FixedClock {
        fn wall_clock_ms(&self) -> u64 {
            self.now_ms.load(Ordering::SeqCst)
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(0x42);
        }
    }

    fn driver_at(now_ms: u64) -> (RelayDriver<FixedClock>, FixedClock) {
        let clock = FixedClock::at(now_ms);
        (RelayDriver::new(clock.clone(), RelayConfig::default()), clock)
    }

    fn message_payload(fill: u8) -> Payload {
        Payload::Message(Envelope { nonce: [fill; 12], ciphertext: vec![fill; 32] })
    }

    fn username_payload(name: &str) -> Payload {
        Payload::SetUsername(SetUsername { username: name.to_string() })
    }

    /// Extract the broadcast envelope from a single-action result.
    fn broadcast_envelope(actions: &[RelayAction]) -> StampedEnvelope {
        let frame = actions
            .iter()
            .find_map(|action| match action {
                RelayAction::Broadcast { frame } => Some(frame.clone()),
                _ => None,
            })
            .expect("expected a Broadcast action");

        match Payload::from_frame(&frame).unwrap() {
            Payload::Broadcast(stamped) => stamped,
            other => panic!("expected Broadcast payload, got {other:?}"),
        }
    }

    #[test]
    fn connect_sends_history_snapshot_to_that_session_only() {
        let (mut driver, _) = driver_at(1_000);

        let actions = driver.process_event(RelayEvent::Connected { session_id: 1 }).unwrap();

        let sends: Vec<_> = actions
            .iter()
            .filter(|a| matches!(a, RelayAction::SendToSession { .. }))
            .collect();
        assert_eq!(sends.len(), 1);
        assert!(!actions.iter().any(|a| matches!(a, RelayAction::Broadcast { .. })));

        match &sends[0] {
            RelayAction::SendToSession { session_id, frame } => {
                assert_eq!(*session_id, 1);
                match Payload::from_frame(frame).unwrap() {
                    Payload::History(history) => assert!(history.messages.is_empty()),
                    other => panic!("expected History payload, got {other:?}"),
                }
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn message_is_stamped_with_resolved_name_and_clock() {
        let (mut driver, _) = driver_at(5_000);

        driver.process_event(RelayEvent::Connected { session_id: 1 }).unwrap();
        driver
            .process_event(RelayEvent::PayloadReceived {
                session_id: 1,
                payload: username_payload("alice"),
            })
            .unwrap();

        let actions = driver
            .process_event(RelayEvent::PayloadReceived {
                session_id: 1,
                payload: message_payload(0x01),
            })
            .unwrap();

        let stamped = broadcast_envelope(&actions);
        assert_eq!(stamped.from_user, "alice");
        assert_eq!(stamped.timestamp_ms, 5_000);
        assert_eq!(stamped.nonce, [0x01; 12]);

        // The same envelope is in history.
        assert_eq!(driver.history().len(), 1);
        assert_eq!(driver.history().snapshot()[0], stamped);
    }

    #[test]
    fn unnamed_sender_is_stamped_anonymous() {
        let (mut driver, _) = driver_at(1_000);

        driver.process_event(RelayEvent::Connected { session_id: 7 }).unwrap();
        let actions = driver
            .process_event(RelayEvent::PayloadReceived {
                session_id: 7,
                payload: message_payload(0x02),
            })
            .unwrap();

        assert_eq!(broadcast_envelope(&actions).from_user, "Anonymous");
    }

    #[test]
    fn set_username_has_no_broadcast_side_effect() {
        let (mut driver, _) = driver_at(1_000);

        driver.process_event(RelayEvent::Connected { session_id: 1 }).unwrap();
        let actions = driver
            .process_event(RelayEvent::PayloadReceived {
                session_id: 1,
                payload: username_payload("alice"),
            })
            .unwrap();

        assert!(actions.iter().all(|a| matches!(a, RelayAction::Log { .. })));
    }

    #[test]
    fn broadcast_order_matches_history_order() {
        let (mut driver, clock) = driver_at(1_000);

        driver.process_event(RelayEvent::Connected { session_id: 1 }).unwrap();
        driver.process_event(RelayEvent::Connected { session_id: 2 }).unwrap();

        let mut broadcast_stamps = Vec::new();
        for fill in 0..5u8 {
            let session_id = SessionId::from(fill % 2) + 1;
            let actions = driver
                .process_event(RelayEvent::PayloadReceived {
                    session_id,
                    payload: message_payload(fill),
                })
                .unwrap();
            broadcast_stamps.push(broadcast_envelope(&actions));
            clock.advance(10);
        }

        // Order preservation: broadcast order is exactly history order.
        assert_eq!(driver.history().snapshot(), broadcast_stamps);
    }

    #[test]
    fn new_joiner_snapshot_excludes_nothing_and_repeats_nothing() {
        let (mut driver, clock) = driver_at(1_000);

        driver.process_event(RelayEvent::Connected { session_id: 1 }).unwrap();
        for fill in 0..3u8 {
            driver
                .process_event(RelayEvent::PayloadReceived {
                    session_id: 1,
                    payload: message_payload(fill),
                })
                .unwrap();
            clock.advance(1);
        }

        // New joiner gets exactly the three prior messages in its snapshot.
        let actions = driver.process_event(RelayEvent::Connected { session_id: 2 }).unwrap();
        let snapshot = actions
            .iter()
            .find_map(|action| match action {
                RelayAction::SendToSession { session_id: 2, frame } => {
                    match Payload::from_frame(frame).unwrap() {
                        Payload::History(history) => Some(history.messages),
                        _ => None,
                    }
                },
                _ => None,
            })
            .expect("history snapshot for session 2");
        assert_eq!(snapshot.len(), 3);

        // A message processed after the connect event is broadcast but is
        // not in the snapshot: no loss, no duplication.
        let actions = driver
            .process_event(RelayEvent::PayloadReceived {
                session_id: 1,
                payload: message_payload(9),
            })
            .unwrap();
        let live = broadcast_envelope(&actions);
        assert!(!snapshot.contains(&live));
    }

    #[test]
    fn disconnect_does_not_alter_stamped_history() {
        let (mut driver, _) = driver_at(1_000);

        driver.process_event(RelayEvent::Connected { session_id: 1 }).unwrap();
        driver
            .process_event(RelayEvent::PayloadReceived {
                session_id: 1,
                payload: username_payload("alice"),
            })
            .unwrap();
        driver
            .process_event(RelayEvent::PayloadReceived {
                session_id: 1,
                payload: message_payload(0x05),
            })
            .unwrap();

        driver.process_event(RelayEvent::Disconnected { session_id: 1 }).unwrap();

        // Registry independence from history: the frozen name survives the
        // registry entry.
        assert!(!driver.is_connected(1));
        assert_eq!(driver.history().snapshot()[0].from_user, "alice");
    }

    #[test]
    fn renaming_does_not_alter_stamped_history() {
        let (mut driver, _) = driver_at(1_000);

        driver.process_event(RelayEvent::Connected { session_id: 1 }).unwrap();
        driver
            .process_event(RelayEvent::PayloadReceived {
                session_id: 1,
                payload: username_payload("alice"),
            })
            .unwrap();
        driver
            .process_event(RelayEvent::PayloadReceived {
                session_id: 1,
                payload: message_payload(0x05),
            })
            .unwrap();
        driver
            .process_event(RelayEvent::PayloadReceived {
                session_id: 1,
                payload: username_payload("mallory"),
            })
            .unwrap();

        let actions = driver
            .process_event(RelayEvent::PayloadReceived {
                session_id: 1,
                payload: message_payload(0x06),
            })
            .unwrap();

        let snapshot = driver.history().snapshot();
        assert_eq!(snapshot[0].from_user, "alice");
        assert_eq!(broadcast_envelope(&actions).from_user, "mallory");
        assert_eq!(snapshot[1].from_user, "mallory");
    }

    #[test]
    fn payload_from_unknown_session_is_rejected() {
        let (mut driver, _) = driver_at(1_000);

        let actions = driver
            .process_event(RelayEvent::PayloadReceived {
                session_id: 99,
                payload: message_payload(0x01),
            })
            .unwrap();

        assert!(actions.iter().any(
            |a| matches!(a, RelayAction::Log { level: LogLevel::Warn, .. })
        ));
        assert!(!actions.iter().any(|a| matches!(a, RelayAction::Broadcast { .. })));
        assert!(driver.history().is_empty());
    }

    #[test]
    fn server_only_payload_from_client_is_rejected() {
        let (mut driver, _) = driver_at(1_000);

        driver.process_event(RelayEvent::Connected { session_id: 1 }).unwrap();
        let actions = driver
            .process_event(RelayEvent::PayloadReceived {
                session_id: 1,
                payload: Payload::History(History { messages: Vec::new() }),
            })
            .unwrap();

        assert!(!actions.iter().any(|a| matches!(a, RelayAction::Broadcast { .. })));
        assert!(driver.history().is_empty());
    }

    #[test]
    fn tick_evicts_only_stale_entries() {
        let (mut driver, clock) = driver_at(1_000);

        driver.process_event(RelayEvent::Connected { session_id: 1 }).unwrap();
        driver
            .process_event(RelayEvent::PayloadReceived {
                session_id: 1,
                payload: message_payload(0x01),
            })
            .unwrap();

        // Advance past the 10-minute window and append a fresh message.
        clock.advance(11 * 60 * 1000);
        driver
            .process_event(RelayEvent::PayloadReceived {
                session_id: 1,
                payload: message_payload(0x02),
            })
            .unwrap();

        driver.process_event(RelayEvent::Tick).unwrap();

        let snapshot = driver.history().snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].nonce, [0x02; 12]);
    }

    #[test]
    fn eviction_does_not_affect_connections() {
        let (mut driver, clock) = driver_at(1_000);

        driver.process_event(RelayEvent::Connected { session_id: 1 }).unwrap();
        clock.advance(60 * 60 * 1000);
        driver.process_event(RelayEvent::Tick).unwrap();

        assert!(driver.is_connected(1));
    }

    #[test]
    fn max_connections_guard_closes_excess_sessions() {
        let clock = FixedClock::at(1_000);
        let config = RelayConfig { max_connections: 2, ..RelayConfig::default() };
        let mut driver = RelayDriver::new(clock, config);

        driver.process_event(RelayEvent::Connected { session_id: 1 }).unwrap();
        driver.process_event(RelayEvent::Connected { session_id: 2 }).unwrap();
        let actions = driver.process_event(RelayEvent::Connected { session_id: 3 }).unwrap();

        assert!(actions
            .iter()
            .any(|a| matches!(a, RelayAction::CloseSession { session_id: 3, .. })));
        assert!(!driver.is_connected(3));
        assert_eq!(driver.registry().len(), 2);
    }

    #[test]
    fn disconnect_of_unknown_session_is_harmless() {
        let (mut driver, _) = driver_at(1_000);

        let actions =
            driver.process_event(RelayEvent::Disconnected { session_id: 404 }).unwrap();
        assert!(actions.iter().all(|a| matches!(a, RelayAction::Log { .. })));
    }
}
