//! Connection registry mapping live sessions to declared usernames.
//!
//! The registry is the single source of truth for which connections are
//! live and what name each one last declared. Names are self-declared and
//! unauthenticated: re-declaration overwrites, and two sessions may claim
//! the same name (preserved behavior, not corrected).
//!
//! All operations are total. `resolve` is consulted exactly once per
//! inbound message, at the moment the relay stamps it - the name frozen
//! into an envelope is unaffected by later `register`/`remove` calls.

use std::collections::HashMap;

/// Unique identifier for a live connection, assigned by the runtime.
pub type SessionId = u64;

/// Display name attached to messages from sessions that never declared one.
pub const ANONYMOUS: &str = "Anonymous";

/// Lifecycle state of a registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport is up, no username declared yet.
    Connected,
    /// A username has been declared.
    Named,
}

/// Registry of live connections and their declared usernames.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Session ID → declared username (`None` until declared).
    connections: HashMap<SessionId, Option<String>>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection in the unnamed state.
    ///
    /// Idempotent: connecting an already-known session leaves its declared
    /// name untouched.
    pub fn connect(&mut self, session_id: SessionId) {
        self.connections.entry(session_id).or_insert(None);
    }

    /// Associate a username with a session, overwriting any prior value.
    ///
    /// Total: registering an unknown session creates its entry, matching
    /// the declare-then-chat flow where the declaration is the first event
    /// a client sends.
    pub fn register(&mut self, session_id: SessionId, username: String) {
        self.connections.insert(session_id, Some(username));
    }

    /// The username a session declared, or [`ANONYMOUS`].
    ///
    /// Total: unknown sessions and sessions that never declared a name both
    /// resolve to the anonymous default.
    pub fn resolve(&self, session_id: SessionId) -> &str {
        self.connections
            .get(&session_id)
            .and_then(|name| name.as_deref())
            .unwrap_or(ANONYMOUS)
    }

    /// Delete a session's entry. Idempotent: removing an unknown session is
    /// a no-op.
    pub fn remove(&mut self, session_id: SessionId) {
        self.connections.remove(&session_id);
    }

    /// Lifecycle state of a session. `None` if the session is not
    /// registered.
    pub fn state(&self, session_id: SessionId) -> Option<ConnectionState> {
        self.connections.get(&session_id).map(|name| {
            if name.is_some() { ConnectionState::Named } else { ConnectionState::Connected }
        })
    }

    /// Whether a session is currently registered.
    pub fn contains(&self, session_id: SessionId) -> bool {
        self.connections.contains_key(&session_id)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the registry has no live connections.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// All live session IDs (arbitrary order).
    pub fn session_ids(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.connections.keys().copied()
    }
}
