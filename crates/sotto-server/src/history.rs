//! Time-windowed buffer of recent encrypted messages.
//!
//! The buffer holds stamped envelopes in arrival order so a newly joined
//! peer can catch up on recent conversation. Envelopes are opaque: the
//! relay stores ciphertext it cannot read.
//!
//! # Invariants
//!
//! - Arrival order is chronological order: the relay stamps each envelope
//!   with the current time under a single serialized writer, so timestamps
//!   are non-decreasing from head to tail.
//! - After an eviction pass at time `now`, every retained envelope is
//!   within `window` of `now`. Eviction only trims the oldest prefix; it
//!   never reorders or introduces gaps.

use std::{collections::VecDeque, time::Duration};

use sotto_proto::payloads::StampedEnvelope;

/// Default retention window (10 minutes).
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(600);

/// Ordered, time-windowed store of stamped envelopes.
#[derive(Debug)]
pub struct HistoryBuffer {
    /// Retention window in milliseconds.
    window_ms: u64,
    /// Envelopes in arrival order (oldest at the head).
    messages: VecDeque<StampedEnvelope>,
}

impl HistoryBuffer {
    /// Create an empty buffer with the given retention window.
    pub fn new(window: Duration) -> Self {
        Self { window_ms: window.as_millis() as u64, messages: VecDeque::new() }
    }

    /// Append an envelope at the tail.
    ///
    /// The caller (the relay, as the single serialized writer) guarantees
    /// the stamp is not older than the current tail.
    pub fn append(&mut self, envelope: StampedEnvelope) {
        debug_assert!(
            self.messages.back().is_none_or(|tail| tail.timestamp_ms <= envelope.timestamp_ms),
            "appended envelope must not be older than the tail"
        );
        self.messages.push_back(envelope);
    }

    /// Drop envelopes older than the retention window.
    ///
    /// Removes from the head while the head's stamp is older than
    /// `now - window`; O(evicted) because the sequence is time-ordered.
    /// Returns the number of envelopes evicted.
    ///
    /// Runs on a fixed period independent of traffic, not on every append.
    pub fn evict(&mut self, now_ms: u64) -> usize {
        let cutoff_ms = now_ms.saturating_sub(self.window_ms);

        let mut evicted = 0;
        while self.messages.front().is_some_and(|head| head.timestamp_ms < cutoff_ms) {
            self.messages.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Current contents in arrival order, for delivery to a newly joined
    /// connection. Read-only; does not trigger eviction.
    pub fn snapshot(&self) -> Vec<StampedEnvelope> {
        self.messages.iter().cloned().collect()
    }

    /// Number of retained envelopes.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Stamp of the oldest retained envelope, if any.
    pub fn oldest_timestamp_ms(&self) -> Option<u64> {
        self.messages.front().map(|envelope| envelope.timestamp_ms)
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
