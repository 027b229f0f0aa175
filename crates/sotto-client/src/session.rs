//! Sans-IO client session state machine.

use sotto_crypto::{NONCE_SIZE, SealedMessage, SymmetricKey, derive_key, open, seal};
use sotto_proto::{
    Frame, Payload,
    payloads::{Envelope, SetUsername, StampedEnvelope},
};

use crate::{error::SessionError, event::SessionOutput};

/// A client session bound to one username and one passphrase-derived key.
///
/// The key is derived once at construction (PBKDF2 is deliberately slow;
/// deriving per message would be wasteful) and lives exactly as long as the
/// session.
pub struct Session {
    /// Display name declared to the relay.
    username: String,
    /// Passphrase-derived key used for all sealing and opening.
    key: SymmetricKey,
}

impl Session {
    /// Create a session, deriving the key from the passphrase.
    pub fn new(username: impl Into<String>, passphrase: &str) -> Self {
        Self { username: username.into(), key: derive_key(passphrase) }
    }

    /// The username this session declares.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The username declaration to send immediately after connecting.
    pub fn hello(&self) -> Result<Frame, SessionError> {
        Payload::SetUsername(SetUsername { username: self.username.clone() })
            .into_frame()
            .map_err(SessionError::from)
    }

    /// Seal a plaintext into a message frame.
    ///
    /// Generates a fresh cryptographically random 96-bit nonce for every
    /// call; nonce reuse under the shared key would break confidentiality
    /// and integrity for both affected messages.
    pub fn compose(&self, plaintext: &str) -> Result<Frame, SessionError> {
        let mut nonce = [0u8; NONCE_SIZE];
        // INVARIANT: OS RNG failure is unrecoverable - sending with a
        // predictable nonce would be worse than not sending at all.
        #[allow(clippy::expect_used)]
        getrandom::fill(&mut nonce).expect("invariant: OS RNG must be available");

        let sealed = seal(plaintext.as_bytes(), &self.key, nonce);

        Payload::Message(Envelope { nonce: sealed.nonce, ciphertext: sealed.ciphertext })
            .into_frame()
            .map_err(SessionError::from)
    }

    /// Process a frame received from the relay.
    ///
    /// A history snapshot yields one output per envelope in arrival order; a
    /// broadcast yields one. Envelopes are opened independently: a failed
    /// authentication becomes [`SessionOutput::Undecryptable`] and never
    /// aborts the replay of the remaining entries.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Protocol`] if the frame does not decode
    /// - [`SessionError::UnexpectedOpcode`] for client-to-server opcodes,
    ///   which a well-behaved relay never sends
    pub fn accept(&self, frame: &Frame) -> Result<Vec<SessionOutput>, SessionError> {
        match Payload::from_frame(frame)? {
            Payload::History(history) => {
                Ok(history.messages.into_iter().map(|entry| self.open_entry(entry)).collect())
            },
            Payload::Broadcast(entry) => Ok(vec![self.open_entry(entry)]),
            other @ (Payload::SetUsername(_) | Payload::Message(_)) => {
                Err(SessionError::UnexpectedOpcode(other.opcode()))
            },
        }
    }

    /// Open one stamped envelope into a displayable output.
    fn open_entry(&self, entry: StampedEnvelope) -> SessionOutput {
        let sealed = SealedMessage { nonce: entry.nonce, ciphertext: entry.ciphertext };

        match open(&sealed, &self.key) {
            Ok(plaintext) => match String::from_utf8(plaintext) {
                Ok(text) => SessionOutput::Message {
                    from_user: entry.from_user,
                    text,
                    timestamp_ms: entry.timestamp_ms,
                },
                // Authenticated but not text: a peer speaking a different
                // plaintext convention. Treated the same as undecryptable.
                Err(_) => SessionOutput::Undecryptable {
                    from_user: entry.from_user,
                    timestamp_ms: entry.timestamp_ms,
                },
            },
            Err(_) => SessionOutput::Undecryptable {
                from_user: entry.from_user,
                timestamp_ms: entry.timestamp_ms,
            },
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The key redacts itself; keep the username visible.
        f.debug_struct("Session").field("username", &self.username).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use sotto_proto::payloads::History;

    use super::*;

    /// Build a Broadcast frame the way the relay would: seal under the
    /// given passphrase, stamp with name and time.
    fn broadcast_from(passphrase: &str, from_user: &str, text: &str, timestamp_ms: u64) -> Frame {
        let key = derive_key(passphrase);
        let sealed = seal(text.as_bytes(), &key, [0x5A; NONCE_SIZE]);

        Payload::Broadcast(StampedEnvelope {
            nonce: sealed.nonce,
            ciphertext: sealed.ciphertext,
            from_user: from_user.to_string(),
            timestamp_ms,
        })
        .into_frame()
        .unwrap()
    }

    #[test]
    fn hello_declares_the_username() {
        let session = Session::new("alice", "secret123");
        let frame = session.hello().unwrap();

        match Payload::from_frame(&frame).unwrap() {
            Payload::SetUsername(declare) => assert_eq!(declare.username, "alice"),
            other => panic!("expected SetUsername, got {other:?}"),
        }
    }

    #[test]
    fn compose_produces_an_opaque_message_frame() {
        let session = Session::new("alice", "secret123");
        let frame = session.compose("hi").unwrap();

        match Payload::from_frame(&frame).unwrap() {
            Payload::Message(envelope) => {
                assert_ne!(envelope.ciphertext, b"hi".to_vec());
                assert_eq!(envelope.ciphertext.len(), 2 + 16); // plaintext + tag
            },
            other => panic!("expected Message, got {other:?}"),
        }
    }

    #[test]
    fn compose_uses_a_fresh_nonce_every_call() {
        let session = Session::new("alice", "secret123");

        let nonce_of = |frame: &Frame| match Payload::from_frame(frame).unwrap() {
            Payload::Message(envelope) => envelope.nonce,
            other => panic!("expected Message, got {other:?}"),
        };

        let first = nonce_of(&session.compose("same text").unwrap());
        let second = nonce_of(&session.compose("same text").unwrap());

        assert_ne!(first, second, "nonce must be fresh per message");
    }

    #[test]
    fn two_sessions_from_the_same_passphrase_interoperate() {
        let alice = Session::new("alice", "secret123");
        let bob = Session::new("bob", "secret123");

        // Relay a composed message back as a broadcast.
        let frame = alice.compose("hi bob").unwrap();
        let envelope = match Payload::from_frame(&frame).unwrap() {
            Payload::Message(envelope) => envelope,
            other => panic!("expected Message, got {other:?}"),
        };
        let broadcast = Payload::Broadcast(StampedEnvelope {
            nonce: envelope.nonce,
            ciphertext: envelope.ciphertext,
            from_user: "alice".to_string(),
            timestamp_ms: 42,
        })
        .into_frame()
        .unwrap();

        let outputs = bob.accept(&broadcast).unwrap();
        assert_eq!(
            outputs,
            vec![SessionOutput::Message {
                from_user: "alice".to_string(),
                text: "hi bob".to_string(),
                timestamp_ms: 42,
            }]
        );
    }

    #[test]
    fn wrong_passphrase_yields_undecryptable() {
        let session = Session::new("carol", "other");
        let frame = broadcast_from("secret123", "alice", "hi", 7);

        let outputs = session.accept(&frame).unwrap();
        assert_eq!(
            outputs,
            vec![SessionOutput::Undecryptable { from_user: "alice".to_string(), timestamp_ms: 7 }]
        );
    }

    #[test]
    fn history_replay_isolates_failures_per_envelope() {
        let session = Session::new("bob", "secret123");
        let key = derive_key("secret123");
        let foreign_key = derive_key("other");

        let entry = |sealed: SealedMessage, from_user: &str, timestamp_ms| StampedEnvelope {
            nonce: sealed.nonce,
            ciphertext: sealed.ciphertext,
            from_user: from_user.to_string(),
            timestamp_ms,
        };

        // Good, foreign-key, tampered, good again.
        let mut tampered = seal(b"tampered", &key, [3; NONCE_SIZE]);
        tampered.ciphertext[0] ^= 0xFF;

        let frame = Payload::History(History {
            messages: vec![
                entry(seal(b"first", &key, [1; NONCE_SIZE]), "alice", 1),
                entry(seal(b"hidden", &foreign_key, [2; NONCE_SIZE]), "eve", 2),
                entry(tampered, "mallory", 3),
                entry(seal(b"last", &key, [4; NONCE_SIZE]), "alice", 4),
            ],
        })
        .into_frame()
        .unwrap();

        let outputs = session.accept(&frame).unwrap();
        assert_eq!(
            outputs,
            vec![
                SessionOutput::Message {
                    from_user: "alice".to_string(),
                    text: "first".to_string(),
                    timestamp_ms: 1,
                },
                SessionOutput::Undecryptable { from_user: "eve".to_string(), timestamp_ms: 2 },
                SessionOutput::Undecryptable { from_user: "mallory".to_string(), timestamp_ms: 3 },
                SessionOutput::Message {
                    from_user: "alice".to_string(),
                    text: "last".to_string(),
                    timestamp_ms: 4,
                },
            ]
        );
    }

    #[test]
    fn empty_history_yields_no_outputs() {
        let session = Session::new("bob", "secret123");
        let frame = Payload::History(History { messages: Vec::new() }).into_frame().unwrap();

        assert_eq!(session.accept(&frame).unwrap(), Vec::new());
    }

    #[test]
    fn history_outputs_preserve_arrival_order() {
        let session = Session::new("bob", "secret123");
        let key = derive_key("secret123");

        let messages = (0..5u64)
            .map(|i| {
                let sealed = seal(format!("m{i}").as_bytes(), &key, [i as u8; NONCE_SIZE]);
                StampedEnvelope {
                    nonce: sealed.nonce,
                    ciphertext: sealed.ciphertext,
                    from_user: "alice".to_string(),
                    timestamp_ms: i,
                }
            })
            .collect();

        let frame = Payload::History(History { messages }).into_frame().unwrap();
        let outputs = session.accept(&frame).unwrap();

        let texts: Vec<String> = outputs
            .into_iter()
            .map(|output| match output {
                SessionOutput::Message { text, .. } => text,
                SessionOutput::Undecryptable { .. } => panic!("all entries must decrypt"),
            })
            .collect();
        assert_eq!(texts, vec!["m0", "m1", "m2", "m3", "m4"]);
    }

    #[test]
    fn authenticated_non_utf8_plaintext_is_undecryptable() {
        let session = Session::new("bob", "secret123");
        let key = derive_key("secret123");

        let sealed = seal(&[0xFF, 0xFE, 0x80], &key, [9; NONCE_SIZE]);
        let frame = Payload::Broadcast(StampedEnvelope {
            nonce: sealed.nonce,
            ciphertext: sealed.ciphertext,
            from_user: "alice".to_string(),
            timestamp_ms: 9,
        })
        .into_frame()
        .unwrap();

        let outputs = session.accept(&frame).unwrap();
        assert!(matches!(outputs[0], SessionOutput::Undecryptable { .. }));
    }

    #[test]
    fn client_to_server_opcodes_are_rejected() {
        let session = Session::new("bob", "secret123");

        let frame = Payload::SetUsername(SetUsername { username: "alice".to_string() })
            .into_frame()
            .unwrap();

        let result = session.accept(&frame);
        assert!(matches!(result, Err(SessionError::UnexpectedOpcode(_))));
    }

    #[test]
    fn debug_does_not_leak_key_material() {
        let session = Session::new("alice", "secret123");
        let debug = format!("{session:?}");

        assert!(debug.contains("alice"));
        assert!(!debug.contains("secret123"));
    }
}
