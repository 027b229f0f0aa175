//! Outputs the session produces for the caller to display.

/// One displayable result of processing a server frame.
///
/// A history snapshot yields one output per retained envelope, in arrival
/// order; a live broadcast yields exactly one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutput {
    /// A successfully decrypted message.
    Message {
        /// Sender's display name as stamped by the relay.
        from_user: String,
        /// Decrypted plaintext.
        text: String,
        /// Relay stamp in Unix milliseconds.
        timestamp_ms: u64,
    },

    /// An envelope this session's key could not open.
    ///
    /// Wrong passphrase (ours or the sender's) or a tampered envelope - the
    /// cases are indistinguishable. The message is simply absent from this
    /// client's view; the relay is never told.
    Undecryptable {
        /// Sender's display name as stamped by the relay.
        from_user: String,
        /// Relay stamp in Unix milliseconds.
        timestamp_ms: u64,
    },
}
