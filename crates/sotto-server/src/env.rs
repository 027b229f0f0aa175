//! Environment abstraction for time and randomness.
//!
//! The relay driver is pure logic; wall-clock time and randomness reach it
//! only through this trait. Production uses [`SystemEnv`]; tests substitute
//! a fixed clock to make stamping and eviction deterministic.

/// Source of wall-clock time and cryptographic randomness.
pub trait Environment: Clone + Send + 'static {
    /// Current wall-clock time in Unix milliseconds (UTC).
    fn wall_clock_ms(&self) -> u64;

    /// Fill a buffer with cryptographically secure random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);
}

/// Production environment using system time and the OS RNG.
///
/// # Panics
///
/// Panics if the OS RNG fails. This is intentional - a relay without
/// functioning cryptographic randomness cannot assign unpredictable session
/// IDs and should not run. RNG failure indicates OS-level issues and is
/// extremely rare.
#[derive(Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::expect_used)]
    fn wall_clock_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("invariant: system clock is after Unix epoch (1970-01-01)")
            .as_millis() as u64
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - relay cannot operate securely");
    }
}
