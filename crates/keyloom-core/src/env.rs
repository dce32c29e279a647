//! Environment abstraction for deterministic testing.
//!
//! The directories draw every random seed and nonce through [`Environment`],
//! so tests can replay a conversation byte-for-byte from a fixed RNG seed
//! while production uses OS entropy.

/// Source of randomness for key generation and nonces.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Given the same seed, a test implementation yields the same byte sequence
pub trait Environment: Clone + Send + Sync + 'static {
    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Fixed-size random array, for seeds and nonces.
    fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.random_bytes(&mut bytes);
        bytes
    }
}

/// Production environment backed by the OS RNG.
///
/// # Panics
///
/// Panics if the OS RNG fails. A process without working entropy cannot
/// generate keys safely, so continuing is not an option.
#[derive(Debug, Clone, Copy, Default)]
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
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}
