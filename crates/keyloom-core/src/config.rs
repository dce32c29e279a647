//! Directory configuration.

use keyloom_crypto::SkipLimits;

/// Associated-data constant bound into every pairwise ciphertext unless
/// overridden. Both peers must use the same value.
pub const DEFAULT_ASSOCIATED_DATA: &[u8] = b"keyloom-pairwise-v1";

/// Settings shared by the session and group directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryConfig {
    /// Constant mixed into pairwise associated data. Fixed per session at
    /// bootstrap; changing it later only affects new sessions.
    pub associated_data: Vec<u8>,
    /// Skip-ahead cap and skipped-key retention for all receivers.
    pub skip_limits: SkipLimits,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self { associated_data: DEFAULT_ASSOCIATED_DATA.to_vec(), skip_limits: SkipLimits::default() }
    }
}

impl DirectoryConfig {
    /// Override the skip-ahead cap, keeping the retention window.
    #[must_use]
    pub fn with_max_skip(mut self, max_skip: u32) -> Self {
        self.skip_limits.max_skip = max_skip;
        self
    }
}
