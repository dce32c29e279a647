//! Local identity keys.

use std::fmt;

use keyloom_crypto::primitives::{ed25519_public, x25519_public};
use zeroize::Zeroizing;

use crate::env::Environment;

/// Supplies the local user's long-term keys.
///
/// The agreement key bootstraps pairwise sessions addressed to us. The
/// signing key's public half identifies us as a group sender; group messages
/// themselves are signed by per-group sender keys, never by this key.
pub trait IdentityProvider: Send + Sync {
    /// Our contact id, as other members know us.
    fn contact_id(&self) -> &str;

    /// Long-term X25519 private key.
    fn agreement_private_key(&self) -> Zeroizing<[u8; 32]>;

    /// Long-term Ed25519 signing seed.
    fn signing_private_key(&self) -> Zeroizing<[u8; 32]>;

    /// Long-term X25519 public key.
    fn agreement_public_key(&self) -> [u8; 32] {
        x25519_public(&self.agreement_private_key())
    }

    /// Identity under which our group messages are filed by receivers.
    fn signing_public_key(&self) -> [u8; 32] {
        ed25519_public(&self.signing_private_key())
    }
}

/// Identity held in process memory.
pub struct LocalIdentity {
    contact_id: String,
    agreement_secret: Zeroizing<[u8; 32]>,
    signing_seed: Zeroizing<[u8; 32]>,
}

impl LocalIdentity {
    /// Fresh identity with keys drawn from `env`.
    pub fn generate(contact_id: impl Into<String>, env: &impl Environment) -> Self {
        Self::from_secrets(contact_id, env.random_array(), env.random_array())
    }

    /// Identity from existing key material.
    pub fn from_secrets(
        contact_id: impl Into<String>,
        agreement_secret: [u8; 32],
        signing_seed: [u8; 32],
    ) -> Self {
        Self {
            contact_id: contact_id.into(),
            agreement_secret: Zeroizing::new(agreement_secret),
            signing_seed: Zeroizing::new(signing_seed),
        }
    }
}

impl IdentityProvider for LocalIdentity {
    fn contact_id(&self) -> &str {
        &self.contact_id
    }

    fn agreement_private_key(&self) -> Zeroizing<[u8; 32]> {
        self.agreement_secret.clone()
    }

    fn signing_private_key(&self) -> Zeroizing<[u8; 32]> {
        self.signing_seed.clone()
    }
}

impl fmt::Debug for LocalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalIdentity").field("contact_id", &self.contact_id).finish_non_exhaustive()
    }
}
