//! Keyloom session and sender-key directories.
//!
//! Stateful layer over `keyloom-crypto`. Where the crypto crate works on one
//! session object at a time and takes its randomness as arguments, this crate
//! owns the objects: it loads them from [`Storage`], serializes access per
//! contact and per (group, sender), draws randomness from an
//! [`Environment`], and persists every mutation before returning.
//!
//! # Components
//!
//! - [`SessionDirectory`]: pairwise sessions keyed by contact id
//! - [`GroupKeyDirectory`]: our sender key per group, plus a receiver per
//!   remote sender, distributed over pairwise sessions
//! - [`IdentityProvider`] / [`ContactDirectory`]: collaborators supplied by
//!   the application
//! - [`Storage`]: opaque blob persistence, with [`MemoryStorage`] and
//!   [`RedbStorage`] backends
//!
//! # Concurrency
//!
//! Directory methods are `async` only to wait on per-key locks. Operations
//! on different contacts or senders proceed in parallel; operations on the
//! same key run one at a time so a load-mutate-store cycle never interleaves
//! with another.
//!
//! # Errors
//!
//! Every fallible method returns [`DirectoryError`]. The wrapped
//! [`RatchetError`](keyloom_crypto::RatchetError) is never collapsed, and
//! [`DirectoryError::recovery`] says what to do next.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod contacts;
pub mod env;
pub mod error;
pub mod group_directory;
pub mod identity;
mod locks;
pub mod session_directory;
pub mod storage;

pub use config::{DEFAULT_ASSOCIATED_DATA, DirectoryConfig};
pub use contacts::{ContactDirectory, MemoryContacts};
pub use env::{Environment, SystemEnv};
pub use error::{DirectoryError, StorageError};
pub use group_directory::{GroupKeyDirectory, SenderKeyDistribution};
pub use identity::{IdentityProvider, LocalIdentity};
pub use session_directory::SessionDirectory;
pub use storage::{MemoryStorage, RedbStorage, Storage};
