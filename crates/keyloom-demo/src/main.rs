//! Keyloom walkthrough binary.
//!
//! Runs a pairwise and a group conversation between three local users, each
//! with its own redb database, and passes every envelope through its JSON
//! wire form.
//!
//! # Usage
//!
//! ```bash
//! keyloom-demo --data-dir /tmp/keyloom --messages 20
//! RUST_LOG=keyloom_core=debug keyloom-demo
//! ```

use std::{
    error::Error,
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::Parser;
use keyloom_core::{
    DirectoryConfig, DirectoryError, Environment, GroupKeyDirectory, IdentityProvider,
    LocalIdentity, MemoryContacts, RedbStorage, SessionDirectory, SystemEnv,
};
use keyloom_proto::{PairwiseEnvelope, WireMessage};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const GROUP: &str = "demo-team";

/// Keyloom end-to-end encryption walkthrough
#[derive(Parser, Debug)]
#[command(name = "keyloom-demo")]
#[command(about = "Pairwise and group encryption walkthrough over durable storage")]
#[command(version)]
struct Args {
    /// Directory for the per-user databases; each run uses a fresh subdirectory
    #[arg(long, default_value = "keyloom-demo-data")]
    data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Extra pairwise messages to exchange after the opening pair
    #[arg(long, default_value = "10")]
    messages: u32,

    /// Skip-ahead cap for pairwise sessions and group receivers
    #[arg(long, default_value = "1000")]
    max_skip: u32,
}

struct User {
    name: &'static str,
    sessions: Arc<SessionDirectory<RedbStorage, SystemEnv>>,
    groups: GroupKeyDirectory<RedbStorage, SystemEnv>,
}

impl User {
    fn open(
        name: &'static str,
        dir: &Path,
        contacts: &MemoryContacts,
        config: &DirectoryConfig,
    ) -> Result<Self, DirectoryError> {
        let env = SystemEnv::new();
        let identity = LocalIdentity::generate(name, &env);
        contacts.insert_contact(name, identity.agreement_public_key());
        contacts.insert_signing_key(name, identity.signing_public_key());
        contacts.add_member(GROUP, name);

        let storage = RedbStorage::open(dir.join(format!("{name}.redb")))?;
        let sessions = Arc::new(SessionDirectory::new(
            storage,
            env,
            Arc::new(identity),
            Arc::new(contacts.clone()),
            config.clone(),
        ));
        let groups = GroupKeyDirectory::new(Arc::clone(&sessions));
        Ok(Self { name, sessions, groups })
    }

    async fn send(&self, to: &User, text: &str) -> Result<String, Box<dyn Error>> {
        let envelope = self.sessions.encrypt(to.name, text.as_bytes()).await?;
        let wire = WireMessage::from(envelope).encode()?;
        to.receive(self, &wire).await
    }

    async fn receive(&self, from: &User, wire: &str) -> Result<String, Box<dyn Error>> {
        let WireMessage::Pairwise(envelope) = WireMessage::decode(wire)? else {
            return Err("expected a pairwise message".into());
        };
        let plaintext = self.sessions.decrypt(from.name, &envelope).await?;
        Ok(String::from_utf8(plaintext)?)
    }

    /// Hand this user's sender key to each listed recipient.
    async fn share_sender_key(&self, recipients: &[&User]) -> Result<(), DirectoryError> {
        for dist in self.groups.distribute_sender_key(GROUP).await? {
            self.deliver_sender_key(recipients, &dist.contact, &dist.envelope).await?;
        }
        Ok(())
    }

    async fn deliver_sender_key(
        &self,
        recipients: &[&User],
        contact: &str,
        envelope: &PairwiseEnvelope,
    ) -> Result<(), DirectoryError> {
        if let Some(to) = recipients.iter().find(|user| user.name == contact) {
            to.groups
                .receive_sender_key(self.name, GROUP, self.groups.sender_public_key(), envelope)
                .await?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let run = u32::from_be_bytes(SystemEnv::new().random_array());
    let dir = args.data_dir.join(format!("run-{run:08x}"));
    std::fs::create_dir_all(&dir)?;
    info!(path = %dir.display(), "keyloom demo starting");

    let config = DirectoryConfig::default().with_max_skip(args.max_skip);
    let contacts = MemoryContacts::new();
    let alice = User::open("alice", &dir, &contacts, &config)?;
    let bob = User::open("bob", &dir, &contacts, &config)?;
    let carol = User::open("carol", &dir, &contacts, &config)?;

    pairwise(&alice, &bob, args.messages).await?;
    group(&alice, &bob, &carol, &contacts).await?;

    info!("keyloom demo finished");
    Ok(())
}

async fn pairwise(alice: &User, bob: &User, messages: u32) -> Result<(), Box<dyn Error>> {
    let first = alice.send(bob, "hi").await?;
    info!(received = %first, "bob decrypted bootstrap message");
    let second = alice.send(bob, "how are you").await?;
    info!(received = %second, "bob decrypted steady-state message");

    for i in 0..messages {
        let (from, to) = if i % 2 == 0 { (bob, alice) } else { (alice, bob) };
        let received = from.send(to, &format!("message {i} from {}", from.name)).await?;
        info!(from = from.name, to = to.name, received = %received, "delivered");
    }

    // Reordered delivery: the later message arrives first.
    let early = WireMessage::from(alice.sessions.encrypt("bob", b"sent first").await?).encode()?;
    let late = WireMessage::from(alice.sessions.encrypt("bob", b"sent second").await?).encode()?;
    for wire in [&late, &early] {
        let received = bob.receive(alice, wire).await?;
        info!(received = %received, "delivered out of order");
    }

    match bob.receive(alice, &early).await {
        Ok(_) => warn!("replay was accepted"),
        Err(err) => info!(error = %err, "replay rejected"),
    }
    Ok(())
}

async fn group(
    alice: &User,
    bob: &User,
    carol: &User,
    contacts: &MemoryContacts,
) -> Result<(), Box<dyn Error>> {
    alice.share_sender_key(&[bob, carol]).await?;
    bob.share_sender_key(&[alice, carol]).await?;
    carol.share_sender_key(&[alice, bob]).await?;

    let hello = alice.groups.encrypt_group_message(GROUP, b"group hello").await?;
    let wire = hello.to_json()?;
    info!(wire_bytes = wire.len(), index = hello.message.message_index, "alice sent");
    for reader in [bob, carol] {
        let plaintext = String::from_utf8(reader.groups.decrypt_group_message(GROUP, &hello).await?)?;
        info!(reader = reader.name, received = %plaintext, "group delivered");
    }

    contacts.remove_member(GROUP, bob.name);
    let redistribution = alice.groups.remove_member(GROUP, &bob.groups.sender_public_key()).await?;
    info!(remaining = redistribution.len(), "alice removed bob and rotated");

    let post = alice.groups.encrypt_group_message(GROUP, b"post-rotation").await?;
    for reader in [bob, carol] {
        if let Err(err) = reader.groups.decrypt_group_message(GROUP, &post).await {
            info!(reader = reader.name, error = %err, recovery = ?err.recovery(), "cannot read yet");
        }
    }

    for dist in &redistribution {
        alice.deliver_sender_key(&[carol], &dist.contact, &dist.envelope).await?;
    }
    let plaintext = String::from_utf8(carol.groups.decrypt_group_message(GROUP, &post).await?)?;
    info!(received = %plaintext, "carol decrypted after importing the rotated key");

    match bob.groups.decrypt_group_message(GROUP, &post).await {
        Ok(_) => warn!("removed member read a post-rotation message"),
        Err(err) => info!(error = %err, "bob is locked out"),
    }
    Ok(())
}
