//! End-to-end directory tests.
//!
//! Three members (Alice, Bob, Carol) exchange pairwise and group traffic
//! through `SessionDirectory` and `GroupKeyDirectory`, with every envelope
//! passed through its JSON wire form on the way.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use keyloom_core::{
    DirectoryConfig, DirectoryError, Environment, GroupKeyDirectory, IdentityProvider,
    LocalIdentity, MemoryContacts, MemoryStorage, SessionDirectory, Storage, StorageError,
};
use keyloom_crypto::{RatchetError, Recovery};
use keyloom_proto::{GroupEnvelope, PairwiseEnvelope, WireMessage};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

#[derive(Clone)]
struct SeededEnv(Arc<Mutex<ChaCha20Rng>>);

impl SeededEnv {
    fn new(seed: u64) -> Self {
        Self(Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))))
    }
}

impl Environment for SeededEnv {
    fn random_bytes(&self, buffer: &mut [u8]) {
        self.0.lock().unwrap().fill_bytes(buffer);
    }
}

struct Member<S: Storage> {
    id: &'static str,
    sessions: Arc<SessionDirectory<S, SeededEnv>>,
    groups: GroupKeyDirectory<S, SeededEnv>,
}

impl<S: Storage> Member<S> {
    fn new(id: &'static str, seed: u64, storage: S, contacts: &MemoryContacts) -> Self {
        Self::with_config(id, seed, storage, contacts, DirectoryConfig::default())
    }

    fn with_config(
        id: &'static str,
        seed: u64,
        storage: S,
        contacts: &MemoryContacts,
        config: DirectoryConfig,
    ) -> Self {
        let env = SeededEnv::new(seed);
        let identity = LocalIdentity::generate(id, &env);
        contacts.insert_contact(id, identity.agreement_public_key());
        contacts.insert_signing_key(id, identity.signing_public_key());

        let sessions = Arc::new(SessionDirectory::new(
            storage,
            env,
            Arc::new(identity),
            Arc::new(contacts.clone()),
            config,
        ));
        let groups = GroupKeyDirectory::new(Arc::clone(&sessions));
        Self { id, sessions, groups }
    }
}

fn over_wire_pairwise(envelope: PairwiseEnvelope) -> PairwiseEnvelope {
    let text = WireMessage::from(envelope).encode().unwrap();
    match WireMessage::decode(&text).unwrap() {
        WireMessage::Pairwise(envelope) => envelope,
        other => panic!("expected pairwise message, got {}", other.kind()),
    }
}

fn over_wire_group(envelope: GroupEnvelope) -> GroupEnvelope {
    GroupEnvelope::from_json(&envelope.to_json().unwrap()).unwrap()
}

async fn send<S: Storage>(from: &Member<S>, to: &Member<S>, text: &str) -> Vec<u8> {
    let envelope = from.sessions.encrypt(to.id, text.as_bytes()).await.unwrap();
    to.sessions.decrypt(from.id, &over_wire_pairwise(envelope)).await.unwrap()
}

/// Run `from`'s sender-key distribution and install it at each recipient.
async fn distribute<S: Storage>(from: &Member<S>, recipients: &[&Member<S>]) {
    for dist in from.groups.distribute_sender_key("team").await.unwrap() {
        let to = recipients
            .iter()
            .find(|member| member.id == dist.contact)
            .expect("distribution addressed to a known member");
        to.groups
            .receive_sender_key(
                from.id,
                "team",
                from.groups.sender_public_key(),
                &over_wire_pairwise(dist.envelope),
            )
            .await
            .unwrap();
    }
}

fn team(contacts: &MemoryContacts) -> [Member<MemoryStorage>; 3] {
    let members = [
        Member::new("alice", 1, MemoryStorage::new(), contacts),
        Member::new("bob", 2, MemoryStorage::new(), contacts),
        Member::new("carol", 3, MemoryStorage::new(), contacts),
    ];
    for member in &members {
        contacts.add_member("team", member.id);
    }
    members
}

#[tokio::test]
async fn pairwise_conversation_with_turns() {
    let contacts = MemoryContacts::new();
    let [alice, bob, _carol] = team(&contacts);

    assert_eq!(send(&alice, &bob, "hi bob").await, b"hi bob");
    assert_eq!(send(&alice, &bob, "are you there").await, b"are you there");
    assert_eq!(send(&bob, &alice, "yes").await, b"yes");
    assert_eq!(send(&alice, &bob, "great").await, b"great");
    assert_eq!(send(&bob, &alice, "bye").await, b"bye");
}

#[tokio::test]
async fn pairwise_out_of_order_delivery() {
    let contacts = MemoryContacts::new();
    let [alice, bob, _carol] = team(&contacts);

    let m0 = alice.sessions.encrypt("bob", b"zero").await.unwrap();
    let m1 = alice.sessions.encrypt("bob", b"one").await.unwrap();
    let m2 = alice.sessions.encrypt("bob", b"two").await.unwrap();

    assert_eq!(bob.sessions.decrypt("alice", &m0).await.unwrap(), b"zero");
    assert_eq!(bob.sessions.decrypt("alice", &m2).await.unwrap(), b"two");
    assert_eq!(bob.sessions.decrypt("alice", &m1).await.unwrap(), b"one");

    let replay = bob.sessions.decrypt("alice", &m1).await.unwrap_err();
    assert!(matches!(
        replay,
        DirectoryError::Ratchet(RatchetError::DuplicateOrStaleMessage { .. })
    ));
    assert_eq!(replay.recovery(), Recovery::Discard);
}

#[tokio::test]
async fn skip_cap_comes_from_config() {
    let contacts = MemoryContacts::new();
    let alice = Member::new("alice", 1, MemoryStorage::new(), &contacts);
    let bob = Member::with_config(
        "bob",
        2,
        MemoryStorage::new(),
        &contacts,
        DirectoryConfig::default().with_max_skip(2),
    );

    let first = alice.sessions.encrypt("bob", b"hello").await.unwrap();
    bob.sessions.decrypt("alice", &first).await.unwrap();

    let mut last = None;
    for i in 0..4 {
        last = Some(alice.sessions.encrypt("bob", format!("{i}").as_bytes()).await.unwrap());
    }

    let err = bob.sessions.decrypt("alice", &last.unwrap()).await.unwrap_err();
    assert!(matches!(err, DirectoryError::Ratchet(RatchetError::SkipTooFar { .. })));
    assert_eq!(err.recovery(), Recovery::ResetSession);
}

#[tokio::test]
async fn group_conversation_among_three() {
    let contacts = MemoryContacts::new();
    let [alice, bob, carol] = team(&contacts);

    distribute(&alice, &[&bob, &carol]).await;
    distribute(&bob, &[&alice, &carol]).await;
    distribute(&carol, &[&alice, &bob]).await;

    let from_alice = over_wire_group(alice.groups.encrypt_group_message("team", b"standup?").await.unwrap());
    assert_eq!(bob.groups.decrypt_group_message("team", &from_alice).await.unwrap(), b"standup?");
    assert_eq!(carol.groups.decrypt_group_message("team", &from_alice).await.unwrap(), b"standup?");

    let from_carol = over_wire_group(carol.groups.encrypt_group_message("team", b"in 5").await.unwrap());
    assert_eq!(alice.groups.decrypt_group_message("team", &from_carol).await.unwrap(), b"in 5");
    assert_eq!(bob.groups.decrypt_group_message("team", &from_carol).await.unwrap(), b"in 5");

    let mut senders = bob.groups.known_senders("team").unwrap();
    senders.sort_unstable();
    let mut expected = vec![alice.groups.sender_public_key(), carol.groups.sender_public_key()];
    expected.sort_unstable();
    assert_eq!(senders, expected);
}

#[tokio::test]
async fn group_messages_out_of_order_then_replayed() {
    let contacts = MemoryContacts::new();
    let [alice, bob, carol] = team(&contacts);
    distribute(&alice, &[&bob, &carol]).await;

    let mut sent = Vec::new();
    for i in 0..5 {
        sent.push(alice.groups.encrypt_group_message("team", format!("m{i}").as_bytes()).await.unwrap());
    }

    for index in [4, 1, 3, 0, 2] {
        let plaintext = bob.groups.decrypt_group_message("team", &sent[index]).await.unwrap();
        assert_eq!(plaintext, format!("m{index}").as_bytes());
    }
    for envelope in &sent {
        assert!(matches!(
            bob.groups.decrypt_group_message("team", envelope).await,
            Err(DirectoryError::Ratchet(RatchetError::DuplicateOrStaleMessage { .. }))
        ));
    }
}

#[tokio::test]
async fn tampered_group_ciphertext_fails_signature() {
    let contacts = MemoryContacts::new();
    let [alice, bob, carol] = team(&contacts);
    distribute(&alice, &[&bob, &carol]).await;

    let mut envelope = alice.groups.encrypt_group_message("team", b"payload").await.unwrap();
    let last = envelope.message.ciphertext.len() - 1;
    envelope.message.ciphertext[last] ^= 0x80;

    let err = bob.groups.decrypt_group_message("team", &envelope).await.unwrap_err();
    assert_eq!(err, DirectoryError::Ratchet(RatchetError::InvalidSignature));
    assert_eq!(err.recovery(), Recovery::Discard);
}

#[tokio::test]
async fn removed_member_cannot_read_after_rotation() {
    let contacts = MemoryContacts::new();
    let [alice, bob, carol] = team(&contacts);
    distribute(&alice, &[&bob, &carol]).await;
    distribute(&carol, &[&alice, &bob]).await;

    let before = alice.groups.encrypt_group_message("team", b"all of us").await.unwrap();
    assert_eq!(carol.groups.decrypt_group_message("team", &before).await.unwrap(), b"all of us");

    contacts.remove_member("team", "carol");
    let redistribution = alice
        .groups
        .remove_member("team", &carol.groups.sender_public_key())
        .await
        .unwrap();
    assert_eq!(redistribution.len(), 1);
    assert_eq!(redistribution[0].contact, "bob");
    for dist in redistribution {
        bob.groups
            .receive_sender_key("alice", "team", alice.groups.sender_public_key(), &dist.envelope)
            .await
            .unwrap();
    }

    let after = alice.groups.encrypt_group_message("team", b"just us").await.unwrap();
    assert_eq!(after.message.message_index, 0);
    assert_eq!(bob.groups.decrypt_group_message("team", &after).await.unwrap(), b"just us");
    assert_eq!(
        carol.groups.decrypt_group_message("team", &after).await.unwrap_err(),
        DirectoryError::Ratchet(RatchetError::InvalidSignature)
    );

    let from_carol = carol.groups.encrypt_group_message("team", b"hello?").await.unwrap();
    assert_eq!(
        alice.groups.decrypt_group_message("team", &from_carol).await.unwrap_err(),
        DirectoryError::Ratchet(RatchetError::UnknownSender)
    );
}

#[tokio::test]
async fn concurrent_encrypts_to_one_contact_stay_consistent() {
    let contacts = MemoryContacts::new();
    let [alice, bob, _carol] = team(&contacts);
    assert_eq!(send(&alice, &bob, "bootstrap").await, b"bootstrap");

    let alice = Arc::new(alice);
    let mut tasks = Vec::new();
    for i in 0..16 {
        let alice = Arc::clone(&alice);
        tasks.push(tokio::spawn(async move {
            alice.sessions.encrypt("bob", format!("msg {i}").as_bytes()).await.unwrap()
        }));
    }

    let mut envelopes = Vec::new();
    for task in tasks {
        envelopes.push(task.await.unwrap());
    }

    let mut lengths: Vec<u32> = envelopes.iter().map(|e| e.message.header.chain_length).collect();
    lengths.sort_unstable();
    assert_eq!(lengths, (2..18).collect::<Vec<u32>>());

    for envelope in &envelopes {
        bob.sessions.decrypt("alice", envelope).await.unwrap();
    }
}

#[tokio::test]
async fn concurrent_group_decrypts_from_many_senders() {
    let contacts = MemoryContacts::new();
    let [alice, bob, carol] = team(&contacts);
    distribute(&alice, &[&bob, &carol]).await;
    distribute(&carol, &[&alice, &bob]).await;

    let mut inbound = Vec::new();
    for i in 0..8 {
        inbound.push(alice.groups.encrypt_group_message("team", format!("a{i}").as_bytes()).await.unwrap());
        inbound.push(carol.groups.encrypt_group_message("team", format!("c{i}").as_bytes()).await.unwrap());
    }

    let bob = Arc::new(bob);
    let mut tasks = Vec::new();
    for envelope in inbound {
        let bob = Arc::clone(&bob);
        tasks.push(tokio::spawn(async move {
            bob.groups.decrypt_group_message("team", &envelope).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
}

/// Storage whose writes can be switched off.
#[derive(Clone, Default)]
struct FlakyStorage {
    inner: MemoryStorage,
    failing: Arc<AtomicBool>,
}

impl FlakyStorage {
    fn check(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Io("disk unavailable".to_string()));
        }
        Ok(())
    }
}

impl Storage for FlakyStorage {
    fn load_session(&self, contact: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.load_session(contact)
    }

    fn store_session(&self, contact: &str, blob: &[u8]) -> Result<(), StorageError> {
        self.check()?;
        self.inner.store_session(contact, blob)
    }

    fn delete_session(&self, contact: &str) -> Result<(), StorageError> {
        self.check()?;
        self.inner.delete_session(contact)
    }

    fn load_receiver(&self, group: &str, sender: &[u8; 32]) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.load_receiver(group, sender)
    }

    fn store_receiver(&self, group: &str, sender: &[u8; 32], blob: &[u8]) -> Result<(), StorageError> {
        self.check()?;
        self.inner.store_receiver(group, sender, blob)
    }

    fn delete_receiver(&self, group: &str, sender: &[u8; 32]) -> Result<(), StorageError> {
        self.check()?;
        self.inner.delete_receiver(group, sender)
    }

    fn list_receivers(&self, group: &str) -> Result<Vec<[u8; 32]>, StorageError> {
        self.inner.list_receivers(group)
    }

    fn load_sender_key(&self, group: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.load_sender_key(group)
    }

    fn store_sender_key(&self, group: &str, blob: &[u8]) -> Result<(), StorageError> {
        self.check()?;
        self.inner.store_sender_key(group, blob)
    }

    fn delete_sender_key(&self, group: &str) -> Result<(), StorageError> {
        self.check()?;
        self.inner.delete_sender_key(group)
    }
}

#[tokio::test]
async fn failed_persist_surfaces_as_retryable_and_keeps_state() {
    let contacts = MemoryContacts::new();
    let alice_storage = FlakyStorage::default();
    let alice = Member::new("alice", 1, alice_storage.clone(), &contacts);
    let bob = Member::new("bob", 2, FlakyStorage::default(), &contacts);

    assert_eq!(send(&alice, &bob, "hello").await, b"hello");
    let stored = alice_storage.load_session("bob").unwrap();

    alice_storage.failing.store(true, Ordering::SeqCst);
    let err = alice.sessions.encrypt("bob", b"lost").await.unwrap_err();
    assert_eq!(err, DirectoryError::Storage(StorageError::Io("disk unavailable".to_string())));
    assert_eq!(err.recovery(), Recovery::Retry);
    assert_eq!(alice_storage.load_session("bob").unwrap(), stored);

    alice_storage.failing.store(false, Ordering::SeqCst);
    assert_eq!(send(&alice, &bob, "retried").await, b"retried");
}

#[tokio::test]
async fn member_cannot_install_key_under_another_sender() {
    let contacts = MemoryContacts::new();
    let [alice, bob, carol] = team(&contacts);
    distribute(&alice, &[&bob, &carol]).await;

    // Carol sends her own sender key to Bob, labelled as Alice's.
    let dist = carol
        .groups
        .distribute_sender_key("team")
        .await
        .unwrap()
        .into_iter()
        .find(|dist| dist.contact == "bob")
        .unwrap();
    let err = bob
        .groups
        .receive_sender_key(
            "carol",
            "team",
            alice.groups.sender_public_key(),
            &over_wire_pairwise(dist.envelope),
        )
        .await
        .unwrap_err();
    assert_eq!(err, DirectoryError::SenderKeyMismatch { contact: "carol".to_string() });
    assert_eq!(err.recovery(), Recovery::Discard);

    // A message Carol signs and files under Alice's key does not verify.
    let mut forged = carol.groups.encrypt_group_message("team", b"from alice").await.unwrap();
    forged.sender_public_key = alice.groups.sender_public_key();
    assert_eq!(
        bob.groups.decrypt_group_message("team", &over_wire_group(forged)).await.unwrap_err(),
        DirectoryError::Ratchet(RatchetError::InvalidSignature)
    );

    let genuine = alice.groups.encrypt_group_message("team", b"really alice").await.unwrap();
    assert_eq!(
        bob.groups.decrypt_group_message("team", &over_wire_group(genuine)).await.unwrap(),
        b"really alice"
    );
}

#[tokio::test]
async fn delayed_distribution_does_not_undo_rotation() {
    let contacts = MemoryContacts::new();
    let [alice, bob, _carol] = team(&contacts);
    contacts.remove_member("team", "carol");
    distribute(&alice, &[&bob]).await;

    let delayed = alice.groups.distribute_sender_key("team").await.unwrap();
    let rotated = alice.groups.rotate_sender_key("team").await.unwrap();

    for dist in rotated.into_iter().chain(delayed) {
        bob.groups
            .receive_sender_key(
                "alice",
                "team",
                alice.groups.sender_public_key(),
                &over_wire_pairwise(dist.envelope),
            )
            .await
            .unwrap();
    }

    for text in ["first after rotation", "second after rotation"] {
        let envelope = alice.groups.encrypt_group_message("team", text.as_bytes()).await.unwrap();
        assert_eq!(
            bob.groups.decrypt_group_message("team", &over_wire_group(envelope)).await.unwrap(),
            text.as_bytes()
        );
    }
}
