#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Notify};

use murmur_client::{ClientConfig, ClientContext, Messenger, ViewEvent};
use murmur_media::{AudioSource, SyntheticSource};
use murmur_shared::provider::{
    AuthProvider, Backend, BlobStore, ChangeFeed, DirectoryProvider, MessageRepository,
    Subscription, SubscriptionHandle,
};
use murmur_shared::{
    ConversationKey, Identity, Message, MessageDraft, MessageId, MessagePatch, MurmurError, Result,
    UserId,
};
use murmur_store::{LocalBackend, LocalSession, NewProfile};

/// One shared local provider with three registered users.
pub struct Harness {
    pub backend: Arc<LocalBackend>,
    pub ann: Identity,
    pub bob: Identity,
    pub cid: Identity,
}

impl Harness {
    pub fn new() -> Self {
        let backend = LocalBackend::in_memory().unwrap();
        let register = |username: &str, first: &str| {
            backend
                .register_profile(&NewProfile {
                    username: username.into(),
                    first_name: first.into(),
                    last_name: String::new(),
                    avatar_url: None,
                })
                .unwrap()
        };
        let ann = register("ann", "Ann");
        let bob = register("bob", "Bob");
        let cid = register("cid", "Cid");
        Self {
            backend,
            ann,
            bob,
            cid,
        }
    }

    pub fn session(&self, username: &str) -> Arc<LocalSession> {
        let session = self.backend.connect();
        session.sign_in(username).unwrap();
        Arc::new(session)
    }

    pub fn gated(&self, username: &str) -> Arc<GatedBackend> {
        Arc::new(GatedBackend::new(self.session(username)))
    }

    pub async fn messenger(&self, username: &str) -> Messenger {
        self.messenger_with(self.session(username), test_config(), tone())
            .await
    }

    pub async fn messenger_with(
        &self,
        backend: Arc<dyn Backend>,
        config: ClientConfig,
        audio: Arc<dyn AudioSource>,
    ) -> Messenger {
        let ctx = ClientContext::new(backend, config);
        Messenger::open(&ctx, audio).await.unwrap()
    }
}

pub fn test_config() -> ClientConfig {
    ClientConfig {
        progress_tick: Duration::from_millis(1),
        ..ClientConfig::default()
    }
}

pub fn tone() -> Arc<dyn AudioSource> {
    Arc::new(SyntheticSource::default())
}

/// Poll `check` until it holds, failing after a generous timeout.
pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Receive events until `pick` matches one.
pub async fn next_matching<T>(
    events: &mut broadcast::Receiver<ViewEvent>,
    pick: impl Fn(&ViewEvent) -> Option<T>,
) -> T {
    let wait = async {
        loop {
            let event = events.recv().await.unwrap();
            if let Some(found) = pick(&event) {
                return found;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("expected view event")
}

/// Counts and perturbs provider calls on top of a real session.
pub struct GatedBackend {
    inner: Arc<LocalSession>,
    held: Mutex<HashMap<ConversationKey, Arc<Notify>>>,
    pub entered: Notify,
    pub fail_inserts: AtomicBool,
    pub fail_read_updates: AtomicBool,
    pub fail_commits: AtomicBool,
    pub subscribes: AtomicUsize,
    pub unsubscribes: AtomicUsize,
    pub chunks: Mutex<Vec<(u64, usize)>>,
    pub discards: AtomicUsize,
    upload_gate: Mutex<Option<Arc<Notify>>>,
}

impl GatedBackend {
    pub fn new(inner: Arc<LocalSession>) -> Self {
        Self {
            inner,
            held: Mutex::new(HashMap::new()),
            entered: Notify::new(),
            fail_inserts: AtomicBool::new(false),
            fail_read_updates: AtomicBool::new(false),
            fail_commits: AtomicBool::new(false),
            subscribes: AtomicUsize::new(0),
            unsubscribes: AtomicUsize::new(0),
            chunks: Mutex::new(Vec::new()),
            discards: AtomicUsize::new(0),
            upload_gate: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &Arc<LocalSession> {
        &self.inner
    }

    /// History queries for `key` block until [`GatedBackend::release`].
    pub fn hold(&self, key: ConversationKey) {
        self.held
            .lock()
            .unwrap()
            .insert(key, Arc::new(Notify::new()));
    }

    pub fn release(&self, key: &ConversationKey) {
        if let Some(gate) = self.held.lock().unwrap().remove(key) {
            gate.notify_one();
        }
    }

    /// The next blob chunk blocks until the returned gate is notified.
    pub fn hold_upload(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.upload_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthProvider for GatedBackend {
    async fn current_user(&self) -> Result<Option<Identity>> {
        self.inner.current_user().await
    }
}

#[async_trait]
impl DirectoryProvider for GatedBackend {
    async fn list_profiles(&self, exclude: &UserId) -> Result<Vec<Identity>> {
        self.inner.list_profiles(exclude).await
    }
}

#[async_trait]
impl MessageRepository for GatedBackend {
    async fn query_messages(&self, key: &ConversationKey) -> Result<Vec<Message>> {
        let gate = self.held.lock().unwrap().get(key).cloned();
        if let Some(gate) = gate {
            self.entered.notify_one();
            gate.notified().await;
        }
        self.inner.query_messages(key).await
    }

    async fn insert_message(&self, draft: MessageDraft) -> Result<Message> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(MurmurError::Backend("connection reset".into()));
        }
        self.inner.insert_message(draft).await
    }

    async fn update_message(&self, id: &MessageId, patch: MessagePatch) -> Result<()> {
        if self.fail_read_updates.load(Ordering::SeqCst) {
            return Err(MurmurError::Backend("update rejected".into()));
        }
        self.inner.update_message(id, patch).await
    }

    async fn mark_conversation_read(&self, receiver: &UserId, sender: &UserId) -> Result<u64> {
        if self.fail_read_updates.load(Ordering::SeqCst) {
            return Err(MurmurError::Backend("update rejected".into()));
        }
        self.inner.mark_conversation_read(receiver, sender).await
    }

    async fn delete_message(&self, id: &MessageId, sender: &UserId) -> Result<bool> {
        self.inner.delete_message(id, sender).await
    }
}

#[async_trait]
impl ChangeFeed for GatedBackend {
    async fn subscribe(&self, scope: &ConversationKey) -> Result<Subscription> {
        let subscription = self.inner.subscribe(scope).await?;
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        Ok(subscription)
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()> {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        self.inner.unsubscribe(handle).await
    }
}

#[async_trait]
impl BlobStore for GatedBackend {
    async fn put_chunk(&self, key: &str, offset: u64, bytes: &[u8]) -> Result<()> {
        let gate = self.upload_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            self.entered.notify_one();
            gate.notified().await;
        }
        self.chunks.lock().unwrap().push((offset, bytes.len()));
        self.inner.put_chunk(key, offset, bytes).await
    }

    async fn commit(&self, key: &str, total_len: u64, mime: &str) -> Result<String> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(MurmurError::Backend("storage unavailable".into()));
        }
        self.inner.commit(key, total_len, mime).await
    }

    async fn discard(&self, key: &str) -> Result<()> {
        self.discards.fetch_add(1, Ordering::SeqCst);
        self.inner.discard(key).await
    }

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.fetch(key).await
    }
}
