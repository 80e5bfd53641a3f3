//! Mock collaborators shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, RwLock};

use crate::cache::{PermissionCache, PermissionCacheConfig, TabStorage};
use crate::clock::{Clock, ManualClock};
use crate::error::{AuthError, DomainError, DomainResult, StorageError};
use crate::model::{AdminLevelRecord, MemberRecord, Role, Session, SessionEvent, StampSource};
use crate::resolver::MemberDirectory;
use crate::session::IdentityProvider;

/// In-memory [`TabStorage`] whose reads and writes can be made to fail.
#[derive(Default)]
pub struct MockTabStorage {
    items: Mutex<HashMap<String, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MockTabStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn insert_raw(&self, key: &str, value: &str) {
        self.items.lock().insert(key.to_string(), value.to_string());
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.items.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }
}

impl TabStorage for MockTabStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable {
                message: "reads disabled".to_string(),
            });
        }
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::QuotaExceeded { bytes: value.len() });
        }
        self.items.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable {
                message: "writes disabled".to_string(),
            });
        }
        self.items.lock().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable {
                message: "reads disabled".to_string(),
            });
        }
        Ok(self.items.lock().keys().cloned().collect())
    }
}

/// How a mock lookup answers.
#[derive(Debug, Clone)]
pub enum Behavior {
    Immediate,
    Delay(Duration),
    Hang,
    Fail,
}

impl Behavior {
    async fn perform(&self) -> DomainResult<()> {
        match self {
            Behavior::Immediate => Ok(()),
            Behavior::Delay(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(())
            }
            Behavior::Hang => std::future::pending().await,
            Behavior::Fail => Err(DomainError::LookupFailed {
                message: "directory offline".to_string(),
            }),
        }
    }
}

/// Mock member directory with call counters and scripted latency.
pub struct MockDirectory {
    members: RwLock<HashMap<String, MemberRecord>>,
    admin_levels: RwLock<HashMap<String, AdminLevelRecord>>,
    member_calls: AtomicUsize,
    admin_calls: AtomicUsize,
    member_script: Mutex<VecDeque<Behavior>>,
    admin_script: Mutex<VecDeque<Behavior>>,
    member_default: Mutex<Behavior>,
    admin_default: Mutex<Behavior>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self {
            members: RwLock::new(HashMap::new()),
            admin_levels: RwLock::new(HashMap::new()),
            member_calls: AtomicUsize::new(0),
            admin_calls: AtomicUsize::new(0),
            member_script: Mutex::new(VecDeque::new()),
            admin_script: Mutex::new(VecDeque::new()),
            member_default: Mutex::new(Behavior::Immediate),
            admin_default: Mutex::new(Behavior::Immediate),
        }
    }

    pub async fn add_member(&self, email: &str, member_id: &str, is_admin: bool) {
        self.members
            .write()
            .await
            .insert(email.to_string(), MemberRecord::new(member_id, is_admin));
    }

    pub async fn remove_member(&self, email: &str) {
        self.members.write().await.remove(email);
    }

    pub async fn set_admin_level(&self, member_id: &str, level: Role) {
        self.admin_levels
            .write()
            .await
            .insert(member_id.to_string(), AdminLevelRecord::new(level));
    }

    pub fn set_member_behavior(&self, behavior: Behavior) {
        *self.member_default.lock() = behavior;
    }

    pub fn set_admin_behavior(&self, behavior: Behavior) {
        *self.admin_default.lock() = behavior;
    }

    /// Queues behaviors consumed by the next member lookups, in order.
    pub fn script_member_lookups(&self, behaviors: impl IntoIterator<Item = Behavior>) {
        self.member_script.lock().extend(behaviors);
    }

    pub fn script_admin_lookups(&self, behaviors: impl IntoIterator<Item = Behavior>) {
        self.admin_script.lock().extend(behaviors);
    }

    pub fn member_calls(&self) -> usize {
        self.member_calls.load(Ordering::SeqCst)
    }

    pub fn admin_calls(&self) -> usize {
        self.admin_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.member_calls() + self.admin_calls()
    }

    fn next_member_behavior(&self) -> Behavior {
        self.member_script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.member_default.lock().clone())
    }

    fn next_admin_behavior(&self) -> Behavior {
        self.admin_script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.admin_default.lock().clone())
    }
}

#[async_trait]
impl MemberDirectory for MockDirectory {
    async fn find_member_by_email(&self, email: &str) -> DomainResult<Option<MemberRecord>> {
        self.member_calls.fetch_add(1, Ordering::SeqCst);
        self.next_member_behavior().perform().await?;
        Ok(self.members.read().await.get(email).cloned())
    }

    async fn find_admin_level(&self, member_id: &str) -> DomainResult<Option<AdminLevelRecord>> {
        self.admin_calls.fetch_add(1, Ordering::SeqCst);
        self.next_admin_behavior().perform().await?;
        Ok(self.admin_levels.read().await.get(member_id).copied())
    }
}

/// When the mock provider reports a sign-in on its event stream.
#[derive(Debug, Clone, Copy)]
pub enum SignInEvents {
    /// Before `sign_in_with_password` returns.
    Immediate,
    /// After the given delay, from a separate task.
    Delayed(Duration),
    /// Never.
    Silent,
}

/// Mock identity provider backed by a broadcast channel.
pub struct MockProvider {
    session: Mutex<Option<Session>>,
    events: broadcast::Sender<SessionEvent>,
    credentials: Mutex<HashMap<String, (String, String)>>,
    sign_in_events: Mutex<SignInEvents>,
    announce_initial: AtomicBool,
    sessions_issued: AtomicUsize,
    sign_out_calls: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            session: Mutex::new(None),
            events,
            credentials: Mutex::new(HashMap::new()),
            sign_in_events: Mutex::new(SignInEvents::Immediate),
            announce_initial: AtomicBool::new(true),
            sessions_issued: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
        }
    }

    pub fn add_user(&self, email: &str, password: &str, user_id: &str) {
        self.credentials
            .lock()
            .insert(email.to_string(), (password.to_string(), user_id.to_string()));
    }

    /// Pretends a session survived from a previous page load.
    pub fn restore_session(&self, session: Session) {
        *self.session.lock() = Some(session);
    }

    pub fn set_sign_in_events(&self, mode: SignInEvents) {
        *self.sign_in_events.lock() = mode;
    }

    pub fn announce_initial_session(&self, announce: bool) {
        self.announce_initial.store(announce, Ordering::SeqCst);
    }

    pub fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    pub fn current(&self) -> Option<Session> {
        self.session.lock().clone()
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for MockProvider {
    async fn get_session(&self) -> DomainResult<Option<Session>> {
        Ok(self.session.lock().clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        let receiver = self.events.subscribe();
        if self.announce_initial.load(Ordering::SeqCst) {
            let current = self.session.lock().clone();
            let _ = self.events.send(SessionEvent::InitialSession(current));
        }
        receiver
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let user_id = match self.credentials.lock().get(email) {
            Some((expected, user_id)) if expected == password => user_id.clone(),
            _ => return Err(AuthError::InvalidCredentials),
        };

        let n = self.sessions_issued.fetch_add(1, Ordering::SeqCst) + 1;
        let session = Session::new(format!("session-{n}"), user_id, email);
        *self.session.lock() = Some(session.clone());

        let event = SessionEvent::SignedIn(Some(session.clone()));
        match *self.sign_in_events.lock() {
            SignInEvents::Immediate => {
                let _ = self.events.send(event);
            }
            SignInEvents::Delayed(delay) => {
                let events = self.events.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(event);
                });
            }
            SignInEvents::Silent => {}
        }

        Ok(session)
    }

    async fn sign_out(&self) -> DomainResult<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        let previous = self.session.lock().take();
        let _ = self.events.send(SessionEvent::SignedOut(previous));
        Ok(())
    }
}

/// Cache over a fresh [`MockTabStorage`] with a manual clock.
pub fn cache_fixture() -> (Arc<MockTabStorage>, Arc<ManualClock>, Arc<PermissionCache>) {
    let storage = Arc::new(MockTabStorage::new());
    let clock = Arc::new(ManualClock::starting_now());
    let stamps = Arc::new(StampSource::new(clock.clone() as Arc<dyn Clock>));
    let cache = Arc::new(PermissionCache::new(
        storage.clone(),
        stamps,
        PermissionCacheConfig::default(),
    ));
    (storage, clock, cache)
}
