//! In-process remote with counters and failure injection for sync tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use super::{Connectivity, Session, SyncEngine};
use crate::db::init_db;
use crate::models::ReadingKind;
use crate::remote::{RemoteError, RemoteStore};
use crate::server::DocumentStore;

pub const USER: &str = "user-1";

pub struct TestRemote {
    pub store: DocumentStore,
    commits: AtomicUsize,
    queries: AtomicUsize,
    failing_queries: AtomicUsize,
    failing_kind: Mutex<Option<ReadingKind>>,
    online: AtomicBool,
    gated: AtomicBool,
    gate: Semaphore,
}

impl TestRemote {
    pub fn new() -> Self {
        Self {
            store: DocumentStore::in_memory(),
            commits: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
            failing_queries: AtomicUsize::new(0),
            failing_kind: Mutex::new(None),
            online: AtomicBool::new(true),
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
        }
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Makes the next `n` queries fail with a network error.
    pub fn fail_queries(&self, n: usize) {
        self.failing_queries.store(n, Ordering::SeqCst);
    }

    /// Makes every query for `kind` fail until cleared with `None`.
    pub fn fail_kind(&self, kind: Option<ReadingKind>) {
        *self.failing_kind.lock().unwrap() = kind;
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Holds every query until [`TestRemote::open_gate`] is called.
    pub fn close_gate(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    pub fn open_gate(&self) {
        self.gated.store(false, Ordering::SeqCst);
        self.gate.add_permits(1024);
    }

    /// Waits until at least `n` queries have been issued.
    pub async fn wait_for_queries(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.queries() < n {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("remote was not queried in time");
    }

    pub async fn documents(&self, kind: ReadingKind) -> Vec<Value> {
        self.store
            .changed_since(USER, kind, DateTime::UNIX_EPOCH)
            .await
            .unwrap()
    }
}

#[async_trait]
impl RemoteStore for TestRemote {
    async fn commit(
        &self,
        user_id: &str,
        kind: ReadingKind,
        documents: Vec<Value>,
    ) -> Result<(), RemoteError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.store.commit(user_id, kind, documents).await
    }

    async fn query_changed(
        &self,
        user_id: &str,
        kind: ReadingKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<Value>, RemoteError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.gated.load(Ordering::SeqCst) {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }
        let failing = self
            .failing_queries
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() || *self.failing_kind.lock().unwrap() == Some(kind) {
            return Err(RemoteError::Network("connection refused".to_string()));
        }
        self.store.query_changed(user_id, kind, since).await
    }
}

#[async_trait]
impl Connectivity for TestRemote {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

pub struct TestContext {
    pub pool: SqlitePool,
    pub remote: Arc<TestRemote>,
    pub session: Arc<Session>,
    pub engine: Arc<SyncEngine>,
    _temp_dir: TempDir,
}

pub async fn setup() -> TestContext {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
    let remote = Arc::new(TestRemote::new());
    let session = Arc::new(Session::new(Some(USER.to_string())));
    let engine = Arc::new(SyncEngine::new(
        pool.clone(),
        remote.clone(),
        session.clone(),
    ));
    TestContext {
        pool,
        remote,
        session,
        engine,
        _temp_dir: temp_dir,
    }
}
