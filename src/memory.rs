// In-memory backing store.
//
// Records applied statements in order and can be told to fail, which makes
// it the reference member for tests and dry runs.

use crate::core::{ClusterError, Result};
use crate::store::{Action, BackingStore, StoreSynchronizer, SyncSnapshot};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// A labelled store that keeps an ordered log of executed statements.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    name: String,
    log: Mutex<Vec<String>>,
    fail_next: AtomicU32,
    failing: AtomicBool,
    applied: AtomicUsize,
}

impl InMemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute one statement, honouring injected failures.
    pub async fn execute(&self, statement: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ClusterError::ActionFailed(format!(
                "store '{}' is unavailable",
                self.name
            )));
        }
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if injected {
            return Err(ClusterError::ActionFailed(format!(
                "store '{}' rejected '{}'",
                self.name, statement
            )));
        }

        self.log.lock().await.push(statement.to_string());
        self.applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Executed statements, oldest first.
    pub async fn statements(&self) -> Vec<String> {
        self.log.lock().await.clone()
    }

    pub fn applied_count(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }

    /// Fail the next `count` statements.
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Fail every statement until switched off again.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl BackingStore for InMemoryStore {
    fn label(&self) -> String {
        self.name.clone()
    }
}

/// Records a single statement on the store.
#[derive(Debug, Clone)]
pub struct StatementAction {
    statement: String,
}

impl StatementAction {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
        }
    }
}

#[async_trait]
impl Action<InMemoryStore> for StatementAction {
    async fn apply(&self, store: &InMemoryStore) -> Result<()> {
        store.execute(&self.statement).await
    }

    fn describe(&self) -> String {
        self.statement.clone()
    }
}

/// Sleeps, then succeeds. Works against any store.
#[derive(Debug, Clone, Copy)]
pub struct DelayAction {
    delay: Duration,
}

impl DelayAction {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl<S: BackingStore> Action<S> for DelayAction {
    async fn apply(&self, _store: &S) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("delay {:?}", self.delay)
    }
}

/// Synchronises members by copying the statement log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSynchronizer;

#[async_trait]
impl StoreSynchronizer<InMemoryStore> for LogSynchronizer {
    async fn capture(&self, source: &InMemoryStore) -> Result<SyncSnapshot> {
        serde_json::to_value(source.statements().await)
            .map_err(|err| ClusterError::SyncFailed(err.to_string()))
    }

    async fn restore(&self, target: &InMemoryStore, snapshot: SyncSnapshot) -> Result<()> {
        let statements: Vec<String> = serde_json::from_value(snapshot)
            .map_err(|err| ClusterError::SyncFailed(err.to_string()))?;
        let mut log = target.log.lock().await;
        target.applied.store(statements.len(), Ordering::SeqCst);
        *log = statements;
        Ok(())
    }
}
