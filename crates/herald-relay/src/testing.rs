//! Test doubles for the store and transport seams.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use herald_core::ids::{ConnectionId, ExecutionId};
use herald_core::records::{ConnectionRecord, ResultRecord};
use herald_core::{Transport, TransportError};
use herald_store::{ConnectionRepo, ConnectionStore, Database, ResultRepo, ResultStore, StoreError};

/// Records every push; optionally fails them.
#[derive(Default)]
pub struct RecordingTransport {
    pub pushes: Mutex<Vec<(ConnectionId, String)>>,
    fail_with: Mutex<Option<TransportError>>,
}

impl RecordingTransport {
    pub fn failing(err: TransportError) -> Self {
        Self {
            pushes: Mutex::new(Vec::new()),
            fail_with: Mutex::new(Some(err)),
        }
    }

    pub fn pushes(&self) -> Vec<(ConnectionId, String)> {
        self.pushes.lock().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn push(
        &self,
        connection_id: &ConnectionId,
        message: String,
    ) -> Result<(), TransportError> {
        self.pushes.lock().push((connection_id.clone(), message));
        match self.fail_with.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// A connection store whose every call fails.
pub struct BrokenConnectionStore;

fn broken() -> StoreError {
    StoreError::Database("unable to open database file".into())
}

#[async_trait]
impl ConnectionStore for BrokenConnectionStore {
    async fn put(&self, _: &ConnectionRecord) -> Result<Option<ConnectionId>, StoreError> {
        Err(broken())
    }
    async fn get(&self, _: &ExecutionId) -> Result<Option<ConnectionRecord>, StoreError> {
        Err(broken())
    }
    async fn find_by_connection(
        &self,
        _: &ConnectionId,
    ) -> Result<Vec<ConnectionRecord>, StoreError> {
        Err(broken())
    }
    async fn delete(&self, _: &ExecutionId) -> Result<bool, StoreError> {
        Err(broken())
    }
    async fn delete_if_matches(
        &self,
        _: &ExecutionId,
        _: &ConnectionId,
    ) -> Result<bool, StoreError> {
        Err(broken())
    }
}

/// Wraps a result store and counts reads.
pub struct CountingResults {
    inner: Arc<dyn ResultStore>,
    pub reads: AtomicUsize,
}

impl CountingResults {
    pub fn new(inner: Arc<dyn ResultStore>) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResultStore for CountingResults {
    async fn get(&self, execution_id: &ExecutionId) -> Result<Option<ResultRecord>, StoreError> {
        let _ = self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get(execution_id).await
    }
}

pub struct BrokenResultStore;

#[async_trait]
impl ResultStore for BrokenResultStore {
    async fn get(&self, _: &ExecutionId) -> Result<Option<ResultRecord>, StoreError> {
        Err(broken())
    }
}

/// Fresh in-memory repositories sharing one database.
pub fn sqlite_stores() -> (Arc<ConnectionRepo>, Arc<ResultRepo>) {
    let db = Database::in_memory().unwrap();
    (
        Arc::new(ConnectionRepo::new(db.clone())),
        Arc::new(ResultRepo::new(db)),
    )
}
