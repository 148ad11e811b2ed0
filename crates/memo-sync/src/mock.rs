use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::adapter::{PushOutcome, SnapshotSync};
use crate::error::SyncError;
use crate::snapshot::Snapshot;

/// In-memory remote for tests.
///
/// A successful push becomes the snapshot returned by the next pull.
#[derive(Default)]
pub struct MockSync {
    remote: Mutex<Option<Snapshot>>,
    pull_error: Mutex<Option<SyncError>>,
    push_error: Mutex<Option<SyncError>>,
    pushes: Mutex<Vec<(Snapshot, String)>>,
    pulls: Mutex<usize>,
}

impl MockSync {
    /// Remote holding an empty snapshot.
    pub fn new() -> Self {
        Self::with_remote(Snapshot::default())
    }

    pub fn with_remote(snapshot: Snapshot) -> Self {
        let mock = Self::default();
        *mock.remote.lock() = Some(snapshot);
        mock
    }

    /// Remote with no snapshot file yet.
    pub fn empty_remote() -> Self {
        Self::default()
    }

    /// Make every pull fail with `err` until cleared.
    pub fn fail_pulls(&self, err: SyncError) {
        *self.pull_error.lock() = Some(err);
    }

    /// Make every push fail with `err` until cleared.
    pub fn fail_pushes(&self, err: SyncError) {
        *self.push_error.lock() = Some(err);
    }

    pub fn clear_failures(&self) {
        *self.pull_error.lock() = None;
        *self.push_error.lock() = None;
    }

    pub fn remote(&self) -> Option<Snapshot> {
        self.remote.lock().clone()
    }

    pub fn pushes(&self) -> Vec<(Snapshot, String)> {
        self.pushes.lock().clone()
    }

    pub fn pull_count(&self) -> usize {
        *self.pulls.lock()
    }
}

#[async_trait]
impl SnapshotSync for MockSync {
    fn name(&self) -> &str {
        "mock"
    }

    async fn pull(&self) -> Result<Snapshot, SyncError> {
        *self.pulls.lock() += 1;
        if let Some(err) = self.pull_error.lock().clone() {
            return Err(err);
        }
        self.remote
            .lock()
            .clone()
            .ok_or_else(|| SyncError::SnapshotMissing(PathBuf::from("mock://context.json")))
    }

    async fn push(&self, snapshot: &Snapshot, message: &str) -> Result<PushOutcome, SyncError> {
        if let Some(err) = self.push_error.lock().clone() {
            return Err(err);
        }
        self.pushes.lock().push((snapshot.clone(), message.to_string()));
        let mut remote = self.remote.lock();
        let committed = remote.as_ref() != Some(snapshot);
        *remote = Some(snapshot.clone());
        Ok(PushOutcome { committed, retried: false })
    }
}
