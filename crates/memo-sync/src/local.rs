use async_trait::async_trait;
use tracing::debug;

use crate::adapter::{PushOutcome, SnapshotSync};
use crate::error::SyncError;
use crate::snapshot::{Snapshot, SnapshotFile};

/// File-only adapter used when remote sync is disabled.
///
/// `file` is the published copy, not the live mirror: the mirror is cleared
/// at session end while the published copy keeps the last pushed snapshot.
#[derive(Clone, Debug)]
pub struct LocalSync {
    file: SnapshotFile,
}

impl LocalSync {
    pub fn new(file: SnapshotFile) -> Self {
        Self { file }
    }

    /// Published copy stored next to the mirror, e.g. `context.published.json`.
    pub fn beside(mirror: &SnapshotFile) -> Self {
        Self::new(SnapshotFile::new(mirror.path().with_extension("published.json")))
    }
}

#[async_trait]
impl SnapshotSync for LocalSync {
    fn name(&self) -> &str {
        "local"
    }

    async fn pull(&self) -> Result<Snapshot, SyncError> {
        self.file.read()
    }

    async fn push(&self, snapshot: &Snapshot, message: &str) -> Result<PushOutcome, SyncError> {
        self.file.write(snapshot)?;
        debug!(commit = message, entries = snapshot.len(), "snapshot saved locally");
        Ok(PushOutcome::default())
    }
}
