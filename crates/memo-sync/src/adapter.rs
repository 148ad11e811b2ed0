use async_trait::async_trait;

use crate::error::SyncError;
use crate::snapshot::Snapshot;

/// What a successful push did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PushOutcome {
    /// A new commit was created. False when nothing changed.
    pub committed: bool,
    /// The first push was rejected and succeeded after a rebase.
    pub retried: bool,
}

/// Exchanges the snapshot with the remote store.
#[async_trait]
pub trait SnapshotSync: Send + Sync {
    /// Adapter name for logs.
    fn name(&self) -> &str;

    /// Fetch the latest remote snapshot.
    async fn pull(&self) -> Result<Snapshot, SyncError>;

    /// Publish `snapshot` with the given commit message.
    async fn push(&self, snapshot: &Snapshot, message: &str) -> Result<PushOutcome, SyncError>;
}

/// Default commit message, stamped with local time.
pub fn commit_message_now() -> String {
    format!(
        "Update conversation - {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_message_has_timestamp() {
        let msg = commit_message_now();
        let stamp = msg.strip_prefix("Update conversation - ").unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S").is_ok());
    }
}
