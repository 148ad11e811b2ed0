use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug, thiserror::Error)]
pub enum SyncError {
    #[error("git {command} failed: {detail}")]
    Git { command: String, detail: String },

    #[error("snapshot file not found: {}", .0.display())]
    SnapshotMissing(PathBuf),

    #[error("IO error: {0}")]
    Io(String),

    #[error("malformed snapshot: {0}")]
    Snapshot(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },
}

impl SyncError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Git { .. } => "git",
            Self::SnapshotMissing(_) => "snapshot_missing",
            Self::Io(_) => "io",
            Self::Snapshot(_) => "snapshot",
            Self::Timeout { .. } => "timeout",
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        SyncError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Snapshot(e.to_string())
    }
}
