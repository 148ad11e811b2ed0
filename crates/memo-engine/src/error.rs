use memo_store::StoreError;
use memo_sync::SyncError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("no active session")]
    NoActiveSession,
}
