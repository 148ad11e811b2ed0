//! Snapshot exchange with the remote fact store.
//!
//! The snapshot is a JSON array of `{id, role, content}` entries. It is
//! mirrored to a local file on every write and pushed through a
//! [`SnapshotSync`] implementation when a session ends.

pub mod adapter;
pub mod error;
pub mod git;
pub mod local;
pub mod mock;
pub mod snapshot;

pub use adapter::{commit_message_now, PushOutcome, SnapshotSync};
pub use error::SyncError;
pub use git::{GitOutput, GitRunner, GitSync, TokioGitRunner};
pub use local::LocalSync;
pub use mock::MockSync;
pub use snapshot::{Snapshot, SnapshotEntry, SnapshotFile};
