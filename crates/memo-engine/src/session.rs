use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use memo_core::{Message, MessageId, Role, SessionId};
use memo_facts::FactClassifier;
use memo_store::{Database, FactRepo, FactRow, MessageRepo, NewFact, SessionRepo, SessionRow};
use memo_sync::{
    commit_message_now, PushOutcome, Snapshot, SnapshotEntry, SnapshotFile, SnapshotSync,
};

use crate::error::EngineError;
use crate::outcome::WriteOutcome;

pub const CLEAR_COMMIT_MESSAGE: &str = "Clear all memory";

#[derive(Clone, Debug, Default)]
pub struct SessionOptions {
    /// Keep local facts when the startup pull fails.
    pub preserve_facts_on_pull_failure: bool,
}

/// What happened while starting a session.
#[derive(Clone, Debug)]
pub struct InitReport {
    pub session: SessionRow,
    /// Facts imported from the pulled snapshot.
    pub imported: usize,
    /// Local facts dropped because the pull failed.
    pub discarded_facts: usize,
    pub pull_error: Option<String>,
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PushStatus {
    Pushed(PushOutcome),
    NothingToSave,
    Failed(String),
}

impl PushStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// What happened while saving and closing a session.
#[derive(Clone, Debug)]
pub struct FlushReport {
    pub session: Option<SessionId>,
    /// Messages included in the pushed snapshot.
    pub messages: usize,
    pub push: PushStatus,
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct EndReport {
    pub flush: FlushReport,
    pub init: InitReport,
}

#[derive(Clone, Debug)]
pub struct ClearReport {
    pub push: PushStatus,
    pub warnings: Vec<String>,
}

/// Owns the session lifecycle and keeps the store, the snapshot mirror and
/// the remote snapshot in step.
///
/// Write paths never fail the caller: storage errors come back as
/// [`WriteOutcome::Degraded`] and sync errors are reported in the returned
/// reports. Read paths propagate errors.
pub struct SessionManager {
    db: Database,
    message_repo: MessageRepo,
    fact_repo: FactRepo,
    session_repo: SessionRepo,
    sync: Arc<dyn SnapshotSync>,
    mirror: SnapshotFile,
    classifier: FactClassifier,
    options: SessionOptions,
    active: Option<SessionId>,
}

impl SessionManager {
    pub fn new(
        db: Database,
        sync: Arc<dyn SnapshotSync>,
        mirror: SnapshotFile,
        classifier: FactClassifier,
        options: SessionOptions,
    ) -> Self {
        Self {
            message_repo: MessageRepo::new(db.clone()),
            fact_repo: FactRepo::new(db.clone()),
            session_repo: SessionRepo::new(db.clone()),
            db,
            sync,
            mirror,
            classifier,
            options,
            active: None,
        }
    }

    pub fn active_session(&self) -> Option<&SessionId> {
        self.active.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn classifier(&self) -> &FactClassifier {
        &self.classifier
    }

    pub fn mirror(&self) -> &SnapshotFile {
        &self.mirror
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn require_active(&self) -> Result<&SessionId, EngineError> {
        self.active.as_ref().ok_or(EngineError::NoActiveSession)
    }

    /// Open a new session and import the latest remote snapshot as facts.
    ///
    /// Only a failure to open the session row is an error. Snapshots are
    /// pushed newest-first, so entries are imported in reverse to restore
    /// chronological order.
    #[instrument(skip(self), fields(sync = self.sync.name()))]
    pub async fn init(&mut self) -> Result<InitReport, EngineError> {
        let row = self.session_repo.open()?;
        self.active = Some(row.id.clone());
        info!(session_id = %row.id, "session started");

        let mut report = InitReport {
            session: row,
            imported: 0,
            discarded_facts: 0,
            pull_error: None,
            warnings: Vec::new(),
        };

        // Earlier sessions were flushed into the snapshot on close; their
        // working rows are never listed again.
        match self.message_repo.prune_closed() {
            Ok(0) => {}
            Ok(pruned) => debug!(pruned, "pruned context of closed sessions"),
            Err(e) => {
                warn!(error = %e, "failed to prune closed sessions");
                report.warnings.push(format!("failed to prune old messages: {e}"));
            }
        }

        match self.sync.pull().await {
            Ok(snapshot) => {
                let entries: Vec<NewFact> = snapshot
                    .entries
                    .into_iter()
                    .rev()
                    .map(|e| NewFact {
                        role: e.role,
                        content: e.content,
                    })
                    .collect();
                match self.fact_repo.replace(&report.session.id, &entries) {
                    Ok(imported) => report.imported = imported.len(),
                    Err(e) => {
                        warn!(error = %e, "failed to import snapshot facts");
                        report.warnings.push(format!("failed to import facts: {e}"));
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, kind = e.error_kind(), "snapshot pull failed");
                report.pull_error = Some(e.to_string());
                if self.options.preserve_facts_on_pull_failure {
                    info!("keeping local facts after failed pull");
                } else {
                    match self.fact_repo.clear() {
                        Ok(discarded) => {
                            if discarded > 0 {
                                warn!(discarded, "local facts discarded after failed pull");
                            }
                            report.discarded_facts = discarded;
                        }
                        Err(e) => report.warnings.push(format!("failed to clear facts: {e}")),
                    }
                }
            }
        }

        if let Err(e) = self.rewrite_mirror() {
            warn!(error = %e, "failed to rewrite snapshot file");
            report.warnings.push(format!("failed to rewrite snapshot file: {e}"));
        }

        Ok(report)
    }

    /// Record a message, then append it to the snapshot mirror.
    ///
    /// These are two sinks written in sequence. Between the store commit and
    /// the append the mirror is one entry behind; if the append fails it stays
    /// behind until the next full rewrite (delete, init or end).
    #[instrument(skip(self, content), fields(content_len = content.len()))]
    pub fn ingest(&self, role: Role, content: &str, is_fact: bool) -> WriteOutcome<Message> {
        let Some(session_id) = self.active.as_ref() else {
            return WriteOutcome::Degraded("no active session".into());
        };

        let msg = match self.message_repo.insert(session_id, role, content, is_fact) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "failed to store message");
                return WriteOutcome::Degraded(format!("failed to store message: {e}"));
            }
        };

        if let Err(e) = self.mirror.append(SnapshotEntry::from(&msg)) {
            warn!(error = %e, message_id = %msg.id, "failed to mirror message");
        }
        WriteOutcome::Applied(msg)
    }

    /// Messages of the active session, oldest first.
    pub fn messages(&self) -> Result<Vec<Message>, EngineError> {
        Ok(self.message_repo.list(self.require_active()?)?)
    }

    /// Fact-flagged messages of the active session, oldest first.
    pub fn facts(&self) -> Result<Vec<Message>, EngineError> {
        Ok(self.message_repo.list_facts(self.require_active()?)?)
    }

    /// Messages of the active session containing `keyword`, ignoring case.
    pub fn search(&self, keyword: &str) -> Result<Vec<Message>, EngineError> {
        Ok(self.message_repo.search(self.require_active()?, keyword)?)
    }

    /// The long-term facts table.
    pub fn long_term_facts(&self) -> Result<Vec<FactRow>, EngineError> {
        Ok(self.fact_repo.list()?)
    }

    /// Delete one message (and its fact row) and rewrite the mirror.
    /// `Applied(false)` means no message had that id.
    #[instrument(skip(self))]
    pub fn delete(&self, id: &str) -> WriteOutcome<bool> {
        let id = MessageId::from_raw(id);
        let removed = match self.message_repo.delete(&id) {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "failed to delete message");
                return WriteOutcome::Degraded(format!("failed to delete {id}: {e}"));
            }
        };

        if removed && self.is_active() {
            if let Err(e) = self.rewrite_mirror() {
                warn!(error = %e, "failed to rewrite snapshot file");
            }
        }
        WriteOutcome::Applied(removed)
    }

    /// Wipe every message and fact, then publish an empty snapshot.
    #[instrument(skip(self))]
    pub async fn delete_all(&self) -> WriteOutcome<ClearReport> {
        if let Err(e) = self.message_repo.delete_all() {
            warn!(error = %e, "failed to wipe memory");
            return WriteOutcome::Degraded(format!("failed to wipe memory: {e}"));
        }

        let mut warnings = Vec::new();
        let empty = Snapshot::default();
        if let Err(e) = self.mirror.write(&empty) {
            warn!(error = %e, "failed to clear snapshot file");
            warnings.push(format!("failed to clear snapshot file: {e}"));
        }

        let push = match self.sync.push(&empty, CLEAR_COMMIT_MESSAGE).await {
            Ok(outcome) => PushStatus::Pushed(outcome),
            Err(e) => {
                warn!(error = %e, kind = e.error_kind(), "failed to publish cleared snapshot");
                PushStatus::Failed(e.to_string())
            }
        };
        WriteOutcome::Applied(ClearReport { push, warnings })
    }

    /// Push the session, clear local context and start a fresh session.
    /// A failed push is reported and does not stop the rotation.
    #[instrument(skip(self))]
    pub async fn end(&mut self) -> Result<EndReport, EngineError> {
        let mut flush = self.flush().await;

        if let Err(e) = self.message_repo.clear_context() {
            warn!(error = %e, "failed to clear context");
            flush.warnings.push(format!("failed to clear context: {e}"));
        }
        if let Err(e) = self.mirror.clear() {
            warn!(error = %e, "failed to clear snapshot file");
            flush.warnings.push(format!("failed to clear snapshot file: {e}"));
        }

        let init = self.init().await?;
        Ok(EndReport { flush, init })
    }

    /// Push the session and close it without starting another.
    #[instrument(skip(self))]
    pub async fn close(&mut self) -> FlushReport {
        self.flush().await
    }

    async fn flush(&mut self) -> FlushReport {
        let Some(session_id) = self.active.take() else {
            return FlushReport {
                session: None,
                messages: 0,
                push: PushStatus::NothingToSave,
                warnings: Vec::new(),
            };
        };
        let mut warnings = Vec::new();

        let (count, push) = match self.message_repo.list(&session_id) {
            Ok(messages) if messages.is_empty() => {
                info!("no messages to save");
                (0, PushStatus::NothingToSave)
            }
            Ok(messages) => {
                let snapshot = Snapshot::newest_first(&messages);
                if let Err(e) = self.mirror.write(&snapshot) {
                    warn!(error = %e, "failed to write snapshot file");
                    warnings.push(format!("failed to write snapshot file: {e}"));
                }
                let push = match self.sync.push(&snapshot, &commit_message_now()).await {
                    Ok(outcome) => {
                        info!(
                            entries = snapshot.len(),
                            committed = outcome.committed,
                            retried = outcome.retried,
                            "session saved"
                        );
                        PushStatus::Pushed(outcome)
                    }
                    Err(e) => {
                        warn!(error = %e, kind = e.error_kind(), "failed to push snapshot");
                        PushStatus::Failed(e.to_string())
                    }
                };
                (messages.len(), push)
            }
            Err(e) => {
                warn!(error = %e, "failed to read session messages");
                (0, PushStatus::Failed(format!("failed to read session: {e}")))
            }
        };

        match self.session_repo.close(&session_id) {
            Ok(_) => debug!(session_id = %session_id, "session closed"),
            Err(e) => {
                warn!(error = %e, "failed to close session");
                warnings.push(format!("failed to close session: {e}"));
            }
        }

        FlushReport {
            session: Some(session_id),
            messages: count,
            push,
            warnings,
        }
    }

    fn rewrite_mirror(&self) -> Result<usize, EngineError> {
        let messages = self.message_repo.list(self.require_active()?)?;
        self.mirror.write(&Snapshot::from_messages(&messages))?;
        Ok(messages.len())
    }
}
