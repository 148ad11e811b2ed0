//! The interactive command loop.

use std::future::Future;
use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use memo_core::Message;
use memo_engine::{
    Conversation, EngineError, FlushReport, InitReport, PushStatus, WriteOutcome,
};

use crate::commands::{Command, HELP};

pub struct Repl<W: Write> {
    convo: Conversation,
    out: W,
}

impl<W: Write> Repl<W> {
    pub fn new(convo: Conversation, out: W) -> Self {
        Self { convo, out }
    }

    /// Open the first session. Failing to open it is the only fatal error.
    pub async fn start(&mut self) -> Result<()> {
        let report = self.convo.session_mut().init().await?;
        self.print_init(&report)?;
        writeln!(self.out, "Type /help for available commands.")?;
        Ok(())
    }

    /// Read lines until `/exit`, end of input or `shutdown` resolves, then
    /// save the session. The session is saved even when the loop itself
    /// fails; that error is returned afterwards.
    pub async fn run<R, S>(&mut self, input: R, shutdown: S) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        S: Future<Output = ()>,
    {
        let looped = self.command_loop(input, shutdown).await;
        if let Err(e) = &looped {
            warn!(error = %e, "command loop failed");
        }

        let report = self.convo.session_mut().close().await;
        self.print_flush(&report)?;
        writeln!(self.out, "Goodbye!")?;
        looped
    }

    async fn command_loop<R, S>(&mut self, mut input: R, shutdown: S) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut buf = Vec::new();

        loop {
            self.prompt()?;
            buf.clear();
            let read = tokio::select! {
                read = input.read_until(b'\n', &mut buf) => Some(read),
                () = &mut shutdown => None,
            };
            match read {
                None => return self.interrupted(),
                Some(Ok(0)) => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "failed to read input");
                    writeln!(self.out, "\nError: could not read input: {e}")?;
                    return Ok(());
                }
            }

            // Undecodable bytes are replaced rather than rejected.
            let line = String::from_utf8_lossy(&buf);
            let Some(command) = Command::parse(&line) else { continue };
            debug!(?command, "command");

            // An interrupt abandons the running command; the session is
            // still saved by `run`.
            let keep_going = tokio::select! {
                flow = self.handle(command) => Some(flow?),
                () = &mut shutdown => None,
            };
            match keep_going {
                Some(true) => {}
                Some(false) => return Ok(()),
                None => return self.interrupted(),
            }
        }
    }

    fn interrupted(&mut self) -> Result<()> {
        info!("interrupted");
        writeln!(self.out)?;
        Ok(())
    }

    fn prompt(&mut self) -> Result<()> {
        write!(self.out, "> ")?;
        self.out.flush()?;
        Ok(())
    }

    /// Returns `false` when the loop should stop.
    async fn handle(&mut self, command: Command) -> Result<bool> {
        match command {
            Command::Help => writeln!(self.out, "{HELP}")?,
            Command::Memory => {
                let listed = self.convo.session().messages();
                self.print_listing(listed, "No memory stored yet.")?;
            }
            Command::Facts => {
                let listed = self.convo.session().facts();
                self.print_listing(listed, "No facts available in this session.")?;
            }
            Command::Search(keyword) => {
                let listed = self.convo.session().search(&keyword);
                let empty = format!("No messages containing: '{keyword}'");
                self.print_listing(listed, &empty)?;
            }
            Command::SearchUsage => writeln!(self.out, "Usage: /search <keyword>")?,
            Command::DeleteUsage => writeln!(self.out, "Usage: /delete <message_id> or /delete all")?,
            Command::Delete(id) => match self.convo.session().delete(&id) {
                WriteOutcome::Applied(true) => writeln!(self.out, "Deleted message with ID {id}")?,
                WriteOutcome::Applied(false) => writeln!(self.out, "No message with ID {id}")?,
                WriteOutcome::Degraded(reason) => writeln!(self.out, "Could not delete: {reason}")?,
            },
            Command::DeleteAll => match self.convo.session().delete_all().await {
                WriteOutcome::Applied(report) => {
                    writeln!(self.out, "All memory deleted.")?;
                    if let PushStatus::Failed(e) = &report.push {
                        writeln!(self.out, "Failed to publish cleared memory: {e}")?;
                    }
                }
                WriteOutcome::Degraded(reason) => {
                    writeln!(self.out, "Could not delete memory: {reason}")?
                }
            },
            Command::Reset => match self.convo.session_mut().end().await {
                Ok(report) => {
                    self.print_flush(&report.flush)?;
                    self.print_init(&report.init)?;
                }
                Err(e) => {
                    warn!(error = %e, "failed to start a new session");
                    writeln!(self.out, "Error: {e}")?;
                }
            },
            Command::Exit => return Ok(false),
            Command::Turn(text) => match self.convo.turn(&text).await {
                Ok(reply) => {
                    writeln!(self.out, "{}", reply.text)?;
                    if let Some(summary) = &reply.context {
                        writeln!(self.out, "  ({summary})")?;
                    }
                }
                Err(e) => writeln!(self.out, "Error: {e}")?,
            },
        }
        Ok(true)
    }

    fn print_listing(&mut self, listed: Result<Vec<Message>, EngineError>, empty: &str) -> Result<()> {
        let messages = match listed {
            Ok(messages) => messages,
            Err(e) => {
                writeln!(self.out, "Error: {e}")?;
                return Ok(());
            }
        };
        if messages.is_empty() {
            writeln!(self.out, "{empty}")?;
            return Ok(());
        }
        for (i, msg) in messages.iter().enumerate() {
            writeln!(
                self.out,
                "{}. [ID: {}] [{}] {}",
                i + 1,
                msg.id,
                msg.role.as_str().to_uppercase(),
                msg.content
            )?;
        }
        Ok(())
    }

    fn print_init(&mut self, report: &InitReport) -> Result<()> {
        if let Some(e) = &report.pull_error {
            writeln!(self.out, "Could not load facts: {e}")?;
        }
        if report.discarded_facts > 0 {
            writeln!(self.out, "Discarded {} local facts.", report.discarded_facts)?;
        }
        if report.imported > 0 {
            writeln!(self.out, "Loaded {} facts.", report.imported)?;
        }
        writeln!(self.out, "Session {} started.", report.session.id)?;
        Ok(())
    }

    fn print_flush(&mut self, report: &FlushReport) -> Result<()> {
        match &report.push {
            PushStatus::Pushed(outcome) if outcome.retried => {
                writeln!(self.out, "Conversation saved after resolving conflicts.")?
            }
            PushStatus::Pushed(_) => writeln!(self.out, "Conversation saved.")?,
            PushStatus::NothingToSave if report.session.is_some() => {
                writeln!(self.out, "No messages to save.")?
            }
            PushStatus::NothingToSave => {}
            PushStatus::Failed(e) => writeln!(self.out, "Failed to save conversation: {e}")?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use memo_engine::{ConversationOptions, SessionManager, SessionOptions};
    use memo_facts::FactClassifier;
    use memo_llm::MockModel;
    use memo_store::Database;
    use memo_sync::{MockSync, SnapshotFile, SyncError};

    struct Harness {
        dir: tempfile::TempDir,
        sync: Arc<MockSync>,
        repl: Repl<Vec<u8>>,
    }

    async fn harness(model: MockModel) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let sync = Arc::new(MockSync::new());
        let session = SessionManager::new(
            Database::in_memory().unwrap(),
            sync.clone(),
            SnapshotFile::new(dir.path().join("context.json")),
            FactClassifier::default(),
            SessionOptions::default(),
        );
        let convo = Conversation::new(session, Arc::new(model), ConversationOptions::default());
        let mut repl = Repl::new(convo, Vec::new());
        repl.start().await.unwrap();
        Harness { dir, sync, repl }
    }

    async fn drive(h: &mut Harness, script: &str) -> String {
        h.repl
            .run(script.as_bytes(), std::future::pending())
            .await
            .unwrap();
        String::from_utf8(std::mem::take(&mut h.repl.out)).unwrap()
    }

    #[tokio::test]
    async fn turn_then_memory_lists_both_messages() {
        let model = MockModel::new().then_ok("An API is an interface.");
        let mut h = harness(model).await;

        let out = drive(&mut h, "What is an API?\n/memory\n/facts\n/exit\n").await;

        assert!(out.contains("An API is an interface.\n"));
        assert!(out.contains("1. [ID: msg_"));
        assert!(out.contains("[USER] What is an API?"));
        assert!(out.contains("2. [ID: "));
        // /facts lists only the assistant reply, numbered from one
        assert_eq!(out.matches("[ASSISTANT] An API is an interface.").count(), 2);
        assert!(out.contains("Conversation saved."));
        assert!(out.ends_with("Goodbye!\n"));
        assert_eq!(h.sync.pushes().len(), 1);
    }

    #[tokio::test]
    async fn delete_all_then_memory_shows_nothing() {
        let model = MockModel::new().then_ok("An API is an interface.");
        let mut h = harness(model).await;

        let out = drive(&mut h, "What is an API?\n/delete all\n/memory\n/exit\n").await;

        assert!(out.contains("All memory deleted."));
        assert!(out.contains("No memory stored yet."));
        assert!(out.contains("No messages to save."));
        let mirror = std::fs::read_to_string(h.dir.path().join("context.json")).unwrap();
        assert_eq!(mirror, "[]");
    }

    #[tokio::test]
    async fn usage_and_empty_results() {
        let mut h = harness(MockModel::new()).await;

        let out = drive(&mut h, "\n/delete\n/search\n/search kafka\n/facts\n/delete msg_nope\n").await;

        assert!(out.contains("Usage: /delete <message_id> or /delete all"));
        assert!(out.contains("Usage: /search <keyword>"));
        assert!(out.contains("No messages containing: 'kafka'"));
        assert!(out.contains("No facts available in this session."));
        assert!(out.contains("No message with ID msg_nope"));
    }

    #[tokio::test]
    async fn model_error_is_printed_inline() {
        let model = MockModel::new().then_err(memo_core::ModelError::Network("down".into()));
        let mut h = harness(model).await;

        let out = drive(&mut h, "hello\n").await;
        assert!(out.contains("Error: network error: down\n"));
    }

    #[tokio::test]
    async fn reset_reports_push_failure_and_starts_new_session() {
        let model = MockModel::new().then_ok("ok thanks");
        let mut h = harness(model).await;
        h.sync.fail_pushes(SyncError::Git {
            command: "push".into(),
            detail: "rejected".into(),
        });

        let out = drive(&mut h, "hi\n/reset\n/memory\n").await;

        assert!(out.contains("Failed to save conversation: git push failed: rejected"));
        assert!(out.contains("Session sess_"));
        assert!(out.contains("No memory stored yet."));
    }

    #[tokio::test]
    async fn shutdown_signal_saves_session() {
        let model = MockModel::new().then_ok("ok thanks");
        let mut h = harness(model).await;
        let (_tx, rx) = tokio::io::duplex(64);
        let input = tokio::io::BufReader::new(rx);

        h.repl.run(input, async {}).await.unwrap();

        let out = String::from_utf8(h.repl.out.clone()).unwrap();
        assert!(out.ends_with("Goodbye!\n"));
        assert!(!h.repl.convo.session().is_active());
    }

    #[tokio::test]
    async fn undecodable_line_does_not_lose_the_session() {
        let model = MockModel::new().then_ok("An API is an interface.").then_ok("noted");
        let mut h = harness(model).await;

        let input: &[u8] = b"What is an API?\n\xff\xfe\n/exit\n";
        h.repl.run(input, std::future::pending()).await.unwrap();

        let out = String::from_utf8(h.repl.out.clone()).unwrap();
        assert!(out.contains("Conversation saved."));
        assert!(out.ends_with("Goodbye!\n"));
        assert_eq!(h.sync.pushes().len(), 1);
        assert!(!h.repl.convo.session().is_active());
    }

    #[tokio::test]
    async fn reset_with_broken_store_keeps_looping() {
        let model = MockModel::new().then_ok("ok thanks");
        let mut h = harness(model).await;
        h.repl
            .convo
            .session()
            .database()
            .with_conn(|conn| Ok(conn.execute_batch("DROP TABLE sessions")?))
            .unwrap();

        let out = drive(&mut h, "hi\n/reset\n/memory\n/exit\n").await;

        assert!(out.contains("Error: store error:"));
        assert!(out.contains("Error: no active session"));
        assert!(out.ends_with("Goodbye!\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_during_model_call_saves_session() {
        let model = MockModel::new()
            .then_ok("too late")
            .with_delay(Duration::from_secs(3600));
        let mut h = harness(model).await;
        let started = tokio::time::Instant::now();

        let input: &[u8] = b"hello\n/memory\n";
        h.repl
            .run(input, tokio::time::sleep(Duration::from_secs(1)))
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(60));
        let out = String::from_utf8(h.repl.out.clone()).unwrap();
        assert!(!out.contains("too late"));
        assert!(out.contains("Conversation saved."));
        assert_eq!(h.sync.pushes().len(), 1);
        assert!(!h.repl.convo.session().is_active());
    }
}
