use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::adapter::{PushOutcome, SnapshotSync};
use crate::error::SyncError;
use crate::snapshot::{Snapshot, SnapshotFile};

/// Result of one git invocation.
#[derive(Clone, Debug, Default)]
pub struct GitOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    pub fn ok() -> Self {
        Self {
            success: true,
            code: Some(0),
            ..Default::default()
        }
    }

    pub fn with_stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::ok()
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs git commands in a working copy.
///
/// A non-zero exit is a successful run with `success == false`; `Err` is
/// reserved for spawn failures and timeouts.
#[async_trait]
pub trait GitRunner: Send + Sync {
    async fn run(&self, repo: &Path, args: &[&str]) -> Result<GitOutput, SyncError>;
}

/// Spawns the `git` binary through tokio.
#[derive(Clone, Debug)]
pub struct TokioGitRunner {
    timeout: Duration,
}

impl TokioGitRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl GitRunner for TokioGitRunner {
    async fn run(&self, repo: &Path, args: &[&str]) -> Result<GitOutput, SyncError> {
        let child = tokio::process::Command::new("git")
            .args(args)
            .current_dir(repo)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| SyncError::Timeout {
                operation: format!("git {}", args.join(" ")),
                after: self.timeout,
            })??;

        Ok(GitOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Snapshot sync over a git working copy.
pub struct GitSync {
    repo_dir: PathBuf,
    file: SnapshotFile,
    runner: Arc<dyn GitRunner>,
}

impl GitSync {
    pub fn new(repo_dir: impl Into<PathBuf>, file: SnapshotFile, runner: Arc<dyn GitRunner>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            file,
            runner,
        }
    }

    /// Production adapter spawning `git` with the given per-command timeout.
    pub fn with_timeout(repo_dir: impl Into<PathBuf>, file: SnapshotFile, timeout: Duration) -> Self {
        Self::new(repo_dir, file, Arc::new(TokioGitRunner::new(timeout)))
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    async fn git(&self, args: &[&str]) -> Result<GitOutput, SyncError> {
        debug!(args = ?args, "git");
        self.runner.run(&self.repo_dir, args).await
    }

    /// Run a command and turn a non-zero exit into `SyncError::Git`.
    async fn git_checked(&self, args: &[&str]) -> Result<GitOutput, SyncError> {
        let output = self.git(args).await?;
        if output.success {
            Ok(output)
        } else {
            Err(SyncError::Git {
                command: args.first().copied().unwrap_or_default().to_string(),
                detail: failure_detail(&output),
            })
        }
    }

    /// Snapshot path as git sees it from inside the working copy.
    fn repo_relative(&self) -> Option<&Path> {
        self.file.path().strip_prefix(&self.repo_dir).ok()
    }

    /// Read the committed snapshot rather than the working file, which holds
    /// the live mirror and may have been cleared locally.
    async fn read_committed(&self) -> Result<Snapshot, SyncError> {
        let Some(rel) = self.repo_relative() else {
            return self.file.read();
        };
        let spec = format!("HEAD:./{}", rel.display());
        let output = self.git(&["show", &spec]).await?;
        if output.success {
            return Snapshot::from_json(&output.stdout);
        }
        let detail = failure_detail(&output);
        if detail.contains("does not exist")
            || detail.contains("not in 'HEAD'")
            || detail.contains("invalid object name")
        {
            Err(SyncError::SnapshotMissing(self.file.path().to_path_buf()))
        } else {
            Err(SyncError::Git {
                command: "show".into(),
                detail,
            })
        }
    }

    /// `git diff --cached --quiet` exits 1 when something is staged.
    async fn has_staged_changes(&self, file: &str) -> Result<bool, SyncError> {
        let output = self.git(&["diff", "--cached", "--quiet", "--", file]).await?;
        match output.code {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(SyncError::Git {
                command: "diff".into(),
                detail: failure_detail(&output),
            }),
        }
    }
}

fn failure_detail(output: &GitOutput) -> String {
    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    match output.code {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}

#[async_trait]
impl SnapshotSync for GitSync {
    fn name(&self) -> &str {
        "git"
    }

    #[instrument(skip(self), fields(repo = %self.repo_dir.display()))]
    async fn pull(&self) -> Result<Snapshot, SyncError> {
        self.git_checked(&["pull"]).await?;
        let snapshot = self.read_committed().await?;
        info!(entries = snapshot.len(), "pulled snapshot");
        Ok(snapshot)
    }

    #[instrument(skip(self, snapshot), fields(repo = %self.repo_dir.display(), entries = snapshot.len()))]
    async fn push(&self, snapshot: &Snapshot, message: &str) -> Result<PushOutcome, SyncError> {
        self.file.write(snapshot)?;
        let file = self
            .repo_relative()
            .unwrap_or(self.file.path())
            .to_string_lossy()
            .into_owned();

        self.git_checked(&["add", "--", &file]).await?;

        let committed = self.has_staged_changes(&file).await?;
        if committed {
            self.git_checked(&["commit", "-m", message]).await?;
        } else {
            debug!("snapshot unchanged, skipping commit");
        }

        if let Err(first) = self.git_checked(&["push"]).await {
            warn!(error = %first, "push rejected, rebasing and retrying");
            self.git_checked(&["pull", "--rebase"]).await?;
            self.git_checked(&["push"]).await?;
            info!("pushed snapshot after rebase");
            return Ok(PushOutcome { committed, retried: true });
        }

        info!(committed, "pushed snapshot");
        Ok(PushOutcome { committed, retried: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memo_core::{MessageId, Role};
    use parking_lot::Mutex;
    use std::collections::HashMap;

    use crate::snapshot::SnapshotEntry;

    /// Records every call and answers from a per-command script.
    /// Commands without a scripted answer succeed.
    #[derive(Default)]
    struct ScriptedGit {
        calls: Mutex<Vec<String>>,
        script: Mutex<HashMap<String, Vec<Result<GitOutput, SyncError>>>>,
    }

    impl ScriptedGit {
        fn on(self, command: &str, result: Result<GitOutput, SyncError>) -> Self {
            self.script
                .lock()
                .entry(command.to_string())
                .or_default()
                .push(result);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl GitRunner for ScriptedGit {
        async fn run(&self, _repo: &Path, args: &[&str]) -> Result<GitOutput, SyncError> {
            // Key on the command words, not on paths or messages.
            let key = args
                .iter()
                .take_while(|a| **a != "--" && **a != "-m" && !a.contains(':'))
                .copied()
                .collect::<Vec<_>>()
                .join(" ");
            self.calls.lock().push(key.clone());
            let mut script = self.script.lock();
            match script.get_mut(&key) {
                Some(queue) if !queue.is_empty() => queue.remove(0),
                _ => Ok(GitOutput::ok()),
            }
        }
    }

    fn sample() -> Snapshot {
        Snapshot::new(vec![SnapshotEntry {
            id: MessageId::from_raw("msg_1"),
            role: Role::Assistant,
            content: "An API is an interface.".into(),
            is_fact: None,
        }])
    }

    fn setup(runner: ScriptedGit) -> (tempfile::TempDir, Arc<ScriptedGit>, GitSync) {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(runner);
        let file = SnapshotFile::new(dir.path().join("context.json"));
        let sync = GitSync::new(dir.path(), file, runner.clone());
        (dir, runner, sync)
    }

    #[tokio::test]
    async fn push_stages_commits_and_pushes() {
        let runner = ScriptedGit::default().on("diff --cached --quiet", Ok(GitOutput::failed(1, "")));
        let (dir, runner, sync) = setup(runner);

        let outcome = sync.push(&sample(), "Update conversation").await.unwrap();

        assert_eq!(outcome, PushOutcome { committed: true, retried: false });
        assert_eq!(runner.calls(), ["add", "diff --cached --quiet", "commit", "push"]);
        let written = SnapshotFile::new(dir.path().join("context.json")).read().unwrap();
        assert_eq!(written, sample());
    }

    #[tokio::test]
    async fn push_skips_commit_when_nothing_staged() {
        let (_dir, runner, sync) = setup(ScriptedGit::default());

        let outcome = sync.push(&sample(), "msg").await.unwrap();

        assert!(!outcome.committed);
        assert_eq!(runner.calls(), ["add", "diff --cached --quiet", "push"]);
    }

    #[tokio::test]
    async fn rejected_push_rebases_once_and_retries() {
        let runner = ScriptedGit::default()
            .on("diff --cached --quiet", Ok(GitOutput::failed(1, "")))
            .on("push", Ok(GitOutput::failed(1, "! [rejected] main -> main (fetch first)")));
        let (_dir, runner, sync) = setup(runner);

        let outcome = sync.push(&sample(), "msg").await.unwrap();

        assert!(outcome.retried);
        assert_eq!(
            runner.calls(),
            ["add", "diff --cached --quiet", "commit", "push", "pull --rebase", "push"]
        );
    }

    #[tokio::test]
    async fn second_push_failure_is_reported() {
        let runner = ScriptedGit::default()
            .on("push", Ok(GitOutput::failed(1, "rejected")))
            .on("push", Ok(GitOutput::failed(128, "remote hung up")));
        let (_dir, _runner, sync) = setup(runner);

        let err = sync.push(&sample(), "msg").await.unwrap_err();
        match err {
            SyncError::Git { command, detail } => {
                assert_eq!(command, "push");
                assert_eq!(detail, "remote hung up");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn failed_rebase_stops_the_retry() {
        let runner = ScriptedGit::default()
            .on("push", Ok(GitOutput::failed(1, "rejected")))
            .on("pull --rebase", Ok(GitOutput::failed(1, "CONFLICT")));
        let (_dir, runner, sync) = setup(runner);

        let err = sync.push(&sample(), "msg").await.unwrap_err();
        assert!(matches!(err, SyncError::Git { ref command, .. } if command == "pull"));
        assert_eq!(runner.calls().last().map(String::as_str), Some("pull --rebase"));
    }

    #[tokio::test]
    async fn pull_reads_the_committed_snapshot() {
        let committed = sample().to_json().unwrap();
        let (dir, runner, sync) = setup(ScriptedGit::default().on("show", Ok(GitOutput::with_stdout(committed))));
        // Working copy was cleared locally; the committed version wins.
        SnapshotFile::new(dir.path().join("context.json")).clear().unwrap();

        let snapshot = sync.pull().await.unwrap();

        assert_eq!(snapshot, sample());
        assert_eq!(runner.calls(), ["pull", "show"]);
    }

    #[tokio::test]
    async fn pull_without_committed_snapshot_is_missing() {
        let runner = ScriptedGit::default().on(
            "show",
            Ok(GitOutput::failed(128, "fatal: path 'context.json' does not exist in 'HEAD'")),
        );
        let (_dir, _runner, sync) = setup(runner);
        assert!(matches!(sync.pull().await, Err(SyncError::SnapshotMissing(_))));
    }

    #[tokio::test]
    async fn pull_with_corrupt_snapshot_is_a_snapshot_error() {
        let runner = ScriptedGit::default().on("show", Ok(GitOutput::with_stdout("[{\"id\": 1")));
        let (_dir, _runner, sync) = setup(runner);
        assert!(matches!(sync.pull().await, Err(SyncError::Snapshot(_))));
    }

    #[tokio::test]
    async fn failed_pull_does_not_read_the_snapshot() {
        let runner = ScriptedGit::default().on("pull", Ok(GitOutput::failed(1, "could not resolve host")));
        let (_dir, runner, sync) = setup(runner);

        let err = sync.pull().await.unwrap_err();
        assert_eq!(err.to_string(), "git pull failed: could not resolve host");
        assert_eq!(runner.calls(), ["pull"]);
    }

    #[tokio::test]
    async fn snapshot_outside_the_repo_is_read_from_disk() {
        let repo = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let file = SnapshotFile::new(elsewhere.path().join("context.json"));
        file.write(&sample()).unwrap();
        let runner = Arc::new(ScriptedGit::default());
        let sync = GitSync::new(repo.path(), file, runner.clone());

        assert_eq!(sync.pull().await.unwrap(), sample());
        assert_eq!(runner.calls(), ["pull"]);
    }

    #[tokio::test]
    async fn runner_timeout_propagates() {
        let timeout = SyncError::Timeout {
            operation: "git pull".into(),
            after: Duration::from_secs(1),
        };
        let (_dir, _runner, sync) = setup(ScriptedGit::default().on("pull", Err(timeout)));

        assert!(matches!(sync.pull().await, Err(SyncError::Timeout { .. })));
    }

    #[test]
    fn failure_detail_falls_back_to_exit_code() {
        assert_eq!(failure_detail(&GitOutput::failed(128, "  ")), "exit status 128");
        assert_eq!(failure_detail(&GitOutput::failed(1, "fatal: nope\n")), "fatal: nope");
    }

    #[tokio::test]
    async fn tokio_runner_reports_missing_directory_as_io() {
        let runner = TokioGitRunner::new(Duration::from_secs(5));
        let result = runner.run(Path::new("/nonexistent/memo/repo"), &["status"]).await;
        assert!(matches!(result, Err(SyncError::Io(_))));
    }
}
