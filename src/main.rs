use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use memo_core::ChatModel;
use memo_engine::{Conversation, ConversationOptions, SessionManager, SessionOptions};
use memo_facts::FactClassifier;
use memo_llm::{ClientConfig, OpenAiCompatClient, RetryConfig, RetryingModel};
use memo_settings::{LogFormat, MemoSettings, ModelSettings};
use memo_store::Database;
use memo_sync::{GitSync, LocalSync, SnapshotFile, SnapshotSync};
use memo_telemetry::{LogOutput, TelemetryConfig};

mod commands;
mod repl;

/// Chat with a model while retaining facts across sessions.
#[derive(Debug, Parser)]
#[command(name = "memo", version)]
struct Cli {
    /// Settings file (defaults to ~/.memo/settings.json).
    #[arg(long)]
    config: Option<PathBuf>,

    /// SQLite database path.
    #[arg(long)]
    db_path: Option<String>,

    /// Git working copy holding the snapshot.
    #[arg(long)]
    repo_dir: Option<String>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    log_level: Option<String>,

    /// Keep the snapshot local instead of pushing it through git.
    #[arg(long)]
    no_sync: bool,

    /// Summarize retained replies.
    #[arg(long)]
    extract_context: bool,
}

impl Cli {
    fn apply(&self, settings: &mut MemoSettings) {
        if let Some(path) = &self.db_path {
            settings.store.db_path.clone_from(path);
        }
        if let Some(dir) = &self.repo_dir {
            settings.sync.repo_dir.clone_from(dir);
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.no_sync {
            settings.sync.enabled = false;
        }
        if self.extract_context {
            settings.facts.extract_context = true;
        }
    }
}

fn telemetry_config(settings: &MemoSettings) -> TelemetryConfig {
    let mut config = TelemetryConfig {
        output: match settings.logging.format {
            LogFormat::Compact => LogOutput::Compact,
            LogFormat::Json => LogOutput::Json,
        },
        log_file: settings.logging.file.as_ref().map(PathBuf::from),
        ..Default::default()
    };
    if let Some(level) = memo_telemetry::parse_level(&settings.logging.level) {
        config.log_level = level;
    }
    config
}

fn build_sync(settings: &MemoSettings, mirror: &SnapshotFile) -> Arc<dyn SnapshotSync> {
    if settings.sync.enabled {
        Arc::new(GitSync::with_timeout(
            &settings.sync.repo_dir,
            mirror.clone(),
            Duration::from_secs(settings.sync.timeout_secs),
        ))
    } else {
        Arc::new(LocalSync::beside(mirror))
    }
}

fn build_model(settings: &MemoSettings) -> anyhow::Result<Arc<dyn ChatModel>> {
    let config = ClientConfig {
        base_url: settings.model.base_url.clone(),
        model: settings.model.name.clone(),
        temperature: settings.model.temperature,
        max_tokens: settings.model.max_tokens,
        request_timeout: Duration::from_secs(settings.model.timeout_secs),
    };
    let client = OpenAiCompatClient::from_env(config).context("failed to create model client")?;
    let retry = RetryConfig {
        max_retries: settings.model.max_retries,
        ..Default::default()
    };
    Ok(Arc::new(RetryingModel::new(client, retry)))
}

/// Budget for one turn: every attempt plus a minute of backoff.
fn model_call_timeout(model: &ModelSettings) -> Duration {
    let attempts = u64::from(model.max_retries).saturating_add(1);
    Duration::from_secs(model.timeout_secs.saturating_mul(attempts).saturating_add(60))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => memo_settings::load_settings_from_path(path),
        None => memo_settings::load_settings(),
    }
    .context("failed to load settings")?;
    cli.apply(&mut settings);
    settings.validate().context("invalid settings")?;

    memo_telemetry::init_telemetry(telemetry_config(&settings))
        .context("failed to initialize logging")?;

    let db_path = PathBuf::from(&settings.store.db_path);
    let db = Database::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    info!(path = %db_path.display(), "database opened");

    let mirror = SnapshotFile::new(settings.sync.snapshot_path());
    let sync = build_sync(&settings, &mirror);
    if !settings.sync.enabled {
        warn!("git sync disabled, snapshot stays local");
    }

    let session = SessionManager::new(
        db,
        sync,
        mirror,
        FactClassifier::new(settings.facts.max_words),
        SessionOptions {
            preserve_facts_on_pull_failure: settings.sync.preserve_facts_on_pull_failure,
        },
    );
    let model = build_model(&settings)?;
    let options = ConversationOptions {
        model_timeout: model_call_timeout(&settings.model),
        extract_context: settings.facts.extract_context,
    };
    let convo = Conversation::new(session, model, options);

    let mut repl = repl::Repl::new(convo, std::io::stdout());
    repl.start().await?;

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    repl.run(stdin, shutdown).await?;

    info!("shut down");
    Ok(())
}
