use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use memo_core::{build_history, ChatModel, ChatTurn, ModelError, Role};
use memo_facts::{ContextExtractor, ContextSummary};

use crate::error::EngineError;
use crate::outcome::WriteOutcome;
use crate::session::SessionManager;

#[derive(Clone, Debug)]
pub struct ConversationOptions {
    /// Upper bound on one model call, retries included.
    pub model_timeout: Duration,
    /// Run the context extractor over exchanges whose reply is a fact.
    pub extract_context: bool,
}

impl Default for ConversationOptions {
    fn default() -> Self {
        Self {
            model_timeout: Duration::from_secs(60),
            extract_context: false,
        }
    }
}

/// Result of one user turn.
#[derive(Clone, Debug)]
pub struct TurnReply {
    /// Reply text, or an inline `Error: ...` line when the model failed.
    pub text: String,
    pub is_fact: bool,
    pub context: Option<ContextSummary>,
    /// Whether the reply was recorded.
    pub stored: bool,
    pub error: Option<ModelError>,
    pub warnings: Vec<String>,
}

impl TurnReply {
    fn failed(err: ModelError, warnings: Vec<String>) -> Self {
        Self {
            text: format!("Error: {err}"),
            is_fact: false,
            context: None,
            stored: false,
            error: Some(err),
            warnings,
        }
    }
}

/// Drives user turns: record the input, ask the model with the full session
/// history, classify and record the reply.
pub struct Conversation {
    session: SessionManager,
    model: Arc<dyn ChatModel>,
    extractor: ContextExtractor,
    options: ConversationOptions,
}

impl Conversation {
    pub fn new(session: SessionManager, model: Arc<dyn ChatModel>, options: ConversationOptions) -> Self {
        Self {
            session,
            model,
            extractor: ContextExtractor::default(),
            options,
        }
    }

    pub fn with_extractor(mut self, extractor: ContextExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionManager {
        &mut self.session
    }

    pub fn into_session(self) -> SessionManager {
        self.session
    }

    /// Run one turn. Model failures come back inline in the reply and leave
    /// nothing recorded for the assistant; only reading history can fail.
    #[instrument(skip(self, input), fields(model = self.model.model(), input_len = input.len()))]
    pub async fn turn(&mut self, input: &str) -> Result<TurnReply, EngineError> {
        let mut warnings = Vec::new();

        let user_write = self.session.ingest(Role::User, input, false);
        let mut history = build_history(&self.session.messages()?);
        if let WriteOutcome::Degraded(reason) = user_write {
            warnings.push(reason);
            history.push(ChatTurn::new(Role::User.into(), input));
        }

        let completion = tokio::time::timeout(self.options.model_timeout, self.model.complete(&history))
            .await
            .unwrap_or(Err(ModelError::Timeout(self.options.model_timeout)));

        let text = match completion {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, kind = e.error_kind(), "model call failed");
                return Ok(TurnReply::failed(e, warnings));
            }
        };

        let is_fact = self.session.classifier().is_fact(&text);
        let stored = match self.session.ingest(Role::Assistant, &text, is_fact) {
            WriteOutcome::Applied(_) => true,
            WriteOutcome::Degraded(reason) => {
                warnings.push(reason);
                false
            }
        };

        let context = if self.options.extract_context && is_fact {
            self.extractor.extract(input, &text)
        } else {
            None
        };
        if let Some(summary) = &context {
            debug!(%summary, "context extracted");
        }

        Ok(TurnReply {
            text,
            is_fact,
            context,
            stored,
            error: None,
            warnings,
        })
    }
}
