use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use memo_core::{ChatModel, ChatTurn, ModelError};

/// Scripted model for tests. Replies are consumed in order; an exhausted
/// script yields `ModelError::InvalidResponse`.
#[derive(Default)]
pub struct MockModel {
    replies: Mutex<VecDeque<Result<String, ModelError>>>,
    histories: Mutex<Vec<Vec<ChatTurn>>>,
    delay: Option<Duration>,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_ok(self, text: impl Into<String>) -> Self {
        self.replies.lock().push_back(Ok(text.into()));
        self
    }

    pub fn then_err(self, err: ModelError) -> Self {
        self.replies.lock().push_back(Err(err));
        self
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.histories.lock().len()
    }

    /// Every history the model was called with.
    pub fn histories(&self) -> Vec<Vec<ChatTurn>> {
        self.histories.lock().clone()
    }
}

#[async_trait]
impl ChatModel for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, history: &[ChatTurn]) -> Result<String, ModelError> {
        self.histories.lock().push(history.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::InvalidResponse("no scripted reply".into())))
    }
}
