use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ModelError;
use crate::messages::{Message, Role};

/// Fixed instruction prepended to every model call.
pub const SYSTEM_PROMPT: &str = "You are a concise assistant. Keep responses brief and to the point. Use short sentences and avoid unnecessary details.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl From<Role> for ChatRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => Self::User,
            Role::Assistant => Self::Assistant,
        }
    }
}

/// One turn of the history handed to the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }
}

impl From<&Message> for ChatTurn {
    fn from(msg: &Message) -> Self {
        Self::new(msg.role.into(), msg.content.clone())
    }
}

/// Build the model input: the system instruction followed by stored history.
pub fn build_history<'a>(messages: impl IntoIterator<Item = &'a Message>) -> Vec<ChatTurn> {
    std::iter::once(ChatTurn::system(SYSTEM_PROMPT))
        .chain(messages.into_iter().map(ChatTurn::from))
        .collect()
}

/// The language-model collaborator: one reply per history.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    async fn complete(&self, history: &[ChatTurn]) -> Result<String, ModelError>;
}
