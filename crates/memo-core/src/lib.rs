pub mod errors;
pub mod ids;
pub mod messages;
pub mod model;

pub use errors::ModelError;
pub use ids::{MessageId, SessionId};
pub use messages::{Message, Role};
pub use model::{build_history, ChatModel, ChatRole, ChatTurn, SYSTEM_PROMPT};
