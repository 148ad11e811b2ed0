pub mod conversation;
pub mod error;
pub mod outcome;
pub mod session;

pub use conversation::{Conversation, ConversationOptions, TurnReply};
pub use error::EngineError;
pub use outcome::WriteOutcome;
pub use session::{
    ClearReport, EndReport, FlushReport, InitReport, PushStatus, SessionManager, SessionOptions,
    CLEAR_COMMIT_MESSAGE,
};
