pub mod mock;
pub mod openai;
pub mod retry;

pub use mock::MockModel;
pub use openai::{ClientConfig, OpenAiCompatClient, API_KEY_ENV, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use retry::{RetryConfig, RetryingModel};
