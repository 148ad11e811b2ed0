use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use memo_core::{ChatModel, ChatTurn, ModelError};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
pub const API_KEY_ENV: &str = "GROQ_API_KEY";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 256,
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompatClient {
    client: Client,
    api_key: SecretString,
    config: ClientConfig,
}

impl OpenAiCompatClient {
    pub fn new(api_key: SecretString, config: ClientConfig) -> Result<Self, ModelError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ModelError::Network(e.to_string()))?;
        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    /// Build a client with the key taken from `GROQ_API_KEY`.
    pub fn from_env(config: ClientConfig) -> Result<Self, ModelError> {
        let key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ModelError::Authentication(format!("{API_KEY_ENV} is not set")))?;
        Self::new(SecretString::from(key), config)
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn request_body<'a>(&'a self, history: &'a [ChatTurn]) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: history,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }
}

/// Pull the first choice's text out of a completion body.
fn parse_completion(body: &str) -> Result<String, ModelError> {
    let resp: ChatResponse =
        serde_json::from_str(body).map_err(|e| ModelError::InvalidResponse(e.to_string()))?;
    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|text| text.trim().to_string())
        .ok_or_else(|| ModelError::InvalidResponse("completion has no content".into()))
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl ChatModel for OpenAiCompatClient {
    fn name(&self) -> &str {
        "openai-compat"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip(self, history), fields(model = %self.config.model, turns = history.len()))]
    async fn complete(&self, history: &[ChatTurn]) -> Result<String, ModelError> {
        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.api_key.expose_secret())
            .json(&self.request_body(history))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout(self.config.request_timeout)
                } else {
                    ModelError::Network(e.to_string())
                }
            })?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let delay = retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            return Err(match ModelError::from_status(status, body) {
                ModelError::RateLimited { .. } => ModelError::RateLimited { retry_after: delay },
                other => other,
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;
        let text = parse_completion(&body)?;
        debug!(chars = text.len(), "completion received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memo_core::{ChatRole, SYSTEM_PROMPT};

    fn client(config: ClientConfig) -> OpenAiCompatClient {
        OpenAiCompatClient::new(SecretString::from("test-key".to_string()), config).unwrap()
    }

    #[test]
    fn defaults_target_groq() {
        let config = ClientConfig::default();
        assert_eq!(config.model, "llama-3.1-8b-instant");
        assert_eq!(config.max_tokens, 256);
        assert!((config.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(
            client(config).endpoint(),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let c = client(ClientConfig {
            base_url: "http://localhost:8080/v1/".into(),
            ..Default::default()
        });
        assert_eq!(c.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn request_body_shape() {
        let c = client(ClientConfig::default());
        let history = vec![
            ChatTurn::system(SYSTEM_PROMPT),
            ChatTurn::new(ChatRole::User, "What is an API?"),
        ];
        let body = serde_json::to_value(c.request_body(&history)).unwrap();

        assert_eq!(body["model"], "llama-3.1-8b-instant");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "What is an API?");
    }

    #[test]
    fn parses_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  An API is an interface. "}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "An API is an interface.");
    }

    #[test]
    fn empty_choices_is_invalid_response() {
        assert!(matches!(
            parse_completion(r#"{"choices":[]}"#),
            Err(ModelError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_completion("not json"),
            Err(ModelError::InvalidResponse(_))
        ));
    }

    #[test]
    fn retry_after_header_in_seconds() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));

        headers.insert(
            reqwest::header::RETRY_AFTER,
            "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap(),
        );
        assert_eq!(retry_after(&headers), None);
    }
}
