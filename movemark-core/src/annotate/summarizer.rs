//! Summarizer collaborator.
//!
//! [`ChatSummarizer`] talks to any OpenAI-compatible chat completions endpoint
//! (OpenAI itself, a local Ollama or llama.cpp server, a proxy). Transient
//! failures are retried with exponential backoff; a rejected API key makes the
//! summarizer unavailable rather than failed.

use super::Outcome;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str =
    "You explain stock price moves. Answer with a short phrase naming the cause, nothing else.";

/// Something that condenses a prompt into a short phrase.
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &str;

    /// A reply of roughly `max_words` words. Callers still enforce the limit.
    fn summarize(&self, prompt: &str, max_words: usize) -> Outcome<String>;
}

#[derive(Debug, thiserror::Error)]
enum ChatError {
    #[error("rate limited")]
    RateLimited,

    #[error("API key rejected")]
    Unauthorized,

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Format(String),
}

/// Settings for [`ChatSummarizer`].
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// OpenAI-compatible chat completions summarizer.
#[derive(Debug)]
pub struct ChatSummarizer {
    client: reqwest::blocking::Client,
    config: ChatConfig,
}

impl ChatSummarizer {
    pub fn new(config: ChatConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    fn request_once(&self, prompt: &str, max_words: usize) -> Result<String, ChatError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt }
            ],
            "max_tokens": max_words * 4 + 16,
            "temperature": 0.2
        });

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ChatError::RateLimited);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ChatError::Unauthorized);
        }
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(ChatError::Status {
                status: status.as_u16(),
                body: text.chars().take(200).collect(),
            });
        }

        let json: serde_json::Value = response
            .json()
            .map_err(|e| ChatError::Format(e.to_string()))?;
        message_content(&json)
    }
}

fn message_content(json: &serde_json::Value) -> Result<String, ChatError> {
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.trim().to_string())
        .ok_or_else(|| ChatError::Format("missing choices[0].message.content".into()))
}

impl Summarizer for ChatSummarizer {
    fn name(&self) -> &str {
        &self.config.model
    }

    fn summarize(&self, prompt: &str, max_words: usize) -> Outcome<String> {
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.config.base_delay * 2u32.pow(attempt - 1);
                tracing::debug!(attempt, ?delay, "retrying summarizer");
                std::thread::sleep(delay);
            }

            match self.request_once(prompt, max_words) {
                Ok(text) => return Outcome::Success(text),
                Err(ChatError::Unauthorized) => {
                    tracing::warn!(endpoint = %self.config.endpoint, "summarizer rejected API key");
                    return Outcome::Unavailable;
                }
                Err(e) => last_error = Some(e),
            }
        }

        Outcome::Failed(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts made".to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_message_content() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "  Strong iPhone sales \n" } }]
        });
        assert_eq!(message_content(&json).unwrap(), "Strong iPhone sales");
    }

    #[test]
    fn missing_content_is_format_error() {
        let json = serde_json::json!({ "choices": [] });
        assert!(matches!(message_content(&json), Err(ChatError::Format(_))));
    }

    #[test]
    fn unreachable_endpoint_fails_after_attempts() {
        let summarizer = ChatSummarizer::new(ChatConfig {
            endpoint: "http://127.0.0.1:9/v1/chat/completions".into(),
            timeout: Duration::from_millis(500),
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            ..ChatConfig::default()
        })
        .unwrap();

        assert!(matches!(
            summarizer.summarize("anything", 10),
            Outcome::Failed(_)
        ));
    }
}
