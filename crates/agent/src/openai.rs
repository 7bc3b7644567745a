use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::llm::{status_error, transport_error, GenerationOptions, LlmClient, LlmError};

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Chat-completions client for OpenAI and compatible servers (including Ollama's `/v1`).
pub struct OpenAiCompatibleClient {
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    client: Client,
    read_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 1],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiCompatibleClient {
    pub fn new(
        client: Client,
        base_url: Option<&str>,
        api_key: Option<SecretString>,
        model: &str,
        read_timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url.unwrap_or(DEFAULT_OPENAI_URL).trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            client,
            read_timeout,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    fn describe(&self) -> String {
        format!("openai:{}", self.model)
    }

    async fn generate(
        &self,
        prompt: &str,
        options: GenerationOptions,
    ) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [Message { role: "user", content: prompt }],
            temperature: options.temperature,
            max_tokens: options.max_output_tokens,
        };

        let mut builder = self.client.post(format!("{}/chat/completions", self.base_url));
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response = builder
            .json(&request)
            .send()
            .await
            .map_err(|error| transport_error(error, self.read_timeout))?;

        if !response.status().is_success() {
            return Err(status_error("openai", response).await);
        }

        let body: ChatResponse =
            response.json().await.map_err(|error| transport_error(error, self.read_timeout))?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("response carried no message content".into()))
    }
}
