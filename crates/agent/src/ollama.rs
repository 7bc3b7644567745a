use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::llm::{status_error, transport_error, GenerationOptions, LlmClient, LlmError};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Native Ollama chat API (`POST /api/chat`, non-streaming).
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: Client,
    read_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 1],
    stream: bool,
    options: Options,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

impl OllamaClient {
    pub fn new(client: Client, base_url: Option<&str>, model: &str, read_timeout: Duration) -> Self {
        Self {
            base_url: base_url.unwrap_or(DEFAULT_OLLAMA_URL).trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            read_timeout,
        }
    }

    fn build_request<'a>(&'a self, prompt: &'a str, options: GenerationOptions) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: [Message { role: "user", content: prompt }],
            stream: false,
            options: Options {
                temperature: options.temperature,
                num_predict: options.max_output_tokens,
            },
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn describe(&self) -> String {
        format!("ollama:{}", self.model)
    }

    async fn generate(
        &self,
        prompt: &str,
        options: GenerationOptions,
    ) -> Result<String, LlmError> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&self.build_request(prompt, options))
            .send()
            .await
            .map_err(|error| transport_error(error, self.read_timeout))?;

        if !response.status().is_success() {
            return Err(status_error("ollama", response).await);
        }

        let body: ChatResponse =
            response.json().await.map_err(|error| transport_error(error, self.read_timeout))?;
        Ok(body.message.content)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::OllamaClient;
    use crate::llm::{build_http_client, GenerationOptions, HttpTimeouts, LlmClient, LlmError};

    fn client(base_url: &str, read_timeout: Duration) -> OllamaClient {
        let timeouts = HttpTimeouts {
            connect: Duration::from_secs(5),
            read: read_timeout,
            write: Duration::from_secs(30),
        };
        let http = build_http_client(timeouts).expect("http client");
        OllamaClient::new(http, Some(base_url), "llama3.1:8b", read_timeout)
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let ollama = client("http://myserver:11434/", Duration::from_secs(5));
        assert_eq!(ollama.base_url, "http://myserver:11434");
    }

    #[test]
    fn request_carries_sampling_options() {
        let ollama = client("http://localhost:11434", Duration::from_secs(5));
        let request = ollama.build_request("hello", GenerationOptions::new(0.0, 20));
        let json = serde_json::to_value(&request).expect("serialize");

        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 20);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["model"], "llama3.1:8b");
    }

    #[tokio::test]
    async fn generate_returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({ "stream": false, "options": { "num_predict": 260 } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "llama3.1:8b",
                "message": { "role": "assistant", "content": "{\"ok\": true}" },
                "done": true
            })))
            .mount(&server)
            .await;

        let text = client(&server.uri(), Duration::from_secs(5))
            .generate("prompt", GenerationOptions::new(0.2, 260))
            .await
            .expect("generate");
        assert_eq!(text, "{\"ok\": true}");
    }

    #[tokio::test]
    async fn non_success_status_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .mount(&server)
            .await;

        let error = client(&server.uri(), Duration::from_secs(5))
            .generate("prompt", GenerationOptions::WARMUP)
            .await
            .expect_err("404 should fail");
        assert!(matches!(error, LlmError::Unavailable(ref m) if m.contains("model not found")));
    }

    #[tokio::test]
    async fn slow_backend_reports_read_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "message": { "content": "late" } }))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let error = client(&server.uri(), Duration::from_millis(200))
            .generate("prompt", GenerationOptions::WARMUP)
            .await
            .expect_err("read timeout");
        assert_eq!(error, LlmError::Timeout { after: Duration::from_millis(200) });
    }
}
