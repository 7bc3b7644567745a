use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use triage_core::config::{LlmConfig, LlmProvider};
use triage_core::errors::TriageError;
use triage_core::prompts::PromptStage;

use crate::ollama::OllamaClient;
use crate::openai::OpenAiCompatibleClient;

pub const STAGE_TEMPERATURE: f32 = 0.2;
pub const REPAIR_TEMPERATURE: f32 = 0.0;

/// Per-call sampling controls.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl GenerationOptions {
    pub const WARMUP: Self = Self { temperature: 0.0, max_output_tokens: 20 };

    pub const fn new(temperature: f32, max_output_tokens: u32) -> Self {
        Self { temperature, max_output_tokens }
    }

    pub fn for_stage(stage: PromptStage) -> Self {
        Self::new(STAGE_TEMPERATURE, stage.max_output_tokens())
    }

    pub fn repair(stage: PromptStage) -> Self {
        Self::new(REPAIR_TEMPERATURE, stage.max_output_tokens())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("request timed out after {}s", .after.as_secs_f64())]
    Timeout { after: Duration },
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
    #[error("client configuration error: {0}")]
    Configuration(String),
}

impl From<LlmError> for TriageError {
    fn from(error: LlmError) -> Self {
        match error {
            LlmError::Timeout { after } => TriageError::BackendTimeout { timeout: after },
            other => TriageError::BackendUnavailable(other.to_string()),
        }
    }
}

/// Stateless request/response access to a language model.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider and model label used in logs.
    fn describe(&self) -> String;

    async fn generate(&self, prompt: &str, options: GenerationOptions)
        -> Result<String, LlmError>;
}

/// Socket-level bounds for model requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
}

impl HttpTimeouts {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            connect: config.connect_timeout(),
            read: config.read_timeout(),
            write: config.write_timeout(),
        }
    }

    /// reqwest has no per-write bound, so the write budget is folded into a whole-request cap.
    pub fn request(&self) -> Duration {
        self.connect + self.write + self.read
    }
}

pub fn build_http_client(timeouts: HttpTimeouts) -> Result<Client, LlmError> {
    Client::builder()
        .connect_timeout(timeouts.connect)
        .read_timeout(timeouts.read)
        .timeout(timeouts.request())
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .map_err(|error| LlmError::Configuration(error.to_string()))
}

/// Maps a transport failure, keeping timeouts distinct from other I/O errors.
pub(crate) fn transport_error(error: reqwest::Error, read_timeout: Duration) -> LlmError {
    if error.is_timeout() {
        LlmError::Timeout { after: read_timeout }
    } else if error.is_decode() {
        LlmError::InvalidResponse(error.to_string())
    } else {
        LlmError::Unavailable(error.to_string())
    }
}

pub(crate) async fn status_error(provider: &str, response: reqwest::Response) -> LlmError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(300).collect();
    LlmError::Unavailable(format!("{provider} returned HTTP {status}: {body}"))
}

pub fn client_from_config(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    let http = build_http_client(HttpTimeouts::from_config(config))?;
    let client: Arc<dyn LlmClient> = match config.provider {
        LlmProvider::Ollama => Arc::new(OllamaClient::new(
            http,
            config.base_url.as_deref(),
            &config.model,
            config.read_timeout(),
        )),
        LlmProvider::OpenAi => Arc::new(OpenAiCompatibleClient::new(
            http,
            config.base_url.as_deref(),
            config.api_key.clone(),
            &config.model,
            config.read_timeout(),
        )),
    };
    Ok(client)
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    pub prompt: String,
    pub options: GenerationOptions,
}

/// In-process client replaying queued responses in order. Used by tests and dry runs.
#[derive(Default)]
pub struct ScriptedLlmClient {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_results(responses.into_iter().map(|response| Ok(response.into())))
    }

    pub fn with_results<I>(results: I) -> Self
    where
        I: IntoIterator<Item = Result<String, LlmError>>,
    {
        Self { responses: Mutex::new(results.into_iter().collect()), ..Self::default() }
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn remaining(&self) -> usize {
        match self.responses.lock() {
            Ok(responses) => responses.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    fn describe(&self) -> String {
        "scripted".to_string()
    }

    async fn generate(
        &self,
        prompt: &str,
        options: GenerationOptions,
    ) -> Result<String, LlmError> {
        let call = RecordedCall { prompt: prompt.to_string(), options };
        match self.calls.lock() {
            Ok(mut calls) => calls.push(call),
            Err(poisoned) => poisoned.into_inner().push(call),
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = match self.responses.lock() {
            Ok(mut responses) => responses.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or_else(|| Err(LlmError::Unavailable("script exhausted".to_string())))
    }
}
