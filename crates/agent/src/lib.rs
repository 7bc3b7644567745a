//! Model-facing half of ticket triage.
//!
//! The language model only *suggests*. This crate turns a ticket into a
//! suggestion through one combined call or a classify → prioritize → reply
//! chain, decodes each answer with a single repair attempt, and hands the
//! result to the deterministic guardrail policy in `triage-core`. Nothing is
//! written to the store unless the caller explicitly applies the outcome.
//!
//! - `llm`: client trait, HTTP client factory, scripted client for tests
//! - `ollama` / `openai`: provider clients
//! - `decoder`: compose → generate → decode with one repair
//! - `pipeline`: fetch, single and multi-stage generation, finalize
//! - `runtime`: [`TriageService`], the process-scoped handle
//! - `bootstrap`: config → pool → migrations → service

pub mod bootstrap;
pub mod decoder;
pub mod llm;
pub mod ollama;
pub mod openai;
pub mod pipeline;
pub mod runtime;

pub use bootstrap::{bootstrap, bootstrap_with_config, Application, BootstrapError};
pub use llm::{client_from_config, GenerationOptions, LlmClient, LlmError, ScriptedLlmClient};
pub use runtime::TriageService;
