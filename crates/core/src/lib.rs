pub mod audit;
pub mod config;
pub mod decode;
pub mod domain;
pub mod errors;
pub mod guardrails;
pub mod prompts;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use config::{AppConfig, LlmProvider, PipelineMode};
pub use decode::{decode_stage, extract_first_json_object, DecodeFailure, StageSchema};
pub use domain::category::{Category, CategoryCatalog, CategoryId};
pub use domain::suggestion::{ProposedPatch, Suggestion, TicketPatch, TriageOutcome};
pub use domain::ticket::{Ticket, TicketId, TicketPriority, TicketStatus};
pub use errors::{DomainError, InterfaceError, InterfaceErrorKind, TriageError};
pub use guardrails::{reconcile, GuardrailPolicy};
pub use prompts::{PromptRequest, PromptStage};
