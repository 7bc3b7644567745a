use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;

use crate::domain::ticket::TicketId;

/// Raw model output attached to decode errors is cut to this many characters.
pub const RAW_OUTPUT_PREVIEW_CHARS: usize = 1200;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown ticket status `{0}` (expected OPEN|IN_PROGRESS|RESOLVED|CLOSED)")]
    UnknownStatus(String),
    #[error("unknown ticket priority `{0}` (expected LOW|MEDIUM|HIGH|URGENT)")]
    UnknownPriority(String),
}

/// Failure surface of a triage run. Every variant is terminal for the run.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TriageError {
    #[error("ticket {ticket_id} not found")]
    NotFound { ticket_id: TicketId },
    #[error("no categories configured; create categories before requesting triage")]
    NoCategoriesConfigured,
    #[error("language model backend timed out after {}s", .timeout.as_secs_f64())]
    BackendTimeout { timeout: Duration },
    #[error("language model backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("could not decode model output: {message}")]
    Decode { message: String, raw_output_preview: String },
    #[error("category_name `{got}` is not one of the allowed categories")]
    CategoryMismatch { allowed: Vec<String>, got: String },
    #[error("ticket store failure: {0}")]
    Store(String),
}

impl TriageError {
    /// Builds a decode error, bounding the raw output kept for diagnostics.
    pub fn decode(message: impl Into<String>, raw_output: &str) -> Self {
        Self::Decode {
            message: message.into(),
            raw_output_preview: truncate_chars(raw_output, RAW_OUTPUT_PREVIEW_CHARS),
        }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::NoCategoriesConfigured => "no_categories_configured",
            Self::BackendTimeout { .. } => "backend_timeout",
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::Decode { .. } => "decode_error",
            Self::CategoryMismatch { .. } => "category_mismatch",
            Self::Store(_) => "store_failure",
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let message = self.to_string();
        let kind = match &self {
            Self::NotFound { .. } => InterfaceErrorKind::NotFound,
            Self::NoCategoriesConfigured => InterfaceErrorKind::BadRequest,
            Self::BackendTimeout { .. } => InterfaceErrorKind::GatewayTimeout,
            Self::BackendUnavailable(_) => InterfaceErrorKind::BadGateway,
            Self::Decode { .. } | Self::CategoryMismatch { .. } => {
                InterfaceErrorKind::Unprocessable
            }
            Self::Store(_) => InterfaceErrorKind::ServiceUnavailable,
        };
        let details = match self {
            Self::NotFound { ticket_id } => json!({ "ticket_id": ticket_id.0 }),
            Self::Decode { message, raw_output_preview } => {
                json!({ "message": message, "raw_output_preview": raw_output_preview })
            }
            Self::CategoryMismatch { allowed, got } => {
                json!({ "allowed_categories": allowed, "got": got })
            }
            _ => Value::Null,
        };

        InterfaceError { kind, message, details, correlation_id }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterfaceErrorKind {
    NotFound,
    BadRequest,
    Unprocessable,
    GatewayTimeout,
    BadGateway,
    ServiceUnavailable,
}

/// Transport-neutral error handed to the HTTP or tool layer.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{message}")]
pub struct InterfaceError {
    pub kind: InterfaceErrorKind,
    pub message: String,
    pub details: Value,
    pub correlation_id: String,
}

impl InterfaceError {
    pub fn status_code(&self) -> u16 {
        match self.kind {
            InterfaceErrorKind::NotFound => 404,
            InterfaceErrorKind::BadRequest => 400,
            InterfaceErrorKind::Unprocessable => 422,
            InterfaceErrorKind::GatewayTimeout => 504,
            InterfaceErrorKind::BadGateway => 502,
            InterfaceErrorKind::ServiceUnavailable => 503,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self.kind {
            InterfaceErrorKind::NotFound => "The requested ticket does not exist.",
            InterfaceErrorKind::BadRequest => {
                "Triage is not configured yet. Create categories and try again."
            }
            InterfaceErrorKind::Unprocessable => {
                "The suggestion could not be validated. No changes were applied."
            }
            InterfaceErrorKind::GatewayTimeout => {
                "The language model took too long to answer. No changes were applied."
            }
            InterfaceErrorKind::BadGateway | InterfaceErrorKind::ServiceUnavailable => {
                "The service is temporarily unavailable. Please retry shortly."
            }
        }
    }
}

pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((byte_index, _)) => value[..byte_index].to_string(),
        None => value.to_string(),
    }
}
