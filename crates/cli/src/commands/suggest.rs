use serde_json::{json, Value};
use triage_agent::{bootstrap_with_config, BootstrapError};
use triage_core::config::PipelineMode;
use triage_core::domain::ticket::TicketId;
use triage_core::errors::TriageError;
use uuid::Uuid;

use crate::commands::{prepare, CommandResult};

enum SuggestFailure {
    Bootstrap(BootstrapError),
    Triage { error: TriageError, correlation_id: String },
}

pub fn run(ticket_id: TicketId, pipeline: Option<PipelineMode>, apply: bool) -> CommandResult {
    let (config, runtime) = match prepare("suggest") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let app = bootstrap_with_config(config).await.map_err(SuggestFailure::Bootstrap)?;
        let correlation_id = Uuid::new_v4().to_string();

        let outcome = async {
            let outcome = app
                .service
                .suggest_with_correlation(ticket_id, pipeline, &correlation_id)
                .await?;
            let applied = if apply { Some(app.service.apply(&outcome).await?) } else { None };
            Ok::<_, TriageError>((outcome, applied))
        }
        .await;

        app.shutdown().await;
        outcome.map_err(|error| SuggestFailure::Triage { error, correlation_id })
    });

    match result {
        Ok((outcome, applied)) => {
            let mut data = serde_json::to_value(&outcome).unwrap_or(Value::Null);
            if let (Some(ticket), Value::Object(fields)) = (applied.as_ref(), &mut data) {
                fields.insert(
                    "applied".to_string(),
                    serde_json::to_value(ticket).unwrap_or(Value::Null),
                );
            }
            let message = if applied.is_some() {
                format!("suggestion applied to ticket {ticket_id}")
            } else {
                format!("suggestion ready for ticket {ticket_id} (not applied)")
            };
            CommandResult::success_with_data("suggest", message, Some(data))
        }
        Err(SuggestFailure::Bootstrap(error)) => {
            let (error_class, exit_code) = bootstrap_failure_class(&error);
            CommandResult::failure("suggest", error_class, error.to_string(), exit_code)
        }
        Err(SuggestFailure::Triage { error, correlation_id }) => {
            let error_class = error.error_class();
            let exit_code = triage_exit_code(&error);
            let interface = error.into_interface(correlation_id);
            CommandResult::failure_with_data(
                "suggest",
                error_class,
                interface.message.clone(),
                exit_code,
                Some(json!({
                    "correlation_id": interface.correlation_id,
                    "status_code": interface.status_code(),
                    "user_message": interface.user_message(),
                    "details": interface.details,
                })),
            )
        }
    }
}

fn bootstrap_failure_class(error: &BootstrapError) -> (&'static str, u8) {
    match error {
        BootstrapError::Config(_) => ("config_validation", 2),
        BootstrapError::DatabaseConnect(_) => ("db_connectivity", 4),
        BootstrapError::Migration(_) => ("migration", 5),
        BootstrapError::LlmClient(_) => ("llm_client", 8),
    }
}

/// Exit codes for run failures start at 10 so they never collide with setup failures.
pub fn triage_exit_code(error: &TriageError) -> u8 {
    match error {
        TriageError::NotFound { .. } => 10,
        TriageError::NoCategoriesConfigured => 11,
        TriageError::BackendTimeout { .. } => 12,
        TriageError::BackendUnavailable(_) => 13,
        TriageError::Decode { .. } => 14,
        TriageError::CategoryMismatch { .. } => 15,
        TriageError::Store(_) => 16,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::triage_exit_code;
    use triage_core::domain::ticket::TicketId;
    use triage_core::errors::TriageError;

    #[test]
    fn every_failure_class_has_a_distinct_exit_code() {
        let errors = [
            TriageError::NotFound { ticket_id: TicketId(1) },
            TriageError::NoCategoriesConfigured,
            TriageError::BackendTimeout { timeout: Duration::from_secs(1) },
            TriageError::BackendUnavailable("down".to_string()),
            TriageError::decode("bad", "raw"),
            TriageError::CategoryMismatch { allowed: Vec::new(), got: "x".to_string() },
            TriageError::Store("locked".to_string()),
        ];

        let mut codes: Vec<u8> = errors.iter().map(triage_exit_code).collect();
        assert!(codes.iter().all(|code| *code >= 10));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
