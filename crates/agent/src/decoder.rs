use std::time::Instant;

use tracing::{info, warn};

use triage_core::decode::{decode_stage, StageSchema};
use triage_core::domain::ticket::TicketId;
use triage_core::errors::TriageError;
use triage_core::prompts::{compose, compose_repair, PromptRequest};

use crate::llm::{GenerationOptions, LlmClient};

/// Runs one stage against the model: compose, generate, decode, and at most one repair.
pub struct StageRunner<'a> {
    client: &'a dyn LlmClient,
    ticket_id: TicketId,
    correlation_id: &'a str,
}

impl<'a> StageRunner<'a> {
    pub fn new(client: &'a dyn LlmClient, ticket_id: TicketId, correlation_id: &'a str) -> Self {
        Self { client, ticket_id, correlation_id }
    }

    pub async fn run<T: StageSchema>(&self, request: &PromptRequest<'_>) -> Result<T, TriageError> {
        let stage = request.stage();
        let started = Instant::now();

        let raw = self.client.generate(&compose(request), GenerationOptions::for_stage(stage)).await?;

        let first_failure = match decode_stage::<T>(&raw) {
            Ok(value) => {
                self.completed(stage.as_str(), false, started);
                return Ok(value);
            }
            Err(failure) => failure,
        };

        warn!(
            event_name = "triage.decode.repair",
            ticket_id = self.ticket_id.0,
            correlation_id = %self.correlation_id,
            stage = stage.as_str(),
            error = %first_failure,
            "stage output rejected, requesting repair"
        );

        let repair_prompt = compose_repair(request, &first_failure.to_string(), &raw);
        let repaired = self.client.generate(&repair_prompt, GenerationOptions::repair(stage)).await?;

        match decode_stage::<T>(&repaired) {
            Ok(value) => {
                self.completed(stage.as_str(), true, started);
                Ok(value)
            }
            Err(second_failure) => Err(TriageError::decode(
                format!("{} output unusable after repair: {second_failure}", stage.as_str()),
                &repaired,
            )),
        }
    }

    fn completed(&self, stage: &str, repaired: bool, started: Instant) {
        info!(
            event_name = "triage.stage.completed",
            ticket_id = self.ticket_id.0,
            correlation_id = %self.correlation_id,
            stage,
            repaired,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "stage completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use triage_core::domain::suggestion::{ReplyDraft, TriageDraft};
    use triage_core::domain::ticket::{TicketId, TicketPriority};
    use triage_core::errors::{TriageError, RAW_OUTPUT_PREVIEW_CHARS};
    use triage_core::prompts::{PromptRequest, TicketContext};

    use super::StageRunner;
    use crate::llm::{LlmError, ScriptedLlmClient, REPAIR_TEMPERATURE};

    const VALID_TRIAGE: &str = r#"{"category_name": "Bug", "priority": "LOW", "status": "OPEN",
        "summary": "Button misaligned.", "rationale": ["cosmetic"], "draft_reply": null}"#;

    fn allowed() -> Vec<String> {
        vec!["Bug".to_string(), "Access".to_string()]
    }

    fn triage_request(allowed: &[String]) -> PromptRequest<'_> {
        PromptRequest::Triage {
            ticket: TicketContext { title: "Button", description: "misaligned" },
            allowed_categories: allowed,
        }
    }

    #[tokio::test]
    async fn valid_first_output_needs_one_call() {
        let client = ScriptedLlmClient::new([format!("Here you go: {VALID_TRIAGE}")]);
        let allowed = allowed();

        let draft: TriageDraft = StageRunner::new(&client, TicketId(1), "req")
            .run(&triage_request(&allowed))
            .await
            .expect("decoded");

        assert_eq!(draft.priority, TicketPriority::Low);
        assert_eq!(client.calls().len(), 1);
    }

    #[tokio::test]
    async fn one_repair_recovers_from_prose() {
        let client = ScriptedLlmClient::new(["I think this is a bug.", VALID_TRIAGE]);
        let allowed = allowed();

        let draft: TriageDraft = StageRunner::new(&client, TicketId(1), "req")
            .run(&triage_request(&allowed))
            .await
            .expect("repaired");

        assert_eq!(draft.category_name, "Bug");
        let calls = client.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].options.temperature, REPAIR_TEMPERATURE);
        assert_eq!(calls[1].options.max_output_tokens, 260);
        assert!(calls[1].prompt.contains("I think this is a bug."));
        assert!(calls[1].prompt.contains(r#"Allowed categories: ["Bug","Access"]"#));
    }

    #[tokio::test]
    async fn second_failure_is_terminal_with_bounded_preview() {
        let long_garbage = "x".repeat(RAW_OUTPUT_PREVIEW_CHARS * 2);
        let client = ScriptedLlmClient::new([
            "not json".to_string(),
            long_garbage,
            VALID_TRIAGE.to_string(),
        ]);
        let allowed = allowed();

        let error = StageRunner::new(&client, TicketId(1), "req")
            .run::<TriageDraft>(&triage_request(&allowed))
            .await
            .expect_err("terminal decode error");

        let TriageError::Decode { message, raw_output_preview } = error else {
            panic!("expected decode error, got {error:?}");
        };
        assert!(message.contains("no '{' found"));
        assert_eq!(raw_output_preview.chars().count(), RAW_OUTPUT_PREVIEW_CHARS);
        assert_eq!(client.calls().len(), 2, "no third attempt");
        assert_eq!(client.remaining(), 1);
    }

    #[tokio::test]
    async fn unknown_enum_values_use_the_single_repair() {
        let critical = VALID_TRIAGE.replace(r#""LOW""#, r#""CRITICAL""#);
        let pending = VALID_TRIAGE.replace(r#""OPEN""#, r#""PENDING""#);
        let allowed = allowed();

        let client = ScriptedLlmClient::new([critical.clone(), VALID_TRIAGE.to_string()]);
        let draft: TriageDraft = StageRunner::new(&client, TicketId(1), "req")
            .run(&triage_request(&allowed))
            .await
            .expect("repaired");
        assert_eq!(draft.priority, TicketPriority::Low);
        let calls = client.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].prompt.contains("unknown ticket priority `CRITICAL`"));

        let client = ScriptedLlmClient::new([critical, pending, VALID_TRIAGE.to_string()]);
        let error = StageRunner::new(&client, TicketId(1), "req")
            .run::<TriageDraft>(&triage_request(&allowed))
            .await
            .expect_err("terminal decode error");
        let TriageError::Decode { message, raw_output_preview } = error else {
            panic!("expected decode error, got {error:?}");
        };
        assert!(message.contains("unknown ticket status `PENDING`"), "message: {message}");
        assert!(raw_output_preview.contains("PENDING"));
        assert_eq!(client.calls().len(), 2, "no third attempt");
    }

    #[tokio::test]
    async fn transport_errors_propagate_without_repair() {
        let client = ScriptedLlmClient::with_results([Err(LlmError::Unavailable(
            "connection refused".to_string(),
        ))]);
        let request = PromptRequest::Reply {
            ticket: TicketContext { title: "t", description: "d" },
            category_name: "Bug",
            priority: TicketPriority::High,
        };

        let error = StageRunner::new(&client, TicketId(3), "req")
            .run::<ReplyDraft>(&request)
            .await
            .expect_err("unavailable");

        assert!(matches!(error, TriageError::BackendUnavailable(_)));
        assert_eq!(client.calls().len(), 1);
    }

    #[tokio::test]
    async fn transport_error_during_repair_is_not_a_decode_error() {
        let client = ScriptedLlmClient::with_results([
            Ok("garbage".to_string()),
            Err(LlmError::Timeout { after: std::time::Duration::from_secs(120) }),
        ]);
        let allowed = allowed();

        let error = StageRunner::new(&client, TicketId(4), "req")
            .run::<TriageDraft>(&triage_request(&allowed))
            .await
            .expect_err("timeout");

        assert!(matches!(error, TriageError::BackendTimeout { .. }));
    }
}
