//! Single and multi-stage triage pipelines.
//!
//! A run moves through `fetch -> generate -> finalize`. Every stage reads only
//! what its predecessors produced through [`RunContext`]; nothing is shared
//! across runs.

use tracing::debug;

use triage_core::config::PipelineMode;
use triage_core::domain::category::CategoryCatalog;
use triage_core::domain::suggestion::{
    CategoryDraft, PriorityDraft, ReplyDraft, Suggestion, TriageDraft, TriageOutcome,
};
use triage_core::domain::ticket::{Ticket, TicketId};
use triage_core::errors::TriageError;
use triage_core::guardrails::GuardrailPolicy;
use triage_core::prompts::{PromptRequest, TicketContext};
use triage_db::{CategoryRepository, RepositoryError, TicketRepository};

use crate::decoder::StageRunner;
use crate::llm::LlmClient;

/// Inputs resolved before any model call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunContext {
    pub ticket: Ticket,
    pub catalog: CategoryCatalog,
    pub allowed_categories: Vec<String>,
    pub correlation_id: String,
}

pub(crate) fn store_error(error: RepositoryError) -> TriageError {
    TriageError::Store(error.to_string())
}

/// Loads the ticket and category snapshot, failing before generation when either is missing.
pub async fn fetch(
    tickets: &dyn TicketRepository,
    categories: &dyn CategoryRepository,
    ticket_id: TicketId,
    correlation_id: &str,
) -> Result<RunContext, TriageError> {
    let ticket = tickets
        .find_by_id(ticket_id)
        .await
        .map_err(store_error)?
        .ok_or(TriageError::NotFound { ticket_id })?;

    let catalog = CategoryCatalog::new(categories.list().await.map_err(store_error)?);
    if catalog.is_empty() {
        return Err(TriageError::NoCategoriesConfigured);
    }

    Ok(RunContext {
        allowed_categories: catalog.names(),
        ticket,
        catalog,
        correlation_id: correlation_id.to_string(),
    })
}

pub async fn generate(
    mode: PipelineMode,
    client: &dyn LlmClient,
    context: &RunContext,
) -> Result<Suggestion, TriageError> {
    match mode {
        PipelineMode::Single => run_single(client, context).await,
        PipelineMode::Multi => run_multi(client, context).await,
    }
}

/// One combined call producing every suggestion field.
pub async fn run_single(
    client: &dyn LlmClient,
    context: &RunContext,
) -> Result<Suggestion, TriageError> {
    let runner = StageRunner::new(client, context.ticket.id, &context.correlation_id);
    let draft: TriageDraft = runner
        .run(&PromptRequest::Triage {
            ticket: TicketContext::from(&context.ticket),
            allowed_categories: &context.allowed_categories,
        })
        .await?;
    Ok(Suggestion::from(draft))
}

/// Classify, then prioritize given the category, then draft a reply given both.
pub async fn run_multi(
    client: &dyn LlmClient,
    context: &RunContext,
) -> Result<Suggestion, TriageError> {
    let runner = StageRunner::new(client, context.ticket.id, &context.correlation_id);
    let ticket = TicketContext::from(&context.ticket);

    let category: CategoryDraft = runner
        .run(&PromptRequest::Classify {
            ticket: ticket.clone(),
            allowed_categories: &context.allowed_categories,
        })
        .await?;

    let priority: PriorityDraft = runner
        .run(&PromptRequest::Prioritize {
            ticket: ticket.clone(),
            category_name: &category.category_name,
        })
        .await?;

    let reply: ReplyDraft = runner
        .run(&PromptRequest::Reply {
            ticket,
            category_name: &category.category_name,
            priority: priority.priority,
        })
        .await?;

    Ok(Suggestion::merge_stages(category, priority, reply))
}

/// Resolves the suggested category and runs the guardrail policy.
pub fn finalize(
    context: RunContext,
    suggestion: Suggestion,
    policy: &GuardrailPolicy,
) -> Result<TriageOutcome, TriageError> {
    let category = context.catalog.resolve(&suggestion.category_name).ok_or_else(|| {
        TriageError::CategoryMismatch {
            allowed: context.allowed_categories.clone(),
            got: suggestion.category_name.clone(),
        }
    })?;

    let proposed = suggestion.proposed_patch(category.id);
    let reconciliation =
        policy.reconcile_with_trace(&context.ticket, &proposed, &context.catalog.name_to_id());
    for adjustment in &reconciliation.adjustments {
        debug!(
            event_name = "triage.guardrail.adjusted",
            ticket_id = context.ticket.id.0,
            correlation_id = %context.correlation_id,
            reason = adjustment.reason_code(),
            "guardrail adjusted proposed patch"
        );
    }

    Ok(TriageOutcome { ticket_id: context.ticket.id, suggestion, patch: reconciliation.patch })
}

#[cfg(test)]
mod tests {
    use triage_core::config::PipelineMode;
    use triage_core::domain::category::{Category, CategoryCatalog, CategoryId};
    use triage_core::domain::ticket::{Ticket, TicketId, TicketPriority, TicketStatus};
    use triage_core::errors::TriageError;
    use triage_core::guardrails::GuardrailPolicy;
    use triage_db::{
        CategoryRepository, InMemoryCategoryRepository, InMemoryTicketRepository, NewTicket,
        TicketRepository,
    };

    use super::{fetch, finalize, generate, RunContext};
    use crate::llm::ScriptedLlmClient;

    fn context(ticket: Ticket) -> RunContext {
        let catalog = CategoryCatalog::new(vec![
            Category::new(CategoryId(1), "Bug"),
            Category::new(CategoryId(2), "Access"),
            Category::new(CategoryId(3), "Data"),
        ]);
        RunContext {
            allowed_categories: catalog.names(),
            ticket,
            catalog,
            correlation_id: "req-test".to_string(),
        }
    }

    #[tokio::test]
    async fn fetch_reports_missing_ticket_before_categories() {
        let tickets = InMemoryTicketRepository::default();
        let categories = InMemoryCategoryRepository::default();

        let error = fetch(&tickets, &categories, TicketId(42), "req").await.expect_err("missing");
        assert_eq!(error, TriageError::NotFound { ticket_id: TicketId(42) });
    }

    #[tokio::test]
    async fn fetch_requires_at_least_one_category() {
        let tickets = InMemoryTicketRepository::default();
        let categories = InMemoryCategoryRepository::default();
        let ticket = tickets.create(NewTicket::new("t", "d")).await.expect("create");

        let error = fetch(&tickets, &categories, ticket.id, "req").await.expect_err("empty");
        assert_eq!(error, TriageError::NoCategoriesConfigured);

        categories.create("Bug", None).await.expect("category");
        let context = fetch(&tickets, &categories, ticket.id, "req").await.expect("fetched");
        assert_eq!(context.allowed_categories, vec!["Bug"]);
    }

    #[tokio::test]
    async fn multi_stage_prompts_carry_predecessor_outputs() {
        let client = ScriptedLlmClient::new([
            r#"{"category_name": "Data", "summary": "Export broken.", "rationale": ["csv"]}"#,
            r#"{"priority": "HIGH", "status": "OPEN", "rationale": ["blocks reporting"]}"#,
            r#"{"draft_reply": "We are investigating the export."}"#,
        ]);
        let ctx = context(Ticket::new(TicketId(5), "Export", "CSV export fails"));

        let suggestion = generate(PipelineMode::Multi, &client, &ctx).await.expect("suggestion");

        assert_eq!(suggestion.category_name, "Data");
        assert_eq!(suggestion.priority, TicketPriority::High);
        assert_eq!(suggestion.rationale, vec!["csv", "blocks reporting"]);
        assert_eq!(suggestion.draft_reply.as_deref(), Some("We are investigating the export."));

        let calls = client.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[1].prompt.contains(r#"Category already chosen: "Data""#));
        assert!(calls[2].prompt.contains(r#"- category_name: "Data""#));
        assert!(calls[2].prompt.contains("- priority: HIGH"));
        assert_eq!(calls[2].options.max_output_tokens, 180);
    }

    #[tokio::test]
    async fn multi_stage_failure_stops_later_stages() {
        let client = ScriptedLlmClient::new([
            r#"{"category_name": "Bug", "summary": "Crash."}"#,
            "no idea",
            "still no idea",
            r#"{"draft_reply": null}"#,
        ]);
        let ctx = context(Ticket::new(TicketId(6), "Crash", "app crashes"));

        let error = generate(PipelineMode::Multi, &client, &ctx).await.expect_err("decode");
        assert!(matches!(error, TriageError::Decode { .. }));
        assert_eq!(client.calls().len(), 3);
    }

    #[test]
    fn unknown_category_is_a_mismatch_not_a_guess() {
        let ctx = context(Ticket::new(TicketId(7), "Invoice", "charged twice"));
        let suggestion = triage_core::domain::suggestion::Suggestion {
            category_name: "Billing".to_string(),
            priority: TicketPriority::Medium,
            status: TicketStatus::Open,
            summary: "Double charge.".to_string(),
            rationale: Vec::new(),
            draft_reply: None,
        };

        let error = finalize(ctx, suggestion, &GuardrailPolicy::default()).expect_err("mismatch");
        assert_eq!(
            error,
            TriageError::CategoryMismatch {
                allowed: vec!["Bug".to_string(), "Access".to_string(), "Data".to_string()],
                got: "Billing".to_string(),
            }
        );
    }

    #[test]
    fn finalize_runs_keyword_guardrail_on_resolved_suggestion() {
        let ctx = context(Ticket::new(TicketId(8), "Export", "can't export CSV, separator issue"));
        let suggestion = triage_core::domain::suggestion::Suggestion {
            category_name: "Bug".to_string(),
            priority: TicketPriority::Medium,
            status: TicketStatus::Open,
            summary: "CSV separator wrong.".to_string(),
            rationale: vec!["export".to_string()],
            draft_reply: None,
        };

        let outcome = finalize(ctx, suggestion, &GuardrailPolicy::default()).expect("outcome");
        assert_eq!(outcome.patch.category_id, Some(CategoryId(3)));
        assert_eq!(outcome.suggestion.category_name, "Bug");
        assert_eq!(outcome.ticket_id, TicketId(8));
    }
}
