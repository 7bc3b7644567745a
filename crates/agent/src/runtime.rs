use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};
use uuid::Uuid;

use triage_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink};
use triage_core::config::{AppConfig, PipelineMode};
use triage_core::domain::suggestion::TriageOutcome;
use triage_core::domain::ticket::{Ticket, TicketId};
use triage_core::errors::TriageError;
use triage_core::guardrails::GuardrailPolicy;
use triage_core::prompts::warmup_prompt;
use triage_db::{CategoryRepository, TicketRepository};

use crate::llm::{GenerationOptions, LlmClient};
use crate::pipeline::{self, store_error};

const ACTOR: &str = "triage-service";

/// Process-scoped triage handle.
///
/// Owns the long-lived model client and the store handles. Runs are independent:
/// the service keeps no per-run state, so one instance can serve concurrent calls.
pub struct TriageService {
    tickets: Arc<dyn TicketRepository>,
    categories: Arc<dyn CategoryRepository>,
    client: Arc<dyn LlmClient>,
    audit: Arc<dyn AuditSink>,
    policy: GuardrailPolicy,
    run_timeout: Duration,
    default_pipeline: PipelineMode,
}

impl TriageService {
    pub fn new(
        tickets: Arc<dyn TicketRepository>,
        categories: Arc<dyn CategoryRepository>,
        client: Arc<dyn LlmClient>,
    ) -> Self {
        let defaults = AppConfig::default();
        Self {
            tickets,
            categories,
            client,
            audit: Arc::new(TracingAuditSink),
            policy: GuardrailPolicy::default(),
            run_timeout: defaults.llm.run_timeout(),
            default_pipeline: defaults.triage.pipeline,
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Bounds generation and repair for one run. Fetch is not counted.
    pub fn with_run_timeout(mut self, run_timeout: Duration) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    pub fn with_default_pipeline(mut self, pipeline: PipelineMode) -> Self {
        self.default_pipeline = pipeline;
        self
    }

    pub fn default_pipeline(&self) -> PipelineMode {
        self.default_pipeline
    }

    pub fn client_label(&self) -> String {
        self.client.describe()
    }

    pub async fn suggest(
        &self,
        ticket_id: TicketId,
        pipeline: Option<PipelineMode>,
    ) -> Result<TriageOutcome, TriageError> {
        let correlation_id = Uuid::new_v4().to_string();
        self.suggest_with_correlation(ticket_id, pipeline, &correlation_id).await
    }

    /// Runs the configured pipeline for one ticket. The store is never written here.
    pub async fn suggest_with_correlation(
        &self,
        ticket_id: TicketId,
        pipeline: Option<PipelineMode>,
        correlation_id: &str,
    ) -> Result<TriageOutcome, TriageError> {
        let mode = pipeline.unwrap_or(self.default_pipeline);
        let started = Instant::now();
        info!(
            event_name = "triage.run.start",
            ticket_id = ticket_id.0,
            correlation_id = %correlation_id,
            pipeline = mode.as_str(),
            model = %self.client.describe(),
            "starting triage run"
        );

        let result = self.run(ticket_id, mode, correlation_id).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(outcome) => {
                info!(
                    event_name = "triage.run.completed",
                    ticket_id = ticket_id.0,
                    correlation_id = %correlation_id,
                    pipeline = mode.as_str(),
                    category = %outcome.suggestion.category_name,
                    priority = outcome.patch.priority.as_str(),
                    status = outcome.patch.status.as_str(),
                    elapsed_ms,
                    "triage run completed"
                );
                self.audit.emit(
                    AuditEvent::new(
                        Some(ticket_id),
                        correlation_id,
                        "triage.suggestion.produced",
                        AuditCategory::Generation,
                        ACTOR,
                        AuditOutcome::Success,
                    )
                    .with_metadata("pipeline", mode.as_str())
                    .with_metadata("category_name", outcome.suggestion.category_name.clone())
                    .with_metadata("priority", outcome.patch.priority.as_str())
                    .with_metadata("status", outcome.patch.status.as_str()),
                );
            }
            Err(error) => {
                warn!(
                    event_name = "triage.run.failed",
                    ticket_id = ticket_id.0,
                    correlation_id = %correlation_id,
                    pipeline = mode.as_str(),
                    error_class = error.error_class(),
                    error = %error,
                    elapsed_ms,
                    "triage run failed"
                );
                let outcome = match error {
                    TriageError::NotFound { .. }
                    | TriageError::NoCategoriesConfigured
                    | TriageError::CategoryMismatch { .. } => AuditOutcome::Rejected,
                    _ => AuditOutcome::Failed,
                };
                self.audit.emit(
                    AuditEvent::new(
                        Some(ticket_id),
                        correlation_id,
                        "triage.suggestion.failed",
                        audit_category(error),
                        ACTOR,
                        outcome,
                    )
                    .with_metadata("pipeline", mode.as_str())
                    .with_metadata("error_class", error.error_class()),
                );
            }
        }

        result
    }

    async fn run(
        &self,
        ticket_id: TicketId,
        mode: PipelineMode,
        correlation_id: &str,
    ) -> Result<TriageOutcome, TriageError> {
        let context =
            pipeline::fetch(self.tickets.as_ref(), self.categories.as_ref(), ticket_id, correlation_id)
                .await?;

        // Dropping the generation future on expiry also drops any in-flight HTTP request.
        let suggestion = tokio::time::timeout(
            self.run_timeout,
            pipeline::generate(mode, self.client.as_ref(), &context),
        )
        .await
        .map_err(|_| TriageError::BackendTimeout { timeout: self.run_timeout })??;

        pipeline::finalize(context, suggestion, &self.policy)
    }

    /// Persists a guardrail-approved patch and returns the updated ticket.
    pub async fn apply(&self, outcome: &TriageOutcome) -> Result<Ticket, TriageError> {
        let updated = self
            .tickets
            .apply_patch(outcome.ticket_id, &outcome.patch)
            .await
            .map_err(store_error)?
            .ok_or(TriageError::NotFound { ticket_id: outcome.ticket_id })?;

        self.audit.emit(
            AuditEvent::new(
                Some(outcome.ticket_id),
                Uuid::new_v4().to_string(),
                "triage.patch.applied",
                AuditCategory::Persistence,
                ACTOR,
                AuditOutcome::Success,
            )
            .with_metadata("priority", updated.priority.as_str())
            .with_metadata("status", updated.status.as_str()),
        );
        Ok(updated)
    }

    /// Sends a tiny deterministic request so the first real run does not pay model load time.
    /// Failure is logged and reported, never raised.
    pub async fn warmup(&self) -> bool {
        let started = Instant::now();
        match self.client.generate(warmup_prompt(), GenerationOptions::WARMUP).await {
            Ok(_) => {
                info!(
                    event_name = "triage.llm.warmup",
                    model = %self.client.describe(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "model warmup succeeded"
                );
                true
            }
            Err(error) => {
                warn!(
                    event_name = "triage.llm.warmup_failed",
                    model = %self.client.describe(),
                    error = %error,
                    "model warmup failed; continuing"
                );
                false
            }
        }
    }

    /// Releases the model client. Store handles are owned by the caller.
    pub fn shutdown(self) {
        info!(
            event_name = "triage.service.shutdown",
            model = %self.client.describe(),
            "releasing model client"
        );
        drop(self.client);
    }
}

fn audit_category(error: &TriageError) -> AuditCategory {
    match error {
        TriageError::NotFound { .. } | TriageError::NoCategoriesConfigured => AuditCategory::Ingress,
        TriageError::BackendTimeout { .. } | TriageError::BackendUnavailable(_) => {
            AuditCategory::Generation
        }
        TriageError::Decode { .. } => AuditCategory::Decode,
        TriageError::CategoryMismatch { .. } => AuditCategory::Policy,
        TriageError::Store(_) => AuditCategory::Persistence,
    }
}
