use serde::{Deserialize, Serialize};

use crate::domain::category::CategoryId;
use crate::domain::ticket::{TicketId, TicketPriority, TicketStatus};

/// Upper bound on rationale entries carried by a suggestion.
pub const MAX_RATIONALE_ITEMS: usize = 5;

/// Model proposal for a ticket, before guardrails. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub category_name: String,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    pub summary: String,
    pub rationale: Vec<String>,
    pub draft_reply: Option<String>,
}

/// Output of the combined single-call triage stage.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TriageDraft {
    pub category_name: String,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    pub summary: String,
    #[serde(default)]
    pub rationale: Vec<String>,
    #[serde(default)]
    pub draft_reply: Option<String>,
}

/// Output of the classify stage.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CategoryDraft {
    pub category_name: String,
    pub summary: String,
    #[serde(default)]
    pub rationale: Vec<String>,
}

/// Output of the prioritize stage.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PriorityDraft {
    pub priority: TicketPriority,
    pub status: TicketStatus,
    #[serde(default)]
    pub rationale: Vec<String>,
}

/// Output of the reply stage. `null` is a valid answer.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ReplyDraft {
    #[serde(default)]
    pub draft_reply: Option<String>,
}

impl From<TriageDraft> for Suggestion {
    fn from(draft: TriageDraft) -> Self {
        Self {
            category_name: draft.category_name,
            priority: draft.priority,
            status: draft.status,
            summary: draft.summary,
            rationale: cap_rationale(draft.rationale),
            draft_reply: normalize_reply(draft.draft_reply),
        }
    }
}

impl Suggestion {
    /// Fan-in of the multi-stage pipeline: classify rationale first, then prioritize.
    pub fn merge_stages(category: CategoryDraft, priority: PriorityDraft, reply: ReplyDraft) -> Self {
        let rationale = category.rationale.into_iter().chain(priority.rationale).collect();
        Self {
            category_name: category.category_name,
            priority: priority.priority,
            status: priority.status,
            summary: category.summary,
            rationale: cap_rationale(rationale),
            draft_reply: normalize_reply(reply.draft_reply),
        }
    }

    /// Proposed patch derived from the suggestion once its category resolved.
    pub fn proposed_patch(&self, category_id: CategoryId) -> ProposedPatch {
        ProposedPatch {
            category_id: Some(category_id),
            priority: Some(self.priority),
            status: Some(self.status),
        }
    }
}

fn cap_rationale(rationale: Vec<String>) -> Vec<String> {
    rationale
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .take(MAX_RATIONALE_ITEMS)
        .collect()
}

fn normalize_reply(reply: Option<String>) -> Option<String> {
    reply.map(|text| text.trim().to_string()).filter(|text| !text.is_empty())
}

/// Field changes proposed by the pipeline; any field may be absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedPatch {
    pub category_id: Option<CategoryId>,
    pub priority: Option<TicketPriority>,
    pub status: Option<TicketStatus>,
}

/// Guardrail-approved update. The only value the store is asked to persist.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketPatch {
    pub category_id: Option<CategoryId>,
    pub priority: TicketPriority,
    pub status: TicketStatus,
}

/// Result of one pipeline run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageOutcome {
    pub ticket_id: TicketId,
    pub suggestion: Suggestion,
    #[serde(rename = "patch_to_apply")]
    pub patch: TicketPatch,
}
