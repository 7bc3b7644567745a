//! Deterministic guardrails applied to every model proposal before it may be persisted.
//!
//! The language model is only trusted to *suggest*. Category overrides for well-known
//! keyword families, the terminal-status lock, escalation defaults and non-regression of
//! status/priority are decided here, synchronously and without I/O.

use std::collections::BTreeMap;

use crate::domain::category::CategoryId;
use crate::domain::suggestion::{ProposedPatch, TicketPatch};
use crate::domain::ticket::{Ticket, TicketStatus};

pub const ACCESS_CATEGORY: &str = "Access";
pub const DATA_CATEGORY: &str = "Data";

pub const ACCESS_KEYWORDS: &[&str] = &[
    "403",
    "401",
    "forbidden",
    "unauthorized",
    "permission",
    "permissions",
    "role",
    "roles",
    "rôle",
    "rôles",
    "auth",
    "token",
    "jwt",
    "access denied",
    "denied",
    "droit",
    "droits",
];

pub const DATA_KEYWORDS: &[&str] = &[
    "csv",
    "export",
    "exports",
    "colonne",
    "colonnes",
    "column",
    "separator",
    "séparateur",
    "separateur",
    "encoding",
    "encodage",
    "delimiter",
    "délimiteur",
    "delimiteur",
    "import",
    "importer",
    "rapport",
    "rapports",
    "montant",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardrailAdjustment {
    AccessKeywordCategory,
    DataKeywordCategory,
    TerminalStatusLocked,
    TriageStatusDefaulted,
    PriorityRegressionBlocked,
    EscalatedToInProgress,
    StatusRegressionBlocked,
}

impl GuardrailAdjustment {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::AccessKeywordCategory => "category_forced_access",
            Self::DataKeywordCategory => "category_forced_data",
            Self::TerminalStatusLocked => "terminal_status_locked",
            Self::TriageStatusDefaulted => "triage_status_defaulted",
            Self::PriorityRegressionBlocked => "priority_regression_blocked",
            Self::EscalatedToInProgress => "escalated_to_in_progress",
            Self::StatusRegressionBlocked => "status_regression_blocked",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reconciliation {
    pub patch: TicketPatch,
    pub adjustments: Vec<GuardrailAdjustment>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub access_category: String,
    pub access_keywords: Vec<String>,
    pub data_category: String,
    pub data_keywords: Vec<String>,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self {
            access_category: ACCESS_CATEGORY.to_string(),
            access_keywords: ACCESS_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            data_category: DATA_CATEGORY.to_string(),
            data_keywords: DATA_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl GuardrailPolicy {
    pub fn reconcile(
        &self,
        ticket: &Ticket,
        proposed: &ProposedPatch,
        category_name_to_id: &BTreeMap<String, CategoryId>,
    ) -> TicketPatch {
        self.reconcile_with_trace(ticket, proposed, category_name_to_id).patch
    }

    pub fn reconcile_with_trace(
        &self,
        ticket: &Ticket,
        proposed: &ProposedPatch,
        category_name_to_id: &BTreeMap<String, CategoryId>,
    ) -> Reconciliation {
        let mut adjustments = Vec::new();
        let current_status = ticket.status;
        let current_priority = ticket.priority;
        let proposed_status = proposed.status.unwrap_or(current_status);
        let proposed_priority = proposed.priority.unwrap_or(current_priority);

        let mut category_id = proposed.category_id;
        let text = ticket.full_text().to_lowercase();

        // Sequential assignment: when both keyword families match, Data is written last and wins.
        if let Some(access_id) = category_name_to_id.get(&self.access_category) {
            if contains_any(&text, &self.access_keywords) {
                category_id = Some(*access_id);
                adjustments.push(GuardrailAdjustment::AccessKeywordCategory);
            }
        }
        if let Some(data_id) = category_name_to_id.get(&self.data_category) {
            if contains_any(&text, &self.data_keywords) {
                category_id = Some(*data_id);
                adjustments.push(GuardrailAdjustment::DataKeywordCategory);
            }
        }

        let mut status = if current_status.is_terminal() {
            if proposed_status != current_status {
                adjustments.push(GuardrailAdjustment::TerminalStatusLocked);
            }
            current_status
        } else if proposed_status.is_triage_allowed() {
            proposed_status
        } else {
            adjustments.push(GuardrailAdjustment::TriageStatusDefaulted);
            if proposed_priority.is_escalated() {
                TicketStatus::InProgress
            } else {
                TicketStatus::Open
            }
        };

        let mut priority = proposed_priority;
        if priority.rank() < current_priority.rank() {
            priority = current_priority;
            adjustments.push(GuardrailAdjustment::PriorityRegressionBlocked);
        }

        if !current_status.is_terminal() && priority.is_escalated() && status == TicketStatus::Open
        {
            status = TicketStatus::InProgress;
            adjustments.push(GuardrailAdjustment::EscalatedToInProgress);
        }

        if status.rank() < current_status.rank() {
            status = current_status;
            adjustments.push(GuardrailAdjustment::StatusRegressionBlocked);
        }

        Reconciliation { patch: TicketPatch { category_id, priority, status }, adjustments }
    }
}

/// Reconciles with the default keyword tables.
pub fn reconcile(
    ticket: &Ticket,
    proposed: &ProposedPatch,
    category_name_to_id: &BTreeMap<String, CategoryId>,
) -> TicketPatch {
    GuardrailPolicy::default().reconcile(ticket, proposed, category_name_to_id)
}

fn contains_any(text: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|keyword| text.contains(keyword.as_str()))
}
