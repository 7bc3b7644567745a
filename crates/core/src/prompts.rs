//! Prompt composition for each triage stage.
//!
//! Every prompt is self-contained: the backend is a stateless request/response capability,
//! so the instruction block travels with each request, including repair requests.

use serde::Serialize;
use serde_json::{json, Value};

use crate::domain::ticket::{Ticket, TicketPriority};
use crate::errors::truncate_chars;

/// Descriptions are cut to this many characters before being embedded.
pub const DESCRIPTION_CHAR_LIMIT: usize = 1500;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStage {
    Triage,
    Classify,
    Prioritize,
    Reply,
}

impl PromptStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Triage => "triage",
            Self::Classify => "classify",
            Self::Prioritize => "prioritize",
            Self::Reply => "reply",
        }
    }

    pub fn required_keys(&self) -> &'static [&'static str] {
        match self {
            Self::Triage => {
                &["category_name", "priority", "status", "summary", "rationale", "draft_reply"]
            }
            Self::Classify => &["category_name", "summary", "rationale"],
            Self::Prioritize => &["priority", "status", "rationale"],
            Self::Reply => &["draft_reply"],
        }
    }

    /// Output budget per stage, in model tokens.
    pub fn max_output_tokens(&self) -> u32 {
        match self {
            Self::Triage => 260,
            Self::Classify => 240,
            Self::Prioritize => 200,
            Self::Reply => 180,
        }
    }

    /// Role line, the key list rendered from [`Self::required_keys`], then the stage rules.
    fn instructions(&self) -> String {
        let (role, rules) = match self {
            Self::Triage => (TRIAGE_ROLE, TRIAGE_RULES),
            Self::Classify => (CLASSIFY_ROLE, CLASSIFY_RULES),
            Self::Prioritize => (PRIORITIZE_ROLE, PRIORITIZE_RULES),
            Self::Reply => (REPLY_ROLE, REPLY_RULES),
        };
        format!(
            "{role}\nAnswer with a single valid JSON object only: no markdown, no text before or after.\n\
             EXACT keys: {}.\n{rules}",
            self.required_keys().join(", ")
        )
    }
}

const TRIAGE_ROLE: &str = "You are a support ticket triage agent.";
const TRIAGE_RULES: &str = "\
Value types: category_name (string), priority (LOW|MEDIUM|HIGH|URGENT), status (OPEN|IN_PROGRESS),
summary (string), rationale (array of strings), draft_reply (string or null).
Rules:
1) category_name MUST be EXACTLY one value from the allowed list.
2) Avoid 'Incident' unless there is a global outage or unavailability.
3) status: only propose OPEN or IN_PROGRESS, never RESOLVED or CLOSED.
   If priority is HIGH or URGENT, status must be IN_PROGRESS.
4) 401/403/forbidden/permission/role/token language -> category_name = Access.
5) CSV/export/encoding/separator/column language -> category_name = Data.
6) summary: 1-2 sentences.
7) rationale: 2-5 short factual bullet points.
";

const CLASSIFY_ROLE: &str = "You are a support ticket classification agent.";
const CLASSIFY_RULES: &str = "\
Rules:
- category_name MUST be EXACTLY one value from the allowed list.
- Avoid 'Incident' unless there is a global outage or unavailability.
- 401/403/forbidden/permission/role/token language -> Access.
- CSV/export/encoding/separator/column language -> Data.
- summary: 1-2 sentences.
- rationale: 2-4 short factual bullet points.
";

const PRIORITIZE_ROLE: &str = "You are a support ticket prioritization agent.";
const PRIORITIZE_RULES: &str = "\
Rules:
- priority is one of LOW|MEDIUM|HIGH|URGENT.
- status: only propose OPEN or IN_PROGRESS, never RESOLVED or CLOSED.
- If priority is HIGH or URGENT, status must be IN_PROGRESS.
- Multi-user outage or unavailability -> URGENT + IN_PROGRESS.
- Finance issues (double charge, refund) -> usually URGENT + IN_PROGRESS.
- rationale: 2-4 short factual bullet points.
";

const REPLY_ROLE: &str = "You are a support reply drafting agent.";
const REPLY_RULES: &str = "\
Rules:
- draft_reply: 1-3 professional sentences, clear tone.
- If priority is HIGH or URGENT, always try to provide a reply.
- If the ticket is purely internal or informational, draft_reply may be null.
- Never promise an exact delivery time.
";

/// Ticket fields as embedded in prompts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TicketContext<'a> {
    pub title: &'a str,
    pub description: &'a str,
}

impl<'a> From<&'a Ticket> for TicketContext<'a> {
    fn from(ticket: &'a Ticket) -> Self {
        Self { title: &ticket.title, description: &ticket.description }
    }
}

impl TicketContext<'_> {
    fn render(&self) -> String {
        let description = truncate_chars(self.description, DESCRIPTION_CHAR_LIMIT);
        format!("Ticket:\nTitle: {}\nDescription: {}\n", self.title, description)
    }
}

/// Everything a stage prompt may depend on. Each variant carries only what its stage reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromptRequest<'a> {
    Triage { ticket: TicketContext<'a>, allowed_categories: &'a [String] },
    Classify { ticket: TicketContext<'a>, allowed_categories: &'a [String] },
    Prioritize { ticket: TicketContext<'a>, category_name: &'a str },
    Reply { ticket: TicketContext<'a>, category_name: &'a str, priority: TicketPriority },
}

impl PromptRequest<'_> {
    pub fn stage(&self) -> PromptStage {
        match self {
            Self::Triage { .. } => PromptStage::Triage,
            Self::Classify { .. } => PromptStage::Classify,
            Self::Prioritize { .. } => PromptStage::Prioritize,
            Self::Reply { .. } => PromptStage::Reply,
        }
    }

    /// Category list a repair prompt should restate, for stages that choose a category.
    pub fn allowed_categories(&self) -> Option<&[String]> {
        match self {
            Self::Triage { allowed_categories, .. } | Self::Classify { allowed_categories, .. } => {
                Some(allowed_categories)
            }
            Self::Prioritize { .. } | Self::Reply { .. } => None,
        }
    }
}

pub fn compose(request: &PromptRequest<'_>) -> String {
    let stage = request.stage();
    let mut prompt = String::with_capacity(2048);
    prompt.push_str(&stage.instructions());
    prompt.push('\n');

    match request {
        PromptRequest::Triage { ticket, allowed_categories } => {
            prompt.push_str(&allowed_line(allowed_categories));
            prompt.push_str(&ticket.render());
            prompt.push_str("\nAnswer ONLY with a conforming JSON object.\n");
            prompt.push_str("Example shape (do not copy the values, only respect the keys):\n");
            prompt.push_str(&triage_example(allowed_categories).to_string());
        }
        PromptRequest::Classify { ticket, allowed_categories } => {
            prompt.push_str(&allowed_line(allowed_categories));
            prompt.push_str(&ticket.render());
        }
        PromptRequest::Prioritize { ticket, category_name } => {
            prompt.push_str(&format!(
                "Category already chosen: {}\n\n",
                Value::from(*category_name)
            ));
            prompt.push_str(&ticket.render());
        }
        PromptRequest::Reply { ticket, category_name, priority } => {
            prompt.push_str("Context:\n");
            prompt.push_str(&format!("- category_name: {}\n", Value::from(*category_name)));
            prompt.push_str(&format!("- priority: {priority}\n\n"));
            prompt.push_str(&ticket.render());
        }
    }

    prompt
}

/// Second-chance prompt after the previous output failed extraction or validation.
pub fn compose_repair(request: &PromptRequest<'_>, error: &str, previous_output: &str) -> String {
    let mut prompt = String::with_capacity(2048 + previous_output.len());
    prompt.push_str(&request.stage().instructions());
    prompt.push('\n');
    prompt.push_str("Your previous output was not valid or could not be parsed.\n");
    prompt.push_str("Fix it and answer ONLY with a valid JSON object (no text).\n");
    prompt.push_str(&format!("Error: {error}\n"));
    if let Some(allowed) = request.allowed_categories() {
        prompt.push_str(&format!("Allowed categories: {}\n", Value::from(allowed.to_vec())));
    }
    prompt.push_str("Previous output:\n");
    prompt.push_str(previous_output);
    prompt
}

/// Tiny deterministic request used to load the model at startup.
pub fn warmup_prompt() -> &'static str {
    "Answer only with: {\"ok\": true}"
}

fn allowed_line(allowed_categories: &[String]) -> String {
    format!("Allowed categories (strict list): {}\n\n", Value::from(allowed_categories.to_vec()))
}

fn triage_example(allowed_categories: &[String]) -> Value {
    let category = allowed_categories.first().map(String::as_str).unwrap_or("Bug");
    json!({
        "category_name": category,
        "priority": "MEDIUM",
        "status": "OPEN",
        "summary": "string",
        "rationale": ["string"],
        "draft_reply": null,
    })
}
