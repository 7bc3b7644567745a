//! Extraction and validation of structured stage output from free-form model text.

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::domain::suggestion::{CategoryDraft, PriorityDraft, ReplyDraft, TriageDraft};
use crate::prompts::PromptStage;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeFailure {
    #[error("no '{{' found in model output")]
    NoJsonFound,
    #[error("incomplete JSON object (unbalanced braces)")]
    IncompleteJson,
    #[error("output does not match the {stage} schema: {reason}")]
    Schema { stage: &'static str, reason: String },
}

/// Returns the first balanced top-level `{...}` in `raw`.
///
/// Braces inside string literals are ignored, and `\"` does not close a string.
pub fn extract_first_json_object(raw: &str) -> Result<&str, DecodeFailure> {
    let start = raw.find('{').ok_or(DecodeFailure::NoJsonFound)?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Ok(&raw[start..end]);
                }
            }
            _ => {}
        }
    }

    Err(DecodeFailure::IncompleteJson)
}

/// Typed output of one pipeline stage.
pub trait StageSchema: DeserializeOwned {
    const STAGE: PromptStage;

    /// Checks beyond what deserialization already enforces.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

impl StageSchema for TriageDraft {
    const STAGE: PromptStage = PromptStage::Triage;

    fn validate(&self) -> Result<(), String> {
        require_text("category_name", &self.category_name)?;
        require_text("summary", &self.summary)
    }
}

impl StageSchema for CategoryDraft {
    const STAGE: PromptStage = PromptStage::Classify;

    fn validate(&self) -> Result<(), String> {
        require_text("category_name", &self.category_name)?;
        require_text("summary", &self.summary)
    }
}

impl StageSchema for PriorityDraft {
    const STAGE: PromptStage = PromptStage::Prioritize;
}

impl StageSchema for ReplyDraft {
    const STAGE: PromptStage = PromptStage::Reply;
}

fn require_text(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("`{field}` must be a non-empty string"));
    }
    Ok(())
}

/// Extracts and validates one stage payload. No retry happens here.
pub fn decode_stage<T: StageSchema>(raw: &str) -> Result<T, DecodeFailure> {
    let candidate = extract_first_json_object(raw)?;
    let schema_error =
        |reason: String| DecodeFailure::Schema { stage: T::STAGE.as_str(), reason };

    let value: T =
        serde_json::from_str(candidate).map_err(|error| schema_error(error.to_string()))?;
    value.validate().map_err(schema_error)?;
    Ok(value)
}
