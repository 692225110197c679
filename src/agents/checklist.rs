//! Checklist Agent
//!
//! Second pipeline stage. The prompt is built from the summary (never the
//! original guideline) and asks for a JSON array of strings. Models do not
//! always comply, so parsing has two explicit branches:
//!
//! 1. Structured: the output decodes as JSON and the top-level value is an
//!    array. Items are taken in decode order.
//! 2. Fallback: one item per non-blank line, skipping lines that open or close
//!    a list (`[` / `]`) and stripping `-`, `*` or `•` bullet markers.
//!
//! The fallback cannot fail, so parsing always yields a list.

use crate::llm::{GenerationParams, ModelGateway};
use crate::types::AppResult;
use serde_json::Value;
use tracing::{info, warn};

const BULLET_MARKERS: [char; 3] = ['-', '*', '•'];

/// Which branch produced the checklist items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecklistParse {
    Structured(Vec<String>),
    Fallback(Vec<String>),
}

impl ChecklistParse {
    pub fn items(&self) -> &[String] {
        match self {
            ChecklistParse::Structured(items) | ChecklistParse::Fallback(items) => items,
        }
    }

    pub fn into_items(self) -> Vec<String> {
        match self {
            ChecklistParse::Structured(items) | ChecklistParse::Fallback(items) => items,
        }
    }

    pub fn used_fallback(&self) -> bool {
        matches!(self, ChecklistParse::Fallback(_))
    }
}

pub struct ChecklistAgent;

impl ChecklistAgent {
    pub fn create_prompt(summary: &str) -> String {
        format!(
            "Based on the following summary of a guideline document, create a practical checklist\n\
             that someone could use to ensure they follow all the important requirements.\n\n\
             Return the response as a JSON array of strings, where each string is a checklist item.\n\n\
             Summary:\n{}",
            summary
        )
    }

    pub async fn generate(
        gateway: &dyn ModelGateway,
        summary: &str,
        params: GenerationParams,
    ) -> AppResult<ChecklistParse> {
        let prompt = Self::create_prompt(summary);
        let raw = gateway.generate(&prompt, params).await?;
        let parsed = Self::parse(&raw);

        if parsed.used_fallback() {
            warn!(
                raw_len = raw.len(),
                item_count = parsed.items().len(),
                "Checklist output was not a JSON array, used line fallback"
            );
        } else {
            info!(item_count = parsed.items().len(), "Checklist generated");
        }

        Ok(parsed)
    }

    pub fn parse(raw: &str) -> ChecklistParse {
        let raw = raw.trim();

        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(values)) => {
                ChecklistParse::Structured(values.into_iter().map(Self::item_text).collect())
            }
            _ => ChecklistParse::Fallback(Self::parse_lines(raw)),
        }
    }

    /// String elements are used as-is; any other JSON element keeps its JSON text.
    fn item_text(value: Value) -> String {
        match value {
            Value::String(s) => s,
            other => other.to_string(),
        }
    }

    fn parse_lines(raw: &str) -> Vec<String> {
        raw.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| !line.starts_with('[') && !line.starts_with(']'))
            .map(|line| Self::strip_bullets(line).to_string())
            .collect()
    }

    /// Removes leading "<marker><whitespace>" prefixes. Anything else (for
    /// example "1." numbering) is kept as literal content.
    fn strip_bullets(line: &str) -> &str {
        let mut rest = line;
        loop {
            let mut chars = rest.chars();
            match (chars.next(), chars.next()) {
                (Some(marker), Some(gap)) if BULLET_MARKERS.contains(&marker) && gap.is_whitespace() => {
                    rest = chars.as_str().trim_start();
                }
                _ => return rest.trim(),
            }
        }
    }
}
