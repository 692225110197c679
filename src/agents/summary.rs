//! Summary Agent
//!
//! First pipeline stage: asks the model for a concise summary of the
//! submitted guideline.

use crate::llm::{GenerationParams, ModelGateway};
use crate::types::AppResult;
use tracing::info;

pub struct SummaryAgent;

impl SummaryAgent {
    pub fn create_prompt(guideline_text: &str) -> String {
        format!(
            "Please provide a concise summary of the following guideline document.\n\
             Focus on the key points, main requirements, and important procedures.\n\n\
             Guideline text:\n{}",
            guideline_text
        )
    }

    /// Returns the model's summary with surrounding whitespace removed.
    pub async fn summarize(
        gateway: &dyn ModelGateway,
        guideline_text: &str,
        params: GenerationParams,
    ) -> AppResult<String> {
        let prompt = Self::create_prompt(guideline_text);
        let summary = gateway.generate(&prompt, params).await?;
        let summary = summary.trim().to_string();

        info!(summary_len = summary.len(), "Summary generated");
        Ok(summary)
    }
}
