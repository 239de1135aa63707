//! Summary agent: emotional and topical summary of the conversation.

use tracing::{info, instrument};

use super::{AgentRuntime, prompt_failure};
use crate::core::types::{AgentRole, SummaryResult};
use crate::error::AnalysisFailure;
use crate::io::generator::Generator;
use crate::io::prompt::PromptInputs;

#[instrument(skip_all, fields(mode = %input.mode))]
pub fn summarize<G: Generator + ?Sized>(
    runtime: &AgentRuntime<'_, G>,
    input: &PromptInputs<'_>,
) -> Result<SummaryResult, AnalysisFailure> {
    let prompt = runtime
        .prompts
        .build_summarizer(input)
        .map_err(|err| prompt_failure(AgentRole::Summarizer, err))?;
    let summary: SummaryResult = runtime.call(AgentRole::Summarizer, &prompt)?;
    info!(
        emotions = summary.emotions.len(),
        focus_areas = summary.focus_areas.len(),
        tags = summary.tags.len(),
        "summary ready"
    );
    Ok(summary)
}
