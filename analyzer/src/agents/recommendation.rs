//! Recommendation agent: actionable suggestions for the user.

use tracing::{info, instrument};

use super::{AgentRuntime, prompt_failure};
use crate::core::types::{AgentRole, RecommendationResult};
use crate::error::AnalysisFailure;
use crate::io::generator::Generator;
use crate::io::prompt::PromptInputs;

#[instrument(skip_all, fields(mode = %input.mode))]
pub fn recommend<G: Generator + ?Sized>(
    runtime: &AgentRuntime<'_, G>,
    input: &PromptInputs<'_>,
) -> Result<RecommendationResult, AnalysisFailure> {
    let prompt = runtime
        .prompts
        .build_recommender(input)
        .map_err(|err| prompt_failure(AgentRole::Recommender, err))?;
    let recommendation: RecommendationResult = runtime.call(AgentRole::Recommender, &prompt)?;
    info!(
        recommendations = recommendation.recommendations.len(),
        exercises = recommendation.wellness_exercises.len(),
        tasks = recommendation.recommended_tasks.len(),
        tone = ?recommendation.tone,
        "recommendation ready"
    );
    Ok(recommendation)
}
