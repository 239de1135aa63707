//! Safety refiner: rewrites a rejected candidate using reviewer feedback.

use serde::Deserialize;
use tracing::{info, instrument};

use super::{AgentRuntime, prompt_failure};
use crate::core::types::{
    AgentRole, CandidateAnalysis, Mode, RecommendationResult, SafetyReview, SummaryResult,
};
use crate::error::AnalysisFailure;
use crate::io::generator::Generator;

/// Refiner output: a full replacement for both halves of the candidate.
#[derive(Debug, Deserialize)]
struct RefinedAnalysis {
    summary: SummaryResult,
    recommendation: RecommendationResult,
}

/// Produce the successor of `candidate`. The predecessor is consumed.
#[instrument(skip_all, fields(iteration = candidate.iteration, modifications = review.required_modifications.len()))]
pub fn refine<G: Generator + ?Sized>(
    runtime: &AgentRuntime<'_, G>,
    candidate: CandidateAnalysis,
    review: &SafetyReview,
    mode: Mode,
) -> Result<CandidateAnalysis, AnalysisFailure> {
    let prompt = runtime
        .prompts
        .build_refiner(&candidate, review, mode)
        .map_err(|err| prompt_failure(AgentRole::SafetyRefiner, err))?;
    let refined: RefinedAnalysis = runtime.call(AgentRole::SafetyRefiner, &prompt)?;
    let next = candidate.next_revision(refined.summary, refined.recommendation);
    info!(next_iteration = next.iteration, "candidate refined");
    Ok(next)
}
