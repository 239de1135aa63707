//! Safety reviewer: scores a candidate and flags concerns.

use tracing::{info, instrument};

use super::{AgentRuntime, prompt_failure};
use crate::core::safety::{ReviewerVerdict, finalize_review};
use crate::core::types::{AgentRole, CandidateAnalysis, Mode, SafetyReview};
use crate::error::AnalysisFailure;
use crate::io::generator::Generator;

/// Review `candidate` and apply the local approval policy to the verdict.
#[instrument(skip_all, fields(iteration = candidate.iteration))]
pub fn review<G: Generator + ?Sized>(
    runtime: &AgentRuntime<'_, G>,
    candidate: &CandidateAnalysis,
    mode: Mode,
    approval_threshold: f64,
) -> Result<SafetyReview, AnalysisFailure> {
    let prompt = runtime
        .prompts
        .build_reviewer(candidate, mode)
        .map_err(|err| prompt_failure(AgentRole::SafetyReviewer, err))?;
    let verdict: ReviewerVerdict = runtime.call(AgentRole::SafetyReviewer, &prompt)?;
    let model_approved = verdict.approved;
    let review = finalize_review(verdict, approval_threshold);
    info!(
        safety_score = review.safety_score,
        concerns = review.concerns.len(),
        crisis = review.has_crisis_indicator(),
        model_approved,
        approved = review.approved,
        "review complete"
    );
    Ok(review)
}
