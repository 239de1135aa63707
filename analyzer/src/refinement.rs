//! Refinement loop controller: drives review/refine until accepted or escalated.

use tracing::{info, instrument};

use crate::agents::AgentRuntime;
use crate::agents::refiner::refine;
use crate::agents::reviewer::review;
use crate::core::transition::{LoopEvent, LoopState, transition};
use crate::core::types::{CandidateAnalysis, EscalationReason, Mode, SafetyReview};
use crate::error::AnalysisFailure;
use crate::io::generator::Generator;

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Accepted,
    Escalated(EscalationReason),
}

impl Resolution {
    pub fn is_escalated(&self) -> bool {
        matches!(self, Resolution::Escalated(_))
    }
}

/// Terminal state of one loop run.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub candidate: CandidateAnalysis,
    pub last_review: SafetyReview,
    pub resolution: Resolution,
    /// Review passes run; equals `candidate.iteration + 1`.
    pub reviews_run: u32,
    pub refinements: u32,
}

pub struct RefinementLoop<'r, 'a, G: ?Sized> {
    runtime: &'r AgentRuntime<'a, G>,
    max_iterations: u32,
    approval_threshold: f64,
}

impl<'r, 'a, G: Generator + ?Sized> RefinementLoop<'r, 'a, G> {
    pub fn new(runtime: &'r AgentRuntime<'a, G>, max_iterations: u32, approval_threshold: f64) -> Self {
        Self {
            runtime,
            max_iterations,
            approval_threshold,
        }
    }

    #[instrument(skip_all, fields(max_iterations = self.max_iterations))]
    pub fn run(&self, initial: CandidateAnalysis, mode: Mode) -> Result<LoopOutcome, AnalysisFailure> {
        let mut state = LoopState::Reviewing;
        let mut candidate = initial;
        let mut last_review: Option<SafetyReview> = None;
        let mut reviews_run = 0u32;
        let mut refinements = 0u32;

        while !state.is_terminal() {
            state = match state {
                LoopState::Reviewing => {
                    let verdict = review(self.runtime, &candidate, mode, self.approval_threshold)?;
                    reviews_run += 1;
                    let event = LoopEvent::Reviewed {
                        review: &verdict,
                        iteration: candidate.iteration,
                    };
                    let next = transition(state, event, self.max_iterations).map_err(loop_fault)?;
                    last_review = Some(verdict);
                    next
                }
                LoopState::Refining => {
                    let feedback = last_review
                        .as_ref()
                        .ok_or_else(|| loop_fault("refining without a review"))?;
                    candidate = refine(self.runtime, candidate, feedback, mode)?;
                    refinements += 1;
                    transition(state, LoopEvent::Refined, self.max_iterations).map_err(loop_fault)?
                }
                terminal => terminal,
            };
            info!(state = %state, iteration = candidate.iteration, "loop transition");
        }

        let resolution = match state {
            LoopState::Accepted => Resolution::Accepted,
            LoopState::Escalated(reason) => Resolution::Escalated(reason),
            other => return Err(loop_fault(format!("loop stopped in state {other}"))),
        };
        let last_review = last_review.ok_or_else(|| loop_fault("loop ended without a review"))?;
        Ok(LoopOutcome {
            candidate,
            last_review,
            resolution,
            reviews_run,
            refinements,
        })
    }
}

fn loop_fault(err: impl std::fmt::Display) -> AnalysisFailure {
    AnalysisFailure::generation(format!("refinement loop fault: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use crate::agents::CallPolicy;
    use crate::core::types::AgentRole;
    use crate::io::prompt::PromptBuilder;
    use crate::io::schema::SchemaSet;
    use crate::test_support::{
        Reply, ScriptedGenerator, approve_json, crisis_json, refined_json, reject_json,
        sample_candidate,
    };

    fn run_loop(generator: &ScriptedGenerator, max_iterations: u32) -> Result<LoopOutcome, AnalysisFailure> {
        let schemas = SchemaSet::compile().expect("schemas");
        let prompts = PromptBuilder::new(40_000);
        let runtime = AgentRuntime {
            generator,
            schemas: &schemas,
            prompts: &prompts,
            policy: CallPolicy {
                timeout: Duration::from_secs(10),
                retries: 2,
                retry_delay: Duration::ZERO,
                output_limit_bytes: 100_000,
            },
            deadline: Instant::now() + Duration::from_secs(60),
        };
        RefinementLoop::new(&runtime, max_iterations, 0.8).run(sample_candidate(), Mode::StudyStress)
    }

    #[test]
    fn first_approval_accepts_without_refining() {
        let generator =
            ScriptedGenerator::new().always(AgentRole::SafetyReviewer, Reply::text(approve_json(0.9)));
        let outcome = run_loop(&generator, 3).expect("outcome");
        assert_eq!(outcome.resolution, Resolution::Accepted);
        assert_eq!(outcome.reviews_run, 1);
        assert_eq!(outcome.candidate.iteration, 0);
        assert_eq!(generator.calls(AgentRole::SafetyRefiner), 0);
    }

    /// Verifies the refined candidate replaces the first one and is re-reviewed.
    #[test]
    fn rejection_then_approval_accepts_refined_candidate() {
        let generator = ScriptedGenerator::new()
            .then(
                AgentRole::SafetyReviewer,
                Reply::text(reject_json(0.5, &["Soften the sleep advice"])),
            )
            .then(AgentRole::SafetyReviewer, Reply::text(approve_json(0.92)))
            .always(AgentRole::SafetyRefiner, Reply::text(refined_json("revised")));
        let outcome = run_loop(&generator, 3).expect("outcome");

        assert_eq!(outcome.resolution, Resolution::Accepted);
        assert_eq!(outcome.reviews_run, 2);
        assert_eq!(outcome.refinements, 1);
        assert_eq!(outcome.candidate.iteration, 1);
        assert!(outcome.candidate.summary.summary.starts_with("revised"));
        assert_eq!(outcome.last_review.safety_score, 0.92);

        let refiner_prompt = &generator.requests(AgentRole::SafetyRefiner)[0].prompt;
        assert!(refiner_prompt.contains("Soften the sleep advice"));
        let second_review_prompt = &generator.requests(AgentRole::SafetyReviewer)[1].prompt;
        assert!(second_review_prompt.contains("revised: the user is under exam pressure"));
    }

    #[test]
    fn crisis_escalates_without_refining() {
        let generator =
            ScriptedGenerator::new().always(AgentRole::SafetyReviewer, Reply::text(crisis_json()));
        let outcome = run_loop(&generator, 3).expect("outcome");
        assert_eq!(
            outcome.resolution,
            Resolution::Escalated(EscalationReason::CrisisIndicator)
        );
        assert_eq!(outcome.reviews_run, 1);
        assert_eq!(generator.calls(AgentRole::SafetyRefiner), 0);
    }

    #[test]
    fn persistent_rejection_exhausts_budget() {
        let generator = ScriptedGenerator::new()
            .always(AgentRole::SafetyReviewer, Reply::text(reject_json(0.4, &[])))
            .always(AgentRole::SafetyRefiner, Reply::text(refined_json("again")));
        let outcome = run_loop(&generator, 3).expect("outcome");
        assert_eq!(
            outcome.resolution,
            Resolution::Escalated(EscalationReason::BudgetExhausted)
        );
        assert_eq!(outcome.reviews_run, 3);
        assert_eq!(outcome.candidate.iteration, 2);
        assert_eq!(generator.calls(AgentRole::SafetyRefiner), 2);
    }

    /// Verifies a model "approved" below threshold still triggers refinement.
    #[test]
    fn low_score_approval_is_refined() {
        let generator = ScriptedGenerator::new()
            .then(AgentRole::SafetyReviewer, Reply::text(approve_json(0.6)))
            .then(AgentRole::SafetyReviewer, Reply::text(approve_json(0.85)))
            .always(AgentRole::SafetyRefiner, Reply::text(refined_json("safer")));
        let outcome = run_loop(&generator, 3).expect("outcome");
        assert_eq!(outcome.resolution, Resolution::Accepted);
        assert_eq!(outcome.refinements, 1);
    }

    #[test]
    fn refiner_failure_fails_the_run() {
        let generator = ScriptedGenerator::new()
            .always(AgentRole::SafetyReviewer, Reply::text(reject_json(0.4, &[])))
            .always(AgentRole::SafetyRefiner, Reply::fail("upstream error"));
        let err = run_loop(&generator, 3).expect_err("failure");
        assert!(err.detail.contains("safety_refiner"));
        assert_eq!(generator.calls(AgentRole::SafetyRefiner), 3);
    }
}
