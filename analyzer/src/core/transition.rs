//! Pure state machine for the safety review/refine loop.

use std::fmt;

use thiserror::Error;

use crate::core::types::{EscalationReason, SafetyReview};

/// Default number of review passes per run.
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Reviewing,
    Refining,
    Accepted,
    Escalated(EscalationReason),
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Accepted | LoopState::Escalated(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Reviewing => "reviewing",
            LoopState::Refining => "refining",
            LoopState::Accepted => "accepted",
            LoopState::Escalated(_) => "escalated",
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that happened to the current candidate.
#[derive(Debug, Clone, Copy)]
pub enum LoopEvent<'a> {
    /// A review finished for the candidate at `iteration`.
    Reviewed {
        review: &'a SafetyReview,
        iteration: u32,
    },
    /// The refiner produced a replacement candidate.
    Refined,
}

impl LoopEvent<'_> {
    fn as_str(&self) -> &'static str {
        match self {
            LoopEvent::Reviewed { .. } => "reviewed",
            LoopEvent::Refined => "refined",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event `{event}` is not valid in state `{state}`")]
pub struct InvalidTransition {
    pub state: LoopState,
    pub event: &'static str,
}

/// Compute the next loop state.
///
/// A crisis indicator escalates before approval or budget are considered, so
/// the refiner never sees a crisis-flagged candidate.
pub fn transition(
    state: LoopState,
    event: LoopEvent<'_>,
    max_iterations: u32,
) -> Result<LoopState, InvalidTransition> {
    match (state, event) {
        (LoopState::Reviewing, LoopEvent::Reviewed { review, iteration }) => {
            Ok(after_review(review, iteration, max_iterations))
        }
        (LoopState::Refining, LoopEvent::Refined) => Ok(LoopState::Reviewing),
        (state, event) => Err(InvalidTransition {
            state,
            event: event.as_str(),
        }),
    }
}

fn after_review(review: &SafetyReview, iteration: u32, max_iterations: u32) -> LoopState {
    if review.has_crisis_indicator() {
        return LoopState::Escalated(EscalationReason::CrisisIndicator);
    }
    if review.approved {
        return LoopState::Accepted;
    }
    if iteration >= max_iterations.saturating_sub(1) {
        return LoopState::Escalated(EscalationReason::BudgetExhausted);
    }
    LoopState::Refining
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Concern, ConcernCategory, Severity};

    fn review(approved: bool, crisis: bool) -> SafetyReview {
        let concerns = if crisis {
            vec![Concern {
                category: ConcernCategory::CrisisIndicator,
                severity: Severity::High,
                detail: "self-harm language".to_string(),
            }]
        } else {
            Vec::new()
        };
        SafetyReview {
            safety_score: if approved { 0.9 } else { 0.4 },
            concerns,
            required_modifications: Vec::new(),
            approved,
        }
    }

    fn reviewed(review: &SafetyReview, iteration: u32) -> LoopEvent<'_> {
        LoopEvent::Reviewed { review, iteration }
    }

    #[test]
    fn approved_review_is_accepted() {
        let review = review(true, false);
        let next = transition(LoopState::Reviewing, reviewed(&review, 0), 3).expect("transition");
        assert_eq!(next, LoopState::Accepted);
    }

    #[test]
    fn unapproved_review_with_budget_refines() {
        let review = review(false, false);
        for iteration in [0, 1] {
            let next = transition(LoopState::Reviewing, reviewed(&review, iteration), 3)
                .expect("transition");
            assert_eq!(next, LoopState::Refining, "iteration {iteration}");
        }
    }

    #[test]
    fn unapproved_review_on_last_iteration_escalates() {
        let review = review(false, false);
        let next = transition(LoopState::Reviewing, reviewed(&review, 2), 3).expect("transition");
        assert_eq!(next, LoopState::Escalated(EscalationReason::BudgetExhausted));
    }

    /// Verifies crisis escalation wins even when budget remains.
    #[test]
    fn crisis_escalates_immediately() {
        let review = review(false, true);
        let next = transition(LoopState::Reviewing, reviewed(&review, 0), 3).expect("transition");
        assert_eq!(next, LoopState::Escalated(EscalationReason::CrisisIndicator));
    }

    /// Verifies crisis escalation wins even over an approved flag.
    #[test]
    fn crisis_outranks_approval() {
        let review = review(true, true);
        let next = transition(LoopState::Reviewing, reviewed(&review, 0), 3).expect("transition");
        assert_eq!(next, LoopState::Escalated(EscalationReason::CrisisIndicator));
    }

    #[test]
    fn single_pass_budget_never_refines() {
        let review = review(false, false);
        let next = transition(LoopState::Reviewing, reviewed(&review, 0), 1).expect("transition");
        assert_eq!(next, LoopState::Escalated(EscalationReason::BudgetExhausted));
    }

    #[test]
    fn refined_returns_to_reviewing() {
        let next = transition(LoopState::Refining, LoopEvent::Refined, 3).expect("transition");
        assert_eq!(next, LoopState::Reviewing);
    }

    #[test]
    fn terminal_states_reject_events() {
        let review = review(true, false);
        for state in [
            LoopState::Accepted,
            LoopState::Escalated(EscalationReason::BudgetExhausted),
        ] {
            assert!(state.is_terminal());
            let err = transition(state, reviewed(&review, 0), 3).expect_err("terminal");
            assert_eq!(err.state, state);
            assert!(transition(state, LoopEvent::Refined, 3).is_err());
        }
    }

    #[test]
    fn mismatched_events_are_rejected() {
        let review = review(true, false);
        assert!(transition(LoopState::Reviewing, LoopEvent::Refined, 3).is_err());
        assert!(transition(LoopState::Refining, reviewed(&review, 0), 3).is_err());
    }
}
