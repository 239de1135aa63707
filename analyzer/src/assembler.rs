//! Output assembler: builds the final result and appends the memory digest.

use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::core::digest::MemoryDigest;
use crate::core::tasks::plan_tasks;
use crate::core::types::{AnalysisResult, Escalation, Mode};
use crate::io::memory::MemoryStore;
use crate::refinement::{LoopOutcome, Resolution};

/// Identity of the run a result belongs to.
#[derive(Debug, Clone)]
pub struct RunMeta {
    pub user_id: String,
    pub session_id: Option<String>,
    pub mode: Mode,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct OutputAssembler {
    /// Append memory for escalated runs too, using the last candidate.
    pub append_on_escalation: bool,
    pub append_retries: u32,
    pub retry_delay: Duration,
}

impl OutputAssembler {
    /// Build the terminal result. Pure: no memory access.
    pub fn assemble(&self, outcome: LoopOutcome, meta: RunMeta) -> AnalysisResult {
        let escalation = match outcome.resolution {
            Resolution::Accepted => None,
            Resolution::Escalated(reason) => Some(Escalation {
                reason,
                concerns: outcome.last_review.concerns.clone(),
            }),
        };
        let task_plan = plan_tasks(
            &outcome.candidate.recommendation.recommended_tasks,
            meta.created_at,
        );
        AnalysisResult {
            user_id: meta.user_id,
            session_id: meta.session_id,
            mode: meta.mode,
            created_at: meta.created_at,
            final_safety_score: outcome.last_review.safety_score,
            escalated: escalation.is_some(),
            escalation,
            iterations_used: outcome.reviews_run,
            task_plan,
            candidate: outcome.candidate,
            final_review: outcome.last_review,
            memory_appended: false,
        }
    }

    /// Append the digest for `result` and record whether it landed.
    ///
    /// Append failures are logged and reported through `memory_appended`; they
    /// never turn a finished analysis into an error.
    #[instrument(skip_all, fields(escalated = result.escalated))]
    pub fn deliver<M: MemoryStore + ?Sized>(&self, memory: &M, mut result: AnalysisResult) -> AnalysisResult {
        if result.escalated && !self.append_on_escalation {
            info!("memory append skipped for escalated run");
            return result;
        }
        let digest = MemoryDigest::from_result(&result);
        let attempts = self.append_retries + 1;
        for attempt in 1..=attempts {
            match memory.append(&result.user_id, &digest) {
                Ok(()) => {
                    result.memory_appended = true;
                    info!(attempt, "memory digest appended");
                    return result;
                }
                Err(err) => {
                    warn!(attempt, attempts, err = %format!("{err:#}"), "memory append failed");
                    if attempt < attempts && !self.retry_delay.is_zero() {
                        thread::sleep(self.retry_delay);
                    }
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::core::types::{Concern, ConcernCategory, EscalationReason, Quadrant, SafetyReview, Severity};
    use crate::test_support::{InMemoryMemoryStore, sample_candidate};

    fn assembler(append_on_escalation: bool) -> OutputAssembler {
        OutputAssembler {
            append_on_escalation,
            append_retries: 2,
            retry_delay: Duration::ZERO,
        }
    }

    fn meta() -> RunMeta {
        RunMeta {
            user_id: "user-1".to_string(),
            session_id: Some("session-42".to_string()),
            mode: Mode::StudyStress,
            created_at: DateTime::parse_from_rfc3339("2026-10-19T08:30:00Z")
                .expect("timestamp")
                .with_timezone(&Utc),
        }
    }

    fn outcome(resolution: Resolution) -> LoopOutcome {
        let concerns = match resolution {
            Resolution::Accepted => Vec::new(),
            Resolution::Escalated(_) => vec![Concern {
                category: ConcernCategory::CrisisIndicator,
                severity: Severity::High,
                detail: "risk language".to_string(),
            }],
        };
        LoopOutcome {
            candidate: sample_candidate(),
            last_review: SafetyReview {
                safety_score: if resolution.is_escalated() { 0.2 } else { 0.9 },
                concerns,
                required_modifications: Vec::new(),
                approved: !resolution.is_escalated(),
            },
            resolution,
            reviews_run: 1,
            refinements: 0,
        }
    }

    #[test]
    fn accepted_outcome_has_no_escalation_payload() {
        let result = assembler(true).assemble(outcome(Resolution::Accepted), meta());
        assert!(!result.escalated);
        assert!(result.escalation.is_none());
        assert_eq!(result.final_safety_score, 0.9);
        assert_eq!(result.iterations_used, 1);
        assert!(result.final_review.approved);
        assert_eq!(result.session_id.as_deref(), Some("session-42"));
    }

    #[test]
    fn escalated_outcome_carries_last_review_concerns() {
        let result = assembler(true).assemble(
            outcome(Resolution::Escalated(EscalationReason::CrisisIndicator)),
            meta(),
        );
        assert!(result.escalated);
        let escalation = result.escalation.expect("escalation");
        assert_eq!(escalation.reason, EscalationReason::CrisisIndicator);
        assert_eq!(escalation.concerns, result.final_review.concerns);
    }

    #[test]
    fn task_plan_uses_quadrants_and_due_dates() {
        let result = assembler(true).assemble(outcome(Resolution::Accepted), meta());
        assert_eq!(result.task_plan.len(), 2);
        assert_eq!(result.task_plan[0].quadrant, Quadrant::HighImpHighUrg);
        assert_eq!(
            result.task_plan[0].due_date,
            NaiveDate::from_ymd_opt(2026, 10, 20).expect("date")
        );
        assert_eq!(result.task_plan[1].quadrant, Quadrant::HighImpLowUrg);
        assert_eq!(
            result.task_plan[1].due_date,
            NaiveDate::from_ymd_opt(2026, 10, 26).expect("date")
        );
    }

    #[test]
    fn deliver_appends_digest_once() {
        let memory = InMemoryMemoryStore::new();
        let assembler = assembler(true);
        let result = assembler.deliver(&memory, assembler.assemble(outcome(Resolution::Accepted), meta()));
        assert!(result.memory_appended);
        assert_eq!(memory.digests("user-1").len(), 1);
        assert_eq!(memory.append_attempts(), 1);
    }

    #[test]
    fn escalated_append_respects_policy() {
        let memory = InMemoryMemoryStore::new();
        let assembler = assembler(false);
        let escalated = outcome(Resolution::Escalated(EscalationReason::BudgetExhausted));
        let result = assembler.deliver(&memory, assembler.assemble(escalated, meta()));
        assert!(!result.memory_appended);
        assert_eq!(memory.append_attempts(), 0);
    }

    #[test]
    fn transient_append_failure_is_retried() {
        let memory = InMemoryMemoryStore::new().failing_appends(1);
        let assembler = assembler(true);
        let result = assembler.deliver(&memory, assembler.assemble(outcome(Resolution::Accepted), meta()));
        assert!(result.memory_appended);
        assert_eq!(memory.append_attempts(), 2);
    }

    /// Verifies a store that never accepts the append still yields the result.
    #[test]
    fn persistent_append_failure_keeps_result() {
        let memory = InMemoryMemoryStore::new().failing_appends(10);
        let assembler = assembler(true);
        let result = assembler.deliver(&memory, assembler.assemble(outcome(Resolution::Accepted), meta()));
        assert!(!result.memory_appended);
        assert_eq!(memory.append_attempts(), 3);
        assert!(memory.digests("user-1").is_empty());
    }
}
