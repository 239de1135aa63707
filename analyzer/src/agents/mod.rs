//! Generation agents and the shared call policy.
//!
//! Every agent call goes through [`AgentRuntime::call`], which applies the
//! same per-call timeout, retry budget, and deadline handling.

use std::thread;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::core::budget::{call_timeout, remaining_budget};
use crate::core::types::AgentRole;
use crate::error::AnalysisFailure;
use crate::io::generator::{CallError, GenerateRequest, Generator, generate_and_parse};
use crate::io::prompt::{PromptBuilder, PromptPack};
use crate::io::schema::SchemaSet;

pub mod recommendation;
pub mod refiner;
pub mod reviewer;
pub mod summary;

/// Timeout and retry settings applied to each agent call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    pub timeout: Duration,
    /// Attempts after the first failure.
    pub retries: u32,
    pub retry_delay: Duration,
    pub output_limit_bytes: usize,
}

/// Shared collaborators for one run. Borrowed by every agent.
pub struct AgentRuntime<'a, G: ?Sized> {
    pub generator: &'a G,
    pub schemas: &'a SchemaSet,
    pub prompts: &'a PromptBuilder,
    pub policy: CallPolicy,
    pub deadline: Instant,
}

impl<G: Generator + ?Sized> AgentRuntime<'_, G> {
    /// Call the generator for `role` and parse its reply, retrying failed attempts.
    ///
    /// Returns `Timeout` when the run deadline passes, and `GenerationFailure`
    /// naming the role once every attempt has failed.
    pub fn call<T: DeserializeOwned>(
        &self,
        role: AgentRole,
        prompt: &PromptPack,
    ) -> Result<T, AnalysisFailure> {
        let attempts = self.policy.retries + 1;
        let mut last_error: Option<CallError> = None;

        for attempt in 1..=attempts {
            let Ok(timeout) = call_timeout(self.deadline, self.policy.timeout) else {
                return Err(AnalysisFailure::timeout(format!(
                    "run deadline passed before {role} attempt {attempt}"
                )));
            };
            let request = GenerateRequest {
                role,
                prompt: prompt.as_str().to_string(),
                output_schema: self.schemas.get(role).source(),
                timeout,
                output_limit_bytes: self.policy.output_limit_bytes,
            };
            match generate_and_parse(self.generator, &request, self.schemas.get(role)) {
                Ok(value) => {
                    debug!(%role, attempt, "agent call succeeded");
                    return Ok(value);
                }
                Err(err) => {
                    warn!(%role, attempt, attempts, error_kind = err.kind(), "agent call failed");
                    last_error = Some(err);
                }
            }
            if attempt < attempts {
                self.pause_before_retry();
            }
        }

        if remaining_budget(self.deadline).is_err() {
            return Err(AnalysisFailure::timeout(format!(
                "run deadline passed during {role} call"
            )));
        }
        let reason = last_error.map_or_else(|| "no attempts made".to_string(), |err| err.to_string());
        Err(AnalysisFailure::generation(format!(
            "{role} failed after {attempts} attempt(s): {reason}"
        )))
    }

    /// Sleep for the retry delay, never past the run deadline.
    fn pause_before_retry(&self) {
        if self.policy.retry_delay.is_zero() {
            return;
        }
        if let Ok(remaining) = remaining_budget(self.deadline) {
            thread::sleep(self.policy.retry_delay.min(remaining));
        }
    }
}

/// Wrap a prompt rendering error as a failure attributed to `role`.
fn prompt_failure(role: AgentRole, err: anyhow::Error) -> AnalysisFailure {
    AnalysisFailure::generation(format!("{role} prompt: {err:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SummaryResult;
    use crate::error::FailureKind;
    use crate::test_support::{Reply, ScriptedGenerator, summary_json};

    fn policy(retries: u32) -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_secs(5),
            retries,
            retry_delay: Duration::ZERO,
            output_limit_bytes: 100_000,
        }
    }

    fn call(
        generator: &ScriptedGenerator,
        policy: CallPolicy,
        deadline: Instant,
    ) -> Result<SummaryResult, AnalysisFailure> {
        let schemas = SchemaSet::compile().expect("schemas");
        let prompts = PromptBuilder::new(40_000);
        let runtime = AgentRuntime {
            generator,
            schemas: &schemas,
            prompts: &prompts,
            policy,
            deadline,
        };
        let prompt = PromptPack::from("summarize this");
        runtime.call(AgentRole::Summarizer, &prompt)
    }

    #[test]
    fn malformed_then_valid_succeeds_on_retry() {
        let generator = ScriptedGenerator::new()
            .then(AgentRole::Summarizer, Reply::text("not json"))
            .then(AgentRole::Summarizer, Reply::text(summary_json()));
        let summary = call(&generator, policy(2), Instant::now() + Duration::from_secs(30))
            .expect("summary");
        assert!(summary.tags.contains("stress"));
        assert_eq!(generator.calls(AgentRole::Summarizer), 2);
    }

    /// Verifies the retry budget is 1 + retries attempts and the failure names the role.
    #[test]
    fn exhausted_retries_name_the_role() {
        let generator =
            ScriptedGenerator::new().always(AgentRole::Summarizer, Reply::fail("connection reset"));
        let err = call(&generator, policy(2), Instant::now() + Duration::from_secs(30))
            .expect_err("failure");
        assert_eq!(err.kind, FailureKind::GenerationFailure);
        assert!(err.detail.contains("summarizer"));
        assert!(err.detail.contains("3 attempt"));
        assert_eq!(generator.calls(AgentRole::Summarizer), 3);
    }

    #[test]
    fn timed_out_attempts_count_against_retries() {
        let generator = ScriptedGenerator::new()
            .then(AgentRole::Summarizer, Reply::TimedOut)
            .then(AgentRole::Summarizer, Reply::text(summary_json()));
        call(&generator, policy(1), Instant::now() + Duration::from_secs(30)).expect("summary");
        assert_eq!(generator.calls(AgentRole::Summarizer), 2);
    }

    #[test]
    fn passed_deadline_is_a_timeout_without_calling() {
        let generator =
            ScriptedGenerator::new().always(AgentRole::Summarizer, Reply::text(summary_json()));
        let err = call(&generator, policy(2), Instant::now()).expect_err("timeout");
        assert!(err.is_timeout());
        assert_eq!(generator.calls(AgentRole::Summarizer), 0);
    }

    /// Verifies the per-call timeout is clipped to what is left of the run.
    #[test]
    fn request_timeout_is_clipped_to_deadline() {
        let generator =
            ScriptedGenerator::new().always(AgentRole::Summarizer, Reply::text(summary_json()));
        let mut long = policy(0);
        long.timeout = Duration::from_secs(600);
        call(&generator, long, Instant::now() + Duration::from_secs(2)).expect("summary");
        let requests = generator.requests(AgentRole::Summarizer);
        assert!(requests[0].timeout <= Duration::from_secs(2));
    }
}
