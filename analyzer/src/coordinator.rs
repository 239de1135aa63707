//! Parallel coordinator: runs the summary and recommendation agents concurrently.

use std::thread::{self, ScopedJoinHandle};

use tracing::{info, instrument};

use crate::agents::AgentRuntime;
use crate::agents::recommendation::recommend;
use crate::agents::summary::summarize;
use crate::core::types::{AgentRole, CandidateAnalysis, MemoryRecord, Mode, Transcript};
use crate::error::AnalysisFailure;
use crate::io::generator::Generator;
use crate::io::prompt::PromptInputs;

pub struct ParallelCoordinator<'r, 'a, G: ?Sized> {
    runtime: &'r AgentRuntime<'a, G>,
}

impl<'r, 'a, G: Generator + ?Sized> ParallelCoordinator<'r, 'a, G> {
    pub fn new(runtime: &'r AgentRuntime<'a, G>) -> Self {
        Self { runtime }
    }

    /// Run both agents on the same input and join them into the iteration-0 candidate.
    ///
    /// Neither agent sees the other's output. If either fails the run fails;
    /// a timeout on either side takes precedence over a generation failure.
    #[instrument(skip_all, fields(turns = transcript.turns.len(), memory_entries = memory.entries.len()))]
    pub fn run(
        &self,
        transcript: &Transcript,
        memory: &MemoryRecord,
        mode: Mode,
    ) -> Result<CandidateAnalysis, AnalysisFailure> {
        let input = PromptInputs {
            transcript,
            memory,
            mode,
        };
        let runtime = self.runtime;

        let (summary, recommendation) = thread::scope(|scope| {
            let summary = thread::Builder::new()
                .name("summary-agent".to_string())
                .spawn_scoped(scope, || summarize(runtime, &input));
            let recommendation = thread::Builder::new()
                .name("recommendation-agent".to_string())
                .spawn_scoped(scope, || recommend(runtime, &input));
            (
                join_agent(AgentRole::Summarizer, summary),
                join_agent(AgentRole::Recommender, recommendation),
            )
        });

        let (summary, recommendation) = match (summary, recommendation) {
            (Ok(summary), Ok(recommendation)) => (summary, recommendation),
            (Err(first), Err(second)) if second.is_timeout() && !first.is_timeout() => {
                return Err(second);
            }
            (Err(err), _) | (_, Err(err)) => return Err(err),
        };
        info!("parallel agents joined");
        Ok(CandidateAnalysis::initial(summary, recommendation))
    }
}

fn join_agent<T>(
    role: AgentRole,
    spawned: std::io::Result<ScopedJoinHandle<'_, Result<T, AnalysisFailure>>>,
) -> Result<T, AnalysisFailure> {
    let handle = spawned
        .map_err(|err| AnalysisFailure::generation(format!("spawn {role} agent thread: {err}")))?;
    handle
        .join()
        .unwrap_or_else(|_| Err(AnalysisFailure::generation(format!("{role} agent panicked"))))
}
