//! One analysis run: input checks, parallel agents, safety loop, assembly.

use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::agents::{AgentRuntime, CallPolicy};
use crate::assembler::{OutputAssembler, RunMeta};
use crate::coordinator::ParallelCoordinator;
use crate::core::budget::remaining_budget;
use crate::core::types::{AnalysisResult, MemoryRecord, Mode, Transcript, is_valid_user_id};
use crate::error::AnalysisFailure;
use crate::io::config::AnalyzerConfig;
use crate::io::generator::Generator;
use crate::io::memory::MemoryStore;
use crate::io::prompt::PromptBuilder;
use crate::io::schema::SchemaSet;
use crate::refinement::RefinementLoop;

/// Entry point for analysis runs. Owns the injected ports.
///
/// Holds no per-run state, so one instance can serve concurrent runs.
pub struct Analyzer<G, M> {
    generator: G,
    memory: M,
    schemas: SchemaSet,
    prompts: PromptBuilder,
    config: AnalyzerConfig,
}

impl<G: Generator, M: MemoryStore> Analyzer<G, M> {
    pub fn new(generator: G, memory: M, config: &AnalyzerConfig) -> Result<Self> {
        config.validate().context("analyzer config")?;
        let schemas = SchemaSet::compile().context("compile output schemas")?;
        Ok(Self {
            generator,
            memory,
            schemas,
            prompts: PromptBuilder::new(config.prompt_budget_bytes),
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze one transcript for `user_id`.
    ///
    /// Escalation is a successful outcome (`escalated = true`). Errors are
    /// limited to invalid input, exhausted agent retries, and the run deadline.
    pub fn analyze(
        &self,
        transcript: &Transcript,
        user_id: &str,
        mode: Mode,
    ) -> Result<AnalysisResult, AnalysisFailure> {
        self.analyze_session(transcript, user_id, mode, None)
    }

    /// Like [`Analyzer::analyze`], tagging the result with the caller's session id.
    #[instrument(skip_all, fields(user_id = %user_id, mode = %mode, session_id = session_id.unwrap_or("-"), turns = transcript.turns.len()))]
    pub fn analyze_session(
        &self,
        transcript: &Transcript,
        user_id: &str,
        mode: Mode,
        session_id: Option<&str>,
    ) -> Result<AnalysisResult, AnalysisFailure> {
        check_input(transcript, user_id)?;
        if let Some(session_id) = session_id
            && !is_valid_user_id(session_id)
        {
            return Err(AnalysisFailure::invalid_input(format!(
                "session id {session_id:?} must match [A-Za-z0-9_-]+"
            )));
        }
        let deadline = Instant::now() + self.config.run_timeout();

        let memory = match self.memory.fetch(user_id) {
            Ok(record) => record,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "memory fetch failed; continuing without memory");
                MemoryRecord::empty(user_id)
            }
        };

        let runtime = AgentRuntime {
            generator: &self.generator,
            schemas: &self.schemas,
            prompts: &self.prompts,
            policy: self.call_policy(),
            deadline,
        };
        let candidate = ParallelCoordinator::new(&runtime).run(transcript, &memory, mode)?;
        let outcome = RefinementLoop::new(
            &runtime,
            self.config.max_iterations,
            self.config.approval_threshold,
        )
        .run(candidate, mode)?;
        remaining_budget(deadline)?;

        let assembler = self.assembler();
        let result = assembler.assemble(
            outcome,
            RunMeta {
                user_id: user_id.to_string(),
                session_id: session_id.map(str::to_string),
                mode,
                created_at: Utc::now(),
            },
        );
        let result = assembler.deliver(&self.memory, result);
        info!(
            escalated = result.escalated,
            iterations_used = result.iterations_used,
            safety_score = result.final_safety_score,
            memory_appended = result.memory_appended,
            "analysis finished"
        );
        Ok(result)
    }

    fn call_policy(&self) -> CallPolicy {
        CallPolicy {
            timeout: self.config.agent_timeout(),
            retries: self.config.agent_retries,
            retry_delay: self.config.retry_delay(),
            output_limit_bytes: self.config.output_limit_bytes,
        }
    }

    fn assembler(&self) -> OutputAssembler {
        OutputAssembler {
            append_on_escalation: self.config.append_memory_on_escalation,
            append_retries: self.config.agent_retries,
            retry_delay: self.config.retry_delay(),
        }
    }
}

/// Reject unusable input before any generation call.
pub fn check_input(transcript: &Transcript, user_id: &str) -> Result<(), AnalysisFailure> {
    if !is_valid_user_id(user_id) {
        return Err(AnalysisFailure::invalid_input(format!(
            "user id {user_id:?} must match [A-Za-z0-9_-]+"
        )));
    }
    if transcript.is_blank() {
        return Err(AnalysisFailure::invalid_input(
            "transcript has no non-empty turns",
        ));
    }
    Ok(())
}
