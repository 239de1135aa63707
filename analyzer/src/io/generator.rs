//! Language-model invocation port and the subprocess backend.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

use super::process::run_command_with_timeout;
use super::schema::{OutputSchema, write_schema_files};
use crate::core::extract::strip_code_fences;
use crate::core::types::AgentRole;

/// Env var naming the agent role for the generator command.
pub const ROLE_ENV: &str = "ANALYZER_AGENT_ROLE";
/// Env var holding the path to the role's output schema.
pub const SCHEMA_ENV: &str = "ANALYZER_OUTPUT_SCHEMA";

/// One structured-generation request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub role: AgentRole,
    /// Fully rendered prompt; carries the transcript, memory, or candidate context.
    pub prompt: String,
    /// JSON Schema the output must satisfy.
    pub output_schema: &'static str,
    /// The backend must give up after this long.
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Capability to turn a prompt into raw structured text.
///
/// Implementations are shared across the two parallel agent threads.
pub trait Generator: Sync {
    fn generate(&self, request: &GenerateRequest) -> Result<String>;
}

impl<G: Generator + ?Sized> Generator for &G {
    fn generate(&self, request: &GenerateRequest) -> Result<String> {
        (**self).generate(request)
    }
}

/// Returned (inside `anyhow::Error`) by backends that hit the request timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("generation timed out after {0:?}")]
pub struct GenerationTimedOut(pub Duration);

/// Why a single agent call produced no usable value.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("transport error: {0:#}")]
    Transport(anyhow::Error),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("malformed output: {0}")]
    Malformed(String),
}

impl CallError {
    /// Short label safe to log; never includes generated text.
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::Transport(_) => "transport",
            CallError::TimedOut(_) => "timed_out",
            CallError::Malformed(_) => "malformed",
        }
    }
}

/// Issue one request and parse the reply into `T`.
///
/// A reply that arrives after `request.timeout` is discarded as timed out.
pub fn generate_and_parse<G, T>(
    generator: &G,
    request: &GenerateRequest,
    schema: &OutputSchema,
) -> Result<T, CallError>
where
    G: Generator + ?Sized,
    T: DeserializeOwned,
{
    let started = Instant::now();
    let raw = generator.generate(request).map_err(|err| {
        match err.downcast_ref::<GenerationTimedOut>() {
            Some(timed_out) => CallError::TimedOut(timed_out.0),
            None => CallError::Transport(err),
        }
    })?;
    if started.elapsed() > request.timeout {
        return Err(CallError::TimedOut(request.timeout));
    }
    if raw.len() > request.output_limit_bytes {
        return Err(CallError::Malformed(format!(
            "output of {} bytes exceeds limit of {}",
            raw.len(),
            request.output_limit_bytes
        )));
    }
    parse_output(&raw, schema)
}

/// Strip fences, validate against the schema, then deserialize.
pub fn parse_output<T: DeserializeOwned>(raw: &str, schema: &OutputSchema) -> Result<T, CallError> {
    let payload = strip_code_fences(raw);
    let value: Value = serde_json::from_str(payload)
        .map_err(|err| CallError::Malformed(format!("invalid json: {err}")))?;
    if let Err(violations) = schema.check(&value) {
        return Err(CallError::Malformed(format!(
            "{} schema violation(s), first: {}",
            violations.len(),
            violations[0]
        )));
    }
    serde_json::from_value(value)
        .map_err(|err| CallError::Malformed(format!("unexpected shape: {err}")))
}

/// Runs an external model CLI once per request.
///
/// The prompt is written to stdin and stdout is taken as the reply. The role
/// and the path of its schema file are passed through [`ROLE_ENV`] and
/// [`SCHEMA_ENV`].
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    command: Vec<String>,
    schema_paths: HashMap<AgentRole, PathBuf>,
}

impl CommandGenerator {
    /// Write role schemas under `schema_dir` and prepare the command.
    pub fn new(command: Vec<String>, schema_dir: &Path) -> Result<Self> {
        if command.first().is_none_or(|program| program.trim().is_empty()) {
            bail!("generator command must be a non-empty array");
        }
        let schema_paths = write_schema_files(schema_dir)?;
        Ok(Self {
            command,
            schema_paths,
        })
    }
}

impl Generator for CommandGenerator {
    #[instrument(skip_all, fields(role = %request.role, prompt_bytes = request.prompt.len()))]
    fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let (program, args) = self
            .command
            .split_first()
            .context("generator command is empty")?;
        let schema_path = self
            .schema_paths
            .get(&request.role)
            .ok_or_else(|| anyhow!("no schema file for role {}", request.role))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .env(ROLE_ENV, request.role.as_str())
            .env(SCHEMA_ENV, schema_path);

        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.clone().into_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .with_context(|| format!("run generator `{program}`"))?;

        if output.timed_out {
            return Err(GenerationTimedOut(request.timeout).into());
        }
        if !output.status.success() {
            bail!(
                "generator exited with {}: {}",
                output.status,
                output.stderr_tail(2_000)
            );
        }
        if output.stdout_truncated > 0 {
            bail!(
                "generator output exceeded {} bytes",
                request.output_limit_bytes
            );
        }
        debug!(output_bytes = output.stdout.len(), "generator replied");
        String::from_utf8(output.stdout).context("generator output is not utf-8")
    }
}
