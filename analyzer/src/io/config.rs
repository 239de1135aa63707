//! Analyzer configuration stored under `.analyzer/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::safety::DEFAULT_APPROVAL_THRESHOLD;
use crate::core::transition::DEFAULT_MAX_ITERATIONS;

/// Analyzer configuration (TOML).
///
/// Intended to be edited by humans. Missing fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Review passes allowed per run before escalating.
    pub max_iterations: u32,

    /// Minimum safety score for a review to count as approved.
    pub approval_threshold: f64,

    /// Upper bound for a single agent call.
    pub agent_timeout_secs: u64,

    /// Deadline for the whole run, agents and memory append included.
    pub run_timeout_secs: u64,

    /// Extra attempts per agent call after the first failure.
    pub agent_retries: u32,

    /// Fixed pause between attempts.
    pub retry_delay_ms: u64,

    /// Byte budget for a rendered prompt.
    pub prompt_budget_bytes: usize,

    /// Generator output beyond this many bytes is rejected.
    pub output_limit_bytes: usize,

    /// Append a memory digest even when the run escalates.
    pub append_memory_on_escalation: bool,

    pub generator: GeneratorConfig,

    pub memory: MemoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Model CLI argv. Receives the prompt on stdin and prints JSON on stdout.
    pub command: Vec<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: vec!["llm".to_string(), "--no-stream".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MemoryConfig {
    /// Directory holding one JSON-lines file per user. Relative to the project root.
    pub dir: PathBuf,

    /// Most recent entries recalled per run.
    pub recall_limit: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".analyzer/memory"),
            recall_limit: 5,
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            approval_threshold: DEFAULT_APPROVAL_THRESHOLD,
            agent_timeout_secs: 60,
            run_timeout_secs: 5 * 60,
            agent_retries: 2,
            retry_delay_ms: 250,
            prompt_budget_bytes: 40_000,
            output_limit_bytes: 100_000,
            append_memory_on_escalation: true,
            generator: GeneratorConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.approval_threshold) {
            return Err(anyhow!("approval_threshold must be within [0, 1]"));
        }
        if self.agent_timeout_secs == 0 {
            return Err(anyhow!("agent_timeout_secs must be > 0"));
        }
        if self.run_timeout_secs == 0 {
            return Err(anyhow!("run_timeout_secs must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.generator.command.is_empty() || self.generator.command[0].trim().is_empty() {
            return Err(anyhow!("generator.command must be a non-empty array"));
        }
        if self.memory.recall_limit == 0 {
            return Err(anyhow!("memory.recall_limit must be > 0"));
        }
        Ok(())
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Memory directory resolved against the project root.
    pub fn memory_dir(&self, root: &Path) -> PathBuf {
        if self.memory.dir.is_absolute() {
            self.memory.dir.clone()
        } else {
            root.join(&self.memory.dir)
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AnalyzerConfig::default()`.
pub fn load_config(path: &Path) -> Result<AnalyzerConfig> {
    if !path.exists() {
        let cfg = AnalyzerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AnalyzerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AnalyzerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
