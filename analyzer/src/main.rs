//! Safety-gated conversation analyzer.
//!
//! Runs the summary and recommendation agents over a transcript, gates the
//! result behind a safety review loop, and records a digest in per-user
//! memory under `.analyzer/`.

use std::fs;
use std::path::{Path, PathBuf};

use analyzer::analyze::{Analyzer, check_input};
use analyzer::core::types::{MemoryRecord, Mode, Transcript};
use analyzer::exit_codes;
use analyzer::io::config::load_config;
use analyzer::io::generator::CommandGenerator;
use analyzer::io::init::{AnalyzerPaths, InitOptions, init_analyzer};
use analyzer::io::memory::{FileMemoryStore, MemoryStore};
use analyzer::io::prompt::{PromptBuilder, PromptInputs};
use analyzer::logging;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::warn;

#[derive(Parser)]
#[command(
    name = "analyzer",
    version,
    about = "Safety-gated conversation analysis"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.analyzer/` with a default config and memory directory.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Analyze a transcript and print the result JSON.
    Analyze {
        /// Transcript JSON file (`{"turns": [...]}`).
        #[arg(long)]
        transcript: PathBuf,
        #[arg(long)]
        user_id: String,
        #[arg(long, value_enum)]
        mode: ModeArg,
        /// Write the result here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Session id copied onto the result.
        #[arg(long)]
        session_id: Option<String>,
    },
    /// Render an agent prompt without calling the generator.
    Prompt {
        #[arg(long, value_enum)]
        role: PromptRole,
        #[arg(long)]
        transcript: PathBuf,
        #[arg(long, value_enum)]
        mode: ModeArg,
        /// Include this user's stored memory.
        #[arg(long)]
        user_id: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    GeneralWellness,
    StudyStress,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::GeneralWellness => Mode::GeneralWellness,
            ModeArg::StudyStress => Mode::StudyStress,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PromptRole {
    Summarizer,
    Recommender,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(force),
        Command::Analyze {
            transcript,
            user_id,
            mode,
            output,
            session_id,
        } => cmd_analyze(
            &transcript,
            &user_id,
            session_id.as_deref(),
            mode.into(),
            output.as_deref(),
        ),
        Command::Prompt {
            role,
            transcript,
            mode,
            user_id,
        } => cmd_prompt(role, &transcript, mode.into(), user_id.as_deref()),
    }
}

fn cmd_init(force: bool) -> Result<i32> {
    let root = std::env::current_dir().context("resolve current directory")?;
    let paths = init_analyzer(&root, &InitOptions { force })?;
    println!("{}", paths.config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_analyze(
    transcript_path: &Path,
    user_id: &str,
    session_id: Option<&str>,
    mode: Mode,
    output: Option<&Path>,
) -> Result<i32> {
    let paths = AnalyzerPaths::new(std::env::current_dir().context("resolve current directory")?);
    let cfg = load_config(&paths.config_path)?;
    let transcript = read_transcript(transcript_path)?;

    let generator = CommandGenerator::new(cfg.generator.command.clone(), &paths.schema_dir)?;
    let memory = FileMemoryStore::new(cfg.memory_dir(&paths.root), cfg.memory.recall_limit);
    let analyzer = Analyzer::new(generator, memory, &cfg)?;

    match analyzer.analyze_session(&transcript, user_id, mode, session_id) {
        Ok(result) => {
            match output {
                Some(path) => write_json(path, &result)?,
                None => println!(
                    "{}",
                    serde_json::to_string_pretty(&result).context("serialize result")?
                ),
            }
            Ok(if result.escalated {
                exit_codes::ESCALATED
            } else {
                exit_codes::OK
            })
        }
        Err(failure) => {
            eprintln!("analysis failed: {failure}");
            Ok(exit_codes::for_failure(failure.kind))
        }
    }
}

fn cmd_prompt(
    role: PromptRole,
    transcript_path: &Path,
    mode: Mode,
    user_id: Option<&str>,
) -> Result<i32> {
    let paths = AnalyzerPaths::new(std::env::current_dir().context("resolve current directory")?);
    let cfg = load_config(&paths.config_path)?;
    let transcript = read_transcript(transcript_path)?;

    let memory = match user_id {
        Some(user_id) => {
            if let Err(failure) = check_input(&transcript, user_id) {
                eprintln!("{failure}");
                return Ok(exit_codes::INVALID);
            }
            let store = FileMemoryStore::new(cfg.memory_dir(&paths.root), cfg.memory.recall_limit);
            store.fetch(user_id).unwrap_or_else(|err| {
                warn!(err = %format!("{err:#}"), "memory fetch failed; rendering without memory");
                MemoryRecord::empty(user_id)
            })
        }
        None => MemoryRecord::empty("anonymous"),
    };

    let input = PromptInputs {
        transcript: &transcript,
        memory: &memory,
        mode,
    };
    let builder = PromptBuilder::new(cfg.prompt_budget_bytes);
    let pack = match role {
        PromptRole::Summarizer => builder.build_summarizer(&input)?,
        PromptRole::Recommender => builder.build_recommender(&input)?,
    };
    println!("{}", pack.as_str());
    Ok(exit_codes::OK)
}

fn read_transcript(path: &Path) -> Result<Transcript> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse transcript {}", path.display()))
}

/// Serialize `value` as pretty JSON with a trailing newline, via temp file + rename.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut payload = serde_json::to_string_pretty(value).context("serialize json")?;
    payload.push('\n');
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, payload).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
