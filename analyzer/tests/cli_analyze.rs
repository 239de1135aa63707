//! CLI tests for `analyzer init`, `analyzer analyze`, and `analyzer prompt`.
//!
//! Spawns the analyzer binary against a shell-script generator that answers
//! each role from a fixture file, and checks exit codes and written files.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use analyzer::core::types::{AgentRole, AnalysisResult};
use analyzer::exit_codes;
use analyzer::io::config::{AnalyzerConfig, GeneratorConfig, write_config};
use analyzer::io::init::{AnalyzerPaths, InitOptions, init_analyzer};
use analyzer::test_support::{
    approve_json, crisis_json, exam_transcript, recommendation_json, summary_json,
};

/// Initialized project whose generator replies with `<role>.json` from `replies/`.
struct Project {
    temp: tempfile::TempDir,
}

impl Project {
    fn new(reviewer_reply: &str) -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        let paths = init_analyzer(root, &InitOptions { force: false }).expect("init");

        let replies = root.join("replies");
        fs::create_dir_all(&replies).expect("replies dir");
        for (role, reply) in [
            (AgentRole::Summarizer, summary_json()),
            (AgentRole::Recommender, recommendation_json()),
            (AgentRole::SafetyReviewer, reviewer_reply.to_string()),
        ] {
            fs::write(replies.join(format!("{}.json", role.as_str())), reply).expect("reply");
        }
        let script = write_script(
            root,
            &format!(
                "cat >/dev/null\ncat \"{}/$ANALYZER_AGENT_ROLE.json\"",
                replies.display()
            ),
        );
        configure(&paths, script);

        let transcript = serde_json::to_string(&exam_transcript()).expect("transcript json");
        fs::write(root.join("transcript.json"), transcript).expect("transcript");
        Self { temp }
    }

    fn root(&self) -> &Path {
        self.temp.path()
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_analyzer"))
            .current_dir(self.root())
            .args(args)
            .output()
            .expect("run analyzer")
    }

    fn analyze(&self, user_id: &str, extra: &[&str]) -> Output {
        let mut args = vec![
            "analyze",
            "--transcript",
            "transcript.json",
            "--user-id",
            user_id,
            "--mode",
            "study-stress",
        ];
        args.extend_from_slice(extra);
        self.run(&args)
    }
}

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("model.sh");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    let mut perms = fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod");
    path
}

fn configure(paths: &AnalyzerPaths, script: PathBuf) {
    let cfg = AnalyzerConfig {
        retry_delay_ms: 0,
        agent_timeout_secs: 10,
        generator: GeneratorConfig {
            command: vec![script.display().to_string()],
        },
        ..AnalyzerConfig::default()
    };
    write_config(&paths.config_path, &cfg).expect("write config");
}

#[test]
fn accepted_analysis_prints_result_and_appends_memory() {
    let project = Project::new(&approve_json(0.9));

    let output = project.analyze("student-7", &[]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let result: AnalysisResult = serde_json::from_slice(&output.stdout).expect("result json");
    assert!(!result.escalated);
    assert_eq!(result.iterations_used, 1);
    assert!(result.memory_appended);

    let memory_file = project.root().join(".analyzer/memory/student-7.jsonl");
    let lines = fs::read_to_string(memory_file).expect("memory file");
    assert_eq!(lines.lines().count(), 1);
    assert!(
        project
            .root()
            .join(".analyzer/schemas/summarizer.schema.json")
            .exists()
    );
}

#[test]
fn escalated_analysis_writes_output_file() {
    let project = Project::new(&crisis_json());

    let output = project.analyze("student-7", &["--output", "result.json"]);

    assert_eq!(output.status.code(), Some(exit_codes::ESCALATED));
    let raw = fs::read_to_string(project.root().join("result.json")).expect("output file");
    let result: AnalysisResult = serde_json::from_str(&raw).expect("result json");
    assert!(result.escalated);
    assert!(result.escalation.is_some());
    assert!(output.stdout.is_empty());
}

#[test]
fn invalid_user_id_exits_invalid() {
    let project = Project::new(&approve_json(0.9));

    let output = project.analyze("student/7", &[]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid_input"));
}

#[test]
fn failing_generator_exits_generation_failure() {
    let project = Project::new(&approve_json(0.9));
    let script = write_script(project.root(), "cat >/dev/null\necho 'model offline' >&2\nexit 1");
    configure(&AnalyzerPaths::new(project.root()), script);

    let output = project.analyze("student-7", &[]);

    assert_eq!(output.status.code(), Some(exit_codes::GENERATION_FAILURE));
    assert!(
        !project
            .root()
            .join(".analyzer/memory/student-7.jsonl")
            .exists()
    );
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let project = Project::new(&approve_json(0.9));

    let again = project.run(&["init"]);
    assert_eq!(again.status.code(), Some(exit_codes::INVALID));

    let forced = project.run(&["init", "--force"]);
    assert_eq!(forced.status.code(), Some(exit_codes::OK));
}

#[test]
fn prompt_command_renders_without_calling_generator() {
    let project = Project::new(&approve_json(0.9));

    let output = project.run(&[
        "prompt",
        "--role",
        "summarizer",
        "--transcript",
        "transcript.json",
        "--mode",
        "study-stress",
    ]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Summarizer Contract"));
    assert!(stdout.contains("overwhelmed with exams"));
    assert!(!project.root().join(".analyzer/memory/anonymous.jsonl").exists());
}
