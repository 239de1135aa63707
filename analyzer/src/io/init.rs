//! Initialization helpers for `.analyzer/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{AnalyzerConfig, write_config};

/// Canonical paths within `.analyzer/` for a project root.
#[derive(Debug, Clone)]
pub struct AnalyzerPaths {
    pub root: PathBuf,
    pub analyzer_dir: PathBuf,
    pub config_path: PathBuf,
    pub schema_dir: PathBuf,
    pub gitignore_path: PathBuf,
}

impl AnalyzerPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let analyzer_dir = root.join(".analyzer");
        Self {
            root: root.clone(),
            config_path: analyzer_dir.join("config.toml"),
            schema_dir: analyzer_dir.join("schemas"),
            gitignore_path: analyzer_dir.join(".gitignore"),
            analyzer_dir,
        }
    }
}

/// Options for `init_analyzer`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite an existing config.
    pub force: bool,
}

/// Create `.analyzer/` with a default config and an empty memory directory.
///
/// Fails if the config already exists unless `options.force` is set. Stored
/// memory is never touched.
pub fn init_analyzer(root: &Path, options: &InitOptions) -> Result<AnalyzerPaths> {
    let paths = AnalyzerPaths::new(root);
    if paths.analyzer_dir.exists() && !paths.analyzer_dir.is_dir() {
        return Err(anyhow!(
            "analyzer init: .analyzer exists but is not a directory"
        ));
    }
    if paths.config_path.exists() && !options.force {
        return Err(anyhow!(
            "analyzer init: {} already exists (use --force to overwrite)",
            paths.config_path.display()
        ));
    }

    let cfg = AnalyzerConfig::default();
    create_dir(&paths.analyzer_dir)?;
    create_dir(&cfg.memory_dir(&paths.root))?;
    write_config(&paths.config_path, &cfg)?;
    fs::write(&paths.gitignore_path, ANALYZER_GITIGNORE)
        .with_context(|| format!("write file {}", paths.gitignore_path.display()))?;

    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

// Memory holds per-user wellness data and must stay out of version control.
const ANALYZER_GITIGNORE: &str = "memory/\nschemas/\n";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::load_config;

    #[test]
    fn init_creates_expected_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_analyzer(temp.path(), &InitOptions { force: false }).expect("init");

        assert!(paths.analyzer_dir.is_dir());
        assert!(paths.config_path.is_file());
        assert!(temp.path().join(".analyzer/memory").is_dir());
        assert_eq!(
            fs::read_to_string(&paths.gitignore_path).expect("read"),
            ANALYZER_GITIGNORE
        );
        assert_eq!(
            load_config(&paths.config_path).expect("load"),
            AnalyzerConfig::default()
        );
    }

    #[test]
    fn init_without_force_refuses_existing_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_analyzer(temp.path(), &InitOptions { force: false }).expect("init");
        let err = init_analyzer(temp.path(), &InitOptions { force: false }).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    /// Verifies --force restores the default config but keeps stored memory.
    #[test]
    fn init_with_force_rewrites_config_and_keeps_memory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_analyzer(temp.path(), &InitOptions { force: false }).expect("init");
        fs::write(&paths.config_path, "max_iterations = 9\n").expect("write custom");
        let memory_file = temp.path().join(".analyzer/memory/user-1.jsonl");
        fs::write(&memory_file, "{}\n").expect("write memory");

        init_analyzer(temp.path(), &InitOptions { force: true }).expect("re-init");

        assert_eq!(
            load_config(&paths.config_path).expect("load"),
            AnalyzerConfig::default()
        );
        assert!(memory_file.is_file());
    }
}
