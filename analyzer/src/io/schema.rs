//! JSON Schemas (Draft 2020-12) for each agent's output.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use jsonschema::{Draft, Validator};
use serde_json::Value;

use crate::core::types::AgentRole;

const SUMMARIZER_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/analysis/summarizer.schema.json"
));
const RECOMMENDER_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/analysis/recommender.schema.json"
));
const SAFETY_REVIEWER_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/analysis/safety_reviewer.schema.json"
));
const SAFETY_REFINER_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/analysis/safety_refiner.schema.json"
));

/// Raw schema text for a role.
pub fn schema_source(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Summarizer => SUMMARIZER_SCHEMA,
        AgentRole::Recommender => RECOMMENDER_SCHEMA,
        AgentRole::SafetyReviewer => SAFETY_REVIEWER_SCHEMA,
        AgentRole::SafetyRefiner => SAFETY_REFINER_SCHEMA,
    }
}

pub fn schema_file_name(role: AgentRole) -> String {
    format!("{}.schema.json", role.as_str())
}

/// Compiled validator for one role's output.
pub struct OutputSchema {
    role: AgentRole,
    validator: Validator,
}

impl OutputSchema {
    pub fn compile(role: AgentRole) -> Result<Self> {
        let schema: Value = serde_json::from_str(schema_source(role))
            .with_context(|| format!("parse {} schema json", role))?;
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&schema)
            .map_err(|err| anyhow!("compile {} schema: {}", role, err))?;
        Ok(Self { role, validator })
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn source(&self) -> &'static str {
        schema_source(self.role)
    }

    /// Check an instance, returning every violation message on failure.
    pub fn check(&self, instance: &Value) -> Result<(), Vec<String>> {
        let messages: Vec<String> = self
            .validator
            .iter_errors(instance)
            .map(|err| err.to_string())
            .collect();
        if messages.is_empty() {
            Ok(())
        } else {
            Err(messages)
        }
    }
}

impl std::fmt::Debug for OutputSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSchema")
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// Validators for all four roles, compiled once per analyzer.
#[derive(Debug)]
pub struct SchemaSet {
    summarizer: OutputSchema,
    recommender: OutputSchema,
    safety_reviewer: OutputSchema,
    safety_refiner: OutputSchema,
}

impl SchemaSet {
    pub fn compile() -> Result<Self> {
        Ok(Self {
            summarizer: OutputSchema::compile(AgentRole::Summarizer)?,
            recommender: OutputSchema::compile(AgentRole::Recommender)?,
            safety_reviewer: OutputSchema::compile(AgentRole::SafetyReviewer)?,
            safety_refiner: OutputSchema::compile(AgentRole::SafetyRefiner)?,
        })
    }

    pub fn get(&self, role: AgentRole) -> &OutputSchema {
        match role {
            AgentRole::Summarizer => &self.summarizer,
            AgentRole::Recommender => &self.recommender,
            AgentRole::SafetyReviewer => &self.safety_reviewer,
            AgentRole::SafetyRefiner => &self.safety_refiner,
        }
    }
}

/// Write every role schema into `dir` so external generators can read them.
pub fn write_schema_files(dir: &Path) -> Result<HashMap<AgentRole, PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("create schema dir {}", dir.display()))?;
    let mut paths = HashMap::new();
    for role in AgentRole::ALL {
        let path = dir.join(schema_file_name(role));
        fs::write(&path, schema_source(role))
            .with_context(|| format!("write schema {}", path.display()))?;
        paths.insert(role, path);
    }
    Ok(paths)
}
