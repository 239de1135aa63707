//! Memory digest derived from a finished analysis.
//!
//! Digests are built from the final candidate only. Transcript text never
//! flows into memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::{AnalysisResult, Mode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestOutcome {
    Accepted,
    Escalated,
}

/// One memory entry appended after a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryDigest {
    pub created_at: DateTime<Utc>,
    pub mode: Mode,
    pub outcome: DigestOutcome,
    pub safety_score: f64,
    pub summary: String,
    pub emotions: Vec<String>,
    pub focus_areas: Vec<String>,
    pub tags: Vec<String>,
}

impl MemoryDigest {
    pub fn from_result(result: &AnalysisResult) -> Self {
        let summary = &result.candidate.summary;
        Self {
            created_at: result.created_at,
            mode: result.mode,
            outcome: if result.escalated {
                DigestOutcome::Escalated
            } else {
                DigestOutcome::Accepted
            },
            safety_score: result.final_safety_score,
            summary: summary.summary.clone(),
            emotions: summary.emotions.iter().cloned().collect(),
            focus_areas: summary.focus_areas.iter().cloned().collect(),
            tags: summary.tags.iter().cloned().collect(),
        }
    }

    /// Single-line form used as prior context in prompts.
    pub fn render(&self) -> String {
        let mut line = format!(
            "{} [{}] {}",
            self.created_at.format("%Y-%m-%d"),
            self.mode,
            one_line(&self.summary)
        );
        for (label, values) in [
            ("emotions", &self.emotions),
            ("focus", &self.focus_areas),
            ("tags", &self.tags),
        ] {
            if !values.is_empty() {
                let joined: Vec<String> = values.iter().map(|value| one_line(value)).collect();
                line.push_str(&format!(" | {label}: {}", joined.join(", ")));
            }
        }
        if self.outcome == DigestOutcome::Escalated {
            line.push_str(" | escalated for human review");
        }
        line
    }
}

/// Collapse whitespace runs, line breaks included, to single spaces.
fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
