//! Shared deterministic types for the analysis pipeline.
//!
//! These shapes are the binding contract between the orchestrator and whatever
//! serializes results for storage or transport. They must not depend on
//! external state or I/O. Set-valued fields use `BTreeSet` so serialized output
//! is stable across runs.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Analysis flavor requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    GeneralWellness,
    StudyStress,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::GeneralWellness => "general_wellness",
            Mode::StudyStress => "study_stress",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role-specific prompting target for the language-model port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Summarizer,
    Recommender,
    SafetyReviewer,
    SafetyRefiner,
}

impl AgentRole {
    pub const ALL: [AgentRole; 4] = [
        AgentRole::Summarizer,
        AgentRole::Recommender,
        AgentRole::SafetyReviewer,
        AgentRole::SafetyRefiner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Summarizer => "summarizer",
            AgentRole::Recommender => "recommender",
            AgentRole::SafetyReviewer => "safety_reviewer",
            AgentRole::SafetyRefiner => "safety_refiner",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who authored a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Ordered conversation turns. Immutable input to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub turns: Vec<Turn>,
}

impl Transcript {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    /// True when no turn carries any non-whitespace text.
    pub fn is_blank(&self) -> bool {
        self.turns.iter().all(|turn| turn.text.trim().is_empty())
    }

    pub fn text_bytes(&self) -> usize {
        self.turns.iter().map(|turn| turn.text.len()).sum()
    }
}

/// Longest accepted user id.
pub const MAX_USER_ID_LEN: usize = 128;

/// User ids are non-empty `[A-Za-z0-9_-]+` strings of bounded length.
pub fn is_valid_user_id(user_id: &str) -> bool {
    !user_id.is_empty()
        && user_id.len() <= MAX_USER_ID_LEN
        && user_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Prior cross-session context for a user, owned by the memory port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub user_id: String,
    pub entries: Vec<String>,
}

impl MemoryRecord {
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            entries: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StressLevel {
    Low,
    Moderate,
    High,
}

/// Emotional and topical summary produced by the summarizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub summary: String,
    pub emotions: BTreeSet<String>,
    pub focus_areas: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    /// Populated in study mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stress_level: Option<StressLevel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub academic_concerns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub title: String,
    pub description: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WellnessExercise {
    pub name: String,
    pub instructions: String,
    pub duration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_for: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Supportive,
    Encouraging,
    Gentle,
    Motivating,
}

/// Multi-day program the user can opt into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WellnessPathway {
    pub name: String,
    pub pathway_type: String,
    pub description: String,
    pub duration_days: u32,
}

/// Eisenhower classification for a recommended task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    UrgentImportant,
    #[default]
    ImportantNotUrgent,
    UrgentNotImportant,
    NeitherUrgentNorImportant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendedTask {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_due_days")]
    pub suggested_due_days: u32,
}

fn default_due_days() -> u32 {
    7
}

/// Actionable output produced by the recommender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub recommendations: Vec<Recommendation>,
    pub wellness_exercises: Vec<WellnessExercise>,
    pub resources: Vec<Resource>,
    pub tone: Tone,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wellness_pathways: Vec<WellnessPathway>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommended_tasks: Vec<RecommendedTask>,
    /// Populated in study mode.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub study_focus_tips: Vec<String>,
}

/// Unapproved pairing of summary and recommendation awaiting safety clearance.
///
/// A candidate is never edited: each refinement produces a new value whose
/// `iteration` is exactly one greater than its predecessor's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateAnalysis {
    pub summary: SummaryResult,
    pub recommendation: RecommendationResult,
    pub iteration: u32,
}

impl CandidateAnalysis {
    pub fn initial(summary: SummaryResult, recommendation: RecommendationResult) -> Self {
        Self {
            summary,
            recommendation,
            iteration: 0,
        }
    }

    /// Consume this candidate and produce its successor.
    pub fn next_revision(
        self,
        summary: SummaryResult,
        recommendation: RecommendationResult,
    ) -> Self {
        Self {
            summary,
            recommendation,
            iteration: self.iteration + 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcernCategory {
    CrisisIndicator,
    HarmfulContent,
    MedicalOverreach,
    ToneViolation,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concern {
    pub category: ConcernCategory,
    pub severity: Severity,
    pub detail: String,
}

impl Concern {
    pub fn is_crisis(&self) -> bool {
        self.category == ConcernCategory::CrisisIndicator
    }

    /// Crisis indicators count as high severity whatever the reviewer reported.
    pub fn is_high_severity(&self) -> bool {
        self.is_crisis() || self.severity == Severity::High
    }
}

/// Result of one safety review pass. Never reused across iterations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyReview {
    pub safety_score: f64,
    pub concerns: Vec<Concern>,
    pub required_modifications: Vec<String>,
    pub approved: bool,
}

impl SafetyReview {
    pub fn has_crisis_indicator(&self) -> bool {
        self.concerns.iter().any(Concern::is_crisis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// A reviewer flagged crisis language; the loop ended without refinement.
    CrisisIndicator,
    /// Every review pass in the budget came back unapproved.
    BudgetExhausted,
}

/// Payload the calling layer uses to route a run to human review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    pub reason: EscalationReason,
    pub concerns: Vec<Concern>,
}

/// Eisenhower quadrant codes used by task storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quadrant {
    HighImpHighUrg,
    HighImpLowUrg,
    LowImpHighUrg,
    LowImpLowUrg,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedTask {
    pub title: String,
    pub description: String,
    pub quadrant: Quadrant,
    pub due_date: NaiveDate,
}

/// Terminal entity of a run and the only value exposed outside the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub user_id: String,
    /// Caller-supplied id used to correlate the result with its session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub mode: Mode,
    pub created_at: DateTime<Utc>,
    pub candidate: CandidateAnalysis,
    pub final_review: SafetyReview,
    pub final_safety_score: f64,
    pub escalated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<Escalation>,
    pub iterations_used: u32,
    pub task_plan: Vec<PlannedTask>,
    pub memory_appended: bool,
}
