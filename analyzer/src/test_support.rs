//! Test helpers: scripted ports and deterministic fixtures.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde_json::json;

use crate::core::digest::MemoryDigest;
use crate::core::types::{
    AgentRole, AnalysisResult, CandidateAnalysis, MemoryRecord, Mode, RecommendationResult,
    SafetyReview, Speaker, SummaryResult, Transcript, Turn,
};
use crate::io::config::{AnalyzerConfig, GeneratorConfig};
use crate::io::generator::{GenerateRequest, GenerationTimedOut, Generator};
use crate::io::memory::MemoryStore;

/// One scripted generator reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(String),
    /// Report a backend timeout for the request.
    TimedOut,
    /// Sleep, then return the text.
    Delayed(Duration, String),
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Text(text.into())
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Reply::Fail(message.into())
    }
}

/// Generator that replays per-role queues, then falls back to a sticky reply.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    queues: Mutex<HashMap<AgentRole, VecDeque<Reply>>>,
    sticky: HashMap<AgentRole, Reply>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot reply for `role`.
    pub fn then(mut self, role: AgentRole, reply: Reply) -> Self {
        self.queues
            .get_mut()
            .expect("queues lock")
            .entry(role)
            .or_default()
            .push_back(reply);
        self
    }

    /// Reply used for `role` once its queue is empty.
    pub fn always(mut self, role: AgentRole, reply: Reply) -> Self {
        self.sticky.insert(role, reply);
        self
    }

    pub fn calls(&self, role: AgentRole) -> usize {
        self.requests
            .lock()
            .expect("requests lock")
            .iter()
            .filter(|request| request.role == role)
            .count()
    }

    pub fn requests(&self, role: AgentRole) -> Vec<GenerateRequest> {
        self.requests
            .lock()
            .expect("requests lock")
            .iter()
            .filter(|request| request.role == role)
            .cloned()
            .collect()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, request: &GenerateRequest) -> Result<String> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        let queued = self
            .queues
            .lock()
            .expect("queues lock")
            .get_mut(&request.role)
            .and_then(VecDeque::pop_front);
        match queued.or_else(|| self.sticky.get(&request.role).cloned()) {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail(message)) => Err(anyhow!(message)),
            Some(Reply::TimedOut) => Err(GenerationTimedOut(request.timeout).into()),
            Some(Reply::Delayed(delay, text)) => {
                thread::sleep(delay);
                Ok(text)
            }
            None => bail!("no scripted reply for {}", request.role),
        }
    }
}

/// Memory store kept in process, with switchable failures.
#[derive(Debug, Default)]
pub struct InMemoryMemoryStore {
    seeded: HashMap<String, Vec<String>>,
    digests: Mutex<HashMap<String, Vec<MemoryDigest>>>,
    fail_fetch: bool,
    append_failures_left: AtomicU32,
    append_attempts: AtomicU32,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-existing entries returned before any appended digests.
    pub fn with_entries(mut self, user_id: &str, entries: &[&str]) -> Self {
        self.seeded.insert(
            user_id.to_string(),
            entries.iter().map(|entry| entry.to_string()).collect(),
        );
        self
    }

    pub fn failing_fetch(mut self) -> Self {
        self.fail_fetch = true;
        self
    }

    /// Fail the next `count` appends.
    pub fn failing_appends(self, count: u32) -> Self {
        self.append_failures_left.store(count, Ordering::SeqCst);
        self
    }

    pub fn digests(&self, user_id: &str) -> Vec<MemoryDigest> {
        self.digests
            .lock()
            .expect("digests lock")
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn append_attempts(&self) -> u32 {
        self.append_attempts.load(Ordering::SeqCst)
    }
}

impl MemoryStore for InMemoryMemoryStore {
    fn fetch(&self, user_id: &str) -> Result<MemoryRecord> {
        if self.fail_fetch {
            bail!("memory backend unavailable");
        }
        let mut entries = self.seeded.get(user_id).cloned().unwrap_or_default();
        entries.extend(self.digests(user_id).iter().map(MemoryDigest::render));
        Ok(MemoryRecord {
            user_id: user_id.to_string(),
            entries,
        })
    }

    fn append(&self, user_id: &str, digest: &MemoryDigest) -> Result<()> {
        self.append_attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .append_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            bail!("memory backend rejected append");
        }
        self.digests
            .lock()
            .expect("digests lock")
            .entry(user_id.to_string())
            .or_default()
            .push(digest.clone());
        Ok(())
    }
}

fn fixed_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0)
        .single()
        .expect("valid timestamp")
}

/// User-only transcript with one-minute spacing.
pub fn transcript(lines: &[&str]) -> Transcript {
    let start = fixed_start();
    Transcript::new(
        lines
            .iter()
            .enumerate()
            .map(|(idx, text)| Turn {
                role: Speaker::User,
                text: text.to_string(),
                timestamp: start + ChronoDuration::minutes(idx as i64),
            })
            .collect(),
    )
}

pub fn exam_transcript() -> Transcript {
    transcript(&["I'm overwhelmed with exams and haven't slept in two days"])
}

pub fn summary_json() -> String {
    json!({
        "summary": "The user feels overwhelmed by upcoming exams and has not slept for two days.",
        "emotions": ["anxious", "exhausted"],
        "focus_areas": ["exams", "sleep"],
        "tags": ["exams", "sleep", "stress"],
        "stress_level": "high",
        "academic_concerns": ["upcoming exams"]
    })
    .to_string()
}

pub fn recommendation_json() -> String {
    json!({
        "recommendations": [
            {
                "title": "Protect tonight's sleep",
                "description": "Set a fixed lights-out time and keep notes away from bed.",
                "category": "sleep"
            },
            {
                "title": "Break revision into blocks",
                "description": "Work in short focused sessions with planned breaks.",
                "category": "study"
            }
        ],
        "wellness_exercises": [
            {
                "name": "Box breathing",
                "instructions": "Breathe in for four counts, hold for four, out for four, hold for four.",
                "duration": "3 minutes",
                "best_for": "racing thoughts before sleep"
            }
        ],
        "resources": [
            {
                "type": "service",
                "title": "Campus counselling",
                "description": "Free confidential sessions for students."
            }
        ],
        "tone": "supportive",
        "wellness_pathways": [
            {
                "name": "Exam season reset",
                "pathway_type": "stress",
                "description": "A week of short daily check-ins and wind-down routines.",
                "duration_days": 7
            }
        ],
        "recommended_tasks": [
            {
                "title": "Make a revision timetable",
                "description": "List exams by date and assign daily topics.",
                "priority": "urgent_important",
                "suggested_due_days": 1
            },
            {
                "title": "Book a check-in with student support",
                "description": "Talk through workload options."
            }
        ],
        "study_focus_tips": ["Study in 25 minute blocks", "Review the hardest topic first"]
    })
    .to_string()
}

pub fn approve_json(score: f64) -> String {
    json!({
        "safety_score": score,
        "concerns": [],
        "required_modifications": [],
        "approved": true
    })
    .to_string()
}

pub fn reject_json(score: f64, modifications: &[&str]) -> String {
    json!({
        "safety_score": score,
        "concerns": [
            {"category": "tone_violation", "severity": "medium", "detail": "Directive wording."}
        ],
        "required_modifications": modifications,
        "approved": false
    })
    .to_string()
}

pub fn crisis_json() -> String {
    json!({
        "safety_score": 0.2,
        "concerns": [
            {
                "category": "crisis_indicator",
                "severity": "medium",
                "detail": "The conversation suggests the user may be at risk."
            }
        ],
        "required_modifications": ["Route to a human reviewer"],
        "approved": false
    })
    .to_string()
}

/// Refiner reply whose summary text starts with `marker`.
pub fn refined_json(marker: &str) -> String {
    let mut summary: serde_json::Value =
        serde_json::from_str(&summary_json()).expect("summary fixture");
    let recommendation: serde_json::Value =
        serde_json::from_str(&recommendation_json()).expect("recommendation fixture");
    summary["summary"] = json!(format!(
        "{marker}: the user is under exam pressure and short on sleep."
    ));
    json!({"summary": summary, "recommendation": recommendation}).to_string()
}

pub fn sample_summary() -> SummaryResult {
    serde_json::from_str(&summary_json()).expect("summary fixture")
}

pub fn sample_recommendation() -> RecommendationResult {
    serde_json::from_str(&recommendation_json()).expect("recommendation fixture")
}

pub fn sample_candidate() -> CandidateAnalysis {
    CandidateAnalysis::initial(sample_summary(), sample_recommendation())
}

/// Accepted study-mode result built around `summary`.
pub fn accepted_result(summary: SummaryResult) -> AnalysisResult {
    AnalysisResult {
        user_id: "user-1".to_string(),
        session_id: None,
        mode: Mode::StudyStress,
        created_at: fixed_start(),
        candidate: CandidateAnalysis::initial(summary, sample_recommendation()),
        final_review: SafetyReview {
            safety_score: 0.9,
            concerns: Vec::new(),
            required_modifications: Vec::new(),
            approved: true,
        },
        final_safety_score: 0.9,
        escalated: false,
        escalation: None,
        iterations_used: 1,
        task_plan: Vec::new(),
        memory_appended: false,
    }
}

/// Default config with no retry delay and a placeholder generator command.
pub fn test_config() -> AnalyzerConfig {
    AnalyzerConfig {
        retry_delay_ms: 0,
        generator: GeneratorConfig {
            command: vec!["true".to_string()],
        },
        ..AnalyzerConfig::default()
    }
}

/// Generator scripted so every role succeeds and the first review approves.
pub fn approving_generator() -> ScriptedGenerator {
    ScriptedGenerator::new()
        .always(AgentRole::Summarizer, Reply::text(summary_json()))
        .always(AgentRole::Recommender, Reply::text(recommendation_json()))
        .always(AgentRole::SafetyReviewer, Reply::text(approve_json(0.9)))
}
