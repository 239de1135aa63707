//! Prompt pack builder for agent input.

use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::types::{
    CandidateAnalysis, MemoryRecord, Mode, RecommendationResult, SafetyReview, Speaker,
    SummaryResult, Transcript,
};

const SUMMARIZER_TEMPLATE: &str = include_str!("prompts/summarizer.md");
const RECOMMENDER_TEMPLATE: &str = include_str!("prompts/recommender.md");
const SAFETY_REVIEWER_TEMPLATE: &str = include_str!("prompts/safety_reviewer.md");
const SAFETY_REFINER_TEMPLATE: &str = include_str!("prompts/safety_refiner.md");

/// Sections dropped, in order, when a prompt is over budget.
const DROP_ORDER: [&str; 2] = ["memory", "guidance"];

/// What to do when a prompt is still over budget after dropping sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overflow {
    /// Cut the end of the last section.
    TruncateLast,
    /// Send every required section whole, over budget if need be. Used where
    /// the model must see exactly the content that will be delivered.
    KeepWhole,
}

/// Transcript turn as seen by templates.
#[derive(Debug, Clone, Serialize)]
struct TurnContext<'a> {
    role: &'static str,
    at: String,
    text: &'a str,
}

fn turn_contexts(transcript: &Transcript) -> Vec<TurnContext<'_>> {
    transcript
        .turns
        .iter()
        .filter(|turn| !turn.text.trim().is_empty())
        .map(|turn| TurnContext {
            role: match turn.role {
                Speaker::User => "user",
                Speaker::Assistant => "assistant",
            },
            at: turn.timestamp.format("%Y-%m-%d %H:%M").to_string(),
            text: turn.text.trim(),
        })
        .collect()
}

/// Candidate fields shown to the reviewer and refiner; the iteration counter stays internal.
#[derive(Serialize)]
struct CandidateView<'a> {
    summary: &'a SummaryResult,
    recommendation: &'a RecommendationResult,
}

fn candidate_json(candidate: &CandidateAnalysis) -> Result<String> {
    serde_json::to_string_pretty(&CandidateView {
        summary: &candidate.summary,
        recommendation: &candidate.recommendation,
    })
    .context("serialize candidate for prompt")
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        for (name, source) in [
            ("summarizer", SUMMARIZER_TEMPLATE),
            ("recommender", RECOMMENDER_TEMPLATE),
            ("safety_reviewer", SAFETY_REVIEWER_TEMPLATE),
            ("safety_refiner", SAFETY_REFINER_TEMPLATE),
        ] {
            env.add_template(name, source)
                .with_context(|| format!("load {name} template"))?;
        }
        Ok(Self { env })
    }

    /// Shared engine; templates are parsed once per process.
    fn shared() -> Result<&'static Self> {
        static ENGINE: LazyLock<Result<PromptEngine, String>> =
            LazyLock::new(|| PromptEngine::new().map_err(|err| format!("{err:#}")));
        ENGINE
            .as_ref()
            .map_err(|err| anyhow!("prompt templates: {err}"))
    }

    fn render_conversation(&self, name: &str, input: &PromptInputs<'_>) -> Result<String> {
        let template = self.env.get_template(name)?;
        let rendered = template.render(context! {
            mode => input.mode.as_str(),
            memory => (!input.memory.is_empty()).then_some(&input.memory.entries),
            turns => turn_contexts(input.transcript),
        })?;
        Ok(rendered)
    }

    fn render_reviewer(&self, candidate: &CandidateAnalysis, mode: Mode) -> Result<String> {
        let template = self.env.get_template("safety_reviewer")?;
        let rendered = template.render(context! {
            mode => mode.as_str(),
            candidate => candidate_json(candidate)?,
        })?;
        Ok(rendered)
    }

    fn render_refiner(
        &self,
        candidate: &CandidateAnalysis,
        review: &SafetyReview,
        mode: Mode,
    ) -> Result<String> {
        let template = self.env.get_template("safety_refiner")?;
        let rendered = template.render(context! {
            mode => mode.as_str(),
            safety_score => format!("{:.2}", review.safety_score),
            concerns => &review.concerns,
            modifications => &review.required_modifications,
            candidate => candidate_json(candidate)?,
        })?;
        Ok(rendered)
    }
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    /// Required sections are never dropped.
    required: bool,
    content: String,
}

/// Parse sections from rendered template output using HTML comment markers.
///
/// Markers follow format: `<!-- section:KEY required|droppable -->`
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    static SECTION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
            .expect("section marker regex is valid")
    });

    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::with_capacity(markers.len());
    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |next| next.start());
        let content = rendered[whole.end()..end].trim().to_string();
        let required = kind.as_str() == "required";
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }
    sections
}

fn total_len(sections: &[ParsedSection]) -> usize {
    sections.iter().map(|s| s.content.len()).sum()
}

/// Drop droppable sections in [`DROP_ORDER`], then apply `overflow`.
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize, overflow: Overflow) {
    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    if total_len(sections) <= budget {
        return;
    }
    if overflow == Overflow::KeepWhole {
        warn!(
            budget,
            prompt_bytes = total_len(sections),
            "prompt over budget; sending required sections whole"
        );
        return;
    }
    let Some((last, rest)) = sections.split_last_mut() else {
        return;
    };
    let allowed = budget.saturating_sub(total_len(rest));
    let before_len = last.content.len();
    if before_len > allowed {
        const MARKER: &str = "\n[truncated]";
        let keep = floor_char_boundary(&last.content, allowed.saturating_sub(MARKER.len()));
        last.content.truncate(keep);
        if allowed > MARKER.len() {
            last.content.push_str(MARKER);
        }
        warn!(
            section = last.key,
            before_len,
            after_len = last.content.len(),
            "truncated section for budget"
        );
    }
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    (0..=index)
        .rev()
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0)
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Conversation context shared by the summarizer and recommender.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub transcript: &'a Transcript,
    pub memory: &'a MemoryRecord,
    pub mode: Mode,
}

/// Builds prompt packs within a byte budget, dropping less critical sections first.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    pub fn build_summarizer(&self, input: &PromptInputs<'_>) -> Result<PromptPack> {
        let rendered = PromptEngine::shared()?
            .render_conversation("summarizer", input)
            .context("render summarizer prompt")?;
        Ok(self.pack(&rendered, Overflow::TruncateLast))
    }

    pub fn build_recommender(&self, input: &PromptInputs<'_>) -> Result<PromptPack> {
        let rendered = PromptEngine::shared()?
            .render_conversation("recommender", input)
            .context("render recommender prompt")?;
        Ok(self.pack(&rendered, Overflow::TruncateLast))
    }

    pub fn build_reviewer(&self, candidate: &CandidateAnalysis, mode: Mode) -> Result<PromptPack> {
        let rendered = PromptEngine::shared()?
            .render_reviewer(candidate, mode)
            .context("render safety reviewer prompt")?;
        Ok(self.pack(&rendered, Overflow::KeepWhole))
    }

    pub fn build_refiner(
        &self,
        candidate: &CandidateAnalysis,
        review: &SafetyReview,
        mode: Mode,
    ) -> Result<PromptPack> {
        let rendered = PromptEngine::shared()?
            .render_refiner(candidate, review, mode)
            .context("render safety refiner prompt")?;
        Ok(self.pack(&rendered, Overflow::KeepWhole))
    }

    fn pack(&self, rendered: &str, overflow: Overflow) -> PromptPack {
        let mut sections = parse_sections(rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes, overflow);
        PromptPack {
            content: render_sections(&sections),
        }
    }
}

/// A rendered prompt ready to send to a generator.
#[derive(Debug, Clone)]
pub struct PromptPack {
    content: String,
}

impl From<&str> for PromptPack {
    fn from(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }
}

impl PromptPack {
    pub fn as_str(&self) -> &str {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
