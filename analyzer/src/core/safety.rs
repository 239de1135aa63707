//! Local approval policy applied to raw reviewer verdicts.
//!
//! The model's own `approved` flag is advisory: a review only counts as
//! approved when the score clears the threshold and nothing high severity was
//! flagged.

use serde::Deserialize;

use crate::core::types::{Concern, SafetyReview, Severity};

/// Default minimum score for approval.
pub const DEFAULT_APPROVAL_THRESHOLD: f64 = 0.8;

/// Reviewer output as emitted by the model, before policy is applied.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReviewerVerdict {
    pub safety_score: f64,
    #[serde(default)]
    pub concerns: Vec<Concern>,
    #[serde(default)]
    pub required_modifications: Vec<String>,
    pub approved: bool,
}

/// Raise crisis indicators to high severity.
pub fn normalize_concerns(concerns: Vec<Concern>) -> Vec<Concern> {
    concerns
        .into_iter()
        .map(|mut concern| {
            if concern.is_crisis() {
                concern.severity = Severity::High;
            }
            concern
        })
        .collect()
}

pub fn is_approved(model_approved: bool, safety_score: f64, concerns: &[Concern], threshold: f64) -> bool {
    model_approved
        && safety_score >= threshold
        && !concerns.iter().any(Concern::is_high_severity)
}

/// Turn a model verdict into the review the loop acts on.
pub fn finalize_review(verdict: ReviewerVerdict, threshold: f64) -> SafetyReview {
    let concerns = normalize_concerns(verdict.concerns);
    let approved = is_approved(verdict.approved, verdict.safety_score, &concerns, threshold);
    SafetyReview {
        safety_score: verdict.safety_score,
        concerns,
        required_modifications: verdict.required_modifications,
        approved,
    }
}
