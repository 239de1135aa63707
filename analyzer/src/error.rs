//! Public failure taxonomy for an analysis run.
//!
//! Escalation is not represented here: an escalated run still returns an
//! `AnalysisResult`.

use std::fmt;

use thiserror::Error;

use crate::core::budget::DeadlineExceeded;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// An agent call exhausted its retries.
    GenerationFailure,
    /// The overall run deadline passed.
    Timeout,
    /// Rejected before any generation call.
    InvalidInput,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::GenerationFailure => "generation_failure",
            FailureKind::Timeout => "timeout",
            FailureKind::InvalidInput => "invalid_input",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct AnalysisFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl AnalysisFailure {
    pub fn generation(detail: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::GenerationFailure,
            detail: detail.into(),
        }
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Timeout,
            detail: detail.into(),
        }
    }

    pub fn invalid_input(detail: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::InvalidInput,
            detail: detail.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == FailureKind::Timeout
    }
}

impl From<DeadlineExceeded> for AnalysisFailure {
    fn from(err: DeadlineExceeded) -> Self {
        AnalysisFailure::timeout(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_detail() {
        let failure = AnalysisFailure::generation("summarizer failed after 3 attempts");
        assert_eq!(
            failure.to_string(),
            "generation_failure: summarizer failed after 3 attempts"
        );
    }

    #[test]
    fn deadline_converts_to_timeout() {
        let failure = AnalysisFailure::from(DeadlineExceeded);
        assert!(failure.is_timeout());
    }
}
