//! Stable exit codes for analyzer CLI commands.

use crate::error::FailureKind;

/// Command succeeded; for `analyze`, the result was accepted.
pub const OK: i32 = 0;
/// Invalid input, config, or layout, or any other error.
pub const INVALID: i32 = 1;
/// `analyze` finished but the result was escalated for human review.
pub const ESCALATED: i32 = 2;
/// An agent call exhausted its retries.
pub const GENERATION_FAILURE: i32 = 3;
/// The run deadline passed.
pub const TIMEOUT: i32 = 4;

pub fn for_failure(kind: FailureKind) -> i32 {
    match kind {
        FailureKind::InvalidInput => INVALID,
        FailureKind::GenerationFailure => GENERATION_FAILURE,
        FailureKind::Timeout => TIMEOUT,
    }
}
