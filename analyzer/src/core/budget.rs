//! Shared time budget helpers for deterministic orchestration.

use std::time::{Duration, Instant};

use thiserror::Error;

/// The overall run deadline has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("run deadline exceeded")]
pub struct DeadlineExceeded;

/// Return the remaining time budget until the provided deadline.
pub fn remaining_budget(deadline: Instant) -> Result<Duration, DeadlineExceeded> {
    let remaining = deadline
        .checked_duration_since(Instant::now())
        .unwrap_or(Duration::from_secs(0));
    if remaining.is_zero() {
        return Err(DeadlineExceeded);
    }
    Ok(remaining)
}

/// Timeout for a single agent call: the per-call limit clipped to the run deadline.
pub fn call_timeout(deadline: Instant, per_call: Duration) -> Result<Duration, DeadlineExceeded> {
    Ok(remaining_budget(deadline)?.min(per_call))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_deadline_is_exceeded() {
        let deadline = Instant::now();
        assert_eq!(remaining_budget(deadline), Err(DeadlineExceeded));
    }

    #[test]
    fn call_timeout_is_clipped_to_remaining_budget() {
        let deadline = Instant::now() + Duration::from_secs(2);
        let timeout = call_timeout(deadline, Duration::from_secs(60)).expect("budget");
        assert!(timeout <= Duration::from_secs(2));

        let timeout = call_timeout(deadline, Duration::from_millis(10)).expect("budget");
        assert_eq!(timeout, Duration::from_millis(10));
    }
}
