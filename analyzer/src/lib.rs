//! Safety-gated conversation analysis.
//!
//! A run turns a transcript into an [`AnalysisResult`](core::types::AnalysisResult):
//! the summary and recommendation agents run in parallel, a safety reviewer
//! gates the joint candidate, and a refiner revises it until it is accepted
//! or escalated for human review. The layout separates:
//!
//! - **[`core`]**: Pure logic (loop transitions, approval rules, task planning,
//!   memory digests). No I/O.
//! - **[`io`]**: Ports and side effects (generator process, memory files,
//!   prompts, schemas, config).
//!
//! [`coordinator`], [`refinement`], and [`assembler`] are driven by
//! [`analyze::Analyzer`], which the CLI wraps.

pub mod agents;
pub mod analyze;
pub mod assembler;
pub mod coordinator;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod refinement;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
