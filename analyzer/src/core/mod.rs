//! Deterministic, pure logic shared by the analysis pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod digest;
pub mod extract;
pub mod safety;
pub mod tasks;
pub mod transition;
pub mod types;
