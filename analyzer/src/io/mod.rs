//! I/O boundaries: model invocation, memory storage, config, and prompts.

pub mod config;
pub mod generator;
pub mod init;
pub mod memory;
pub mod process;
pub mod prompt;
pub mod schema;
