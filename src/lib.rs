// ABOUTME: Library root for remote-grep - exposes the pipeline for the binary and tests.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod error;
pub mod fleet;
pub mod grep;
pub mod host;
pub mod merge;
pub mod output;
pub mod ssh;
pub mod stream;
