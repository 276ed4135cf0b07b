// ABOUTME: Application-wide error types for remote-grep.
// ABOUTME: Uses thiserror for ergonomic error handling.

use crate::grep::FilterSpecError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid selector '{0}': expected environment.label.file")]
    InvalidSelector(String),

    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("unknown label '{label}' in environment '{environment}'")]
    UnknownLabel { environment: String, label: String },

    #[error("unknown file '{file}' in environment '{environment}'")]
    UnknownFile { environment: String, file: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(#[from] FilterSpecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
