// ABOUTME: The `environment.label.file` selector given on the command line.
// ABOUTME: Names which host group and which log file a run targets.

use crate::error::{Error, Result};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selector {
    pub environment: String,
    pub label: String,
    pub file: String,
}

impl Selector {
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || Error::InvalidSelector(value.to_string());

        let mut parts = value.trim().split('.');
        let (Some(environment), Some(label), Some(file), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        if environment.is_empty() || label.is_empty() || file.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            environment: environment.to_string(),
            label: label.to_string(),
            file: file.to_string(),
        })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.environment, self.label, self.file)
    }
}
