// ABOUTME: Filter terms and remote grep pipeline construction.
// ABOUTME: Each search term becomes one grep stage; stages narrow each other's matches.

use nonempty::NonEmpty;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterSpecError {
    #[error("at least one search term is required")]
    NoTerms,

    #[error("search term {0} is empty")]
    EmptyTerm(usize),

    #[error("file path cannot be empty")]
    EmptyFile,
}

/// Ordered search terms plus the remote file they are matched against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    terms: NonEmpty<String>,
    file: String,
}

impl FilterSpec {
    pub fn new(
        terms: impl IntoIterator<Item = impl Into<String>>,
        file: impl Into<String>,
    ) -> Result<Self, FilterSpecError> {
        let terms: Vec<String> = terms.into_iter().map(Into::into).collect();
        if let Some(index) = terms.iter().position(|t| t.is_empty()) {
            return Err(FilterSpecError::EmptyTerm(index));
        }
        let terms = NonEmpty::from_vec(terms).ok_or(FilterSpecError::NoTerms)?;

        let file = file.into();
        if file.trim().is_empty() {
            return Err(FilterSpecError::EmptyFile);
        }

        Ok(Self { terms, file })
    }

    pub fn terms(&self) -> &NonEmpty<String> {
        &self.terms
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    /// The shell command that runs this filter on the remote host.
    pub fn script(&self) -> String {
        build_script(&self.terms, &self.file)
    }
}

/// Build `grep 't0' FILE | grep 't1' | ...` for the given terms.
pub fn build_script(terms: &NonEmpty<String>, file: &str) -> String {
    let mut script = format!("grep '{}' --color=auto {}", escape_brackets(&terms.head), file);
    for term in &terms.tail {
        script.push_str(&format!(" | grep '{}' --color=auto", escape_brackets(term)));
    }
    script
}

/// Brackets would otherwise start a regex character class.
fn escape_brackets(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if c == '[' || c == ']' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
