// ABOUTME: Console presentation of merged host output.
// ABOUTME: Supports normal, quiet (lines only), and JSON output modes.

use crate::fleet::{FleetRun, RunPlan};
use crate::host::HostError;
use crate::stream::Message;
use console::style;
use serde::Serialize;
use std::time::Instant;

const SEPARATOR: &str = "------------------------------------------------------------";

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Banner, colored host tags and a closing summary
    Normal,
    /// Matched lines and errors only
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Totals for one drained run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Lines actually displayed.
    pub lines: usize,
    pub failed_hosts: Vec<String>,
}

/// Renders fleet output according to the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

/// Trim the terminator and drop blank lines and `==>name<==` file headers.
pub fn displayable(content: &str) -> Option<&str> {
    let trimmed = content.trim_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return None;
    }
    let plain = console::strip_ansi_codes(trimmed);
    let plain = plain.trim();
    if plain.is_empty() || (plain.starts_with("==>") && plain.ends_with("<==")) {
        return None;
    }
    Some(trimmed)
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    /// Start timing the run.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    fn elapsed_secs(&self) -> Option<f64> {
        self.start_time.map(|t| t.elapsed().as_secs_f64())
    }

    /// Print the welcome banner and every target (normal mode only).
    pub fn banner(&self, plan: &RunPlan) {
        if self.mode != OutputMode::Normal {
            return;
        }
        println!(
            "{} {}",
            style("remote-grep").bold(),
            env!("CARGO_PKG_VERSION")
        );
        println!("{}", style(SEPARATOR).magenta());
        for target in &plan.hosts {
            let line = format!("{}@{}:{}", target.user, target.host, plan.spec.file());
            println!("{}", style(line).magenta());
        }
        println!("{}\n", style(SEPARATOR).cyan());
    }

    /// Print one message. Returns false when the line was filtered out.
    pub fn line(&self, message: &Message) -> bool {
        let Some(content) = displayable(&message.content) else {
            return false;
        };

        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                println!(
                    "{} {} {}",
                    style(&message.host).green(),
                    style("->").yellow(),
                    content
                );
            }
            OutputMode::Json => emit(&JsonEvent {
                event: "line",
                host: Some(&message.host),
                message: content,
                duration_secs: None,
            }),
        }
        true
    }

    /// Report a failed host.
    pub fn host_error(&self, error: &HostError) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                eprintln!("{}", style(format!("Error: {error}")).red());
            }
            OutputMode::Json => {
                let message = error.to_string();
                emit(&JsonEvent {
                    event: "error",
                    host: Some(error.host()),
                    message: &message,
                    duration_secs: None,
                });
            }
        }
    }

    pub fn no_targets(&self) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                println!("{}", style("No target host is available").red());
            }
            OutputMode::Json => emit(&JsonEvent {
                event: "no_targets",
                host: None,
                message: "No target host is available",
                duration_secs: None,
            }),
        }
    }

    /// Print the closing totals (suppressed in quiet mode).
    pub fn summary(&self, summary: &Summary) {
        let message = format!(
            "{} line(s), {} host(s) failed",
            summary.lines,
            summary.failed_hosts.len()
        );
        match self.mode {
            OutputMode::Normal => match self.elapsed_secs() {
                Some(elapsed) => println!("\n{} ({:.1}s)", style(message).dim(), elapsed),
                None => println!("\n{}", style(message).dim()),
            },
            OutputMode::Quiet => {}
            OutputMode::Json => emit(&JsonEvent {
                event: "summary",
                host: None,
                message: &message,
                duration_secs: self.elapsed_secs(),
            }),
        }
    }

    /// Render `run` until every host has finished.
    pub async fn drain(&self, mut run: FleetRun) -> Summary {
        let mut summary = Summary::default();
        let mut messages_open = true;
        let mut failures_open = true;

        while messages_open || failures_open {
            tokio::select! {
                message = run.messages.recv(), if messages_open => match message {
                    Some(message) => {
                        if self.line(&message) {
                            summary.lines += 1;
                        }
                    }
                    None => messages_open = false,
                },
                failure = run.failures.recv(), if failures_open => match failure {
                    Some(failure) => {
                        self.host_error(&failure);
                        summary.failed_hosts.push(failure.host().to_string());
                    }
                    None => failures_open = false,
                },
            }
        }

        summary
    }
}

fn emit(event: &JsonEvent<'_>) {
    if let Ok(json) = serde_json::to_string(event) {
        println!("{json}");
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<&'a str>,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}
