// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Positional search terms followed by one environment.label.file selector.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "remote-grep")]
#[command(about = "Grep the same log file across a fleet of hosts over SSH")]
#[command(version)]
pub struct Cli {
    /// Search terms, then the selector (e.g. `ERROR timeout prod.web.nginx`).
    /// Each term narrows the matches of the previous one. Terms may start
    /// with `-`; options go before the first term.
    #[arg(
        value_name = "TERM... ENV.LABEL.FILE",
        required = true,
        num_args = 2..,
        allow_hyphen_values = true
    )]
    pub args: Vec<String>,

    /// Configuration file (default: remote-grep.yml in the current directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Print matched lines and errors only
    #[arg(short, long, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Split positionals into search terms and the selector token.
    pub fn terms_and_selector(&self) -> (Vec<String>, &str) {
        match self.args.split_last() {
            Some((selector, terms)) => (terms.to_vec(), selector.as_str()),
            None => (Vec::new(), ""),
        }
    }
}
