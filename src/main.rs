// ABOUTME: Entry point for the remote-grep CLI application.
// ABOUTME: Loads configuration, fans out to every selected host and prints merged output.

mod cli;

use clap::Parser;
use cli::Cli;
use remote_grep::config::{Config, Selector};
use remote_grep::error::Result;
use remote_grep::fleet;
use remote_grep::output::{Output, OutputMode};
use remote_grep::ssh::SshTransport;
use std::env;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so they never mix with matched lines
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };
    let mut output = Output::new(mode);

    let (terms, selector) = cli.terms_and_selector();
    let selector = Selector::parse(selector)?;

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::discover(&env::current_dir()?)?,
    };
    let plan = config.plan(&selector, terms)?;

    if plan.hosts.is_empty() {
        output.no_targets();
        return Ok(());
    }

    output.banner(&plan);
    output.start_timer();

    let run = fleet::launch(Arc::new(SshTransport), &plan);
    let summary = output.drain(run).await;
    output.summary(&summary);

    Ok(())
}
