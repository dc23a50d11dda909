//! CLI binary for ghwatch.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use ghwatch::queries::{self, DEFAULT_QUERIES};
use ghwatch::report::render_markdown;
use ghwatch::{AppConfig, diagnostics};
use ghwatch_search::{CancellationToken, MemorySink};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// ghwatch: find fresh GitHub code and repositories matching named searches.
#[derive(Parser)]
#[command(name = "ghwatch", version, about)]
struct Cli {
    /// Path to TOML settings file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,
}

/// Overrides for a single run.
#[derive(clap::Args)]
struct RunArgs {
    /// Path to TOML query file (overrides the settings file).
    #[arg(short, long)]
    queries: Option<PathBuf>,

    /// Recency window in days.
    #[arg(long)]
    days_back: Option<u32>,

    /// Page cap per search.
    #[arg(long)]
    max_pages: Option<u32>,

    /// Skip the commit-date confirmation round.
    #[arg(long)]
    no_enrich: bool,

    /// Skip repository searches.
    #[arg(long)]
    no_repo: bool,

    /// Print findings as JSON instead of Markdown.
    #[arg(long)]
    json: bool,

    /// Dump the run's event log as JSON to stderr.
    #[arg(long)]
    dump_events: bool,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Run every enabled search and print a digest (default).
    Run,

    /// Print the built-in query file.
    DefaultQueries,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays clean for the report.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ghwatch=info,ghwatch_search=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(cli.config, cli.run).await,
        Command::DefaultQueries => {
            print!("{DEFAULT_QUERIES}");
            Ok(())
        }
    }
}

async fn run(config_path: Option<PathBuf>, args: RunArgs) -> anyhow::Result<()> {
    let mut config = AppConfig::load(config_path.as_deref())?;
    if let Some(days_back) = args.days_back {
        config.days_back = days_back;
    }
    if let Some(max_pages) = args.max_pages {
        config.max_pages = max_pages;
    }
    if args.no_enrich {
        config.enrich = false;
    }
    if args.no_repo {
        config.include_repo_search = false;
    }

    let spec = match args.queries.as_ref().or(config.queries_file.as_ref()) {
        Some(path) => queries::load_queries(path)?,
        None => queries::default_queries()?,
    };

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, cancelling run...");
            cancel_clone.cancel();
        }
    });

    let sink = Arc::new(MemorySink::default());
    let result = ghwatch::run_watch(&config, &spec, cancel, sink.clone()).await;

    diagnostics::log_summary(&sink);
    if args.dump_events {
        if let Some(run_id) = sink.last_run_id() {
            eprintln!("{}", diagnostics::events_json(&sink, &run_id)?);
        }
    }

    let findings = match result {
        Ok(findings) => findings,
        Err(err) if err.is_interrupted() => {
            anyhow::bail!("run stopped before completion: {err}");
        }
        Err(err) => return Err(err.into()),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&findings)?);
    } else {
        print!("{}", render_markdown(&findings));
    }
    Ok(())
}
