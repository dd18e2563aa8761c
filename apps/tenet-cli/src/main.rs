//! # tenet-cli
//!
//! Operator command-line interface for the Tenet compliance engine.
//!
//! Read-only views over what the engine recorded, plus policy tooling:
//! - `tenet dashboard` — rebuild the dashboard from the violation log
//! - `tenet audit verify/tail/query` — inspect the hash-chained violation log
//! - `tenet report show/list` — saved end-of-task compliance reports
//! - `tenet policy show/check/init` — effective policy, dry runs, defaults

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tenet_engine::ProjectLayout;
use tracing_subscriber::EnvFilter;

/// Tenet — runtime compliance for autonomous agents.
#[derive(Parser)]
#[command(
    name = "tenet",
    version,
    long_version = concat!(
        env!("CARGO_PKG_VERSION"),
        " (",
        env!("TENET_GIT_HASH"),
        " ",
        env!("TENET_BUILD_DATE"),
        ")"
    ),
    about
)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, global = true, default_value = ".")]
    project_root: PathBuf,

    /// Emit diagnostics on stderr as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show per-task compliance tallies, open obligations and recent blocks.
    Dashboard {
        /// Only show this task.
        #[arg(long)]
        task: Option<String>,
        /// Path to the violation log (defaults to .tenet/violations.jsonl).
        #[arg(long)]
        log: Option<PathBuf>,
        /// Print the view as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Inspect the violation log.
    Audit {
        #[command(subcommand)]
        command: commands::audit::AuditCommands,
    },
    /// Show saved compliance reports.
    Report {
        #[command(subcommand)]
        command: commands::report::ReportCommands,
    },
    /// Inspect, dry-run and initialize the policy.
    Policy {
        #[command(subcommand)]
        command: commands::policy::PolicyCommands,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    let project_root = cli.project_root.canonicalize().unwrap_or(cli.project_root);
    let layout = ProjectLayout::for_project(&project_root);
    tracing::debug!(root = %layout.root.display(), "project layout resolved");

    match &cli.command {
        Commands::Dashboard { task, log, json } => {
            commands::dashboard::execute(&layout, task.as_deref(), log.as_deref(), *json)
        }
        Commands::Audit { command } => commands::audit::execute(command, &layout),
        Commands::Report { command } => commands::report::execute(command, &layout),
        Commands::Policy { command } => commands::policy::execute(command, &layout),
    }
}

/// Diagnostics go to stderr so command output on stdout stays parseable.
fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("tenet_engine=info".parse()?)
        .add_directive("tenet_audit=warn".parse()?);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
