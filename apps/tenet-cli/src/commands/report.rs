// report.rs — Report subcommands: show, list.

use clap::Subcommand;
use tenet_engine::{ProjectLayout, ReportStore};

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Show the saved compliance report for a task.
    Show {
        /// Task ID.
        task: String,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List saved reports, newest first.
    List,
}

pub fn execute(cmd: &ReportCommands, layout: &ProjectLayout) -> anyhow::Result<()> {
    if !layout.reports_dir.exists() {
        println!("No reports found in {}", layout.reports_dir.display());
        return Ok(());
    }
    let store = ReportStore::new(&layout.reports_dir)?;

    match cmd {
        ReportCommands::Show { task, json } => match store.get(task)? {
            Some(report) if *json => println!("{}", serde_json::to_string_pretty(&report)?),
            Some(report) => print!("{}", report.render()),
            None => anyhow::bail!("No report for task: {}", task),
        },

        ReportCommands::List => {
            let reports = store.list()?;
            if reports.is_empty() {
                println!("No reports found.");
                return Ok(());
            }

            println!(
                "{:<24} {:<12} {:>8} {:>8} {:>10} {:<20}",
                "TASK", "STATUS", "CHECKED", "BLOCKED", "VIOLATIONS", "GENERATED"
            );
            println!("{}", "-".repeat(88));

            for report in &reports {
                println!(
                    "{:<24} {:<12} {:>8} {:>8} {:>10} {:<20}",
                    report.task_id,
                    report.status.to_string(),
                    report.actions_checked,
                    report.actions_blocked,
                    report.violations.len(),
                    report.generated_at.format("%Y-%m-%d %H:%M:%S"),
                );
            }
            println!("\n{} report(s) total.", reports.len());
        }
    }

    Ok(())
}
