// audit.rs — Audit subcommands: verify, tail, query.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Subcommand;
use tenet_audit::{AuditError, LogEntry, ViolationFilter, ViolationLog, ViolationRecord};
use tenet_engine::ProjectLayout;
use tenet_policy::Principle;

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Verify the violation log hash chain integrity.
    Verify {
        /// Path to the violation log (defaults to .tenet/violations.jsonl).
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Show the most recent violation records.
    Tail {
        /// Path to the violation log (defaults to .tenet/violations.jsonl).
        #[arg(long)]
        log: Option<PathBuf>,
        /// Number of records to show.
        #[arg(short, default_value = "10")]
        n: usize,
    },
    /// Search violation records.
    Query {
        /// Path to the violation log (defaults to .tenet/violations.jsonl).
        #[arg(long)]
        log: Option<PathBuf>,
        /// Only this task.
        #[arg(long)]
        task: Option<String>,
        /// Only this principle (e.g., "P3").
        #[arg(long)]
        principle: Option<Principle>,
        /// Only violations whose action was blocked.
        #[arg(long)]
        blocked: bool,
        /// Only records at or after this RFC 3339 timestamp.
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        /// Print matching records as JSON lines.
        #[arg(long)]
        json: bool,
    },
}

pub fn execute(cmd: &AuditCommands, layout: &ProjectLayout) -> anyhow::Result<()> {
    match cmd {
        AuditCommands::Verify { log } => {
            let path = super::log_path(layout, log.as_deref());
            if !path.exists() {
                println!("No violation log found at {}", path.display());
                return Ok(());
            }

            match ViolationLog::verify_chain(&path) {
                Ok(count) => {
                    println!("Violation log verified: {} entries, hash chain intact.", count);
                }
                Err(AuditError::IntegrityViolation {
                    line,
                    expected,
                    actual,
                }) => {
                    println!("INTEGRITY VIOLATION at line {}:", line);
                    println!("  Expected previous_hash: {}", expected);
                    println!("  Actual previous_hash:   {}", actual);
                    println!();
                    println!("The violation log may have been tampered with.");
                    anyhow::bail!("Violation log integrity check failed");
                }
                Err(e) => return Err(e.into()),
            }
        }

        AuditCommands::Tail { log, n } => {
            let path = super::log_path(layout, log.as_deref());
            if !path.exists() {
                println!("No violation log found at {}", path.display());
                return Ok(());
            }

            let entries = ViolationLog::read_all(&path)?;
            let records = matching(&entries, &ViolationFilter::all());
            let start = records.len().saturating_sub(*n);
            print_records(&records[start..]);
        }

        AuditCommands::Query {
            log,
            task,
            principle,
            blocked,
            since,
            json,
        } => {
            let path = super::log_path(layout, log.as_deref());
            if !path.exists() {
                println!("No violation log found at {}", path.display());
                return Ok(());
            }

            let filter = ViolationFilter {
                task_id: task.clone(),
                principle: *principle,
                since: *since,
                until: None,
                blocked_only: *blocked,
            };
            let entries = ViolationLog::read_all(&path)?;
            let records = matching(&entries, &filter);

            if *json {
                for record in records {
                    println!("{}", serde_json::to_string(record)?);
                }
            } else {
                print_records(&records);
                println!("\n{} violation(s) matched.", records.len());
            }
        }
    }

    Ok(())
}

/// Violation records among `entries` that pass `filter`, oldest first.
fn matching<'a>(entries: &'a [LogEntry], filter: &ViolationFilter) -> Vec<&'a ViolationRecord> {
    entries
        .iter()
        .filter_map(|entry| entry.record.as_violation())
        .filter(|record| filter.matches(record))
        .collect()
}

fn print_records(records: &[&ViolationRecord]) {
    if records.is_empty() {
        println!("No violation records.");
        return;
    }

    println!(
        "{:<20} {:<16} {:<4} {:<22} {:<6} {:<18} REASON",
        "TIMESTAMP", "TASK", "P", "SEVERITY", "STAGE", "ACTION"
    );
    println!("{}", "-".repeat(110));

    for record in records {
        println!(
            "{:<20} {:<16} {:<4} {:<22} {:<6} {:<18} {}{}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            truncate(&record.task_id, 16),
            record.principle.to_string(),
            record.severity.to_string(),
            record.stage.to_string(),
            truncate(&record.action_kind, 18),
            if record.blocked { "[BLOCKED] " } else { "" },
            record.reason,
        );
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
