// policy.rs — Policy subcommands: show, check, init.
//
// `check` is a dry run: it evaluates the checklist against a fresh task
// state and prints the outcome. Nothing is written to the violation log.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Subcommand;
use tenet_engine::ProjectLayout;
use tenet_policy::{
    Action, ActionResult, CheckOutcome, Checklist, ComplianceState, Decision, EvaluationContext,
    PolicyConfig, Stage,
};

#[derive(Subcommand)]
pub enum PolicyCommands {
    /// Show the effective principle configuration.
    Show,
    /// Dry-run the checklist against an action described in a JSON file.
    Check {
        /// Path to the action JSON.
        action: PathBuf,
        /// Interception point to evaluate ("pre" or "post").
        #[arg(long, default_value = "pre")]
        stage: Stage,
        /// Path to the execution result JSON (required for --stage post).
        #[arg(long)]
        result: Option<PathBuf>,
    },
    /// Write the default policy to .tenet/policy.yaml.
    Init {
        /// Overwrite an existing policy file.
        #[arg(long)]
        force: bool,
    },
}

pub fn execute(cmd: &PolicyCommands, layout: &ProjectLayout) -> anyhow::Result<()> {
    match cmd {
        PolicyCommands::Show => {
            let config = PolicyConfig::load_or_default(&layout.policy_file)?;
            if layout.policy_file.exists() {
                println!("Policy: {}", layout.policy_file.display());
            } else {
                println!("Policy: built-in defaults (no {})", layout.policy_file.display());
            }
            print!("{}", describe(&config));
        }

        PolicyCommands::Check {
            action,
            stage,
            result,
        } => {
            let config = PolicyConfig::load_or_default(&layout.policy_file)?;
            let action: Action = read_json(action)?;
            let result: Option<ActionResult> = result.as_deref().map(read_json).transpose()?;
            let outcome = dry_run(&config, &action, *stage, result.as_ref())?;

            println!(
                "{} {} ({} stage): {}",
                action.kind, action.id, outcome.stage, outcome.decision
            );
            if outcome.results.is_empty() {
                println!("  no enforcer applies");
            }
            for r in &outcome.results {
                println!(
                    "  {} {:<4} {:<16} {}",
                    if r.passed { "pass" } else { "FAIL" },
                    r.principle.to_string(),
                    r.kind.to_string(),
                    r.reason
                );
            }
        }

        PolicyCommands::Init { force } => {
            if layout.policy_file.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    layout.policy_file.display()
                );
            }
            PolicyConfig::default().save(&layout.policy_file)?;
            println!("Wrote default policy to {}", layout.policy_file.display());
        }
    }

    Ok(())
}

/// Evaluate `action` at `stage` as if it were the first action of its task.
///
/// Post-stage checks never block, so their decision is always ALLOW.
fn dry_run(
    config: &PolicyConfig,
    action: &Action,
    stage: Stage,
    result: Option<&ActionResult>,
) -> anyhow::Result<CheckOutcome> {
    let checklist = Checklist::from_config(config)?;
    let state = ComplianceState::new(&action.task_id);
    let ctx = match (stage, result) {
        (Stage::PreAction, _) => EvaluationContext::pre(action, &state),
        (Stage::PostAction, Some(result)) => EvaluationContext::post(action, &state, result),
        (Stage::PostAction, None) => anyhow::bail!("--stage post requires --result"),
    };
    let mut outcome = checklist.run(stage, &ctx);
    if stage == Stage::PostAction {
        outcome.decision = Decision::Allow;
    }
    Ok(outcome)
}

fn describe(config: &PolicyConfig) -> String {
    let mut out = format!(
        "fail_closed: {}  default window: {} actions\n\n",
        config.engine.fail_closed, config.engine.default_window_actions
    );
    out.push_str(&format!(
        "{:<4} {:<8} {:<17} {:<6} {:<22} {:<10} APPLIES TO\n",
        "P", "ENABLED", "KIND", "STAGE", "SEVERITY", "WINDOW"
    ));
    out.push_str(&"-".repeat(96));
    out.push('\n');

    for spec in &config.principles {
        let window = match spec.kind() {
            tenet_policy::PrincipleKind::BoundedLiveness => {
                let mut w = spec.window_actions(&config.engine).to_string();
                if spec.escalate_when_overdue {
                    w.push('!');
                }
                w
            }
            tenet_policy::PrincipleKind::Safety => "-".to_string(),
        };
        let selector = spec.selector();
        let applies_to = selector
            .kinds
            .iter()
            .map(|k| format!("kind:{}", k))
            .chain(selector.risk_tags.iter().map(|t| format!("tag:{}", t)))
            .collect::<Vec<_>>()
            .join(" ");
        out.push_str(&format!(
            "{:<4} {:<8} {:<17} {:<6} {:<22} {:<10} {}\n",
            spec.principle.to_string(),
            if spec.enabled { "yes" } else { "no" },
            spec.kind().to_string(),
            spec.principle.stage().to_string(),
            spec.severity().to_string(),
            window,
            applies_to,
        ));
    }
    out
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let json =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))
}
