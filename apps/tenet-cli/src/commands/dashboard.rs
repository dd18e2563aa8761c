// dashboard.rs — `tenet dashboard`: rebuild the dashboard from the log.

use std::path::Path;

use tenet_audit::ViolationLog;
use tenet_engine::{Dashboard, ProjectLayout};
use tenet_policy::PolicyConfig;

pub fn execute(
    layout: &ProjectLayout,
    task: Option<&str>,
    log: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let path = super::log_path(layout, log);
    if !path.exists() {
        println!("No violation log found at {}", path.display());
        return Ok(());
    }

    let config = PolicyConfig::load_or_default(&layout.policy_file)?;
    let entries = ViolationLog::read_all(&path)?;
    let dashboard = Dashboard::from_entries(&entries, config.engine.recent_blocks);
    let view = dashboard.query(task);

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }
    if let Some(task_id) = task {
        if view.task(task_id).is_none() {
            println!("No records for task {}", task_id);
            return Ok(());
        }
    }
    print!("{}", view.render());
    Ok(())
}
