// layout.rs — Where a project's compliance state lives on disk.
//
// `for_project()` places everything under `.tenet/` in the project root:
//
//   .tenet/policy.yaml        principle configuration
//   .tenet/violations.jsonl   append-only, hash-chained log
//   .tenet/reports/           one JSON report per finished task

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Paths used by the engine and the CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectLayout {
    /// Root directory of the project.
    pub root: PathBuf,

    /// The `.tenet/` directory.
    pub tenet_dir: PathBuf,

    /// Policy configuration (YAML).
    pub policy_file: PathBuf,

    /// The violation log.
    pub violation_log: PathBuf,

    /// Directory for ReportStore (one JSON file per task).
    pub reports_dir: PathBuf,
}

impl ProjectLayout {
    /// Create a layout with the standard `.tenet/` directory for a project.
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        let root = project_root.as_ref().to_path_buf();
        let tenet_dir = root.join(".tenet");
        Self {
            policy_file: tenet_dir.join("policy.yaml"),
            violation_log: tenet_dir.join("violations.jsonl"),
            reports_dir: tenet_dir.join("reports"),
            tenet_dir,
            root,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_lives_under_dot_tenet() {
        let layout = ProjectLayout::for_project("/work/agent");
        assert_eq!(layout.tenet_dir, PathBuf::from("/work/agent/.tenet"));
        assert_eq!(
            layout.violation_log,
            PathBuf::from("/work/agent/.tenet/violations.jsonl")
        );
        assert_eq!(layout.policy_file, PathBuf::from("/work/agent/.tenet/policy.yaml"));
        assert_eq!(layout.reports_dir, PathBuf::from("/work/agent/.tenet/reports"));
    }
}
