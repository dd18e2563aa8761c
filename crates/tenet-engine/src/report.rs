// report.rs — ComplianceReport and its per-task JSON store.
//
// A report is an immutable snapshot built by `end_of_task` from the task's
// ComplianceState plus the task's violation records. ReportStore keeps one
// JSON file per task under `.tenet/reports/`.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tenet_audit::hasher;
use tenet_audit::{ReportStatus, ViolationRecord};
use tenet_policy::{ComplianceState, Obligation, Principle};

use crate::error::EngineError;

/// Pass/fail totals for one principle over a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrincipleSummary {
    pub principle: Principle,
    pub title: String,
    pub pass_count: u64,
    pub fail_count: u64,
}

/// Final compliance summary for one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplianceReport {
    pub report_id: Uuid,
    pub task_id: String,
    pub status: ReportStatus,
    pub generated_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    /// Actions submitted to `before_action`.
    pub actions_checked: u64,
    pub actions_allowed: u64,
    pub actions_blocked: u64,
    pub post_checks: u64,
    /// Principles evaluated at least once, in principle order.
    pub principles: Vec<PrincipleSummary>,
    /// Every violation record of the task, in log order.
    pub violations: Vec<ViolationRecord>,
    pub config_errors: u64,
    /// Obligations still open at task end.
    pub unresolved_obligations: Vec<Obligation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    pub persistence_failures: u64,
}

impl ComplianceReport {
    /// Build a report from the task's state and its violation records.
    pub fn from_state(state: &ComplianceState, violations: Vec<ViolationRecord>) -> Self {
        let principles = state
            .principle_status
            .iter()
            .map(|(principle, status)| PrincipleSummary {
                principle: *principle,
                title: principle.title().to_string(),
                pass_count: status.pass_count,
                fail_count: status.fail_count,
            })
            .collect();

        Self {
            report_id: Uuid::new_v4(),
            task_id: state.task_id.clone(),
            status: Self::status_for(state),
            generated_at: Utc::now(),
            started_at: state.started_at,
            actions_checked: state.actions_seen,
            actions_allowed: state.actions_allowed,
            actions_blocked: state.actions_blocked,
            post_checks: state.post_checks,
            principles,
            violations,
            config_errors: state.config_errors,
            unresolved_obligations: state.open_obligations.values().cloned().collect(),
            abort_reason: state.aborted.clone(),
            persistence_failures: state.persistence_failures,
        }
    }

    /// ABORTED beats INCOMPLETE beats CLEAN.
    pub fn status_for(state: &ComplianceState) -> ReportStatus {
        if state.is_aborted() {
            ReportStatus::Aborted
        } else if !state.open_obligations.is_empty() {
            ReportStatus::Incomplete
        } else {
            ReportStatus::Clean
        }
    }

    /// Violation records whose check decided BLOCK.
    pub fn blocking_violations(&self) -> impl Iterator<Item = &ViolationRecord> {
        self.violations.iter().filter(|v| v.blocked)
    }

    /// Principles with an unresolved obligation.
    pub fn unresolved_principles(&self) -> Vec<Principle> {
        self.unresolved_obligations
            .iter()
            .map(|o| o.principle)
            .collect()
    }

    /// Plain-text rendering for operators.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Compliance report for task {}", self.task_id);
        let _ = writeln!(out, "  Status:        {}", self.status);
        if let Some(reason) = &self.abort_reason {
            let _ = writeln!(out, "  Abort reason:  {}", reason);
        }
        let _ = writeln!(
            out,
            "  Period:        {} .. {}",
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        let _ = writeln!(
            out,
            "  Actions:       {} checked, {} allowed, {} blocked, {} post-checked",
            self.actions_checked, self.actions_allowed, self.actions_blocked, self.post_checks
        );
        let _ = writeln!(out, "  Config errors: {}", self.config_errors);
        if self.persistence_failures > 0 {
            let _ = writeln!(out, "  Persistence failures: {}", self.persistence_failures);
        }

        if !self.principles.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "  {:<4} {:<44} {:>6} {:>6}", "", "PRINCIPLE", "PASS", "FAIL");
            for p in &self.principles {
                let _ = writeln!(
                    out,
                    "  {:<4} {:<44} {:>6} {:>6}",
                    p.principle.to_string(),
                    p.title,
                    p.pass_count,
                    p.fail_count
                );
            }
        }

        if !self.violations.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "  Violations ({}):", self.violations.len());
            for v in &self.violations {
                let marker = if v.blocked { "BLOCK" } else { "     " };
                let _ = writeln!(
                    out,
                    "    {} {} [{}] {} ({}): {}",
                    marker,
                    v.timestamp.format("%H:%M:%S"),
                    v.severity,
                    v.principle,
                    v.action_kind,
                    v.reason
                );
            }
        }

        if !self.unresolved_obligations.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "  Unresolved obligations:");
            for o in &self.unresolved_obligations {
                let _ = writeln!(
                    out,
                    "    {} opened at action #{}, due by #{}: {}",
                    o.principle, o.opened_at_seq, o.deadline.action_seq, o.reason
                );
            }
        }
        out
    }
}

/// Persistent store for ComplianceReports.
///
/// Each task gets its own JSON file in the store directory.
pub struct ReportStore {
    store_dir: PathBuf,
}

impl ReportStore {
    /// Create a new store backed by the given directory.
    /// Creates the directory if it doesn't exist.
    pub fn new(store_dir: impl AsRef<Path>) -> Result<Self, EngineError> {
        let store_dir = store_dir.as_ref().to_path_buf();
        fs::create_dir_all(&store_dir).map_err(|source| EngineError::IoError {
            path: store_dir.display().to_string(),
            source,
        })?;
        Ok(Self { store_dir })
    }

    /// Save a report (overwrites an earlier report for the same task id).
    pub fn save(&self, report: &ComplianceReport) -> Result<PathBuf, EngineError> {
        let path = self.report_file(&report.task_id);
        let json = serde_json::to_string_pretty(report)?;
        fs::write(&path, json).map_err(|source| EngineError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        Ok(path)
    }

    /// The report for a task, if one was saved.
    pub fn get(&self, task_id: &str) -> Result<Option<ComplianceReport>, EngineError> {
        let path = self.report_file(task_id);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path).map_err(|source| EngineError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    /// All reports, newest first. Unreadable files are skipped.
    pub fn list(&self) -> Result<Vec<ComplianceReport>, EngineError> {
        let entries = fs::read_dir(&self.store_dir).map_err(|source| EngineError::IoError {
            path: self.store_dir.display().to_string(),
            source,
        })?;

        let mut reports = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| EngineError::IoError {
                path: self.store_dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            match fs::read_to_string(&path)
                .ok()
                .and_then(|json| serde_json::from_str::<ComplianceReport>(&json).ok())
            {
                Some(report) => reports.push(report),
                None => tracing::warn!(path = %path.display(), "skipping unreadable report"),
            }
        }

        reports.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        Ok(reports)
    }

    /// Path to the JSON file for a task.
    ///
    /// Task ids are caller-chosen, so anything outside `[A-Za-z0-9._-]` is
    /// replaced and a hash suffix keeps distinct ids apart.
    fn report_file(&self, task_id: &str) -> PathBuf {
        let safe = !task_id.is_empty()
            && !task_id.starts_with('.')
            && task_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        let name = if safe {
            task_id.to_string()
        } else {
            let cleaned: String = task_id
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect();
            format!("{}-{}", cleaned, &hasher::hash_str(task_id)[..12])
        };
        self.store_dir.join(format!("{}.json", name))
    }
}
