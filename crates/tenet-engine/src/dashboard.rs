// dashboard.rs — Live compliance dashboard, projected from the log.
//
// The dashboard never reads engine state. The engine feeds it every log
// entry once the entry is durable, and the same `apply` can replay a log
// file offline, so a rebuilt dashboard equals the live one.
//
// `query` is read-only and deterministic: `as_of` is the timestamp of the
// last applied entry, so two queries with no engine activity in between
// return identical views.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Write as _;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tenet_audit::{
    AuditError, LogEntry, LogRecord, ObligationEvent, ReportStatus, ViolationLogger,
};
use tenet_policy::{Deadline, Decision, Principle, Stage};

/// Pass/fail tallies for one principle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrincipleTally {
    pub passed: u64,
    pub failed: u64,
}

/// An obligation the log shows as open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenObligation {
    pub principle: Principle,
    pub opened_by: Uuid,
    pub deadline: Deadline,
    pub reason: String,
    /// Past its deadline as of the task's latest check.
    pub overdue: bool,
}

/// One BLOCK decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockEvent {
    pub task_id: String,
    pub action_id: Uuid,
    pub action_kind: String,
    pub principles: Vec<Principle>,
    /// Reasons of the blocking check's violation records.
    pub reasons: Vec<String>,
    pub at: DateTime<Utc>,
}

/// Aggregates for one task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskView {
    pub task_id: String,
    pub actions_checked: u64,
    pub actions_allowed: u64,
    pub actions_blocked: u64,
    pub post_checks: u64,
    pub violations: u64,
    pub config_errors: u64,
    pub overdue_reports: u64,
    /// Latest action sequence number seen in a check.
    pub latest_seq: u64,
    pub principles: BTreeMap<Principle, PrincipleTally>,
    pub open_obligations: Vec<OpenObligation>,
    /// Set once the task has ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended: Option<ReportStatus>,
}

/// A point-in-time snapshot of the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardView {
    /// Timestamp of the last applied entry (None for an empty log).
    pub as_of: Option<DateTime<Utc>>,
    pub entries_applied: u64,
    pub tasks: Vec<TaskView>,
    /// Most recent first.
    pub recent_blocks: Vec<BlockEvent>,
}

impl DashboardView {
    pub fn total_open_obligations(&self) -> usize {
        self.tasks.iter().map(|t| t.open_obligations.len()).sum()
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskView> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    /// Plain-text rendering for operators.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let as_of = self
            .as_of
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "(empty log)".to_string());
        let _ = writeln!(out, "Compliance dashboard as of {}", as_of);
        let _ = writeln!(
            out,
            "  {} entries, {} tasks, {} open obligations",
            self.entries_applied,
            self.tasks.len(),
            self.total_open_obligations()
        );

        for task in &self.tasks {
            let _ = writeln!(out);
            let status = task
                .ended
                .map(|s| s.to_string())
                .unwrap_or_else(|| "ACTIVE".to_string());
            let _ = writeln!(out, "Task {} [{}]", task.task_id, status);
            let _ = writeln!(
                out,
                "  actions: {} checked, {} allowed, {} blocked, {} post-checked",
                task.actions_checked, task.actions_allowed, task.actions_blocked, task.post_checks
            );
            let _ = writeln!(
                out,
                "  violations: {} ({} config errors, {} overdue reports)",
                task.violations, task.config_errors, task.overdue_reports
            );
            for (principle, tally) in &task.principles {
                let _ = writeln!(
                    out,
                    "    {:<4} pass {:>4}  fail {:>4}",
                    principle.to_string(),
                    tally.passed,
                    tally.failed
                );
            }
            for o in &task.open_obligations {
                let _ = writeln!(
                    out,
                    "  open: {} due by action #{}{}: {}",
                    o.principle,
                    o.deadline.action_seq,
                    if o.overdue { " (OVERDUE)" } else { "" },
                    o.reason
                );
            }
        }

        if !self.recent_blocks.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Recent blocks:");
            for block in &self.recent_blocks {
                let _ = writeln!(
                    out,
                    "  {} {} {} [{}]",
                    block.at.format("%H:%M:%S"),
                    block.task_id,
                    block.action_kind,
                    block
                        .principles
                        .iter()
                        .map(|p| p.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                for reason in &block.reasons {
                    let _ = writeln!(out, "      {}", reason);
                }
            }
        }
        out
    }
}

#[derive(Debug, Default)]
struct TaskTally {
    view: TaskView,
    open: BTreeMap<Principle, OpenObligation>,
    /// Reasons of blocking violation records awaiting their check record.
    pending_block_reasons: HashMap<Uuid, Vec<String>>,
}

#[derive(Debug)]
struct Projection {
    recent_blocks_cap: usize,
    tasks: BTreeMap<String, TaskTally>,
    recent_blocks: VecDeque<BlockEvent>,
    as_of: Option<DateTime<Utc>>,
    entries_applied: u64,
}

impl Projection {
    fn task(&mut self, task_id: &str) -> &mut TaskTally {
        let tally = self.tasks.entry(task_id.to_string()).or_default();
        // A task id reused after its end starts a fresh tally.
        if tally.view.ended.is_some() {
            *tally = TaskTally::default();
        }
        if tally.view.task_id.is_empty() {
            tally.view.task_id = task_id.to_string();
        }
        tally
    }

    fn apply(&mut self, entry: &LogEntry) {
        let record = &entry.record;
        self.entries_applied += 1;
        self.as_of = Some(record.timestamp());

        match record {
            LogRecord::Violation(v) => {
                let tally = self.task(&v.task_id);
                tally.view.violations += 1;
                if v.is_config_error() {
                    tally.view.config_errors += 1;
                }
                if v.is_unresolved_obligation() {
                    tally.view.overdue_reports += 1;
                }
                if v.blocked {
                    tally
                        .pending_block_reasons
                        .entry(v.action_id)
                        .or_default()
                        .push(format!("{}: {}", v.principle, v.reason));
                }
            }
            LogRecord::Check(c) => {
                let tally = self.task(&c.task_id);
                let view = &mut tally.view;
                for p in &c.passed {
                    view.principles.entry(*p).or_default().passed += 1;
                }
                for p in &c.failed {
                    view.principles.entry(*p).or_default().failed += 1;
                }
                view.latest_seq = view.latest_seq.max(c.seq);

                let reasons = tally.pending_block_reasons.remove(&c.action_id);
                match (c.stage, c.decision) {
                    (Stage::PostAction, _) => tally.view.post_checks += 1,
                    (Stage::PreAction, Decision::Allow) => {
                        tally.view.actions_checked += 1;
                        tally.view.actions_allowed += 1;
                    }
                    (Stage::PreAction, Decision::Block) => {
                        tally.view.actions_checked += 1;
                        tally.view.actions_blocked += 1;
                        let event = BlockEvent {
                            task_id: c.task_id.clone(),
                            action_id: c.action_id,
                            action_kind: c.action_kind.clone(),
                            principles: c.failed.clone(),
                            reasons: reasons.unwrap_or_default(),
                            at: c.timestamp,
                        };
                        self.push_block(event);
                    }
                }
            }
            LogRecord::Obligation(o) => {
                let tally = self.task(&o.task_id);
                match o.event {
                    ObligationEvent::Opened => {
                        tally.open.insert(
                            o.principle,
                            OpenObligation {
                                principle: o.principle,
                                opened_by: o.action_id,
                                deadline: o.deadline,
                                reason: o.reason.clone(),
                                overdue: false,
                            },
                        );
                    }
                    ObligationEvent::Discharged => {
                        tally.open.remove(&o.principle);
                    }
                }
            }
            LogRecord::TaskEnd(end) => {
                let tally = self.tasks.entry(end.task_id.clone()).or_default();
                tally.view.task_id = end.task_id.clone();
                tally.view.ended = Some(end.status);
                tally.open.clear();
                tally.pending_block_reasons.clear();
            }
        }
    }

    fn push_block(&mut self, event: BlockEvent) {
        if self.recent_blocks_cap == 0 {
            return;
        }
        while self.recent_blocks.len() >= self.recent_blocks_cap {
            self.recent_blocks.pop_front();
        }
        self.recent_blocks.push_back(event);
    }

    fn view(&self, task_filter: Option<&str>) -> DashboardView {
        let tasks = self
            .tasks
            .values()
            .filter(|t| task_filter.map_or(true, |id| t.view.task_id == id))
            .map(|t| {
                let mut view = t.view.clone();
                let latest_seq = view.latest_seq;
                view.open_obligations = t
                    .open
                    .values()
                    .map(|o| {
                        let mut o = o.clone();
                        o.overdue = self
                            .as_of
                            .is_some_and(|as_of| o.deadline.has_passed(latest_seq, as_of));
                        o
                    })
                    .collect();
                view
            })
            .collect();

        let recent_blocks = self
            .recent_blocks
            .iter()
            .rev()
            .filter(|b| task_filter.map_or(true, |id| b.task_id == id))
            .cloned()
            .collect();

        DashboardView {
            as_of: self.as_of,
            entries_applied: self.entries_applied,
            tasks,
            recent_blocks,
        }
    }
}

/// Cloneable handle to the dashboard projection.
///
/// Readers take only the projection's read lock, never the engine's.
#[derive(Debug, Clone)]
pub struct Dashboard {
    inner: Arc<RwLock<Projection>>,
}

impl Dashboard {
    /// An empty dashboard keeping at most `recent_blocks` BLOCK events.
    pub fn new(recent_blocks: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Projection {
                recent_blocks_cap: recent_blocks,
                tasks: BTreeMap::new(),
                recent_blocks: VecDeque::new(),
                as_of: None,
                entries_applied: 0,
            })),
        }
    }

    /// Rebuild a dashboard by replaying entries in order.
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = &'a LogEntry>,
        recent_blocks: usize,
    ) -> Self {
        let dashboard = Self::new(recent_blocks);
        for entry in entries {
            dashboard.apply(entry);
        }
        dashboard
    }

    /// Rebuild a dashboard from everything in a log.
    pub fn from_log(log: &dyn ViolationLogger, recent_blocks: usize) -> Result<Self, AuditError> {
        Ok(Self::from_entries(&log.entries()?, recent_blocks))
    }

    /// Fold one durable log entry into the projection.
    pub fn apply(&self, entry: &LogEntry) {
        // Tallies stay usable after a panicking writer.
        let mut projection = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        projection.apply(entry);
    }

    /// Snapshot of every task, or of one task.
    pub fn query(&self, task_filter: Option<&str>) -> DashboardView {
        let projection = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        projection.view(task_filter)
    }
}
