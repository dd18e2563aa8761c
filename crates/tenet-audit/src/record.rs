// record.rs — Log record data model.
//
// Every line of the violation log is one LogEntry. The entry wraps a tagged
// LogRecord so that violations, check acknowledgments, obligation changes
// and task ends share a single ordered, hash-chained stream.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tenet_policy::{
    Action, CheckOutcome, Decision, Deadline, EnforcerResult, Obligation, Principle,
    PrincipleKind, Severity, Stage,
};

/// One failed enforcer result, tied to the action it was evaluated against.
///
/// The struct is `non_exhaustive` so that outside this crate a record can
/// only be built with [`ViolationRecord::from_result`], i.e. from an action
/// the engine actually saw.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[non_exhaustive]
pub struct ViolationRecord {
    pub record_id: Uuid,
    pub task_id: String,
    pub action_id: Uuid,
    pub action_kind: String,
    pub principle: Principle,
    pub kind: PrincipleKind,
    pub stage: Stage,
    pub severity: Severity,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    /// Whether the check this result belongs to decided BLOCK.
    pub blocked: bool,
}

impl ViolationRecord {
    pub fn from_result(action: &Action, result: &EnforcerResult, blocked: bool) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            task_id: action.task_id.clone(),
            action_id: action.id,
            action_kind: action.kind.clone(),
            principle: result.principle,
            kind: result.kind,
            stage: result.stage,
            severity: result.severity,
            reason: result.reason.clone(),
            timestamp: Utc::now(),
            blocked,
        }
    }

    pub fn is_config_error(&self) -> bool {
        self.severity == Severity::ConfigError
    }

    pub fn is_unresolved_obligation(&self) -> bool {
        self.severity == Severity::UnresolvedObligation
    }
}

/// Acknowledgment of one check outcome. Written after the check's
/// violation records, so its presence means they are all durable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckRecord {
    pub task_id: String,
    pub action_id: Uuid,
    pub action_kind: String,
    pub stage: Stage,
    /// The task's action sequence number at the time of the check.
    pub seq: u64,
    pub decision: Decision,
    pub passed: Vec<Principle>,
    pub failed: Vec<Principle>,
    pub timestamp: DateTime<Utc>,
}

impl CheckRecord {
    pub fn from_outcome(action: &Action, outcome: &CheckOutcome, seq: u64) -> Self {
        let (passed, failed): (Vec<_>, Vec<_>) =
            outcome.results.iter().partition(|r| r.passed);
        Self {
            task_id: action.task_id.clone(),
            action_id: action.id,
            action_kind: action.kind.clone(),
            stage: outcome.stage,
            seq,
            decision: outcome.decision,
            passed: passed.into_iter().map(|r| r.principle).collect(),
            failed: failed.into_iter().map(|r| r.principle).collect(),
            timestamp: Utc::now(),
        }
    }
}

/// What happened to an obligation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ObligationEvent {
    Opened,
    Discharged,
}

/// An obligation was opened or discharged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObligationRecord {
    pub task_id: String,
    /// The action that opened or discharged the obligation.
    pub action_id: Uuid,
    pub principle: Principle,
    pub event: ObligationEvent,
    pub deadline: Deadline,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl ObligationRecord {
    pub fn opened(task_id: impl Into<String>, obligation: &Obligation) -> Self {
        Self {
            task_id: task_id.into(),
            action_id: obligation.opened_by,
            principle: obligation.principle,
            event: ObligationEvent::Opened,
            deadline: obligation.deadline,
            reason: obligation.reason.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn discharged(task_id: impl Into<String>, action_id: Uuid, obligation: &Obligation) -> Self {
        Self {
            task_id: task_id.into(),
            action_id,
            principle: obligation.principle,
            event: ObligationEvent::Discharged,
            deadline: obligation.deadline,
            reason: obligation.reason.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Final status of a task's compliance run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    /// No open obligations; the task finished normally.
    Clean,
    /// At least one bounded-liveness obligation was still open.
    Incomplete,
    /// The task was aborted.
    Aborted,
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReportStatus::Clean => "CLEAN",
            ReportStatus::Incomplete => "INCOMPLETE",
            ReportStatus::Aborted => "ABORTED",
        };
        write!(f, "{}", s)
    }
}

/// A task was closed by `end_of_task`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskEndRecord {
    pub task_id: String,
    pub status: ReportStatus,
    /// Principles with an obligation still open at task end.
    pub unresolved: Vec<Principle>,
    pub violations: u64,
    pub timestamp: DateTime<Utc>,
}

/// Anything that can be written to the log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogRecord {
    Violation(ViolationRecord),
    Check(CheckRecord),
    Obligation(ObligationRecord),
    TaskEnd(TaskEndRecord),
}

impl LogRecord {
    pub fn task_id(&self) -> &str {
        match self {
            LogRecord::Violation(r) => &r.task_id,
            LogRecord::Check(r) => &r.task_id,
            LogRecord::Obligation(r) => &r.task_id,
            LogRecord::TaskEnd(r) => &r.task_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            LogRecord::Violation(r) => r.timestamp,
            LogRecord::Check(r) => r.timestamp,
            LogRecord::Obligation(r) => r.timestamp,
            LogRecord::TaskEnd(r) => r.timestamp,
        }
    }

    pub fn as_violation(&self) -> Option<&ViolationRecord> {
        match self {
            LogRecord::Violation(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_check(&self) -> Option<&CheckRecord> {
        match self {
            LogRecord::Check(r) => Some(r),
            _ => None,
        }
    }
}

impl From<ViolationRecord> for LogRecord {
    fn from(r: ViolationRecord) -> Self {
        LogRecord::Violation(r)
    }
}

impl From<CheckRecord> for LogRecord {
    fn from(r: CheckRecord) -> Self {
        LogRecord::Check(r)
    }
}

impl From<ObligationRecord> for LogRecord {
    fn from(r: ObligationRecord) -> Self {
        LogRecord::Obligation(r)
    }
}

impl From<TaskEndRecord> for LogRecord {
    fn from(r: TaskEndRecord) -> Self {
        LogRecord::TaskEnd(r)
    }
}

/// One line in the JSONL log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub entry_id: Uuid,
    pub record: LogRecord,
    /// SHA-256 of the previous raw line. None for the first entry.
    pub previous_hash: Option<String>,
}

impl LogEntry {
    pub fn new(record: LogRecord, previous_hash: Option<String>) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            record,
            previous_hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenet_policy::{ActionResult, Checklist, ComplianceState, EvaluationContext, PolicyConfig};

    fn failed_p1() -> EnforcerResult {
        EnforcerResult::fail(
            Principle::P1,
            PrincipleKind::Safety,
            Stage::PreAction,
            Severity::Critical,
            "irreversible action 'delete_file' requires parameters.confirmed = true",
        )
    }

    #[test]
    fn violation_record_copies_action_and_result() {
        let action = Action::new("task-1", "delete_file").with_risk_tag("irreversible");
        let record = ViolationRecord::from_result(&action, &failed_p1(), true);

        assert_eq!(record.task_id, "task-1");
        assert_eq!(record.action_id, action.id);
        assert_eq!(record.action_kind, "delete_file");
        assert_eq!(record.principle, Principle::P1);
        assert!(record.blocked);
        assert!(!record.is_config_error());
    }

    #[test]
    fn log_record_is_tagged() {
        let action = Action::new("task-1", "delete_file");
        let record = LogRecord::from(ViolationRecord::from_result(&action, &failed_p1(), true));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "violation");
        assert_eq!(json["principle"], "P1");
        assert_eq!(json["severity"], "critical");

        let back: LogRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.task_id(), "task-1");
        assert!(back.as_violation().is_some());
        assert!(back.as_check().is_none());
    }

    #[test]
    fn check_record_partitions_principles() {
        let checklist = Checklist::from_config(&PolicyConfig::default()).unwrap();
        let action = Action::new("task-1", "post_message")
            .with_cost(1.0)
            .with_risk_tag("external_write");
        let state = ComplianceState::new("task-1");
        let outcome = ActionResult::success().with_actual_cost(1.0);
        let check = checklist.run(
            Stage::PostAction,
            &EvaluationContext::post(&action, &state, &outcome),
        );

        let record = CheckRecord::from_outcome(&action, &check, 3);
        assert_eq!(record.seq, 3);
        assert_eq!(record.stage, Stage::PostAction);
        assert_eq!(record.passed, vec![Principle::P5]);
        assert_eq!(record.failed, vec![Principle::P6]);
        assert_eq!(record.decision, Decision::Allow);
    }

    #[test]
    fn report_status_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&ReportStatus::Incomplete).unwrap(),
            "\"INCOMPLETE\""
        );
        assert_eq!(ReportStatus::Aborted.to_string(), "ABORTED");
    }
}
