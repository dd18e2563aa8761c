// end_to_end.rs — Integration tests for the compliance engine against a real log.
//
// Each test drives the engine the way an agent loop would:
//   1. before_action → obey ALLOW/BLOCK
//   2. execute (simulated) → after_action
//   3. end_of_task → ComplianceReport
// and then inspects the violation log, the dashboard and the report.

use std::io;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tenet_audit::{
    AuditError, LogEntry, LogRecord, MemoryLog, ViolationFilter, ViolationLog, ViolationLogger,
};
use tenet_engine::{ComplianceEngine, Dashboard, ProjectLayout, ReportStatus, ReportStore};
use tenet_policy::{
    Action, ActionResult, Checklist, Decision, Enforcer, EnforcerResult, EvaluationContext,
    PolicyConfig, Principle, PrincipleKind,
};

/// A file-backed engine in a fresh temp dir.
fn file_engine(config: PolicyConfig) -> (TempDir, ComplianceEngine) {
    let dir = TempDir::new().unwrap();
    let log = ViolationLog::open(dir.path().join("violations.jsonl")).unwrap();
    let engine = ComplianceEngine::new(config, Box::new(log)).unwrap();
    (dir, engine)
}

fn log_entries(dir: &TempDir) -> Vec<LogEntry> {
    ViolationLog::read_all(dir.path().join("violations.jsonl")).unwrap()
}

fn escalating(principles: &[Principle], window: u64) -> PolicyConfig {
    let mut config = PolicyConfig::default();
    for spec in config
        .principles
        .iter_mut()
        .filter(|s| principles.contains(&s.principle))
    {
        spec.window_actions = Some(window);
        spec.escalate_when_overdue = true;
    }
    config
}

fn disk_full() -> AuditError {
    AuditError::WriteFailed(io::Error::new(
        io::ErrorKind::Other,
        "no space left on device",
    ))
}

/// A logger whose appends always fail.
struct FullDisk;

impl ViolationLogger for FullDisk {
    fn append(&mut self, _record: LogRecord) -> Result<LogEntry, AuditError> {
        Err(disk_full())
    }

    fn append_batch(&mut self, _records: Vec<LogRecord>) -> Result<Vec<LogEntry>, AuditError> {
        Err(disk_full())
    }

    fn entries(&self) -> Result<Vec<LogEntry>, AuditError> {
        Ok(Vec::new())
    }
}

/// A logger the test can inspect after handing it to the engine.
#[derive(Clone, Default)]
struct SharedLog(Arc<Mutex<MemoryLog>>);

impl ViolationLogger for SharedLog {
    fn append(&mut self, record: LogRecord) -> Result<LogEntry, AuditError> {
        self.0.lock().unwrap().append(record)
    }

    fn append_batch(&mut self, records: Vec<LogRecord>) -> Result<Vec<LogEntry>, AuditError> {
        self.0.lock().unwrap().append_batch(records)
    }

    fn entries(&self) -> Result<Vec<LogEntry>, AuditError> {
        self.0.lock().unwrap().entries()
    }
}

/// A logger that runs out of space after `capacity` entries. A write that
/// doesn't fit is rejected whole, the way a rolled-back file append is.
struct Quota {
    capacity: usize,
    inner: SharedLog,
}

impl Quota {
    fn new(capacity: usize, inner: SharedLog) -> Self {
        Self { capacity, inner }
    }

    fn fits(&self, n: usize) -> Result<(), AuditError> {
        if self.inner.entries()?.len() + n > self.capacity {
            return Err(disk_full());
        }
        Ok(())
    }
}

impl ViolationLogger for Quota {
    fn append(&mut self, record: LogRecord) -> Result<LogEntry, AuditError> {
        self.fits(1)?;
        self.inner.append(record)
    }

    fn append_batch(&mut self, records: Vec<LogRecord>) -> Result<Vec<LogEntry>, AuditError> {
        self.fits(records.len())?;
        self.inner.append_batch(records)
    }

    fn entries(&self) -> Result<Vec<LogEntry>, AuditError> {
        self.inner.entries()
    }
}

struct Panicky;

impl Enforcer for Panicky {
    fn principle(&self) -> Principle {
        Principle::P7
    }
    fn kind(&self) -> PrincipleKind {
        PrincipleKind::Safety
    }
    fn applies_to(&self, _action: &Action) -> bool {
        true
    }
    fn evaluate(&self, _ctx: &EvaluationContext<'_>) -> EnforcerResult {
        panic!("enforcer bug")
    }
}

#[test]
fn unconfirmed_irreversible_delete_is_blocked_and_logged_once() {
    let (dir, mut engine) = file_engine(PolicyConfig::default());

    let delete = Action::new("task-1", "delete_file")
        .with_risk_tag("irreversible")
        .with_param("path", "/data/prod.db");
    let outcome = engine.before_action(&delete);

    assert_eq!(outcome.decision, Decision::Block);
    assert_eq!(outcome.failures().count(), 1);
    assert!(outcome.reasons()[0].starts_with("P1:"));

    let log = ViolationLog::open(dir.path().join("violations.jsonl")).unwrap();
    let violations = log.query(&ViolationFilter::for_task("task-1")).unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].principle, Principle::P1);
    assert_eq!(violations[0].action_id, delete.id);
    assert!(violations[0].blocked);

    // The confirmed retry is a new action and goes through without adding
    // a violation.
    let retry = Action::new("task-1", "delete_file")
        .with_risk_tag("irreversible")
        .with_param("confirmed", true);
    assert_eq!(engine.before_action(&retry).decision, Decision::Allow);
    let after_retry = ViolationLog::open(dir.path().join("violations.jsonl"))
        .unwrap()
        .query(&ViolationFilter::for_task("task-1"))
        .unwrap();
    assert_eq!(after_retry.len(), violations.len());
    assert!(after_retry.iter().all(|v| v.action_id != retry.id));

    let report = engine.end_of_task("task-1").unwrap();
    assert_eq!(report.status, ReportStatus::Clean);
    assert_eq!(report.actions_blocked, 1);
    assert_eq!(report.actions_allowed, 1);
    assert_eq!(report.blocking_violations().count(), 1);
}

#[test]
fn cost_obligation_opens_and_is_discharged_by_report() {
    let (dir, mut engine) = file_engine(PolicyConfig::default());

    let call = Action::new("task-1", "llm_call").with_cost(2.5);
    let outcome = engine.before_action(&call);
    assert_eq!(outcome.decision, Decision::Allow);
    assert!(engine
        .state("task-1")
        .unwrap()
        .has_open_obligation(Principle::P4));

    engine.after_action(&call, &ActionResult::success().with_actual_cost(2.4));

    let report_cost = Action::new("task-1", "report_cost").with_param("amount", 2.4);
    assert_eq!(engine.before_action(&report_cost).decision, Decision::Allow);
    assert!(!engine
        .state("task-1")
        .unwrap()
        .has_open_obligation(Principle::P4));

    let view = engine.dashboard().query(Some("task-1"));
    assert!(view.task("task-1").unwrap().open_obligations.is_empty());

    let report = engine.end_of_task("task-1").unwrap();
    assert_eq!(report.status, ReportStatus::Clean);
    // The liveness failure is still on record.
    assert_eq!(report.violations.len(), 1);
    assert!(!report.violations[0].blocked);

    let obligation_events = log_entries(&dir)
        .iter()
        .filter(|e| matches!(e.record, LogRecord::Obligation(_)))
        .count();
    assert_eq!(obligation_events, 2);
}

#[test]
fn open_obligation_at_end_makes_report_incomplete() {
    let (_dir, mut engine) = file_engine(PolicyConfig::default());

    let push = Action::new("task-1", "http_post").with_risk_tag("external_write");
    assert_eq!(engine.before_action(&push).decision, Decision::Allow);
    engine.after_action(&push, &ActionResult::success());

    let report = engine.end_of_task("task-1").unwrap();
    assert_eq!(report.status, ReportStatus::Incomplete);
    assert_eq!(report.unresolved_principles(), vec![Principle::P6]);
    assert!(report.render().contains("INCOMPLETE"));

    let view = engine.dashboard().query(None);
    assert_eq!(
        view.task("task-1").unwrap().ended,
        Some(ReportStatus::Incomplete)
    );
}

#[test]
fn failing_logger_blocks_with_fault() {
    let mut engine =
        ComplianceEngine::new(PolicyConfig::default(), Box::new(FullDisk)).unwrap();

    // Nothing fails here, but the acknowledgment can't be written.
    let outcome = engine.before_action(&Action::new("task-1", "read_file"));
    assert_eq!(outcome.decision, Decision::Block);
    assert!(outcome.fault.as_deref().unwrap().contains("persistence failure"));

    let state = engine.state("task-1").unwrap();
    assert_eq!(state.persistence_failures, 1);
    assert_eq!(state.actions_blocked, 1);

    // A liveness failure that couldn't be recorded must not open an obligation.
    engine.before_action(&Action::new("task-1", "llm_call").with_cost(1.0));
    assert!(engine.state("task-1").unwrap().open_obligations.is_empty());
}

#[test]
fn check_that_does_not_fit_leaves_nothing_behind() {
    // Room for one entry: the llm_call's P4 violation would fit, its
    // obligation record and acknowledgment would not.
    let log = SharedLog::default();
    let mut engine = ComplianceEngine::new(
        PolicyConfig::default(),
        Box::new(Quota::new(1, log.clone())),
    )
    .unwrap();

    let outcome = engine.before_action(&Action::new("task-1", "llm_call").with_cost(1.0));
    assert_eq!(outcome.decision, Decision::Block);
    assert!(outcome.fault.is_some());

    assert!(log.entries().unwrap().is_empty());
    assert!(engine.state("task-1").unwrap().open_obligations.is_empty());
    assert!(engine.dashboard().query(Some("task-1")).task("task-1").is_none());
}

#[test]
fn durable_violations_never_contradict_the_decision() {
    let log = SharedLog::default();
    let mut engine = ComplianceEngine::new(
        PolicyConfig::default(),
        Box::new(Quota::new(3, log.clone())),
    )
    .unwrap();

    // Fits: violation and acknowledgment.
    let delete = Action::new("task-1", "delete_file").with_risk_tag("irreversible");
    assert!(engine.before_action(&delete).is_blocked());
    // Doesn't fit: violation, opened obligation and acknowledgment.
    let call = Action::new("task-1", "llm_call").with_cost(1.0);
    assert!(engine.before_action(&call).is_blocked());

    let violations = log.query(&ViolationFilter::all()).unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].action_id, delete.id);
    assert!(violations.iter().all(|v| v.blocked));
    assert!(log
        .checks(None)
        .unwrap()
        .iter()
        .all(|c| c.action_id != call.id));
}

#[test]
fn failed_end_of_task_keeps_state_for_retry() {
    let mut engine =
        ComplianceEngine::new(PolicyConfig::default(), Box::new(FullDisk)).unwrap();
    engine.abort_task("task-1", "operator cancelled");

    assert!(engine.end_of_task("task-1").is_err());
    assert!(engine.state("task-1").is_some());
}

#[test]
fn records_appear_in_submission_order_and_never_disappear() {
    let log = SharedLog::default();
    let mut engine = ComplianceEngine::new(PolicyConfig::default(), Box::new(log.clone())).unwrap();

    let actions = vec![
        Action::new("task-1", "delete_file").with_risk_tag("irreversible"),
        // Over the ceiling, and the cost goes unreported.
        Action::new("task-1", "llm_call").with_cost(50.0),
        Action::new("task-1", "store_secret").with_param("password", "hunter2"),
        Action::new("task-1", "deploy").with_risk_tag("high_impact"),
    ];

    let mut previous = 0;
    for action in &actions {
        engine.before_action(action);
        let count = log.entries().unwrap().len();
        assert!(count > previous);
        previous = count;
    }

    let checked: Vec<_> = log
        .checks(Some("task-1"))
        .unwrap()
        .into_iter()
        .map(|c| c.action_id)
        .collect();
    let submitted: Vec<_> = actions.iter().map(|a| a.id).collect();
    assert_eq!(checked, submitted);

    let violated: Vec<_> = log
        .query(&ViolationFilter::for_task("task-1"))
        .unwrap()
        .into_iter()
        .map(|v| (v.action_id, v.principle))
        .collect();
    assert_eq!(
        violated,
        vec![
            (actions[0].id, Principle::P1),
            (actions[1].id, Principle::P2),
            (actions[1].id, Principle::P4),
            (actions[2].id, Principle::P3),
            (actions[3].id, Principle::P7),
        ]
    );

    // Every entry links to the one before it.
    let entries = log.entries().unwrap();
    assert!(entries[0].previous_hash.is_none());
    assert!(entries[1..].iter().all(|e| e.previous_hash.is_some()));
}

#[test]
fn dashboard_is_idempotent_and_rebuildable_from_log() {
    let (dir, mut engine) = file_engine(PolicyConfig::default());

    let push = Action::new("task-1", "http_post").with_risk_tag("external_write");
    engine.before_action(&push);
    engine.after_action(&push, &ActionResult::success());
    engine.before_action(&Action::new("task-1", "delete_file").with_risk_tag("irreversible"));
    engine.before_action(&Action::new("task-2", "llm_call").with_cost(1.0));
    engine.end_of_task("task-2").unwrap();

    let live = engine.dashboard();
    let first = live.query(None);
    let second = live.query(None);
    assert_eq!(first, second);

    let rebuilt = Dashboard::from_entries(&log_entries(&dir), 50);
    assert_eq!(rebuilt.query(None), first);

    let task1 = first.task("task-1").unwrap();
    assert_eq!(task1.actions_blocked, 1);
    assert_eq!(task1.open_obligations.len(), 1);
    assert_eq!(first.recent_blocks.len(), 1);
    assert_eq!(first.recent_blocks[0].principles, vec![Principle::P1]);
}

#[test]
fn aborted_task_reports_aborted() {
    let (_dir, mut engine) = file_engine(PolicyConfig::default());

    engine.before_action(&Action::new("task-1", "llm_call").with_cost(1.0));
    engine.abort_task("task-1", "agent crashed");

    let report = engine.end_of_task("task-1").unwrap();
    assert_eq!(report.status, ReportStatus::Aborted);
    assert_eq!(report.abort_reason.as_deref(), Some("agent crashed"));
    // The open cost obligation is still listed.
    assert_eq!(report.unresolved_principles(), vec![Principle::P4]);
}

#[test]
fn escalated_verification_blocks_others_but_not_verify() {
    let (_dir, mut engine) = file_engine(escalating(&[Principle::P6], 1));

    let push = Action::new("task-1", "http_post").with_risk_tag("external_write");
    assert_eq!(engine.before_action(&push).decision, Decision::Allow);
    engine.after_action(&push, &ActionResult::success());

    // Still inside the window.
    let read = Action::new("task-1", "read_file");
    assert_eq!(engine.before_action(&read).decision, Decision::Allow);

    // Past the deadline: every unrelated action is blocked.
    for _ in 0..2 {
        let outcome = engine.before_action(&Action::new("task-1", "read_file"));
        assert_eq!(outcome.decision, Decision::Block);
        assert_eq!(outcome.failures().next().unwrap().principle, Principle::P6);
    }

    // The verification itself is the way out.
    let verify = Action::new("task-1", "verify");
    assert_eq!(engine.before_action(&verify).decision, Decision::Allow);
    engine.after_action(&verify, &ActionResult::success());
    assert!(engine.state("task-1").unwrap().open_obligations.is_empty());

    assert_eq!(
        engine.before_action(&Action::new("task-1", "read_file")).decision,
        Decision::Allow
    );
    let report = engine.end_of_task("task-1").unwrap();
    assert_eq!(report.status, ReportStatus::Clean);
    assert_eq!(report.actions_blocked, 2);
}

#[test]
fn escalated_cost_obligation_never_blocks_the_report() {
    let (_dir, mut engine) = file_engine(escalating(&[Principle::P4], 1));

    engine.before_action(&Action::new("task-1", "llm_call").with_cost(1.0));
    engine.before_action(&Action::new("task-1", "read_file"));
    assert!(engine
        .before_action(&Action::new("task-1", "read_file"))
        .is_blocked());

    let report_cost = Action::new("task-1", "report_cost");
    assert_eq!(engine.before_action(&report_cost).decision, Decision::Allow);
    assert!(engine.state("task-1").unwrap().open_obligations.is_empty());
}

#[test]
fn unescalated_overdue_obligation_is_reported_once() {
    let mut config = PolicyConfig::default();
    config.engine.default_window_actions = 1;
    let (_dir, mut engine) = file_engine(config);

    engine.before_action(&Action::new("task-1", "llm_call").with_cost(1.0));
    engine.before_action(&Action::new("task-1", "read_file"));

    let overdue = engine.before_action(&Action::new("task-1", "read_file"));
    assert_eq!(overdue.decision, Decision::Allow);
    assert!(overdue.failures().next().unwrap().is_unresolved_obligation());

    let later = engine.before_action(&Action::new("task-1", "read_file"));
    assert_eq!(later.failures().count(), 0);
}

#[test]
fn panicking_enforcer_becomes_config_error_block() {
    let mut checklist = Checklist::new(true);
    checklist.register(Box::new(Panicky)).unwrap();
    let log = SharedLog::default();
    let mut engine =
        ComplianceEngine::with_checklist(PolicyConfig::default(), checklist, Box::new(log.clone()));

    let outcome = engine.before_action(&Action::new("task-1", "deploy"));
    assert_eq!(outcome.decision, Decision::Block);
    let failure = outcome.failures().next().unwrap();
    assert!(failure.is_config_error());

    let violations = log.query(&ViolationFilter::all()).unwrap();
    assert_eq!(violations.len(), 1);
    assert!(violations[0].is_config_error());
    assert_eq!(engine.state("task-1").unwrap().config_errors, 1);
}

#[test]
fn undeclared_cost_is_caught_after_execution() {
    let (_dir, mut engine) = file_engine(PolicyConfig::default());

    let read = Action::new("task-1", "read_file");
    assert_eq!(engine.before_action(&read).decision, Decision::Allow);
    let outcome = engine.after_action(&read, &ActionResult::success().with_actual_cost(9.0));

    assert_eq!(outcome.decision, Decision::Allow);
    let failure = outcome.failures().next().unwrap();
    assert_eq!(failure.principle, Principle::P5);

    let report = engine.end_of_task("task-1").unwrap();
    assert_eq!(report.violations.len(), 1);
    assert_eq!(report.violations[0].principle, Principle::P5);
    assert!(!report.violations[0].blocked);
}

#[test]
fn unreported_cost_past_its_window_leaves_task_incomplete() {
    let mut config = PolicyConfig::default();
    config.engine.default_window_actions = 5;
    let (_dir, mut engine) = file_engine(config);

    // Action #1 opens the obligation, due by action #6.
    engine.before_action(&Action::new("task-1", "llm_call").with_cost(1.0));
    for _ in 0..6 {
        let outcome = engine.before_action(&Action::new("task-1", "read_file"));
        assert_eq!(outcome.decision, Decision::Allow);
    }

    let report = engine.end_of_task("task-1").unwrap();
    assert_eq!(report.status, ReportStatus::Incomplete);
    assert_eq!(report.unresolved_principles(), vec![Principle::P4]);
    assert_eq!(report.actions_checked, 7);
    assert!(report
        .violations
        .iter()
        .any(|v| v.principle == Principle::P4 && v.is_unresolved_obligation()));
}

#[test]
fn reused_task_id_reports_only_the_current_run() {
    let (_dir, mut engine) = file_engine(PolicyConfig::default());

    engine.before_action(&Action::new("task-1", "delete_file").with_risk_tag("irreversible"));
    let first = engine.end_of_task("task-1").unwrap();
    assert_eq!(first.violations.len(), 1);

    engine.before_action(&Action::new("task-1", "read_file"));
    let second = engine.end_of_task("task-1").unwrap();
    assert!(second.violations.is_empty());
    assert_eq!(second.actions_checked, 1);
}

#[test]
fn open_project_persists_reports_and_replays_history() {
    let project = TempDir::new().unwrap();
    let layout = ProjectLayout::for_project(project.path());

    {
        let mut engine = ComplianceEngine::open_project(&layout).unwrap();
        engine.before_action(&Action::new("task-1", "delete_file").with_risk_tag("irreversible"));
        engine.end_of_task("task-1").unwrap();
    }

    assert_eq!(ViolationLog::verify_chain(&layout.violation_log).unwrap(), 3);

    let store = ReportStore::new(&layout.reports_dir).unwrap();
    let saved = store.get("task-1").unwrap().unwrap();
    assert_eq!(saved.status, ReportStatus::Clean);
    assert_eq!(saved.actions_blocked, 1);

    // A restarted engine sees the earlier task on its dashboard.
    let engine = ComplianceEngine::open_project(&layout).unwrap();
    let view = engine.dashboard().query(None);
    let task = view.task("task-1").unwrap();
    assert_eq!(task.actions_blocked, 1);
    assert_eq!(task.ended, Some(ReportStatus::Clean));
}
