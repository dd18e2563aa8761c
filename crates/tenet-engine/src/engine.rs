// engine.rs — ComplianceEngine: the interception point of the agent loop.
//
// before_action  → run pre-stage enforcers, sweep overdue obligations,
//                  decide ALLOW/BLOCK, persist, then update task state.
// after_action   → run post-stage enforcers against the execution result.
//                  Never blocks: the action already ran.
// end_of_task    → build the ComplianceReport and retire the task's state.
//
// Records for one check are appended as a single batch in a fixed order:
// violations, then obligation changes, then the CheckRecord acknowledging
// the check. An ALLOW is only returned once the batch is durable. If it
// fails, none of its records are kept, the action is blocked, and the
// obligation changes are not applied.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use tenet_audit::{
    AuditError, CheckRecord, LogRecord, ObligationRecord, TaskEndRecord, ViolationFilter,
    ViolationLog, ViolationLogger, ViolationRecord,
};
use tenet_policy::{
    decide, Action, ActionResult, CheckOutcome, Checklist, ComplianceState, Deadline, Decision,
    EnforcerResult, EvaluationContext, Obligation, PolicyConfig, Principle, PrincipleKind,
    Severity, Stage,
};

use crate::dashboard::Dashboard;
use crate::error::EngineError;
use crate::layout::ProjectLayout;
use crate::registry::TaskRegistry;
use crate::report::{ComplianceReport, ReportStore};

/// The compliance engine. Single writer: every mutating call takes `&mut self`.
/// Wrap it in [`SharedEngine`](crate::SharedEngine) to share it across threads.
pub struct ComplianceEngine {
    config: PolicyConfig,
    checklist: Checklist,
    log: Box<dyn ViolationLogger>,
    tasks: TaskRegistry,
    dashboard: Dashboard,
    reports: Option<ReportStore>,
    /// First durable log entry of each live task run.
    run_starts: HashMap<String, Uuid>,
}

impl ComplianceEngine {
    /// Build an engine with the built-in enforcers for `config`.
    pub fn new(config: PolicyConfig, log: Box<dyn ViolationLogger>) -> Result<Self, EngineError> {
        let checklist = Checklist::from_config(&config)?;
        Ok(Self::with_checklist(config, checklist, log))
    }

    /// Build an engine around an explicitly assembled checklist.
    ///
    /// `config` still supplies obligation windows, escalation and the
    /// dashboard size.
    pub fn with_checklist(
        config: PolicyConfig,
        checklist: Checklist,
        log: Box<dyn ViolationLogger>,
    ) -> Self {
        let dashboard = Dashboard::new(config.engine.recent_blocks);
        Self {
            config,
            checklist,
            log,
            tasks: TaskRegistry::new(),
            dashboard,
            reports: None,
            run_starts: HashMap::new(),
        }
    }

    /// Persist every report produced by `end_of_task` to `store`.
    pub fn with_report_store(mut self, store: ReportStore) -> Self {
        self.reports = Some(store);
        self
    }

    /// Open the engine for a project directory.
    ///
    /// Loads `.tenet/policy.yaml` (defaults if absent), opens the violation
    /// log, and replays the log into the dashboard.
    pub fn open_project(layout: &ProjectLayout) -> Result<Self, EngineError> {
        let config = PolicyConfig::load_or_default(&layout.policy_file)?;
        let log = ViolationLog::open(&layout.violation_log)?;
        let history = log.entries()?;
        let store = ReportStore::new(&layout.reports_dir)?;

        let engine = Self::new(config, Box::new(log))?.with_report_store(store);
        for entry in &history {
            engine.dashboard.apply(entry);
        }
        tracing::info!(
            root = %layout.root.display(),
            principles = ?engine.checklist.principles(),
            replayed = history.len(),
            "compliance engine opened"
        );
        Ok(engine)
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn checklist(&self) -> &Checklist {
        &self.checklist
    }

    /// A handle to the live dashboard.
    pub fn dashboard(&self) -> Dashboard {
        self.dashboard.clone()
    }

    pub fn state(&self, task_id: &str) -> Option<&ComplianceState> {
        self.tasks.get(task_id)
    }

    pub fn active_tasks(&self) -> Vec<&str> {
        self.tasks.task_ids()
    }

    /// Check an action before it executes. BLOCK means it must not run.
    pub fn before_action(&mut self, action: &Action) -> CheckOutcome {
        let now = Utc::now();
        let state = self.tasks.get_or_create(&action.task_id);

        if state.decision_for(action.id) == Some(Decision::Block) {
            tracing::warn!(
                task_id = %action.task_id,
                action_id = %action.id,
                "action id was blocked before; a retry should be submitted as a new action"
            );
        }
        if let Some(reason) = &state.aborted {
            tracing::warn!(
                task_id = %action.task_id,
                %reason,
                "action submitted to an aborted task"
            );
        }

        let seq = state.next_seq();
        let ctx = EvaluationContext::pre(action, state);
        let mut outcome = self.checklist.run(Stage::PreAction, &ctx);
        let discharged = self.checklist.discharged(Stage::PreAction, &ctx);
        let exempt = self.checklist.prospective_discharges(&ctx);

        let overdue = overdue_results(&self.config, state, &exempt, seq, now);
        outcome.results.extend(overdue.iter().cloned());
        outcome.decision = decide(&outcome.results, self.checklist.fail_closed());

        let changes = if outcome.is_blocked() {
            ObligationChanges::default()
        } else {
            plan_obligations(&self.config, state, action, &outcome, &discharged, seq, now)
        };

        let records = check_records(action, &outcome, &changes, seq, outcome.is_blocked());
        let persisted = persist(
            self.log.as_mut(),
            &self.dashboard,
            &mut self.run_starts,
            records,
        );
        match persisted {
            Ok(()) => {
                changes.apply(state);
                for result in &overdue {
                    state.mark_overdue_reported(result.principle);
                }
            }
            Err(e) => {
                state.persistence_failures += 1;
                outcome.decision = Decision::Block;
                outcome.fault = Some(format!("persistence failure: {}", e));
                tracing::error!(
                    task_id = %action.task_id,
                    action_id = %action.id,
                    error = %e,
                    "violation log append failed; blocking action"
                );
            }
        }

        tally(state, action, &outcome);
        state.record_decision(action.id, outcome.decision);

        if outcome.is_blocked() {
            tracing::info!(
                task_id = %action.task_id,
                action_id = %action.id,
                kind = %action.kind,
                seq,
                reasons = ?outcome.reasons(),
                "action blocked"
            );
        }
        outcome
    }

    /// Check an action after it executed. Always ALLOW; failures are logged
    /// with `blocked = false`.
    pub fn after_action(&mut self, action: &Action, result: &ActionResult) -> CheckOutcome {
        let now = Utc::now();
        let state = self.tasks.get_or_create(&action.task_id);

        match state.decision_for(action.id) {
            Some(Decision::Allow) => {}
            Some(Decision::Block) => tracing::error!(
                task_id = %action.task_id,
                action_id = %action.id,
                kind = %action.kind,
                "a blocked action was executed"
            ),
            None => tracing::warn!(
                task_id = %action.task_id,
                action_id = %action.id,
                "after_action for an action that never went through before_action"
            ),
        }

        state.post_checks += 1;
        let seq = state.actions_seen;
        let ctx = EvaluationContext::post(action, state, result);
        let mut outcome = self.checklist.run(Stage::PostAction, &ctx);
        let discharged = self.checklist.discharged(Stage::PostAction, &ctx);
        outcome.decision = Decision::Allow;

        let changes = plan_obligations(&self.config, state, action, &outcome, &discharged, seq, now);
        let records = check_records(action, &outcome, &changes, seq, false);
        let persisted = persist(
            self.log.as_mut(),
            &self.dashboard,
            &mut self.run_starts,
            records,
        );
        if let Err(e) = persisted {
            state.persistence_failures += 1;
            outcome.fault = Some(format!("persistence failure: {}", e));
            tracing::error!(
                task_id = %action.task_id,
                action_id = %action.id,
                error = %e,
                "violation log append failed after execution"
            );
        }
        // The action already ran, so its obligations exist whether or not
        // the log write succeeded.
        changes.apply(state);
        tally(state, action, &outcome);
        outcome
    }

    /// Mark a task aborted. Its report will have status ABORTED.
    pub fn abort_task(&mut self, task_id: &str, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(task_id, %reason, "task aborted");
        self.tasks.get_or_create(task_id).abort(reason);
    }

    /// Finish a task: build its report, persist it, and retire the state.
    ///
    /// If any step fails the state is kept so the call can be retried.
    pub fn end_of_task(&mut self, task_id: &str) -> Result<ComplianceReport, EngineError> {
        let state = self
            .tasks
            .get(task_id)
            .ok_or_else(|| EngineError::UnknownTask(task_id.to_string()))?;

        // A task id can be reused; only this run's records belong in the report.
        let violations = match self.run_starts.get(task_id) {
            Some(first) => self
                .log
                .query_from(*first, &ViolationFilter::for_task(task_id))?,
            None => Vec::new(),
        };
        let report = ComplianceReport::from_state(state, violations);

        if let Some(store) = &self.reports {
            let path = store.save(&report)?;
            tracing::debug!(task_id, path = %path.display(), "report saved");
        }

        let end = TaskEndRecord {
            task_id: task_id.to_string(),
            status: report.status,
            unresolved: report.unresolved_principles(),
            violations: report.violations.len() as u64,
            timestamp: report.generated_at,
        };
        let entry = self.log.append(end.into())?;
        self.dashboard.apply(&entry);

        self.tasks.remove(task_id);
        self.run_starts.remove(task_id);
        tracing::info!(
            task_id,
            status = %report.status,
            violations = report.violations.len(),
            unresolved = ?report.unresolved_principles(),
            "task ended"
        );
        Ok(report)
    }
}

/// Obligations to open and discharge once a check's records are durable.
#[derive(Debug, Default)]
struct ObligationChanges {
    discharged: Vec<Obligation>,
    opened: Vec<Obligation>,
}

impl ObligationChanges {
    fn records(&self, task_id: &str, action_id: Uuid) -> Vec<LogRecord> {
        let discharged = self
            .discharged
            .iter()
            .map(|o| LogRecord::from(ObligationRecord::discharged(task_id, action_id, o)));
        let opened = self
            .opened
            .iter()
            .map(|o| LogRecord::from(ObligationRecord::opened(task_id, o)));
        discharged.chain(opened).collect()
    }

    fn apply(self, state: &mut ComplianceState) {
        for obligation in self.discharged {
            state.discharge(obligation.principle);
            tracing::info!(
                task_id = %state.task_id,
                principle = %obligation.principle,
                "obligation discharged"
            );
        }
        for obligation in self.opened {
            let (principle, due) = (obligation.principle, obligation.deadline.action_seq);
            if state.open(obligation) {
                tracing::info!(
                    task_id = %state.task_id,
                    %principle,
                    due_by_action = due,
                    "obligation opened"
                );
            }
        }
    }
}

/// A failed bounded-liveness result that isn't a config error or an overdue
/// report starts a new obligation.
fn opens_obligation(result: &EnforcerResult) -> bool {
    !result.passed
        && result.kind == PrincipleKind::BoundedLiveness
        && !result.is_config_error()
        && !result.is_unresolved_obligation()
}

fn plan_obligations(
    config: &PolicyConfig,
    state: &ComplianceState,
    action: &Action,
    outcome: &CheckOutcome,
    discharged: &[Principle],
    seq: u64,
    now: DateTime<Utc>,
) -> ObligationChanges {
    let mut changes = ObligationChanges::default();

    for principle in discharged {
        if let Some(open) = state.open_obligation(*principle) {
            changes.discharged.push(open.clone());
        }
    }

    for result in outcome.results.iter().filter(|r| opens_obligation(r)) {
        let principle = result.principle;
        let still_open = state.has_open_obligation(principle) && !discharged.contains(&principle);
        if still_open || changes.opened.iter().any(|o| o.principle == principle) {
            continue;
        }
        let spec = config.spec_for(principle);
        let window = spec.map_or(config.engine.default_window_actions, |s| {
            s.window_actions(&config.engine)
        });
        let window_secs = spec.and_then(|s| s.window_secs);
        changes.opened.push(Obligation {
            principle,
            opened_by: action.id,
            opened_at_seq: seq,
            opened_at: now,
            deadline: Deadline::after(seq, window, window_secs, now),
            reason: result.reason.clone(),
            overdue_reported: false,
        });
    }
    changes
}

/// Failed `unresolved-obligation` results for overdue obligations.
///
/// Reported once per obligation, or on every action while overdue when the
/// principle escalates (then the result is safety-kind and blocks).
/// Obligations the action is about to discharge are skipped.
fn overdue_results(
    config: &PolicyConfig,
    state: &ComplianceState,
    exempt: &[Principle],
    seq: u64,
    now: DateTime<Utc>,
) -> Vec<EnforcerResult> {
    state
        .overdue(seq, now)
        .into_iter()
        .filter(|o| !exempt.contains(&o.principle))
        .filter_map(|o| {
            let escalate = config
                .spec_for(o.principle)
                .is_some_and(|s| s.escalate_when_overdue);
            if o.overdue_reported && !escalate {
                return None;
            }
            tracing::warn!(
                task_id = %state.task_id,
                principle = %o.principle,
                opened_at = o.opened_at_seq,
                due_by = o.deadline.action_seq,
                seq,
                escalate,
                "obligation overdue"
            );
            let kind = if escalate {
                PrincipleKind::Safety
            } else {
                PrincipleKind::BoundedLiveness
            };
            Some(EnforcerResult::fail(
                o.principle,
                kind,
                Stage::PreAction,
                Severity::UnresolvedObligation,
                format!(
                    "obligation opened at action #{} is overdue (deadline was action #{}): {}",
                    o.opened_at_seq, o.deadline.action_seq, o.reason
                ),
            ))
        })
        .collect()
}

fn check_records(
    action: &Action,
    outcome: &CheckOutcome,
    changes: &ObligationChanges,
    seq: u64,
    blocked: bool,
) -> Vec<LogRecord> {
    let mut records: Vec<LogRecord> = outcome
        .failures()
        .map(|r| LogRecord::from(ViolationRecord::from_result(action, r, blocked)))
        .collect();
    records.extend(changes.records(&action.task_id, action.id));
    records.push(CheckRecord::from_outcome(action, outcome, seq).into());
    records
}

/// Append one check's records as a batch. The dashboard and run starts only
/// see them once the whole batch is durable.
fn persist(
    log: &mut dyn ViolationLogger,
    dashboard: &Dashboard,
    run_starts: &mut HashMap<String, Uuid>,
    records: Vec<LogRecord>,
) -> Result<(), AuditError> {
    let entries = log.append_batch(records)?;
    for entry in &entries {
        run_starts
            .entry(entry.record.task_id().to_string())
            .or_insert(entry.entry_id);
        dashboard.apply(entry);
    }
    Ok(())
}

fn tally(state: &mut ComplianceState, action: &Action, outcome: &CheckOutcome) {
    for result in &outcome.results {
        tracing::debug!(
            task_id = %action.task_id,
            action_id = %action.id,
            principle = %result.principle,
            stage = %result.stage,
            passed = result.passed,
            reason = %result.reason,
            "enforcer result"
        );
        if result.is_config_error() {
            tracing::warn!(
                task_id = %action.task_id,
                principle = %result.principle,
                reason = %result.reason,
                "enforcer could not evaluate"
            );
        }
        state.record_result(action.id, result);
    }
}
