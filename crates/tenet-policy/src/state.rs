// state.rs — Per-task compliance state.
//
// The engine owns one ComplianceState per task and is its only mutator.
// Enforcers receive it by shared reference, so everything here is either
// a plain read accessor or a mutation the engine calls while applying a
// CheckOutcome.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checklist::Decision;
use crate::enforcer::EnforcerResult;
use crate::principle::Principle;

/// Pass/fail counters for one principle within a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PrincipleStatus {
    pub pass_count: u64,
    pub fail_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_violation: Option<LastViolation>,
}

/// The most recent failure for a principle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LastViolation {
    pub action_id: Uuid,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// When an open obligation becomes overdue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Deadline {
    /// Overdue once the task's action sequence exceeds this number.
    pub action_seq: u64,
    /// Overdue once the wall clock passes this instant, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<Utc>>,
}

impl Deadline {
    /// A deadline `window_actions` actions after `opened_at_seq`, optionally
    /// also bounded by `window_secs` from `now`.
    pub fn after(
        opened_at_seq: u64,
        window_actions: u64,
        window_secs: Option<u64>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            action_seq: opened_at_seq.saturating_add(window_actions),
            at: window_secs.map(|secs| now + Duration::seconds(secs as i64)),
        }
    }

    pub fn has_passed(&self, seq: u64, now: DateTime<Utc>) -> bool {
        seq > self.action_seq || self.at.is_some_and(|at| now > at)
    }
}

/// An open bounded-liveness obligation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Obligation {
    pub principle: Principle,
    /// The action whose check opened the obligation.
    pub opened_by: Uuid,
    pub opened_at_seq: u64,
    pub opened_at: DateTime<Utc>,
    pub deadline: Deadline,
    /// The enforcer's reason at the time it opened.
    pub reason: String,
    /// Set once the overdue state has been recorded.
    #[serde(default)]
    pub overdue_reported: bool,
}

/// Mutable compliance aggregate for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceState {
    pub task_id: String,
    pub started_at: DateTime<Utc>,
    /// Number of actions submitted to `before_action`; also the sequence
    /// number of the latest one.
    pub actions_seen: u64,
    pub actions_allowed: u64,
    pub actions_blocked: u64,
    /// Number of `after_action` checks.
    pub post_checks: u64,
    pub config_errors: u64,
    pub persistence_failures: u64,
    pub principle_status: BTreeMap<Principle, PrincipleStatus>,
    /// At most one open obligation per principle.
    pub open_obligations: BTreeMap<Principle, Obligation>,
    /// Set when the task was aborted, with the reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    /// Latest pre-action decision per action id.
    #[serde(skip)]
    decisions: HashMap<Uuid, Decision>,
}

impl ComplianceState {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            started_at: Utc::now(),
            actions_seen: 0,
            actions_allowed: 0,
            actions_blocked: 0,
            post_checks: 0,
            config_errors: 0,
            persistence_failures: 0,
            principle_status: BTreeMap::new(),
            open_obligations: BTreeMap::new(),
            aborted: None,
            decisions: HashMap::new(),
        }
    }

    pub fn has_open_obligation(&self, principle: Principle) -> bool {
        self.open_obligations.contains_key(&principle)
    }

    pub fn open_obligation(&self, principle: Principle) -> Option<&Obligation> {
        self.open_obligations.get(&principle)
    }

    pub fn status(&self, principle: Principle) -> Option<&PrincipleStatus> {
        self.principle_status.get(&principle)
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    /// The pre-action decision last recorded for an action id.
    pub fn decision_for(&self, action_id: Uuid) -> Option<Decision> {
        self.decisions.get(&action_id).copied()
    }

    /// Advance the action sequence and return the new sequence number.
    pub fn next_seq(&mut self) -> u64 {
        self.actions_seen += 1;
        self.actions_seen
    }

    /// Fold one enforcer result into the per-principle counters.
    pub fn record_result(&mut self, action_id: Uuid, result: &EnforcerResult) {
        let status = self.principle_status.entry(result.principle).or_default();
        if result.passed {
            status.pass_count += 1;
        } else {
            status.fail_count += 1;
            status.last_violation = Some(LastViolation {
                action_id,
                reason: result.reason.clone(),
                at: Utc::now(),
            });
            if result.is_config_error() {
                self.config_errors += 1;
            }
        }
    }

    /// Record the pre-action decision for an action.
    pub fn record_decision(&mut self, action_id: Uuid, decision: Decision) {
        match decision {
            Decision::Allow => self.actions_allowed += 1,
            Decision::Block => self.actions_blocked += 1,
        }
        self.decisions.insert(action_id, decision);
    }

    /// Open an obligation. Returns false (and changes nothing) when one is
    /// already open for the principle.
    pub fn open(&mut self, obligation: Obligation) -> bool {
        if self.open_obligations.contains_key(&obligation.principle) {
            return false;
        }
        self.open_obligations.insert(obligation.principle, obligation);
        true
    }

    /// Close the open obligation for a principle, returning it.
    pub fn discharge(&mut self, principle: Principle) -> Option<Obligation> {
        self.open_obligations.remove(&principle)
    }

    pub fn mark_overdue_reported(&mut self, principle: Principle) {
        if let Some(obligation) = self.open_obligations.get_mut(&principle) {
            obligation.overdue_reported = true;
        }
    }

    /// Open obligations whose deadline has passed at `seq` / `now`.
    pub fn overdue(&self, seq: u64, now: DateTime<Utc>) -> Vec<&Obligation> {
        self.open_obligations
            .values()
            .filter(|o| o.deadline.has_passed(seq, now))
            .collect()
    }

    pub fn abort(&mut self, reason: impl Into<String>) {
        self.aborted = Some(reason.into());
    }
}
