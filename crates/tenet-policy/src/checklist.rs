// checklist.rs — Ordered set of enforcers and the ALLOW/BLOCK decision.
//
// The Checklist holds at most one enforcer per principle, in registration
// order. Running a stage evaluates every applicable enforcer (no
// short-circuit) so that every violation of an action gets recorded, then
// folds the results into a single Decision.
//
// Enforcer panics are caught and converted into config-error results: one
// broken enforcer must never take the agent loop down with it.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::builtin::builtin;
use crate::config::PolicyConfig;
use crate::enforcer::{Enforcer, EnforcerResult, EvaluationContext};
use crate::error::PolicyError;
use crate::principle::{Principle, Severity, Stage};

/// The engine's verdict for a proposed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Block,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => write!(f, "ALLOW"),
            Decision::Block => write!(f, "BLOCK"),
        }
    }
}

/// Fold a set of results into a decision.
///
/// BLOCK iff any result is a failed safety check, or (when failing closed)
/// any result is a config error. Bounded-liveness failures never block.
pub fn decide(results: &[EnforcerResult], fail_closed: bool) -> Decision {
    if results.iter().any(|r| r.is_blocking(fail_closed)) {
        Decision::Block
    } else {
        Decision::Allow
    }
}

/// Results of running one stage of the checklist against one action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckOutcome {
    pub action_id: Uuid,
    pub stage: Stage,
    /// One result per applicable enforcer, in registration order.
    pub results: Vec<EnforcerResult>,
    pub decision: Decision,
    /// Set when the decision was forced by an infrastructure failure
    /// (e.g. the violation log could not be written).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

impl CheckOutcome {
    pub fn is_blocked(&self) -> bool {
        self.decision == Decision::Block
    }

    pub fn failures(&self) -> impl Iterator<Item = &EnforcerResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    /// Reasons of every failed result, plus the fault if any.
    pub fn reasons(&self) -> Vec<String> {
        let mut reasons: Vec<String> = self
            .failures()
            .map(|r| format!("{}: {}", r.principle, r.reason))
            .collect();
        if let Some(fault) = &self.fault {
            reasons.push(fault.clone());
        }
        reasons
    }

    /// The highest severity among failures; disagreeing enforcers resolve to
    /// the worst one.
    pub fn worst_severity(&self) -> Option<Severity> {
        self.failures().map(|r| r.severity).max()
    }
}

/// The ordered enforcer set for a policy.
pub struct Checklist {
    enforcers: Vec<Box<dyn Enforcer>>,
    fail_closed: bool,
}

impl fmt::Debug for Checklist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checklist")
            .field("principles", &self.principles())
            .field("fail_closed", &self.fail_closed)
            .finish()
    }
}

impl Checklist {
    /// An empty checklist. Every action is allowed until enforcers are registered.
    pub fn new(fail_closed: bool) -> Self {
        Self {
            enforcers: Vec::new(),
            fail_closed,
        }
    }

    /// Build the built-in enforcers for every enabled principle in the config.
    pub fn from_config(config: &PolicyConfig) -> Result<Self, PolicyError> {
        config.validate()?;
        let mut checklist = Self::new(config.engine.fail_closed);
        for spec in config.enabled() {
            checklist.register(builtin(spec, config)?)?;
        }
        tracing::debug!(
            principles = ?checklist.principles(),
            fail_closed = checklist.fail_closed,
            "checklist built"
        );
        Ok(checklist)
    }

    /// Add an enforcer at the end of the order.
    pub fn register(&mut self, enforcer: Box<dyn Enforcer>) -> Result<(), PolicyError> {
        let principle = enforcer.principle();
        if self.enforcers.iter().any(|e| e.principle() == principle) {
            return Err(PolicyError::DuplicateEnforcer(principle));
        }
        self.enforcers.push(enforcer);
        Ok(())
    }

    pub fn fail_closed(&self) -> bool {
        self.fail_closed
    }

    /// Registered principles in order.
    pub fn principles(&self) -> Vec<Principle> {
        self.enforcers.iter().map(|e| e.principle()).collect()
    }

    pub fn enforcer(&self, principle: Principle) -> Option<&dyn Enforcer> {
        self.enforcers
            .iter()
            .find(|e| e.principle() == principle)
            .map(|e| e.as_ref())
    }

    pub fn len(&self) -> usize {
        self.enforcers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enforcers.is_empty()
    }

    /// Evaluate every applicable enforcer of `stage`.
    ///
    /// With zero applicable enforcers the outcome is ALLOW with no results.
    pub fn run(&self, stage: Stage, ctx: &EvaluationContext<'_>) -> CheckOutcome {
        let results: Vec<EnforcerResult> = self
            .staged(stage)
            .filter(|e| guarded_applies(*e, stage, ctx).unwrap_or(true))
            .map(|e| guarded_evaluate(e, stage, ctx))
            .collect();
        let decision = decide(&results, self.fail_closed);
        CheckOutcome {
            action_id: ctx.action.id,
            stage,
            results,
            decision,
            fault: None,
        }
    }

    /// Principles whose open obligation this action satisfies at `stage`.
    pub fn discharged(&self, stage: Stage, ctx: &EvaluationContext<'_>) -> Vec<Principle> {
        self.staged(stage)
            .filter(|e| ctx.state.has_open_obligation(e.principle()))
            .filter(|e| {
                catch_unwind(AssertUnwindSafe(|| e.discharges(ctx))).unwrap_or_else(|_| {
                    tracing::warn!(
                        principle = %e.principle(),
                        "enforcer panicked in discharges()"
                    );
                    false
                })
            })
            .map(|e| e.principle())
            .collect()
    }

    /// Principles whose open obligation this action would discharge at any
    /// stage, assuming it executes successfully. Used before execution so an
    /// action that is about to discharge an overdue obligation is not
    /// flagged for it.
    pub fn prospective_discharges(&self, ctx: &EvaluationContext<'_>) -> Vec<Principle> {
        let pre = EvaluationContext::pre(ctx.action, ctx.state);
        [Stage::PreAction, Stage::PostAction]
            .into_iter()
            .flat_map(|stage| self.discharged(stage, &pre))
            .collect()
    }

    fn staged(&self, stage: Stage) -> impl Iterator<Item = &dyn Enforcer> {
        self.enforcers
            .iter()
            .map(|e| e.as_ref() as &dyn Enforcer)
            .filter(move |e| e.stage() == stage)
    }
}

/// `applies_to`, with a panic reported as `None`. A panicking applicability
/// check is treated as applicable so that the panic surfaces as a result.
fn guarded_applies(
    enforcer: &dyn Enforcer,
    stage: Stage,
    ctx: &EvaluationContext<'_>,
) -> Option<bool> {
    match catch_unwind(AssertUnwindSafe(|| enforcer.applies_to(ctx.action))) {
        Ok(applies) => Some(applies),
        Err(_) => {
            tracing::warn!(
                principle = %enforcer.principle(),
                %stage,
                "enforcer panicked in applies_to()"
            );
            None
        }
    }
}

fn guarded_evaluate(
    enforcer: &dyn Enforcer,
    stage: Stage,
    ctx: &EvaluationContext<'_>,
) -> EnforcerResult {
    match catch_unwind(AssertUnwindSafe(|| enforcer.evaluate(ctx))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(
                principle = %enforcer.principle(),
                action_id = %ctx.action.id,
                %message,
                "enforcer panicked; recording config error"
            );
            EnforcerResult::config_error(
                enforcer.principle(),
                enforcer.kind(),
                stage,
                format!("enforcer panicked: {}", message),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::principle::PrincipleKind;
    use crate::state::ComplianceState;

    /// Test enforcer with a fixed verdict.
    struct Fixed {
        principle: Principle,
        kind: PrincipleKind,
        passed: bool,
        applies: bool,
    }

    impl Enforcer for Fixed {
        fn principle(&self) -> Principle {
            self.principle
        }
        fn kind(&self) -> PrincipleKind {
            self.kind
        }
        fn stage(&self) -> Stage {
            Stage::PreAction
        }
        fn applies_to(&self, _action: &Action) -> bool {
            self.applies
        }
        fn evaluate(&self, _ctx: &EvaluationContext<'_>) -> EnforcerResult {
            if self.passed {
                EnforcerResult::pass(self.principle, self.kind, Stage::PreAction, "ok")
            } else {
                EnforcerResult::fail(
                    self.principle,
                    self.kind,
                    Stage::PreAction,
                    Severity::High,
                    "nope",
                )
            }
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
        fn stage(&self) -> Stage {
            Stage::PreAction
        }
        fn applies_to(&self, _action: &Action) -> bool {
            true
        }
        fn evaluate(&self, _ctx: &EvaluationContext<'_>) -> EnforcerResult {
            panic!("boom")
        }
    }

    fn fixed(principle: Principle, kind: PrincipleKind, passed: bool) -> Box<dyn Enforcer> {
        Box::new(Fixed {
            principle,
            kind,
            passed,
            applies: true,
        })
    }

    fn run(checklist: &Checklist, action: &Action) -> CheckOutcome {
        let state = ComplianceState::new(action.task_id.clone());
        checklist.run(Stage::PreAction, &EvaluationContext::pre(action, &state))
    }

    #[test]
    fn no_applicable_enforcers_allows_with_no_results() {
        let mut checklist = Checklist::new(true);
        checklist
            .register(Box::new(Fixed {
                principle: Principle::P1,
                kind: PrincipleKind::Safety,
                passed: false,
                applies: false,
            }))
            .unwrap();
        let outcome = run(&checklist, &Action::new("t", "read_file"));
        assert_eq!(outcome.decision, Decision::Allow);
        assert!(outcome.results.is_empty());
    }

    #[test]
    fn all_results_kept_in_registration_order() {
        let mut checklist = Checklist::new(true);
        checklist.register(fixed(Principle::P7, PrincipleKind::Safety, false)).unwrap();
        checklist.register(fixed(Principle::P2, PrincipleKind::Safety, true)).unwrap();
        checklist.register(fixed(Principle::P1, PrincipleKind::Safety, false)).unwrap();

        let outcome = run(&checklist, &Action::new("t", "x"));
        let order: Vec<Principle> = outcome.results.iter().map(|r| r.principle).collect();
        assert_eq!(order, vec![Principle::P7, Principle::P2, Principle::P1]);
        assert_eq!(outcome.failures().count(), 2);
        assert!(outcome.is_blocked());
    }

    #[test]
    fn liveness_failure_alone_allows() {
        let mut checklist = Checklist::new(true);
        checklist
            .register(fixed(Principle::P4, PrincipleKind::BoundedLiveness, false))
            .unwrap();
        let outcome = run(&checklist, &Action::new("t", "llm_call"));
        assert_eq!(outcome.decision, Decision::Allow);
        assert_eq!(outcome.results.len(), 1);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut checklist = Checklist::new(true);
        checklist.register(fixed(Principle::P1, PrincipleKind::Safety, true)).unwrap();
        let err = checklist
            .register(fixed(Principle::P1, PrincipleKind::Safety, true))
            .unwrap_err();
        assert!(matches!(err, PolicyError::DuplicateEnforcer(Principle::P1)));
    }

    #[test]
    fn panicking_enforcer_becomes_config_error() {
        let mut checklist = Checklist::new(true);
        checklist.register(Box::new(Panicky)).unwrap();
        checklist.register(fixed(Principle::P2, PrincipleKind::Safety, true)).unwrap();

        let outcome = run(&checklist, &Action::new("t", "deploy"));
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results[0].is_config_error());
        assert!(outcome.results[0].reason.contains("boom"));
        assert!(outcome.results[1].passed);
        assert!(outcome.is_blocked());
    }

    #[test]
    fn config_error_allows_when_failing_open() {
        let mut checklist = Checklist::new(false);
        checklist.register(Box::new(Panicky)).unwrap();
        let outcome = run(&checklist, &Action::new("t", "deploy"));
        assert!(outcome.results[0].is_config_error());
        // Panicky is a safety enforcer, so its failure still blocks.
        assert!(outcome.is_blocked());

        let liveness = EnforcerResult::config_error(
            Principle::P4,
            PrincipleKind::BoundedLiveness,
            Stage::PreAction,
            "bad",
        );
        assert_eq!(decide(&[liveness.clone()], false), Decision::Allow);
        assert_eq!(decide(&[liveness], true), Decision::Block);
    }

    #[test]
    fn worst_severity_picks_the_maximum() {
        let mut checklist = Checklist::new(true);
        checklist.register(fixed(Principle::P2, PrincipleKind::Safety, false)).unwrap();
        let outcome = run(&checklist, &Action::new("t", "x"));
        assert_eq!(outcome.worst_severity(), Some(Severity::High));
        assert_eq!(outcome.reasons(), vec!["P2: nope".to_string()]);
    }

    #[test]
    fn from_config_registers_enabled_principles() {
        let yaml = "principles:\n  - principle: P3\n  - principle: P1\n  - principle: P7\n    enabled: false\n";
        let config = PolicyConfig::from_yaml_str(yaml).unwrap();
        let checklist = Checklist::from_config(&config).unwrap();
        assert_eq!(checklist.principles(), vec![Principle::P3, Principle::P1]);
        assert!(checklist.fail_closed());
    }

    #[test]
    fn prospective_discharges_cover_post_stage() {
        use crate::state::{Deadline, Obligation};
        use chrono::Utc;

        let checklist = Checklist::from_config(&PolicyConfig::default()).unwrap();
        let mut state = ComplianceState::new("t");
        state.open(Obligation {
            principle: Principle::P6,
            opened_by: Uuid::new_v4(),
            opened_at_seq: 1,
            opened_at: Utc::now(),
            deadline: Deadline::after(1, 5, None, Utc::now()),
            reason: "verify".to_string(),
            overdue_reported: false,
        });

        let verify = Action::new("t", "verify");
        let ctx = EvaluationContext::pre(&verify, &state);
        // Nothing is discharged before execution...
        assert!(checklist.discharged(Stage::PreAction, &ctx).is_empty());
        // ...but the action is on its way to discharging P6.
        assert_eq!(checklist.prospective_discharges(&ctx), vec![Principle::P6]);
    }

    #[test]
    fn default_checklist_splits_stages() {
        let checklist = Checklist::from_config(&PolicyConfig::default()).unwrap();
        assert_eq!(checklist.len(), 7);

        let action = Action::new("t", "llm_call").with_cost(1.0);
        let state = ComplianceState::new("t");
        let pre = checklist.run(Stage::PreAction, &EvaluationContext::pre(&action, &state));
        // P2 (ceiling) and P4 (reporting) apply before execution.
        let principles: Vec<Principle> = pre.results.iter().map(|r| r.principle).collect();
        assert_eq!(principles, vec![Principle::P2, Principle::P4]);
        assert_eq!(pre.decision, Decision::Allow);
    }
}
