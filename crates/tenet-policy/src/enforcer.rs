// enforcer.rs — The Enforcer contract and its result type.
//
// An Enforcer is a pure predicate for exactly one principle: given an
// action, the task's current state and (post-action only) the execution
// result, it returns an EnforcerResult. It must not perform I/O or mutate
// anything. Any external lookup has to be resolved by the caller into an
// action parameter before evaluation.

use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionResult};
use crate::principle::{Principle, PrincipleKind, Severity, Stage};
use crate::state::ComplianceState;

/// The outcome of one enforcer invocation. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnforcerResult {
    pub principle: Principle,
    pub kind: PrincipleKind,
    pub stage: Stage,
    pub passed: bool,
    /// Human-readable explanation, surfaced verbatim to the agent loop.
    pub reason: String,
    pub severity: Severity,
}

impl EnforcerResult {
    pub fn pass(
        principle: Principle,
        kind: PrincipleKind,
        stage: Stage,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            principle,
            kind,
            stage,
            passed: true,
            reason: reason.into(),
            severity: Severity::Info,
        }
    }

    pub fn fail(
        principle: Principle,
        kind: PrincipleKind,
        stage: Stage,
        severity: Severity,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            principle,
            kind,
            stage,
            passed: false,
            reason: reason.into(),
            severity,
        }
    }

    /// The enforcer could not evaluate: a configuration defect, not a
    /// policy violation.
    pub fn config_error(
        principle: Principle,
        kind: PrincipleKind,
        stage: Stage,
        reason: impl Into<String>,
    ) -> Self {
        Self::fail(principle, kind, stage, Severity::ConfigError, reason)
    }

    pub fn is_config_error(&self) -> bool {
        !self.passed && self.severity == Severity::ConfigError
    }

    pub fn is_unresolved_obligation(&self) -> bool {
        !self.passed && self.severity == Severity::UnresolvedObligation
    }

    /// Whether this result alone forces a BLOCK.
    ///
    /// Safety failures always block. Config errors block when the engine
    /// fails closed. Bounded-liveness failures never block.
    pub fn is_blocking(&self, fail_closed: bool) -> bool {
        if self.passed {
            return false;
        }
        self.kind == PrincipleKind::Safety || (fail_closed && self.is_config_error())
    }
}

/// Everything an enforcer may look at.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub action: &'a Action,
    pub state: &'a ComplianceState,
    /// Present only for post-action checks.
    pub outcome: Option<&'a ActionResult>,
}

impl<'a> EvaluationContext<'a> {
    pub fn pre(action: &'a Action, state: &'a ComplianceState) -> Self {
        Self {
            action,
            state,
            outcome: None,
        }
    }

    pub fn post(action: &'a Action, state: &'a ComplianceState, outcome: &'a ActionResult) -> Self {
        Self {
            action,
            state,
            outcome: Some(outcome),
        }
    }
}

/// A predicate evaluator for one principle.
///
/// Implementations must be deterministic in their inputs so enforcers can
/// run in any order and produce identical results. Panics are caught by the
/// Checklist and turned into config errors, but should not be relied upon.
pub trait Enforcer: Send + Sync {
    fn principle(&self) -> Principle;

    fn kind(&self) -> PrincipleKind;

    fn stage(&self) -> Stage {
        self.principle().stage()
    }

    /// Whether this enforcer has anything to say about the action.
    fn applies_to(&self, action: &Action) -> bool;

    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> EnforcerResult;

    /// Whether the action satisfies this principle's open obligation.
    ///
    /// Only meaningful for bounded-liveness principles.
    fn discharges(&self, _ctx: &EvaluationContext<'_>) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safety_failure_blocks_regardless_of_fail_closed() {
        let result = EnforcerResult::fail(
            Principle::P1,
            PrincipleKind::Safety,
            Stage::PreAction,
            Severity::Critical,
            "not confirmed",
        );
        assert!(result.is_blocking(true));
        assert!(result.is_blocking(false));
    }

    #[test]
    fn liveness_failure_never_blocks() {
        let result = EnforcerResult::fail(
            Principle::P4,
            PrincipleKind::BoundedLiveness,
            Stage::PreAction,
            Severity::Low,
            "cost must be reported",
        );
        assert!(!result.is_blocking(true));
    }

    #[test]
    fn config_error_blocks_only_when_failing_closed() {
        let result = EnforcerResult::config_error(
            Principle::P4,
            PrincipleKind::BoundedLiveness,
            Stage::PreAction,
            "declared_cost is NaN",
        );
        assert!(result.is_config_error());
        assert!(result.is_blocking(true));
        assert!(!result.is_blocking(false));
    }

    #[test]
    fn passing_result_never_blocks() {
        let result = EnforcerResult::pass(
            Principle::P1,
            PrincipleKind::Safety,
            Stage::PreAction,
            "confirmed",
        );
        assert!(!result.is_blocking(true));
        assert_eq!(result.severity, Severity::Info);
    }

    #[test]
    fn result_serializes_severity_kebab_case() {
        let result = EnforcerResult::config_error(
            Principle::P3,
            PrincipleKind::Safety,
            Stage::PreAction,
            "missing key_ref",
        );
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"config-error\""));
        assert!(json.contains("\"P3\""));
    }
}
