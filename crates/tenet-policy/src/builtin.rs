// builtin.rs — The built-in enforcers for principles P1..P7.
//
// Each enforcer carries only immutable configuration (its Rule plus the
// thresholds it reads), so evaluation is a pure function of the action,
// the task state and the execution result.
//
// Applicability is the enforcer's intrinsic condition (e.g. "has a cost")
// OR its configured selector (kind globs / risk tags).

use crate::action::Action;
use crate::config::{CompiledSelector, PolicyConfig, PrincipleSpec};
use crate::enforcer::{Enforcer, EnforcerResult, EvaluationContext};
use crate::error::PolicyError;
use crate::principle::{Principle, PrincipleKind, Severity, Stage};

/// Shared identity of a configured enforcer.
#[derive(Debug, Clone)]
struct Rule {
    principle: Principle,
    kind: PrincipleKind,
    severity: Severity,
    selector: CompiledSelector,
}

impl Rule {
    fn from_spec(spec: &PrincipleSpec) -> Result<Self, PolicyError> {
        Ok(Self {
            principle: spec.principle,
            kind: spec.kind(),
            severity: spec.severity(),
            selector: spec.selector().compile(spec.principle)?,
        })
    }

    fn stage(&self) -> Stage {
        self.principle.stage()
    }

    fn pass(&self, reason: impl Into<String>) -> EnforcerResult {
        EnforcerResult::pass(self.principle, self.kind, self.stage(), reason)
    }

    fn fail(&self, reason: impl Into<String>) -> EnforcerResult {
        EnforcerResult::fail(self.principle, self.kind, self.stage(), self.severity, reason)
    }

    fn config_error(&self, reason: impl Into<String>) -> EnforcerResult {
        EnforcerResult::config_error(self.principle, self.kind, self.stage(), reason)
    }
}

/// Build the built-in enforcer for a configured principle.
pub fn builtin(
    spec: &PrincipleSpec,
    config: &PolicyConfig,
) -> Result<Box<dyn Enforcer>, PolicyError> {
    let rule = Rule::from_spec(spec)?;
    let t = &config.thresholds;
    let window = spec.window_actions(&config.engine);

    let enforcer: Box<dyn Enforcer> = match spec.principle {
        Principle::P1 => Box::new(ConfirmIrreversible { rule }),
        Principle::P2 => Box::new(CostCeiling {
            rule,
            max_action_cost: t.max_action_cost,
            max_alternative_ratio: t.max_alternative_ratio,
        }),
        Principle::P3 => Box::new(CredentialHygiene {
            rule,
            forbidden_keys: t
                .forbidden_parameter_keys
                .iter()
                .map(|k| k.to_ascii_lowercase())
                .collect(),
        }),
        Principle::P4 => Box::new(CostReporting {
            rule,
            report_kinds: t.report_kinds.clone(),
            window,
        }),
        Principle::P5 => Box::new(DeclaredBounds {
            rule,
            cost_tolerance: t.cost_tolerance,
        }),
        Principle::P6 => Box::new(ExternalVerification {
            rule,
            verify_kinds: t.verify_kinds.clone(),
            window,
        }),
        Principle::P7 => Box::new(RationaleRequired {
            rule,
            min_chars: t.min_rationale_chars,
        }),
    };
    Ok(enforcer)
}

// ── P1 ──

/// Irreversible actions need `parameters.confirmed == true`.
pub struct ConfirmIrreversible {
    rule: Rule,
}

impl Enforcer for ConfirmIrreversible {
    fn principle(&self) -> Principle {
        self.rule.principle
    }
    fn kind(&self) -> PrincipleKind {
        self.rule.kind
    }
    fn applies_to(&self, action: &Action) -> bool {
        self.rule.selector.matches(action)
    }
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> EnforcerResult {
        let kind = &ctx.action.kind;
        match ctx.action.param_bool("confirmed") {
            Err(e) => self.rule.config_error(e.to_string()),
            Ok(Some(true)) => self.rule.pass(format!("irreversible action '{}' confirmed", kind)),
            Ok(_) => self.rule.fail(format!(
                "irreversible action '{}' requires parameters.confirmed = true",
                kind
            )),
        }
    }
}

// ── P2 ──

/// Declared cost must be sane, under the ceiling, and (for routable actions)
/// close to the cheapest alternative the caller resolved.
pub struct CostCeiling {
    rule: Rule,
    max_action_cost: f64,
    max_alternative_ratio: f64,
}

impl Enforcer for CostCeiling {
    fn principle(&self) -> Principle {
        self.rule.principle
    }
    fn kind(&self) -> PrincipleKind {
        self.rule.kind
    }
    fn applies_to(&self, action: &Action) -> bool {
        // `!= 0.0` holds for NaN, so malformed costs still get checked.
        action.declared_cost != 0.0
            || action.has_risk_tag("routable")
            || self.rule.selector.matches(action)
    }
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> EnforcerResult {
        let action = ctx.action;
        let cost = action.declared_cost;
        if !cost.is_finite() || cost < 0.0 {
            return self.rule.config_error(format!(
                "declared_cost must be a finite, non-negative number (got {})",
                cost
            ));
        }
        if cost > self.max_action_cost {
            return self.rule.fail(format!(
                "declared cost {:.2} exceeds the per-action ceiling of {:.2}",
                cost, self.max_action_cost
            ));
        }

        if action.has_risk_tag("routable") {
            let alternative = match action.param_f64("cheapest_alternative_cost") {
                Err(e) => return self.rule.config_error(e.to_string()),
                Ok(None) => {
                    return self.rule.config_error(format!(
                        "routable action '{}' is missing parameters.cheapest_alternative_cost",
                        action.kind
                    ))
                }
                Ok(Some(alt)) if !alt.is_finite() || alt < 0.0 => {
                    return self.rule.config_error(format!(
                        "cheapest_alternative_cost must be a finite, non-negative number (got {})",
                        alt
                    ))
                }
                Ok(Some(alt)) => alt,
            };
            if cost > alternative * self.max_alternative_ratio {
                return self.rule.fail(format!(
                    "declared cost {:.2} is more than {}x the cheapest alternative ({:.2})",
                    cost, self.max_alternative_ratio, alternative
                ));
            }
        }

        self.rule.pass(format!(
            "declared cost {:.2} within ceiling {:.2}",
            cost, self.max_action_cost
        ))
    }
}

// ── P3 ──

/// No plaintext credentials in parameters; credential actions name a key_ref.
pub struct CredentialHygiene {
    rule: Rule,
    /// Lowercased.
    forbidden_keys: Vec<String>,
}

impl CredentialHygiene {
    fn forbidden_key<'a>(&self, action: &'a Action) -> Option<&'a str> {
        action
            .parameters
            .keys()
            .find(|k| self.forbidden_keys.contains(&k.to_ascii_lowercase()))
            .map(String::as_str)
    }
}

impl Enforcer for CredentialHygiene {
    fn principle(&self) -> Principle {
        self.rule.principle
    }
    fn kind(&self) -> PrincipleKind {
        self.rule.kind
    }
    fn applies_to(&self, action: &Action) -> bool {
        self.rule.selector.matches(action) || self.forbidden_key(action).is_some()
    }
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> EnforcerResult {
        let action = ctx.action;
        if let Some(key) = self.forbidden_key(action) {
            return self.rule.fail(format!(
                "parameter '{}' carries a plaintext credential; pass a key_ref instead",
                key
            ));
        }
        if self.rule.selector.matches(action) {
            match action.param_str("key_ref") {
                Err(e) => return self.rule.config_error(e.to_string()),
                Ok(Some(key_ref)) if !key_ref.trim().is_empty() => {
                    return self
                        .rule
                        .pass(format!("credential referenced via key_ref '{}'", key_ref))
                }
                Ok(_) => {
                    return self.rule.config_error(format!(
                        "credential action '{}' is missing parameters.key_ref",
                        action.kind
                    ))
                }
            }
        }
        self.rule.pass("no plaintext credentials in parameters")
    }
}

// ── P4 ──

/// Incurred cost must be reported within the obligation window.
pub struct CostReporting {
    rule: Rule,
    report_kinds: Vec<String>,
    window: u64,
}

impl CostReporting {
    fn is_report(&self, action: &Action) -> bool {
        self.report_kinds.iter().any(|k| k == &action.kind)
    }
}

impl Enforcer for CostReporting {
    fn principle(&self) -> Principle {
        self.rule.principle
    }
    fn kind(&self) -> PrincipleKind {
        self.rule.kind
    }
    fn applies_to(&self, action: &Action) -> bool {
        action.declared_cost > 0.0 || self.is_report(action) || self.rule.selector.matches(action)
    }
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> EnforcerResult {
        let action = ctx.action;
        if self.is_report(action) {
            return self.rule.pass("cost report submitted");
        }
        if action.declared_cost <= 0.0 || action.declared_cost.is_nan() {
            return self.rule.pass("no cost incurred");
        }
        if let Some(open) = ctx.state.open_obligation(self.rule.principle) {
            return self.rule.pass(format!(
                "cost folded into the open reporting obligation due by action #{}",
                open.deadline.action_seq
            ));
        }
        self.rule.fail(format!(
            "cost {:.2} incurred by '{}' must be reported within {} actions",
            action.declared_cost, action.kind, self.window
        ))
    }
    fn discharges(&self, ctx: &EvaluationContext<'_>) -> bool {
        self.is_report(ctx.action)
    }
}

// ── P5 ──

/// After execution, actual cost and side effects stay within what the
/// action declared.
pub struct DeclaredBounds {
    rule: Rule,
    cost_tolerance: f64,
}

impl Enforcer for DeclaredBounds {
    fn principle(&self) -> Principle {
        self.rule.principle
    }
    fn kind(&self) -> PrincipleKind {
        self.rule.kind
    }
    /// Every executed action is bounded: an undeclared cost is a declared
    /// cost of zero.
    fn applies_to(&self, _action: &Action) -> bool {
        true
    }
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> EnforcerResult {
        let action = ctx.action;
        let Some(outcome) = ctx.outcome else {
            return self
                .rule
                .config_error("post-condition check requires the execution result");
        };

        let declared = action.declared_cost;
        match outcome.actual_cost {
            None if declared > 0.0 => {
                return self.rule.config_error(format!(
                    "result for '{}' is missing actual_cost; cannot verify the declared cost bound",
                    action.kind
                ))
            }
            Some(actual) if actual > declared * (1.0 + self.cost_tolerance) => {
                return self.rule.fail(format!(
                    "actual cost {:.2} exceeded declared cost {:.2} (tolerance {:.0}%)",
                    actual,
                    declared,
                    self.cost_tolerance * 100.0
                ))
            }
            _ => {}
        }

        match action.param_f64("max_side_effects") {
            Err(e) => return self.rule.config_error(e.to_string()),
            Ok(None) => {}
            Ok(Some(max)) => match outcome.side_effects {
                None => {
                    return self.rule.config_error(format!(
                        "result for '{}' is missing side_effects; cannot verify max_side_effects",
                        action.kind
                    ))
                }
                Some(n) if n as f64 > max => {
                    return self.rule.fail(format!(
                        "{} side effects exceeded the declared maximum of {}",
                        n, max
                    ))
                }
                Some(_) => {}
            },
        }

        if outcome.actual_cost.is_none()
            && declared <= 0.0
            && action.param("max_side_effects").is_none()
        {
            return self.rule.pass("no declared bounds to verify");
        }
        self.rule.pass("outcome within declared bounds")
    }
}

// ── P6 ──

/// Successful external writes must be followed by a verification action
/// within the obligation window.
pub struct ExternalVerification {
    rule: Rule,
    verify_kinds: Vec<String>,
    window: u64,
}

impl ExternalVerification {
    fn is_verify(&self, action: &Action) -> bool {
        self.verify_kinds.iter().any(|k| k == &action.kind)
    }
}

impl Enforcer for ExternalVerification {
    fn principle(&self) -> Principle {
        self.rule.principle
    }
    fn kind(&self) -> PrincipleKind {
        self.rule.kind
    }
    fn applies_to(&self, action: &Action) -> bool {
        self.is_verify(action) || self.rule.selector.matches(action)
    }
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> EnforcerResult {
        let action = ctx.action;
        let Some(outcome) = ctx.outcome else {
            return self
                .rule
                .config_error("verification check requires the execution result");
        };

        if self.is_verify(action) {
            return if outcome.succeeded {
                self.rule.pass("verification executed")
            } else {
                self.rule
                    .pass("verification did not succeed; any open obligation stays open")
            };
        }
        if !outcome.succeeded {
            return self
                .rule
                .pass(format!("'{}' did not execute; nothing to verify", action.kind));
        }
        if let Some(open) = ctx.state.open_obligation(self.rule.principle) {
            return self.rule.pass(format!(
                "effect folded into the open verification obligation due by action #{}",
                open.deadline.action_seq
            ));
        }
        self.rule.fail(format!(
            "external side effect of '{}' must be verified within {} actions",
            action.kind, self.window
        ))
    }
    /// Without a result this answers whether the action would discharge
    /// the obligation if it succeeds.
    fn discharges(&self, ctx: &EvaluationContext<'_>) -> bool {
        self.is_verify(ctx.action) && ctx.outcome.map_or(true, |o| o.succeeded)
    }
}

// ── P7 ──

/// High-impact actions carry a rationale of a minimum length.
pub struct RationaleRequired {
    rule: Rule,
    min_chars: usize,
}

impl Enforcer for RationaleRequired {
    fn principle(&self) -> Principle {
        self.rule.principle
    }
    fn kind(&self) -> PrincipleKind {
        self.rule.kind
    }
    fn applies_to(&self, action: &Action) -> bool {
        self.rule.selector.matches(action)
    }
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> EnforcerResult {
        let kind = &ctx.action.kind;
        match ctx.action.param_str("rationale") {
            Err(e) => self.rule.config_error(e.to_string()),
            Ok(None) => self
                .rule
                .fail(format!("high-impact action '{}' must state a rationale", kind)),
            Ok(Some(rationale)) => {
                let len = rationale.trim().chars().count();
                if len < self.min_chars {
                    self.rule.fail(format!(
                        "rationale for '{}' is too short ({} < {} characters)",
                        kind, len, self.min_chars
                    ))
                } else {
                    self.rule.pass("rationale stated")
                }
            }
        }
    }
}
