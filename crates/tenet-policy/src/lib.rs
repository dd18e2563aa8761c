//! # tenet-policy
//!
//! Operating principles, enforcers and the checklist that turns enforcer
//! results into an ALLOW/BLOCK decision.
//!
//! An agent submits every side-effecting [`Action`] for checking. The
//! [`Checklist`] runs each applicable [`Enforcer`] (one per [`Principle`])
//! and folds their [`EnforcerResult`]s into a [`Decision`].
//!
//! ## Key invariants
//!
//! - **Safety blocks**: a failed safety check always yields BLOCK.
//! - **Liveness never blocks**: a failed bounded-liveness check opens an
//!   obligation that must be discharged within a window of actions.
//! - **Fail closed**: an enforcer that cannot evaluate (malformed input,
//!   panic) produces a config error, which blocks unless the policy opts out.
//! - **Pure enforcers**: enforcers read the action, the task's
//!   [`ComplianceState`] and the execution result. They never do I/O.

pub mod action;
pub mod builtin;
pub mod checklist;
pub mod config;
pub mod enforcer;
pub mod error;
pub mod principle;
pub mod state;

pub use action::{Action, ActionResult, ParamError};
pub use builtin::builtin;
pub use checklist::{decide, CheckOutcome, Checklist, Decision};
pub use config::{
    default_severity, CompiledSelector, EngineSettings, PolicyConfig, PrincipleSpec, Selector,
    Thresholds,
};
pub use enforcer::{Enforcer, EnforcerResult, EvaluationContext};
pub use error::PolicyError;
pub use principle::{Principle, PrincipleKind, Severity, Stage};
pub use state::{ComplianceState, Deadline, LastViolation, Obligation, PrincipleStatus};
