// principle.rs — The fixed set of operating principles.
//
// Principles are a closed enum rather than free-form strings: the
// safety/liveness split is carried by `PrincipleKind`, so a typo in a
// config file fails at load time instead of silently disabling a check.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// One of the seven operating principles an agent is held to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Principle {
    /// Irreversible actions need an explicit confirmation flag.
    P1,
    /// Declared cost stays under the ceiling and near the cheapest alternative.
    P2,
    /// Credentials are referenced, never carried in plaintext.
    P3,
    /// Incurred cost is reported within a bounded number of actions.
    P4,
    /// Executed actions stay within the bounds they declared.
    P5,
    /// External side effects are verified within a bounded number of actions.
    P6,
    /// High-impact actions carry a stated rationale.
    P7,
}

impl Principle {
    /// All principles in their canonical (default registration) order.
    pub const ALL: [Principle; 7] = [
        Principle::P1,
        Principle::P2,
        Principle::P3,
        Principle::P4,
        Principle::P5,
        Principle::P6,
        Principle::P7,
    ];

    /// Short human-readable title, used in reports and the dashboard.
    pub fn title(&self) -> &'static str {
        match self {
            Principle::P1 => "Confirm irreversible actions",
            Principle::P2 => "Respect the cost ceiling",
            Principle::P3 => "Keep credentials out of plaintext",
            Principle::P4 => "Report incurred cost",
            Principle::P5 => "Stay within declared bounds",
            Principle::P6 => "Verify external effects",
            Principle::P7 => "State a rationale for high-impact actions",
        }
    }

    /// The kind a principle has when the config does not override it.
    pub fn default_kind(&self) -> PrincipleKind {
        match self {
            Principle::P4 | Principle::P6 => PrincipleKind::BoundedLiveness,
            _ => PrincipleKind::Safety,
        }
    }

    /// Whether the principle is checked before or after execution.
    ///
    /// Stage is intrinsic to the predicate (P5 needs the result), so unlike
    /// kind it is not configurable.
    pub fn stage(&self) -> Stage {
        match self {
            Principle::P5 | Principle::P6 => Stage::PostAction,
            _ => Stage::PreAction,
        }
    }
}

impl fmt::Display for Principle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = match self {
            Principle::P1 => "P1",
            Principle::P2 => "P2",
            Principle::P3 => "P3",
            Principle::P4 => "P4",
            Principle::P5 => "P5",
            Principle::P6 => "P6",
            Principle::P7 => "P7",
        };
        f.write_str(id)
    }
}

impl FromStr for Principle {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Principle::ALL
            .into_iter()
            .find(|p| p.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PolicyError::UnknownPrinciple(s.to_string()))
    }
}

/// Whether a principle must never be violated or must eventually hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrincipleKind {
    /// Must never be violated; a failure blocks the action pre-execution.
    Safety,
    /// Must be satisfied within a window; a failure opens an obligation.
    BoundedLiveness,
}

impl fmt::Display for PrincipleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrincipleKind::Safety => write!(f, "safety"),
            PrincipleKind::BoundedLiveness => write!(f, "bounded-liveness"),
        }
    }
}

/// Interception point an enforcer runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    PreAction,
    PostAction,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::PreAction => write!(f, "pre"),
            Stage::PostAction => write!(f, "post"),
        }
    }
}

impl FromStr for Stage {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pre" | "pre_action" | "pre-action" => Ok(Stage::PreAction),
            "post" | "post_action" | "post-action" => Ok(Stage::PostAction),
            other => Err(PolicyError::InvalidConfig(format!(
                "unknown stage '{}', expected 'pre' or 'post'",
                other
            ))),
        }
    }
}

/// How serious a failed check is.
///
/// The derived ordering is used to pick the worst failure of a check when
/// several enforcers disagree: `Info < Low < Medium < UnresolvedObligation
/// < High < ConfigError < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    /// Carried by passing results.
    Info,
    Low,
    Medium,
    /// A bounded-liveness deadline passed without the obligation being met.
    UnresolvedObligation,
    High,
    /// The enforcer could not evaluate (missing or malformed input).
    ConfigError,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::UnresolvedObligation => "unresolved-obligation",
            Severity::High => "high",
            Severity::ConfigError => "config-error",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}
