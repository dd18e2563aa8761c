// config.rs — Policy configuration loaded at engine start.
//
// Stored as YAML at `.tenet/policy.yaml`:
//
// ```yaml
// engine:
//   fail_closed: true
//   recent_blocks: 50
//   default_window_actions: 5
// principles:
//   - principle: P1
//     applies_to:
//       kinds: ["delete_*"]
//       risk_tags: ["irreversible"]
//   - principle: P4
//     window_actions: 5
//     escalate_when_overdue: false
// thresholds:
//   max_action_cost: 10.0
// ```
//
// The order of the `principles` list is the enforcer registration order,
// which fixes the order of results in every CheckOutcome. A principle
// that is absent from the list is not enforced.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::error::PolicyError;
use crate::principle::{Principle, PrincipleKind, Severity};

/// Complete policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyConfig {
    #[serde(default)]
    pub engine: EngineSettings,

    /// Principles to enforce, in registration order.
    #[serde(default = "default_principles")]
    pub principles: Vec<PrincipleSpec>,

    #[serde(default)]
    pub thresholds: Thresholds,
}

/// Engine-wide knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSettings {
    /// Block actions whose checks hit a config error.
    #[serde(default = "default_true")]
    pub fail_closed: bool,

    /// How many BLOCK events the dashboard keeps.
    #[serde(default = "default_recent_blocks")]
    pub recent_blocks: usize,

    /// Obligation window (in actions) for liveness principles that don't set one.
    #[serde(default = "default_window_actions")]
    pub default_window_actions: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            fail_closed: true,
            recent_blocks: default_recent_blocks(),
            default_window_actions: default_window_actions(),
        }
    }
}

/// Per-principle configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrincipleSpec {
    pub principle: Principle,

    /// Overrides the principle's default kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PrincipleKind>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Severity recorded when the principle is violated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,

    /// Extra applicability beyond the enforcer's intrinsic condition.
    /// `None` means the principle's default selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applies_to: Option<Selector>,

    /// Liveness only: obligation deadline in actions after it opens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_actions: Option<u64>,

    /// Liveness only: optional wall-clock deadline in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_secs: Option<u64>,

    /// Liveness only: treat an overdue obligation as a safety failure.
    #[serde(default)]
    pub escalate_when_overdue: bool,
}

impl PrincipleSpec {
    /// A spec with every field at its default.
    pub fn new(principle: Principle) -> Self {
        Self {
            principle,
            kind: None,
            enabled: true,
            severity: None,
            applies_to: None,
            window_actions: None,
            window_secs: None,
            escalate_when_overdue: false,
        }
    }

    pub fn kind(&self) -> PrincipleKind {
        self.kind.unwrap_or_else(|| self.principle.default_kind())
    }

    pub fn severity(&self) -> Severity {
        self.severity
            .unwrap_or_else(|| default_severity(self.principle))
    }

    pub fn selector(&self) -> Selector {
        self.applies_to
            .clone()
            .unwrap_or_else(|| Selector::default_for(self.principle))
    }

    pub fn window_actions(&self, settings: &EngineSettings) -> u64 {
        self.window_actions
            .unwrap_or(settings.default_window_actions)
    }
}

/// Which actions a principle applies to, beyond its intrinsic condition.
///
/// An action matches if its kind matches any glob in `kinds` or it carries
/// any tag in `risk_tags`. An empty selector matches nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Selector {
    #[serde(default)]
    pub kinds: Vec<String>,
    #[serde(default)]
    pub risk_tags: Vec<String>,
}

impl Selector {
    /// The selector a principle uses when the config doesn't set one.
    pub fn default_for(principle: Principle) -> Self {
        let tag = match principle {
            Principle::P1 => "irreversible",
            Principle::P3 => "credential",
            Principle::P6 => "external_write",
            Principle::P7 => "high_impact",
            Principle::P2 | Principle::P4 | Principle::P5 => return Self::default(),
        };
        Self {
            kinds: Vec::new(),
            risk_tags: vec![tag.to_string()],
        }
    }

    /// Compile the kind globs. Invalid patterns are a config error rather
    /// than a silent non-match.
    pub fn compile(&self, principle: Principle) -> Result<CompiledSelector, PolicyError> {
        let kinds = self
            .kinds
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|e| PolicyError::InvalidPattern {
                    principle,
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CompiledSelector {
            kinds,
            risk_tags: self.risk_tags.clone(),
        })
    }
}

/// A `Selector` with its globs parsed, ready for matching.
#[derive(Debug, Clone, Default)]
pub struct CompiledSelector {
    kinds: Vec<Pattern>,
    risk_tags: Vec<String>,
}

impl CompiledSelector {
    pub fn matches(&self, action: &Action) -> bool {
        self.kinds.iter().any(|p| p.matches(&action.kind))
            || self.risk_tags.iter().any(|t| action.has_risk_tag(t))
    }
}

/// Numeric limits and vocabularies the built-in enforcers read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    /// P2: hard ceiling on a single action's declared cost.
    pub max_action_cost: f64,
    /// P2: how much more than the cheapest alternative a routable action may cost.
    pub max_alternative_ratio: f64,
    /// P5: allowed overrun of actual over declared cost, as a fraction.
    pub cost_tolerance: f64,
    /// P7: minimum rationale length (trimmed characters).
    pub min_rationale_chars: usize,
    /// P3: parameter keys that indicate a plaintext credential.
    pub forbidden_parameter_keys: Vec<String>,
    /// P4: action kinds that count as a cost report.
    pub report_kinds: Vec<String>,
    /// P6: action kinds that count as verification.
    pub verify_kinds: Vec<String>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_action_cost: 10.0,
            max_alternative_ratio: 1.5,
            cost_tolerance: 0.1,
            min_rationale_chars: 10,
            forbidden_parameter_keys: ["api_key", "raw_key", "secret", "password", "token"]
                .into_iter()
                .map(String::from)
                .collect(),
            report_kinds: vec!["report_cost".to_string()],
            verify_kinds: vec!["verify".to_string()],
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            engine: EngineSettings::default(),
            principles: default_principles(),
            thresholds: Thresholds::default(),
        }
    }
}

impl PolicyConfig {
    /// Parse and validate a YAML policy.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, PolicyError> {
        let config: PolicyConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a policy file.
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let content = fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Load a policy file if it exists, otherwise use the defaults.
    ///
    /// Unlike a missing file, a present-but-invalid file is an error: a
    /// broken policy must not silently fall back to something else.
    pub fn load_or_default(path: &Path) -> Result<Self, PolicyError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_yaml(&self) -> Result<String, PolicyError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Write the policy to disk, creating the parent directory.
    pub fn save(&self, path: &Path) -> Result<(), PolicyError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| PolicyError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, self.to_yaml()?).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The spec for a principle, if it is configured.
    pub fn spec_for(&self, principle: Principle) -> Option<&PrincipleSpec> {
        self.principles.iter().find(|s| s.principle == principle)
    }

    /// Enabled principle specs in registration order.
    pub fn enabled(&self) -> impl Iterator<Item = &PrincipleSpec> {
        self.principles.iter().filter(|s| s.enabled)
    }

    /// Check for inconsistencies serde can't catch.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let mut seen = HashSet::new();
        for spec in &self.principles {
            if !seen.insert(spec.principle) {
                return Err(PolicyError::DuplicatePrinciple(spec.principle));
            }
            spec.selector().compile(spec.principle)?;

            if spec.window_actions == Some(0) || spec.window_secs == Some(0) {
                return Err(PolicyError::InvalidConfig(format!(
                    "{}: obligation windows must be positive",
                    spec.principle
                )));
            }
            if spec.kind() == PrincipleKind::Safety && spec.escalate_when_overdue {
                return Err(PolicyError::InvalidConfig(format!(
                    "{}: escalate_when_overdue only applies to bounded-liveness principles",
                    spec.principle
                )));
            }
        }

        if self.engine.default_window_actions == 0 {
            return Err(PolicyError::InvalidConfig(
                "engine.default_window_actions must be positive".to_string(),
            ));
        }

        let t = &self.thresholds;
        if !(t.max_action_cost.is_finite() && t.max_action_cost >= 0.0) {
            return Err(PolicyError::InvalidConfig(
                "thresholds.max_action_cost must be a non-negative number".to_string(),
            ));
        }
        if !(t.max_alternative_ratio.is_finite() && t.max_alternative_ratio >= 1.0) {
            return Err(PolicyError::InvalidConfig(
                "thresholds.max_alternative_ratio must be at least 1.0".to_string(),
            ));
        }
        if !(t.cost_tolerance.is_finite() && t.cost_tolerance >= 0.0) {
            return Err(PolicyError::InvalidConfig(
                "thresholds.cost_tolerance must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}

/// Severity recorded for a violation when the config doesn't override it.
pub fn default_severity(principle: Principle) -> Severity {
    match principle {
        Principle::P1 | Principle::P3 => Severity::Critical,
        Principle::P2 | Principle::P5 => Severity::High,
        Principle::P7 => Severity::Medium,
        Principle::P4 | Principle::P6 => Severity::Low,
    }
}

fn default_principles() -> Vec<PrincipleSpec> {
    Principle::ALL.into_iter().map(PrincipleSpec::new).collect()
}

fn default_true() -> bool {
    true
}

fn default_recent_blocks() -> usize {
    50
}

fn default_window_actions() -> u64 {
    5
}
