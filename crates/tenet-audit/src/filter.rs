// filter.rs — Selection criteria for violation queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tenet_policy::Principle;

use crate::record::ViolationRecord;

/// Filter for [`ViolationLogger::query`](crate::ViolationLogger::query).
///
/// Every set field must match; the default filter matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ViolationFilter {
    pub task_id: Option<String>,
    pub principle: Option<Principle>,
    /// Inclusive lower bound on the record timestamp.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the record timestamp.
    pub until: Option<DateTime<Utc>>,
    /// Only records whose check decided BLOCK.
    pub blocked_only: bool,
}

impl ViolationFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_task(task_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            ..Self::default()
        }
    }

    pub fn with_principle(mut self, principle: Principle) -> Self {
        self.principle = Some(principle);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn blocked_only(mut self) -> Self {
        self.blocked_only = true;
        self
    }

    pub fn matches(&self, record: &ViolationRecord) -> bool {
        if let Some(task_id) = &self.task_id {
            if &record.task_id != task_id {
                return false;
            }
        }
        if let Some(principle) = self.principle {
            if record.principle != principle {
                return false;
            }
        }
        if self.since.is_some_and(|since| record.timestamp < since) {
            return false;
        }
        if self.until.is_some_and(|until| record.timestamp >= until) {
            return false;
        }
        !self.blocked_only || record.blocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tenet_policy::{Action, EnforcerResult, PrincipleKind, Severity, Stage};

    fn record(task: &str, principle: Principle, blocked: bool) -> ViolationRecord {
        let action = Action::new(task, "x");
        let result = EnforcerResult::fail(
            principle,
            PrincipleKind::Safety,
            Stage::PreAction,
            Severity::High,
            "failed",
        );
        ViolationRecord::from_result(&action, &result, blocked)
    }

    #[test]
    fn default_filter_matches_everything() {
        assert!(ViolationFilter::all().matches(&record("a", Principle::P1, false)));
    }

    #[test]
    fn fields_combine_with_and() {
        let filter = ViolationFilter::for_task("a")
            .with_principle(Principle::P2)
            .blocked_only();

        assert!(filter.matches(&record("a", Principle::P2, true)));
        assert!(!filter.matches(&record("b", Principle::P2, true)));
        assert!(!filter.matches(&record("a", Principle::P3, true)));
        assert!(!filter.matches(&record("a", Principle::P2, false)));
    }

    #[test]
    fn time_window_is_half_open() {
        let r = record("a", Principle::P1, false);
        assert!(ViolationFilter::all().since(r.timestamp).matches(&r));
        assert!(!ViolationFilter::all().until(r.timestamp).matches(&r));
        assert!(ViolationFilter::all()
            .until(r.timestamp + Duration::seconds(1))
            .matches(&r));
    }
}
