// registry.rs — Explicit per-task state registry.
//
// The engine owns one registry; there is no process-global state. A task's
// state is created on first contact and removed by `end_of_task`.

use std::collections::BTreeMap;

use tenet_policy::ComplianceState;

/// Active tasks, keyed by task id.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, ComplianceState>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The state for a task, created if this is the first time it is seen.
    pub fn get_or_create(&mut self, task_id: &str) -> &mut ComplianceState {
        self.tasks.entry(task_id.to_string()).or_insert_with(|| {
            tracing::debug!(task_id, "tracking new task");
            ComplianceState::new(task_id)
        })
    }

    pub fn get(&self, task_id: &str) -> Option<&ComplianceState> {
        self.tasks.get(task_id)
    }

    pub fn remove(&mut self, task_id: &str) -> Option<ComplianceState> {
        self.tasks.remove(task_id)
    }

    /// Ids of all active tasks, sorted.
    pub fn task_ids(&self) -> Vec<&str> {
        self.tasks.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_reuses_existing_state() {
        let mut registry = TaskRegistry::new();
        registry.get_or_create("t1").next_seq();
        assert_eq!(registry.get_or_create("t1").actions_seen, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_forgets_the_task() {
        let mut registry = TaskRegistry::new();
        registry.get_or_create("b");
        registry.get_or_create("a");
        assert_eq!(registry.task_ids(), vec!["a", "b"]);

        assert!(registry.remove("a").is_some());
        assert!(registry.get("a").is_none());
        assert!(registry.remove("a").is_none());
    }
}
