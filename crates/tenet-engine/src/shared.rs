// shared.rs — Thread-safe handle for multi-threaded agent loops.
//
// All engine calls are serialized through one mutex (a global order over
// every task). Dashboard reads go through the dashboard's own lock and
// never wait on the engine.

use std::sync::{Arc, Mutex, MutexGuard};

use tenet_policy::{Action, ActionResult, CheckOutcome, Decision, Stage};

use crate::dashboard::Dashboard;
use crate::engine::ComplianceEngine;
use crate::error::EngineError;
use crate::report::ComplianceReport;

/// Cloneable, `Send + Sync` handle to a [`ComplianceEngine`].
#[derive(Clone)]
pub struct SharedEngine {
    inner: Arc<Mutex<ComplianceEngine>>,
    dashboard: Dashboard,
}

impl SharedEngine {
    pub fn new(engine: ComplianceEngine) -> Self {
        let dashboard = engine.dashboard();
        Self {
            inner: Arc::new(Mutex::new(engine)),
            dashboard,
        }
    }

    /// Check an action before it executes.
    ///
    /// If the engine lock is poisoned the action is blocked: no decision
    /// can be trusted, and an unrecorded ALLOW would break the audit trail.
    pub fn before_action(&self, action: &Action) -> CheckOutcome {
        match self.lock() {
            Ok(mut engine) => engine.before_action(action),
            Err(e) => {
                tracing::error!(
                    task_id = %action.task_id,
                    action_id = %action.id,
                    "compliance engine lock poisoned; blocking action"
                );
                CheckOutcome {
                    action_id: action.id,
                    stage: Stage::PreAction,
                    results: Vec::new(),
                    decision: Decision::Block,
                    fault: Some(e.to_string()),
                }
            }
        }
    }

    pub fn after_action(
        &self,
        action: &Action,
        result: &ActionResult,
    ) -> Result<CheckOutcome, EngineError> {
        Ok(self.lock()?.after_action(action, result))
    }

    pub fn abort_task(&self, task_id: &str, reason: impl Into<String>) -> Result<(), EngineError> {
        self.lock()?.abort_task(task_id, reason);
        Ok(())
    }

    pub fn end_of_task(&self, task_id: &str) -> Result<ComplianceReport, EngineError> {
        self.lock()?.end_of_task(task_id)
    }

    /// Run a closure with exclusive access to the engine.
    pub fn with<R>(&self, f: impl FnOnce(&mut ComplianceEngine) -> R) -> Result<R, EngineError> {
        let mut engine = self.lock()?;
        Ok(f(&mut *engine))
    }

    /// The live dashboard. Does not take the engine lock.
    pub fn dashboard(&self) -> Dashboard {
        self.dashboard.clone()
    }

    fn lock(&self) -> Result<MutexGuard<'_, ComplianceEngine>, EngineError> {
        self.inner.lock().map_err(|_| EngineError::LockPoisoned)
    }
}
