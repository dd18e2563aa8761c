//! # tenet-engine
//!
//! Runtime compliance engine for autonomous agents.
//!
//! The agent loop calls [`ComplianceEngine::before_action`] before every
//! side-effecting action and must not execute it on BLOCK. After execution
//! it calls [`ComplianceEngine::after_action`]; at task end,
//! [`ComplianceEngine::end_of_task`] produces a [`ComplianceReport`].
//!
//! Every failed check is appended to a hash-chained violation log before the
//! decision is returned. The [`Dashboard`] is a projection of that log and
//! can be rebuilt from it offline.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use tenet_engine::{ComplianceEngine, ProjectLayout};
//! use tenet_policy::Action;
//!
//! let layout = ProjectLayout::for_project(".");
//! let mut engine = ComplianceEngine::open_project(&layout).unwrap();
//!
//! let action = Action::new("task-1", "delete_file").with_risk_tag("irreversible");
//! let outcome = engine.before_action(&action);
//! if outcome.is_blocked() {
//!     eprintln!("blocked: {:?}", outcome.reasons());
//! }
//! let report = engine.end_of_task("task-1").unwrap();
//! println!("{}", report.render());
//! ```

pub mod dashboard;
pub mod engine;
pub mod error;
pub mod layout;
pub mod registry;
pub mod report;
pub mod shared;

pub use dashboard::{
    BlockEvent, Dashboard, DashboardView, OpenObligation, PrincipleTally, TaskView,
};
pub use engine::ComplianceEngine;
pub use error::EngineError;
pub use layout::ProjectLayout;
pub use registry::TaskRegistry;
pub use report::{ComplianceReport, PrincipleSummary, ReportStore};
pub use shared::SharedEngine;
pub use tenet_audit::ReportStatus;
