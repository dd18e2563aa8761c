//! # tenet-audit
//!
//! Append-only, hash-chained violation log for Tenet.
//!
//! Every failed enforcer result is recorded as a [`ViolationRecord`]; every
//! check outcome is acknowledged with a [`CheckRecord`]; obligation changes
//! and task ends are recorded too. All of them are [`LogEntry`] lines in a
//! JSONL file, each linked to the previous line by SHA-256.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use tenet_audit::{ViolationFilter, ViolationLog, ViolationLogger};
//!
//! let log = ViolationLog::open("/tmp/violations.jsonl").unwrap();
//! let blocked = log.query(&ViolationFilter::for_task("task-1").blocked_only()).unwrap();
//! println!("{} blocking violations", blocked.len());
//! ```

pub mod error;
pub mod filter;
pub mod hasher;
pub mod log;
pub mod record;

pub use error::AuditError;
pub use filter::ViolationFilter;
pub use log::{MemoryLog, ViolationLog, ViolationLogger};
pub use record::{
    CheckRecord, LogEntry, LogRecord, ObligationEvent, ObligationRecord, ReportStatus,
    TaskEndRecord, ViolationRecord,
};
