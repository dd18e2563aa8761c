pub mod audit;
pub mod dashboard;
pub mod policy;
pub mod report;

use std::path::{Path, PathBuf};

use tenet_engine::ProjectLayout;

/// An explicit `--log` path, or the project's violation log.
pub(crate) fn log_path(layout: &ProjectLayout, log: Option<&Path>) -> PathBuf {
    log.map(Path::to_path_buf)
        .unwrap_or_else(|| layout.violation_log.clone())
}
