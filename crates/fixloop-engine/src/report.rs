//! Run report: the caller-facing record of a finished run.
//!
//! The engine keeps no state across processes; [`save_report`] writes what a
//! run produced to `<logs_root>/run-report.json` for later inspection.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::conversation::Turn;
use crate::plan::Plan;
use crate::state::{EngineState, TerminalStatus};

const REPORT_FILE: &str = "run-report.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    /// `None` only when the run was stopped before reaching a terminal status.
    pub status: Option<TerminalStatus>,
    pub requirement: String,
    pub plan: Option<Plan>,
    pub build_success: bool,
    pub build_summary: String,
    pub cycles_remaining: u32,
    pub fix_cycles_run: u32,
    pub transitions: usize,
    pub failure: Option<String>,
    pub transcript: Vec<Turn>,
    /// RFC 3339 timestamp of when the report was created.
    pub timestamp: String,
}

impl RunReport {
    pub fn from_state(state: &EngineState) -> Self {
        Self {
            run_id: state.run_id.clone(),
            status: state.terminal_status(),
            requirement: state.feature_requirement.clone(),
            plan: state.plan.clone(),
            build_success: state.build_success,
            build_summary: state.build_summary.clone(),
            cycles_remaining: state.cycles_remaining,
            fix_cycles_run: state.fix_cycles_run,
            transitions: state.transitions,
            failure: state.failure.clone(),
            transcript: state.transcript.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Save a report to the given directory, creating it if needed.
pub async fn save_report(report: &RunReport, logs_root: &Path) -> fixloop_types::Result<PathBuf> {
    tokio::fs::create_dir_all(logs_root).await?;
    let path = logs_root.join(REPORT_FILE);
    let json = serde_json::to_string_pretty(report)?;
    tokio::fs::write(&path, json).await?;
    tracing::debug!(path = %path.display(), "Run report saved");
    Ok(path)
}

/// Load a previously saved report. `Ok(None)` when there is none.
pub async fn load_report(logs_root: &Path) -> fixloop_types::Result<Option<RunReport>> {
    let path = logs_root.join(REPORT_FILE);
    if !tokio::fs::try_exists(&path).await? {
        return Ok(None);
    }
    let json = tokio::fs::read_to_string(&path).await?;
    Ok(Some(serde_json::from_str(&json)?))
}
