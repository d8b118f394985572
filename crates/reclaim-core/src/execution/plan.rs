//! Replay of an externally reviewed deletion plan.
//!
//! Rows are applied as written: no grouping, no policy, no re-derivation of
//! reasons or fingerprints. Each row goes through the same tombstone-then-delete
//! sequence as a live run.

use chrono::Utc;
use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

use super::executor::{timestamp, DeletionExecutor, DeletionRequest};
use super::ledger::{LedgerRow, LedgerWriter, Status};
use crate::analysis::Reason;
use crate::error::Result;
use crate::progress::ProgressReporter;

/// One row of a plan file (`deleted_file,kept_file,size_bytes,reason,hash`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PlanRow {
    #[serde(default)]
    pub deleted_file: Option<String>,
    #[serde(default)]
    pub kept_file: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub hash: Option<String>,
}

impl PlanRow {
    /// `None` when `deleted_file` or `kept_file` is absent or blank.
    pub fn to_request(&self) -> Option<DeletionRequest> {
        let candidate = non_blank(&self.deleted_file)?;
        let keeper = non_blank(&self.kept_file)?;
        let reason = self.reason.clone().unwrap_or_default();

        if !reason.is_empty() && Reason::parse(&reason).is_none() {
            warn!(
                "Plan row for '{}' carries unrecognized reason '{}', passing it through",
                candidate, reason
            );
        }

        Some(DeletionRequest {
            candidate: PathBuf::from(candidate),
            keeper: PathBuf::from(keeper),
            size_bytes: self
                .size_bytes
                .as_deref()
                .and_then(|s| s.trim().parse::<u64>().ok()),
            reason,
            fingerprint: self.hash.clone().unwrap_or_default(),
        })
    }

    fn invalid_row(&self) -> LedgerRow {
        LedgerRow {
            timestamp: timestamp(Utc::now()),
            deleted_file: self.deleted_file.clone().unwrap_or_default(),
            kept_file: self.kept_file.clone().unwrap_or_default(),
            size_bytes: self
                .size_bytes
                .as_deref()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0),
            reason: self.reason.clone().unwrap_or_default(),
            hash: self.hash.clone().unwrap_or_default(),
            status: Status::Error,
            message: "plan row is missing deleted_file or kept_file".to_string(),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Read a plan CSV. A header row is required; short rows are tolerated and
/// show up with missing fields.
pub fn read_plan(path: &Path) -> Result<Vec<PlanRow>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_path(path)?;
    let rows = reader
        .deserialize::<PlanRow>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Apply `plan` in order, appending one ledger row per plan row. Outcomes are
/// collected into `rows` before they are appended, as in
/// [`DeletionExecutor::execute_all`].
pub fn execute_plan(
    plan: &[PlanRow],
    executor: &DeletionExecutor,
    ledger: &mut LedgerWriter,
    reporter: &dyn ProgressReporter,
    rows: &mut Vec<LedgerRow>,
) -> Result<()> {
    let started = Instant::now();
    let first = rows.len();
    reporter.on_execute_start(plan.len(), executor.dry_run());

    for (done, plan_row) in plan.iter().enumerate() {
        let outcome = match plan_row.to_request() {
            Some(request) => executor.attempt(&request),
            None => {
                warn!("Plan row {} is missing required fields", done + 2);
                plan_row.invalid_row()
            }
        };
        rows.push(outcome.clone());
        ledger.append(&outcome)?;
        reporter.on_execute_progress(done + 1, plan.len());
    }

    let replayed = &rows[first..];
    let failed = replayed.iter().filter(|r| r.status == Status::Error).count();
    let succeeded = replayed.iter().filter(|r| r.status == Status::Ok).count();
    info!(
        "Plan replayed: {} succeeded, {} failed, {} skipped{}",
        succeeded,
        failed,
        replayed.len() - succeeded - failed,
        if executor.dry_run() { " (dry run)" } else { "" }
    );
    reporter.on_execute_complete(succeeded, failed, started.elapsed().as_secs_f64());

    Ok(())
}
