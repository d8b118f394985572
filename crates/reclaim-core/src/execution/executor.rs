use chrono::{DateTime, SecondsFormat, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::ledger::{LedgerRow, LedgerWriter, Status};
use super::tombstone::TombstoneRecord;
use crate::analysis::KeepDecision;
use crate::error::Result;
use crate::progress::ProgressReporter;

/// The destructive step, separated out so tests can inject failures.
pub trait FileRemover: Send + Sync {
    fn remove(&self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsRemover;

impl FileRemover for FsRemover {
    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

/// One file to delete, with the decision that justifies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionRequest {
    pub candidate: PathBuf,
    pub keeper: PathBuf,
    /// Falls back to the live file size when absent.
    pub size_bytes: Option<u64>,
    pub reason: String,
    pub fingerprint: String,
}

impl DeletionRequest {
    pub fn from_decision(decision: &KeepDecision) -> Vec<DeletionRequest> {
        decision
            .candidates
            .iter()
            .map(|candidate| DeletionRequest {
                candidate: candidate.file.path.clone(),
                keeper: decision.keeper.path.clone(),
                size_bytes: Some(candidate.file.size_bytes),
                reason: candidate.reason.to_string(),
                fingerprint: decision.fingerprint.clone(),
            })
            .collect()
    }
}

/// Tombstone-then-delete, one file at a time.
///
/// Each attempt is isolated: whatever happens to one file ends up as a ledger
/// row and processing moves on. If the delete fails after the tombstone was
/// written, the tombstone stays beside the surviving file.
pub struct DeletionExecutor {
    remover: Arc<dyn FileRemover>,
    tombstone_suffix: String,
    dry_run: bool,
}

impl DeletionExecutor {
    pub fn new(tombstone_suffix: impl Into<String>, dry_run: bool) -> Self {
        Self {
            remover: Arc::new(FsRemover),
            tombstone_suffix: tombstone_suffix.into(),
            dry_run,
        }
    }

    pub fn with_remover(mut self, remover: Arc<dyn FileRemover>) -> Self {
        self.remover = remover;
        self
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn tombstone_suffix(&self) -> &str {
        &self.tombstone_suffix
    }

    /// Perform one attempt and describe the outcome. Never fails: every
    /// per-file problem is folded into the returned row.
    ///
    /// The tombstone is written in both modes; dry run only withholds the
    /// delete, so both modes hit the same per-file failures.
    pub fn attempt(&self, request: &DeletionRequest) -> LedgerRow {
        let metadata = match fs::symlink_metadata(&request.candidate) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(
                    "'{}' no longer exists, skipping",
                    request.candidate.display()
                );
                return row(
                    request,
                    request.size_bytes.unwrap_or(0),
                    Status::Skip,
                    "file not found",
                );
            }
            Err(err) => {
                error!("Cannot stat '{}': {}", request.candidate.display(), err);
                return row(
                    request,
                    request.size_bytes.unwrap_or(0),
                    Status::Error,
                    &format!("stat failed: {}", err),
                );
            }
        };
        let size = request.size_bytes.unwrap_or(metadata.len());

        if !metadata.is_file() {
            error!("'{}' is not a regular file", request.candidate.display());
            return row(request, size, Status::Error, "not a regular file");
        }
        if fs::symlink_metadata(&request.keeper).is_err() {
            error!(
                "Kept file '{}' is missing, refusing to delete '{}'",
                request.keeper.display(),
                request.candidate.display()
            );
            return row(request, size, Status::Error, "kept file not found");
        }
        if is_same_file(&request.candidate, &request.keeper) {
            error!(
                "'{}' is also the kept file, refusing to delete",
                request.candidate.display()
            );
            return row(request, size, Status::Error, "deleted file is the kept file");
        }

        let tombstone = TombstoneRecord {
            original_path: request.candidate.clone(),
            deleted_at: Utc::now(),
            size_bytes: size,
            kept_path: request.keeper.clone(),
            reason: request.reason.clone(),
            fingerprint: request.fingerprint.clone(),
        };
        let sidecar = match tombstone.write(&self.tombstone_suffix) {
            Ok(sidecar) => sidecar,
            Err(err) => {
                error!(
                    "Failed to write tombstone for '{}': {}",
                    request.candidate.display(),
                    err
                );
                return row(
                    request,
                    size,
                    Status::Error,
                    &format!("tombstone write failed: {}", err),
                );
            }
        };

        if self.dry_run {
            debug!(
                "dry run: tombstone at {}, would delete {}",
                sidecar.display(),
                request.candidate.display()
            );
            return row(request, size, Status::Ok, "");
        }

        if let Err(err) = self.remover.remove(&request.candidate) {
            error!("Failed to remove '{}': {}", request.candidate.display(), err);
            return row(
                request,
                size,
                Status::Error,
                &format!("delete failed: {}; tombstone left at {}", err, sidecar.display()),
            );
        }

        debug!("deleted: {}", request.candidate.display());
        row(request, size, Status::Ok, "")
    }

    /// Execute every request in order, collecting outcomes into `rows`.
    ///
    /// Each outcome lands in `rows` before it is appended to `ledger`, so a
    /// ledger failure still leaves the caller with every attempt made so far.
    /// Only a ledger write failure is returned as an error.
    pub fn execute_all(
        &self,
        requests: &[DeletionRequest],
        ledger: &mut LedgerWriter,
        reporter: &dyn ProgressReporter,
        rows: &mut Vec<LedgerRow>,
    ) -> Result<()> {
        let started = Instant::now();
        let first = rows.len();
        reporter.on_execute_start(requests.len(), self.dry_run);

        for (done, request) in requests.iter().enumerate() {
            let outcome = self.attempt(request);
            rows.push(outcome.clone());
            ledger.append(&outcome)?;
            reporter.on_execute_progress(done + 1, requests.len());
        }

        let attempted = &rows[first..];
        let failed = attempted.iter().filter(|r| r.status == Status::Error).count();
        let succeeded = attempted.iter().filter(|r| r.status == Status::Ok).count();
        info!(
            "Deletions executed: {} succeeded, {} failed, {} skipped{}",
            succeeded,
            failed,
            attempted.len() - succeeded - failed,
            if self.dry_run { " (dry run)" } else { "" }
        );
        reporter.on_execute_complete(succeeded, failed, started.elapsed().as_secs_f64());

        Ok(())
    }
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn row(request: &DeletionRequest, size: u64, status: Status, message: &str) -> LedgerRow {
    LedgerRow {
        timestamp: timestamp(Utc::now()),
        deleted_file: request.candidate.display().to_string(),
        kept_file: request.keeper.display().to_string(),
        size_bytes: size,
        reason: request.reason.clone(),
        hash: request.fingerprint.clone(),
        status,
        message: message.to_string(),
    }
}

pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
