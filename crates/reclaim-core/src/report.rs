use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::execution::{LedgerRow, Status};

pub const SUMMARY_FILE: &str = "summary.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub deleted: usize,
    pub skipped: usize,
    pub errors: usize,
    /// Sum of `size_bytes` over `ok` rows.
    pub bytes_reclaimed: u64,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.errors == 0
    }
}

pub fn summarize(rows: &[LedgerRow]) -> RunSummary {
    rows.iter().fold(RunSummary::default(), |mut acc, row| {
        match row.status {
            Status::Ok => {
                acc.deleted += 1;
                acc.bytes_reclaimed += row.size_bytes;
            }
            Status::Skip => acc.skipped += 1,
            Status::Error => acc.errors += 1,
        }
        acc
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Live,
    Replay,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Live => f.write_str("live"),
            RunMode::Replay => f.write_str("replay"),
        }
    }
}

/// Everything the plain-text summary artifact reports.
#[derive(Debug, Clone)]
pub struct SummaryArtifact {
    pub summary: RunSummary,
    pub mode: RunMode,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub ledger_path: PathBuf,
    pub grouping_output: Option<PathBuf>,
    /// Set when the run stopped early, e.g. because the ledger became unwritable.
    pub aborted: Option<String>,
}

impl SummaryArtifact {
    pub fn render(&self) -> String {
        let grouping_output = self
            .grouping_output
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "n/a".to_string());

        let mut text = format!(
            "mode: {}\n\
             started: {}\n\
             finished: {}\n\
             dry run: {}\n\
             files deleted: {}\n\
             files skipped: {}\n\
             errors: {}\n\
             bytes reclaimed: {}\n\
             ledger: {}\n\
             grouping output: {}\n",
            self.mode,
            self.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.finished_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.dry_run,
            self.summary.deleted,
            self.summary.skipped,
            self.summary.errors,
            self.summary.bytes_reclaimed,
            self.ledger_path.display(),
            grouping_output,
        );
        if let Some(reason) = &self.aborted {
            text.push_str(&format!("aborted: {}\n", reason));
        }
        text
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(self.render().as_bytes())?;
        file.sync_all()?;
        Ok(())
    }
}
