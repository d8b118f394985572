use csv::{Writer, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub const LEDGER_HEADER: [&str; 8] = [
    "timestamp",
    "deleted_file",
    "kept_file",
    "size_bytes",
    "reason",
    "hash",
    "status",
    "message",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
    Skip,
}

/// One deletion attempt. Field order matches [`LEDGER_HEADER`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub timestamp: String,
    pub deleted_file: String,
    pub kept_file: String,
    pub size_bytes: u64,
    pub reason: String,
    pub hash: String,
    pub status: Status,
    pub message: String,
}

/// Append-only CSV audit trail owned by a single run.
///
/// Every row is flushed as soon as it is appended, so the ledger on disk
/// never lags behind the filesystem actions it describes.
pub struct LedgerWriter {
    path: PathBuf,
    writer: Writer<Box<dyn Write + Send>>,
    rows_written: usize,
}

impl LedgerWriter {
    /// Create a new ledger. Fails if `path` already exists.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        Self::from_writer(path, file)
    }

    /// Ledger over an arbitrary sink. `path` is only reported, never opened.
    pub fn from_writer(path: &Path, sink: impl Write + Send + 'static) -> Result<Self> {
        let sink: Box<dyn Write + Send> = Box::new(sink);
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(sink);
        writer.write_record(LEDGER_HEADER)?;
        writer.flush()?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            rows_written: 0,
        })
    }

    pub fn append(&mut self, row: &LedgerRow) -> Result<()> {
        self.writer.serialize(row)?;
        self.writer.flush()?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }
}

pub fn read_ledger(path: &Path) -> Result<Vec<LedgerRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader
        .deserialize::<LedgerRow>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
