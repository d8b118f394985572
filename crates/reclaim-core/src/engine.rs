use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::analysis;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::execution::{
    execute_plan, read_plan, DeletionExecutor, DeletionRequest, FileRemover, FsRemover,
    LedgerRow, LedgerWriter,
};
use crate::grouping::{self, DuplicateGrouper};
use crate::progress::ProgressReporter;
use crate::report::{summarize, RunMode, RunSummary, SummaryArtifact, SUMMARY_FILE};
use crate::scanner::{self, FileFilter};

pub const LEDGER_FILE: &str = "ledger.csv";

/// Runs the pipeline: enumerate, group, resolve, tombstone-then-delete, report.
/// The same executor contract backs plan replay.
pub struct DedupeEngine {
    config: AppConfig,
    grouper: Box<dyn DuplicateGrouper>,
    remover: Arc<dyn FileRemover>,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub run_dir: PathBuf,
    pub ledger_path: PathBuf,
    pub summary_path: PathBuf,
    pub grouping_output: Option<PathBuf>,
    pub summary: RunSummary,
    pub rows: Vec<LedgerRow>,
    pub files_enumerated: usize,
    pub duplicate_groups: usize,
    pub enumerate_duration: Duration,
    pub group_duration: Duration,
    pub execute_duration: Duration,
}

/// Per-run output location, created before anything is deleted.
struct RunContext {
    dir: PathBuf,
    ledger: LedgerWriter,
}

impl DedupeEngine {
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let grouper = grouping::from_config(&config.grouper)?;
        Ok(Self {
            config,
            grouper,
            remover: Arc::new(FsRemover),
        })
    }

    pub fn with_grouper(mut self, grouper: Box<dyn DuplicateGrouper>) -> Self {
        self.grouper = grouper;
        self
    }

    pub fn with_remover(mut self, remover: Arc<dyn FileRemover>) -> Self {
        self.remover = remover;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn executor(&self) -> DeletionExecutor {
        DeletionExecutor::new(self.config.tombstone_suffix.clone(), self.config.dry_run)
            .with_remover(Arc::clone(&self.remover))
    }

    /// Live run over the configured root.
    pub fn run(&self, reporter: &dyn ProgressReporter) -> Result<RunOutcome> {
        let started_at = Utc::now();
        let root = scanner::resolve_root(&self.config.root())?;
        let mut context = RunContext::create(Path::new(&self.config.output_dir))?;
        info!(
            "Run directory: {} (dry run: {})",
            context.dir.display(),
            self.config.dry_run
        );

        let output_dir = fs::canonicalize(&self.config.output_dir)?;
        let filter = FileFilter::new(
            &self.config.include_patterns,
            &self.config.exclude_patterns,
        )?
        .skip_suffix(&self.config.tombstone_suffix)
        .skip_dir(output_dir);

        // Phase 1: Enumerate
        info!("Enumerating files under {}...", root.display());
        reporter.on_enumerate_start();
        let enumerate_start = Instant::now();
        let files = scanner::enumerate(&root, &filter)?;
        let enumerate_duration = enumerate_start.elapsed();
        reporter.on_enumerate_complete(files.len(), enumerate_duration.as_secs_f64());
        debug!(
            "Enumeration completed in {:.2}s, {} files",
            enumerate_duration.as_secs_f64(),
            files.len()
        );

        // Phase 2: Group
        info!("Grouping duplicates with {}...", self.grouper.name());
        reporter.on_group_start(self.grouper.name());
        let group_start = Instant::now();
        let (groups, grouping_output) = if files.len() < 2 {
            (Vec::new(), None)
        } else {
            let output = self.grouper.group(&files, &context.dir)?;
            (grouping::resolve_live(output.groups, &files), output.raw_output)
        };
        let group_duration = group_start.elapsed();
        reporter.on_group_complete(groups.len(), group_duration.as_secs_f64());
        info!(
            "{} duplicate groups, {} bytes reclaimable",
            groups.len(),
            groups.iter().map(|g| g.wasted_bytes()).sum::<u64>()
        );

        // Phase 3: Resolve and execute
        let requests: Vec<DeletionRequest> = groups
            .iter()
            .map(analysis::resolve)
            .flat_map(|decision| DeletionRequest::from_decision(&decision))
            .collect();

        let completed = self.complete(
            &mut context,
            RunMode::Live,
            started_at,
            grouping_output.clone(),
            |executor, ledger, rows| executor.execute_all(&requests, ledger, reporter, rows),
        )?;

        Ok(RunOutcome {
            ledger_path: context.ledger.path().to_path_buf(),
            run_dir: context.dir,
            summary_path: completed.summary_path,
            grouping_output,
            summary: completed.summary,
            rows: completed.rows,
            files_enumerated: files.len(),
            duplicate_groups: groups.len(),
            enumerate_duration,
            group_duration,
            execute_duration: completed.execute_duration,
        })
    }

    /// Apply a reviewed plan file instead of computing one.
    pub fn replay(&self, plan_path: &Path, reporter: &dyn ProgressReporter) -> Result<RunOutcome> {
        let started_at = Utc::now();
        let plan = read_plan(plan_path).map_err(|e| {
            Error::Setup(format!("cannot read plan '{}': {}", plan_path.display(), e))
        })?;
        info!("Loaded {} plan rows from {}", plan.len(), plan_path.display());

        let mut context = RunContext::create(Path::new(&self.config.output_dir))?;
        info!(
            "Run directory: {} (dry run: {})",
            context.dir.display(),
            self.config.dry_run
        );

        let completed = self.complete(
            &mut context,
            RunMode::Replay,
            started_at,
            None,
            |executor, ledger, rows| execute_plan(&plan, executor, ledger, reporter, rows),
        )?;

        Ok(RunOutcome {
            ledger_path: context.ledger.path().to_path_buf(),
            run_dir: context.dir,
            summary_path: completed.summary_path,
            grouping_output: None,
            summary: completed.summary,
            rows: completed.rows,
            files_enumerated: 0,
            duplicate_groups: 0,
            enumerate_duration: Duration::ZERO,
            group_duration: Duration::ZERO,
            execute_duration: completed.execute_duration,
        })
    }

    /// Run the execution phase and write the summary. The summary is written
    /// even when execution stops on a ledger failure; that error is returned
    /// afterwards.
    fn complete<F>(
        &self,
        context: &mut RunContext,
        mode: RunMode,
        started_at: DateTime<Utc>,
        grouping_output: Option<PathBuf>,
        execute: F,
    ) -> Result<Completed>
    where
        F: FnOnce(&DeletionExecutor, &mut LedgerWriter, &mut Vec<LedgerRow>) -> Result<()>,
    {
        let executor = self.executor();
        let mut rows = Vec::new();

        let execute_start = Instant::now();
        let executed = execute(&executor, &mut context.ledger, &mut rows);
        let execute_duration = execute_start.elapsed();

        let aborted = executed.as_ref().err().map(|e| e.to_string());
        let finished = context.finish(
            &rows,
            mode,
            self.config.dry_run,
            started_at,
            grouping_output,
            aborted,
        );
        executed?;
        let (summary, summary_path) = finished?;

        Ok(Completed {
            rows,
            summary,
            summary_path,
            execute_duration,
        })
    }
}

/// Result of the execution phase shared by live runs and replays.
struct Completed {
    rows: Vec<LedgerRow>,
    summary: RunSummary,
    summary_path: PathBuf,
    execute_duration: Duration,
}

impl RunContext {
    fn create(output_dir: &Path) -> Result<Self> {
        let dir = create_run_dir(output_dir).map_err(|e| {
            Error::Setup(format!(
                "cannot create run directory under '{}': {}",
                output_dir.display(),
                e
            ))
        })?;
        let ledger = LedgerWriter::create(&dir.join(LEDGER_FILE))
            .map_err(|e| Error::Setup(format!("cannot create ledger: {}", e)))?;
        Ok(Self { dir, ledger })
    }

    fn finish(
        &self,
        rows: &[LedgerRow],
        mode: RunMode,
        dry_run: bool,
        started_at: DateTime<Utc>,
        grouping_output: Option<PathBuf>,
        aborted: Option<String>,
    ) -> Result<(RunSummary, PathBuf)> {
        let summary = summarize(rows);
        let artifact = SummaryArtifact {
            summary,
            mode,
            dry_run,
            started_at,
            finished_at: Utc::now(),
            ledger_path: self.ledger.path().to_path_buf(),
            grouping_output,
            aborted,
        };
        let summary_path = self.dir.join(SUMMARY_FILE);
        artifact.write(&summary_path)?;
        if let Some(reason) = &artifact.aborted {
            error!("Run aborted after {} attempts: {}", rows.len(), reason);
        }
        info!(
            "Run finished: {} deleted, {} skipped, {} errors, {} bytes reclaimed",
            summary.deleted, summary.skipped, summary.errors, summary.bytes_reclaimed
        );
        Ok((summary, summary_path))
    }
}

/// `<output_dir>/<UTC timestamp>`, with a `-N` counter if that name is taken.
fn create_run_dir(output_dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let stamp = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();

    let mut attempt = 0u32;
    loop {
        let name = if attempt == 0 {
            stamp.clone()
        } else {
            format!("{}-{}", stamp, attempt)
        };
        let dir = output_dir.join(name);
        match fs::create_dir(&dir) {
            Ok(()) => return fs::canonicalize(dir),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e),
        }
    }
}
