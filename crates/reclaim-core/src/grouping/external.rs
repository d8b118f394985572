use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{DuplicateGrouper, GroupingOutput, ReportedGroup};
use crate::error::{Error, Result};
use crate::model::FileRecord;

pub const CANDIDATE_LIST_FILE: &str = "candidates.txt";
pub const RAW_OUTPUT_FILE: &str = "grouping-output.csv";
const STDERR_FILE: &str = "grouping-stderr.log";
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs an external fingerprinting tool.
///
/// The candidate list is written one path per line. `{list}` and `{output}` in
/// the arguments are replaced with the list and raw output paths; when no
/// argument mentions `{output}`, the tool's stdout is captured as the output.
/// The output must be CSV with a `hash,path` header.
#[derive(Debug, Clone)]
pub struct ExternalToolGrouper {
    command: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

#[derive(Debug, Deserialize)]
struct OutputRow {
    hash: String,
    path: String,
}

impl ExternalToolGrouper {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn spawn(&self, list_path: &Path, output_path: &Path, work_dir: &Path) -> Result<Child> {
        let uses_output = self.args.iter().any(|a| a.contains("{output}"));
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| {
                a.replace("{list}", &list_path.to_string_lossy())
                    .replace("{output}", &output_path.to_string_lossy())
            })
            .collect();

        let stdout = if uses_output {
            Stdio::null()
        } else {
            Stdio::from(File::create(output_path)?)
        };
        let stderr = Stdio::from(File::create(work_dir.join(STDERR_FILE))?);

        debug!("Running grouping tool: {} {:?}", self.command, args);
        Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|e| Error::Setup(format!("cannot start grouping tool '{}': {}", self.command, e)))
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus> {
        let Some(timeout) = self.timeout else {
            return Ok(child.wait()?);
        };

        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if started.elapsed() >= timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Grouper(format!(
                    "'{}' did not finish within {:.1}s",
                    self.command,
                    timeout.as_secs_f64()
                )));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl DuplicateGrouper for ExternalToolGrouper {
    fn name(&self) -> &str {
        &self.command
    }

    fn group(&self, files: &[FileRecord], work_dir: &Path) -> Result<GroupingOutput> {
        let list_path = work_dir.join(CANDIDATE_LIST_FILE);
        let output_path = work_dir.join(RAW_OUTPUT_FILE);
        write_candidate_list(&list_path, files)?;

        let mut child = self.spawn(&list_path, &output_path, work_dir)?;
        let status = self.wait(&mut child)?;

        let output_len = fs::metadata(&output_path).map(|m| m.len()).unwrap_or(0);
        if output_len == 0 {
            if !status.success() {
                warn!("Grouping tool exited with {} and produced no output", status);
            } else {
                info!("Grouping tool produced no output");
            }
            return Ok(GroupingOutput {
                groups: Vec::new(),
                raw_output: output_path.exists().then_some(output_path),
            });
        }

        if !status.success() {
            warn!(
                "Grouping tool exited with {}; using the output it produced",
                status
            );
        }

        let groups = parse_grouping_csv(File::open(&output_path)?);
        Ok(GroupingOutput {
            groups,
            raw_output: Some(output_path),
        })
    }
}

fn write_candidate_list(path: &Path, files: &[FileRecord]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for file in files {
        writeln!(writer, "{}", file.path.display())?;
    }
    writer.flush()?;
    Ok(())
}

/// Parse `hash,path` rows into groups, keeping first-appearance order.
/// Malformed rows are logged and skipped.
pub fn parse_grouping_csv<R: Read>(reader: R) -> Vec<ReportedGroup> {
    let mut csv_reader = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    let mut groups: Vec<ReportedGroup> = Vec::new();
    let mut by_hash: HashMap<String, usize> = HashMap::new();

    for (line, row) in csv_reader.deserialize::<OutputRow>().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                warn!("Skipping malformed grouping row {}: {}", line + 2, err);
                continue;
            }
        };
        if row.hash.is_empty() || row.path.is_empty() {
            warn!("Skipping incomplete grouping row {}", line + 2);
            continue;
        }

        let index = *by_hash.entry(row.hash.clone()).or_insert_with(|| {
            groups.push(ReportedGroup {
                fingerprint: row.hash.clone(),
                paths: Vec::new(),
            });
            groups.len() - 1
        });
        groups[index].paths.push(PathBuf::from(row.path));
    }

    groups
}
