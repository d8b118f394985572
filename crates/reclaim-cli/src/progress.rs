use indicatif::{ProgressBar, ProgressStyle};
use reclaim_core::ProgressReporter;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Terminal progress for the three run phases.
///
/// Enumeration and grouping have no known total and get a spinner; the
/// execution phase gets a bar over the candidate count.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        // A poisoned lock only means a previous bar update panicked.
        self.bar.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut slot = self.slot();
        if let Some(old) = slot.take() {
            old.finish_and_clear();
        }
        *slot = Some(pb);
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.slot().take() {
            pb.finish_and_clear();
        }
    }

    fn spinner(&self, message: String) {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            pb.set_style(style.tick_chars(TICK_CHARS));
        }
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }
}

impl ProgressReporter for CliReporter {
    fn on_enumerate_start(&self) {
        self.spinner("Enumerating files...".to_string());
    }

    fn on_enumerate_complete(&self, total_files: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Enumeration complete: {} files in {:.2}s",
            total_files, duration_secs
        );
    }

    fn on_group_start(&self, backend: &str) {
        self.spinner(format!("Grouping duplicates ({})...", backend));
    }

    fn on_group_complete(&self, groups: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Grouping complete: {} duplicate groups in {:.2}s",
            groups, duration_secs
        );
    }

    fn on_execute_start(&self, total: usize, dry_run: bool) {
        let verb = if dry_run { "Simulating" } else { "Deleting" };
        let pb = ProgressBar::new(total as u64);
        let template = format!(
            "  {{spinner:.cyan}} {} [{{bar:30.cyan/dim}}] {{pos}}/{{len}} files ({{eta}} remaining)",
            verb
        );
        if let Ok(style) = ProgressStyle::with_template(&template) {
            pb.set_style(style.progress_chars("━╸─").tick_chars(TICK_CHARS));
        }
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_execute_progress(&self, done: usize, _total: usize) {
        if let Some(pb) = self.slot().as_ref() {
            pb.set_position(done as u64);
        }
    }

    fn on_execute_complete(&self, succeeded: usize, failed: usize, duration_secs: f64) {
        self.finish_bar();
        let mark = if failed == 0 {
            "\x1b[32m✓\x1b[0m"
        } else {
            "\x1b[31m✗\x1b[0m"
        };
        eprintln!(
            "  {} Execution complete: {} ok, {} failed in {:.2}s",
            mark, succeeded, failed, duration_secs
        );
    }
}
