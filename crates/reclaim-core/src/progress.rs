/// Trait for reporting run progress.
///
/// The CLI implements it with indicatif; tests use [`SilentReporter`].
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_enumerate_start(&self) {}
    fn on_enumerate_complete(&self, _total_files: usize, _duration_secs: f64) {}
    fn on_group_start(&self, _backend: &str) {}
    fn on_group_complete(&self, _groups: usize, _duration_secs: f64) {}
    fn on_execute_start(&self, _total: usize, _dry_run: bool) {}
    fn on_execute_progress(&self, _done: usize, _total: usize) {}
    fn on_execute_complete(&self, _succeeded: usize, _failed: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
