pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod grouping;
pub mod model;
pub mod platform;
pub mod progress;
pub mod report;
pub mod scanner;

pub use config::AppConfig;
pub use engine::{DedupeEngine, RunOutcome};
pub use error::{Error, Result};
pub use progress::{ProgressReporter, SilentReporter};
