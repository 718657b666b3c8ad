pub mod admin;
pub mod config;
pub mod error;
pub mod finder;
pub mod host;
pub mod progress;
pub mod query;
pub mod scanner;
pub mod stats;
pub mod steps;
pub mod storage;
pub mod sweep;
pub mod tasks;

pub use config::{AppConfig, CleanupConfig};
pub use error::Error;
pub use progress::{CaptureReporter, ProgressReporter, SilentReporter, TraceReporter};
pub use storage::{Database, RecordStore};
pub use tasks::{CleanupTask, ScanTask, ScheduledTask};
