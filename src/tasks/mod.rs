//! Scheduled entry points. Each job talks to the outside world only through its reporter.

pub mod cleanup;
pub mod scan;

use crate::error::Error;
use crate::progress::ProgressReporter;

pub use cleanup::{CleanupTask, HostServices};
pub use scan::ScanTask;

pub trait ScheduledTask {
    fn name(&self) -> &'static str;
    fn execute(&self, reporter: &dyn ProgressReporter) -> Result<(), Error>;
}
