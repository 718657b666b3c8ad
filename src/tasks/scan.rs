use super::ScheduledTask;
use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::scanner::UnlinkedFileScanner;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

pub struct ScanTask<'a> {
    scanner: UnlinkedFileScanner<'a>,
}

impl<'a> ScanTask<'a> {
    pub fn new(scanner: UnlinkedFileScanner<'a>) -> Self {
        Self { scanner }
    }
}

impl ScheduledTask for ScanTask<'_> {
    fn name(&self) -> &'static str {
        "Scan for unlinked files"
    }

    fn execute(&self, reporter: &dyn ProgressReporter) -> Result<(), Error> {
        let summary = self.scanner.scan(reporter)?;
        reporter.write_line(&format!(
            "Total found: {:.3} GB",
            summary.total_size as f64 / GIB
        ));
        Ok(())
    }
}
