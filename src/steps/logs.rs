use super::{cutoff, CleanupStep};
use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::query::CandidateQuery;
use crate::storage::RecordStore;
use crate::sweep::BatchSweeper;
use chrono::Duration;
use tracing::info;

/// Always present in the host schema.
pub const STANDARD_LOG_TABLE: &str = "logstore_standard_log";

/// Audit log entries whose context is gone or that are older than the retention window.
///
/// The standard log table is mandatory. Optional tables are probed first and
/// skipped with a notice when the store does not have them.
pub struct LogsStep<'a> {
    store: &'a dyn RecordStore,
    optional_tables: Vec<String>,
    retention: Duration,
    sweeper: BatchSweeper,
}

impl<'a> LogsStep<'a> {
    pub fn new(store: &'a dyn RecordStore, optional_tables: Vec<String>, retention: Duration) -> Self {
        Self {
            store,
            optional_tables,
            retention,
            sweeper: BatchSweeper::new(),
        }
    }

    pub fn with_sweeper(mut self, sweeper: BatchSweeper) -> Self {
        self.sweeper = sweeper;
        self
    }

    pub fn candidate_query(table: &str, cutoff: i64) -> CandidateQuery {
        CandidateQuery::select(table, "l")
            .join("LEFT JOIN context ctx ON ctx.id = l.contextid")
            .filter("ctx.id IS NULL OR l.timecreated < :cutoffdate")
            .bind("cutoffdate", cutoff)
    }

    fn sweep_log_table(
        &self,
        table: &str,
        cutoff: i64,
        reporter: &dyn ProgressReporter,
    ) -> Result<(), Error> {
        self.sweeper.sweep_table(
            self.store,
            &Self::candidate_query(table, cutoff),
            &format!(
                "Checking for logs to clean up (obsolete or older than {} days)...",
                self.retention.num_days()
            ),
            reporter,
        )?;
        Ok(())
    }
}

impl CleanupStep for LogsStep<'_> {
    fn name(&self) -> &'static str {
        "logs"
    }

    fn sweep(&self, reporter: &dyn ProgressReporter) -> Result<(), Error> {
        reporter.write_line("Starting logs cleanup...");

        let cutoff = cutoff(self.retention)?;
        self.sweep_log_table(STANDARD_LOG_TABLE, cutoff, reporter)?;

        for table in &self.optional_tables {
            if !self.store.table_exists(table)? {
                info!("Optional log table {} not present", table);
                reporter.write_line(&format!(
                    "Skipping {} cleanup: table {} does not exist.",
                    table, table
                ));
                continue;
            }
            self.sweep_log_table(table, cutoff, reporter)?;
        }

        reporter.write_line("Logs cleanup completed.");
        Ok(())
    }
}
