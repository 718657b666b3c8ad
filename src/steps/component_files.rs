use super::{cutoff, CleanupStep};
use crate::config::BACKUP_COMPONENT;
use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::query::CandidateQuery;
use crate::storage::RecordStore;
use crate::sweep::BatchSweeper;
use chrono::Duration;

/// Deletes file records of the configured components once they outlive the retention window.
pub struct ComponentFilesStep<'a> {
    store: &'a dyn RecordStore,
    components: Vec<String>,
    retention: Duration,
    sweeper: BatchSweeper,
}

impl<'a> ComponentFilesStep<'a> {
    pub fn new(store: &'a dyn RecordStore, components: Vec<String>, retention: Duration) -> Self {
        Self {
            store,
            components,
            retention,
            sweeper: BatchSweeper::new(),
        }
    }

    pub fn with_sweeper(mut self, sweeper: BatchSweeper) -> Self {
        self.sweeper = sweeper;
        self
    }

    /// Backups rewrite the same record while they run, so they age from their last modification.
    pub fn candidate_query(component: &str, cutoff: i64) -> CandidateQuery {
        let age_column = if component == BACKUP_COMPONENT {
            "timemodified"
        } else {
            "timecreated"
        };

        CandidateQuery::select("files", "f")
            .filter("f.component = :component")
            .filter(&format!("f.{} < :cutoffdate", age_column))
            .bind("component", component)
            .bind("cutoffdate", cutoff)
    }
}

impl CleanupStep for ComponentFilesStep<'_> {
    fn name(&self) -> &'static str {
        "component files"
    }

    fn sweep(&self, reporter: &dyn ProgressReporter) -> Result<(), Error> {
        reporter.write_line("Starting component files cleanup...");

        let cutoff = cutoff(self.retention)?;

        for component in &self.components {
            reporter.write_line(&format!("Processing component '{}'...", component));

            self.sweeper.sweep_table(
                self.store,
                &Self::candidate_query(component, cutoff),
                &format!("Checking for files to clean up in component '{}'...", component),
                reporter,
            )?;
        }

        reporter.write_line("Component files cleanup completed.");
        Ok(())
    }
}
