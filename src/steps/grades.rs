use super::{cutoff, CleanupStep};
use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::query::CandidateQuery;
use crate::storage::RecordStore;
use crate::sweep::BatchSweeper;
use chrono::Duration;

/// Gradebook orphans, plus grade history past the retention window.
pub struct GradesStep<'a> {
    store: &'a dyn RecordStore,
    retention: Duration,
    sweeper: BatchSweeper,
}

impl<'a> GradesStep<'a> {
    pub fn new(store: &'a dyn RecordStore, retention: Duration) -> Self {
        Self {
            store,
            retention,
            sweeper: BatchSweeper::new(),
        }
    }

    pub fn with_sweeper(mut self, sweeper: BatchSweeper) -> Self {
        self.sweeper = sweeper;
        self
    }

    /// The sub-sweeps in execution order, each with its progress description.
    pub fn sub_sweeps(&self, cutoff: i64) -> Vec<(CandidateQuery, String)> {
        vec![
            (
                CandidateQuery::select("grade_items", "gi")
                    .join("LEFT JOIN course c ON gi.courseid = c.id")
                    .filter("gi.courseid IS NOT NULL")
                    .filter("c.id IS NULL"),
                "Checking for grade items tied to deleted courses...".to_string(),
            ),
            (
                CandidateQuery::select("grade_items", "gi")
                    .filter("gi.itemtype = 'mod'")
                    .filter(
                        "NOT EXISTS (SELECT 1 FROM course_modules cm \
                         WHERE cm.course = gi.courseid AND cm.instance = gi.iteminstance)",
                    ),
                "Checking for grade items tied to deleted modules...".to_string(),
            ),
            (
                CandidateQuery::select("grade_grades", "gg")
                    .join("LEFT JOIN grade_items gi ON gi.id = gg.itemid")
                    .filter("gi.id IS NULL"),
                "Checking for grade grades with no corresponding grade items...".to_string(),
            ),
            (
                CandidateQuery::select("grade_grades", "gg")
                    .join("LEFT JOIN user u ON gg.userid = u.id")
                    .filter("u.id IS NULL"),
                "Checking for grade grades tied to deleted users...".to_string(),
            ),
            (
                CandidateQuery::select("grade_categories", "gc")
                    .join("LEFT JOIN course c ON gc.courseid = c.id")
                    .filter("c.id IS NULL"),
                "Checking for grade categories tied to deleted courses...".to_string(),
            ),
            (
                CandidateQuery::select("grade_outcomes_courses", "goc")
                    .join("LEFT JOIN course c ON goc.courseid = c.id")
                    .filter("c.id IS NULL"),
                "Checking for grade outcomes courses tied to deleted courses...".to_string(),
            ),
            (
                CandidateQuery::select("grade_grades_history", "ggh")
                    .join("LEFT JOIN grade_items gi ON ggh.itemid = gi.id")
                    .filter("gi.id IS NULL OR ggh.timemodified < :cutoffdate")
                    .bind("cutoffdate", cutoff),
                format!(
                    "Checking for grade grades history with no corresponding grade items or older than {} days...",
                    self.retention.num_days()
                ),
            ),
        ]
    }
}

impl CleanupStep for GradesStep<'_> {
    fn name(&self) -> &'static str {
        "grades"
    }

    fn sweep(&self, reporter: &dyn ProgressReporter) -> Result<(), Error> {
        reporter.write_line("Starting grades cleanup...");

        for (query, description) in self.sub_sweeps(cutoff(self.retention)?) {
            self.sweeper
                .sweep_table(self.store, &query, &description, reporter)?;
        }

        reporter.write_line("Grades cleanup completed.");
        Ok(())
    }
}
