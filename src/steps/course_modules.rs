use super::{cutoff, CleanupStep};
use crate::error::Error;
use crate::host::{purge_module_data, ModuleDeleter, ModuleHooks};
use crate::progress::ProgressReporter;
use crate::query::NamedParams;
use crate::storage::models::DeferredTask;
use crate::storage::{Database, RecordStore};
use chrono::Duration;
use serde_json::Value;
use tracing::{debug, warn};

/// Course modules left behind by deleted courses or by deletion tasks that keep failing.
///
/// Orphans go first: deleting them may resolve targets listed in the deferred tasks.
/// A deferred task is removed only when every module it lists was processed.
pub struct CourseModulesStep<'a> {
    db: &'a Database,
    deleter: &'a dyn ModuleDeleter,
    hooks: &'a dyn ModuleHooks,
    retention: Duration,
}

impl<'a> CourseModulesStep<'a> {
    pub fn new(
        db: &'a Database,
        deleter: &'a dyn ModuleDeleter,
        hooks: &'a dyn ModuleHooks,
        retention: Duration,
    ) -> Self {
        Self {
            db,
            deleter,
            hooks,
            retention,
        }
    }

    fn sweep_orphans(&self, reporter: &dyn ProgressReporter) -> Result<(), Error> {
        reporter.write_line("Checking for course modules tied to deleted courses...");

        let orphans = self.db.fieldset(
            "SELECT cm.id FROM course_modules cm \
             LEFT JOIN course c ON cm.course = c.id \
             WHERE c.id IS NULL ORDER BY cm.id",
            &NamedParams::new(),
        )?;

        if orphans.is_empty() {
            reporter.write_line("No orphaned course modules found.");
            return Ok(());
        }

        reporter.write_line(&format!(
            "Found {} orphaned course modules. Cleaning up...",
            orphans.len()
        ));

        for id in orphans {
            if let Err(e) = self.delete_course_module(id, reporter) {
                warn!("Orphaned course module {} not removed: {}", id, e);
                reporter.write_line(&format!(
                    "Failed to delete orphaned course module {}: {}",
                    id, e
                ));
            }
        }

        reporter.write_line("Orphaned course modules cleanup completed.");
        Ok(())
    }

    fn sweep_stalled_tasks(&self, reporter: &dyn ProgressReporter) -> Result<(), Error> {
        let tasks = self
            .db
            .stalled_module_deletion_tasks(cutoff(self.retention)?)?;

        for task in tasks {
            let targets = match task_targets(&task) {
                Ok(targets) => targets,
                Err(e) => {
                    warn!("Deferred task {} has unreadable data: {}", task.id, e);
                    reporter.write_line(&format!("Failed to read task {}: {}", task.id, e));
                    continue;
                }
            };

            let mut success = true;
            for id in targets {
                if let Err(e) = self.delete_course_module(id, reporter) {
                    reporter.write_line(&format!("Failed to delete course module {}: {}", id, e));
                    success = false;
                }
            }

            if success {
                self.db.delete_adhoc_task(task.id)?;
                debug!("Deferred task {} resolved", task.id);
            }
        }

        Ok(())
    }

    /// A missing module counts as done, as does a module whose plugin is gone.
    /// Any other failure of the normal routine falls back to purging the module's data.
    fn delete_course_module(&self, id: i64, reporter: &dyn ProgressReporter) -> Result<(), Error> {
        reporter.write(&format!("Deleting course module {}...", id));

        let cm = match self.db.get_course_module(id)? {
            Some(cm) => cm,
            None => {
                reporter.write_line("Failed: Course module not found.");
                return Ok(());
            }
        };

        if let Err(e) = self.deleter.delete_module(&cm) {
            reporter.write_line(&format!("Failed: {}", e));

            if matches!(e, Error::MissingModulePlugin(_)) {
                return Ok(());
            }

            reporter.write("Failed to remove normally. Now trying to clean-up... ");
            purge_module_data(self.db, self.hooks, &cm)?;
        }

        reporter.write_line("OK");
        Ok(())
    }
}

impl CleanupStep for CourseModulesStep<'_> {
    fn name(&self) -> &'static str {
        "course modules"
    }

    fn sweep(&self, reporter: &dyn ProgressReporter) -> Result<(), Error> {
        self.sweep_orphans(reporter)?;
        self.sweep_stalled_tasks(reporter)
    }
}

/// Course module ids listed in a deletion task's `cms` entry.
///
/// The host writes either a list or an id-keyed map, of module objects carrying
/// an `id`; bare ids are accepted too.
pub fn task_targets(task: &DeferredTask) -> Result<Vec<i64>, Error> {
    let data: Value = serde_json::from_str(&task.customdata)?;

    let entries: Vec<&Value> = match data.get("cms") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Object(items)) => items.values().collect(),
        _ => return Err(Error::Other(format!("task {} lists no course modules", task.id))),
    };

    entries
        .into_iter()
        .map(|entry| {
            entry
                .get("id")
                .unwrap_or(entry)
                .as_i64()
                .ok_or_else(|| Error::Other(format!("bad course module entry {}", entry)))
        })
        .collect()
}
