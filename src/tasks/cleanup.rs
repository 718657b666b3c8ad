use super::ScheduledTask;
use crate::config::CleanupConfig;
use crate::error::Error;
use crate::host::{ContentStore, ModuleDeleter, ModuleHooks};
use crate::progress::ProgressReporter;
use crate::steps::{
    CleanupStep, ComponentFilesStep, CourseModulesStep, FilesCheckoutStep, GhostFilesStep,
    GradesStep, LogsStep,
};
use crate::storage::Database;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Host collaborators the steps need beyond the record store.
#[derive(Clone, Copy)]
pub struct HostServices<'a> {
    pub content: &'a dyn ContentStore,
    pub deleter: &'a dyn ModuleDeleter,
    pub hooks: &'a dyn ModuleHooks,
}

/// Runs the configured steps in order against one reporter.
///
/// The first failing step ends the run; the next scheduled run picks up from the store.
pub struct CleanupTask<'a> {
    steps: Vec<Box<dyn CleanupStep + 'a>>,
}

impl<'a> CleanupTask<'a> {
    pub fn new(steps: Vec<Box<dyn CleanupStep + 'a>>) -> Self {
        Self { steps }
    }

    /// With auto-removal off only the files checkout runs.
    pub fn from_config(
        db: &'a Database,
        host: HostServices<'a>,
        config: &CleanupConfig,
        data_root: &Path,
    ) -> Self {
        let mut steps: Vec<Box<dyn CleanupStep + 'a>> = Vec::new();

        if config.auto_remove {
            steps.push(Box::new(CourseModulesStep::new(
                db,
                host.deleter,
                host.hooks,
                config.course_modules_retention(),
            )));
            steps.push(Box::new(GradesStep::new(db, config.grades_retention())));
            steps.push(Box::new(LogsStep::new(
                db,
                config.optional_log_tables.clone(),
                config.logs_timeout(),
            )));
            steps.push(Box::new(ComponentFilesStep::new(
                db,
                config.components.clone(),
                config.component_files_retention(),
            )));
            steps.push(Box::new(GhostFilesStep::new(db, data_root)));
        }

        steps.push(Box::new(FilesCheckoutStep::new(
            db,
            host.content,
            config.backup_timeout(),
            config.draft_timeout(),
        )));

        Self { steps }
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.name()).collect()
    }
}

impl ScheduledTask for CleanupTask<'_> {
    fn name(&self) -> &'static str {
        "Database and disk clean-up"
    }

    fn execute(&self, reporter: &dyn ProgressReporter) -> Result<(), Error> {
        for step in &self.steps {
            let started = Instant::now();
            info!("Running {} step", step.name());
            step.sweep(reporter)?;
            info!(
                "Finished {} step in {:.2}s",
                step.name(),
                started.elapsed().as_secs_f64()
            );
        }
        Ok(())
    }
}
