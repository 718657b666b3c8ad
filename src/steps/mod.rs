//! Retention steps. Each one owns a single policy and reports through a `ProgressReporter`.

pub mod component_files;
pub mod course_modules;
pub mod files_checkout;
pub mod ghost_files;
pub mod grades;
pub mod logs;

use crate::error::Error;
use crate::progress::ProgressReporter;

pub use component_files::ComponentFilesStep;
pub use course_modules::CourseModulesStep;
pub use files_checkout::FilesCheckoutStep;
pub use ghost_files::GhostFilesStep;
pub use grades::GradesStep;
pub use logs::LogsStep;

pub trait CleanupStep {
    fn name(&self) -> &'static str;

    /// Run the policy once. Outcomes go to the reporter; store failures propagate.
    fn sweep(&self, reporter: &dyn ProgressReporter) -> Result<(), Error>;
}

/// Unix timestamp `age` before now.
pub(crate) fn cutoff(age: chrono::Duration) -> Result<i64, Error> {
    chrono::Utc::now()
        .checked_sub_signed(age)
        .map(|moment| moment.timestamp())
        .ok_or_else(|| {
            Error::Other(format!(
                "retention window of {} days reaches past the earliest representable date",
                age.num_days()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_cutoff_is_in_the_past() {
        let now = chrono::Utc::now().timestamp();
        let cutoff = cutoff(Duration::days(1)).unwrap();
        assert!((now - 86_400 - cutoff).abs() <= 1);
    }

    #[test]
    fn test_cutoff_rejects_unrepresentable_window() {
        let age = Duration::try_days(1_000_000_000).unwrap();
        let err = cutoff(age).unwrap_err();
        assert!(err.to_string().contains("1000000000 days"));
    }
}
