use super::CleanupStep;
use crate::error::Error;
use crate::host::ContentStore;
use crate::progress::ProgressReporter;
use crate::storage::models::FileRecord;
use crate::storage::{Database, RecordStore};
use chrono::{Duration, Utc};
use tracing::warn;

pub const BACKUP_SUFFIX: &str = ".mbz";
pub const DRAFT_AREA: &str = "draft";

/// Walks every file record and inspects the content behind it.
///
/// Records whose content is missing are dropped. Expired backup archives and
/// expired drafts that nothing else shares are removed with their content.
pub struct FilesCheckoutStep<'a> {
    db: &'a Database,
    content: &'a dyn ContentStore,
    backup_timeout: Duration,
    draft_timeout: Duration,
}

impl<'a> FilesCheckoutStep<'a> {
    pub fn new(
        db: &'a Database,
        content: &'a dyn ContentStore,
        backup_timeout: Duration,
        draft_timeout: Duration,
    ) -> Self {
        Self {
            db,
            content,
            backup_timeout,
            draft_timeout,
        }
    }

    /// `Ok(true)` keeps the record.
    fn checkout(&self, id: i64, reporter: &dyn ProgressReporter) -> Result<bool, Error> {
        let file = match self.content.file_by_id(id)? {
            Some(file) => file,
            None => return Ok(true),
        };

        if self.content.content_path(&file).is_none() {
            reporter.write_line(&format!(
                "File \"{}\" is not found or not readable. Removed.",
                id
            ));
            return Ok(false);
        }

        let now = Utc::now().timestamp();

        if file.filename.ends_with(BACKUP_SUFFIX)
            && file.timecreated <= now.saturating_sub(self.backup_timeout.num_seconds())
        {
            // Content shared with another record stays on disk.
            if self.db.count_files_with_hash(&file.contenthash)? <= 1 {
                self.unlink(&file, reporter);
            }
            reporter.write_line(&format!(
                "Backup \"{}\" ({}) is outdated. Removed.",
                file.filename, file.contenthash
            ));
            return Ok(false);
        }

        if file.filearea == DRAFT_AREA
            && file.timecreated <= now.saturating_sub(self.draft_timeout.num_seconds())
            && self.db.count_files_with_hash(&file.contenthash)? == 1
        {
            self.unlink(&file, reporter);
            reporter.write_line(&format!(
                "Outdated draft \"{}\" ({}). Removed.",
                file.filename, file.contenthash
            ));
            return Ok(false);
        }

        Ok(true)
    }

    fn unlink(&self, file: &FileRecord, reporter: &dyn ProgressReporter) {
        if let Err(e) = self.content.delete_content(file) {
            warn!("Could not unlink content {}: {}", file.contenthash, e);
            reporter.write_line(&format!(
                "E: could not unlink content of file \"{}\": {}",
                file.id, e
            ));
        }
    }
}

impl CleanupStep for FilesCheckoutStep<'_> {
    fn name(&self) -> &'static str {
        "files checkout"
    }

    fn sweep(&self, reporter: &dyn ProgressReporter) -> Result<(), Error> {
        reporter.write("Fetching records... ");

        let ids = self.db.all_file_ids()?;
        let count = ids.len();

        reporter.write_line(&format!("{} records found.", count));
        reporter.write("Processing... ");

        let mut progress = 0;
        for (index, id) in ids.into_iter().enumerate() {
            let done = (index * 100).div_ceil(count);
            if done > progress {
                reporter.write(&format!("{}%... ", done));
                progress = done;
            }

            if !self.checkout(id, reporter)? {
                self.db.delete_by_ids("files", "id", &[id])?;
            }
        }

        reporter.write_line("Done.");
        Ok(())
    }
}
