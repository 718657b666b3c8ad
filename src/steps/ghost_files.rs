use super::CleanupStep;
use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::storage::Database;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Candidates read from the store per round trip.
pub const STRAY_PAGE_SIZE: usize = 1000;

/// Unlinks the stray files recorded by the scanner.
///
/// Every candidate row is dropped after its attempt, successful or not.
pub struct GhostFilesStep<'a> {
    db: &'a Database,
    data_root: PathBuf,
    page_size: usize,
}

impl<'a> GhostFilesStep<'a> {
    pub fn new(db: &'a Database, data_root: impl Into<PathBuf>) -> Self {
        Self {
            db,
            data_root: data_root.into(),
            page_size: STRAY_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

impl CleanupStep for GhostFilesStep<'_> {
    fn name(&self) -> &'static str {
        "ghost files"
    }

    fn sweep(&self, reporter: &dyn ProgressReporter) -> Result<(), Error> {
        reporter.write("Deleting unlinked files... ");

        let mut last_id = 0;
        loop {
            let page = self.db.stray_files_after(last_id, self.page_size)?;
            let fetched = page.len();

            for candidate in page {
                let path = self.data_root.join(&candidate.path);

                match fs::remove_file(&path) {
                    Ok(()) => reporter.write("."),
                    Err(e) => {
                        debug!("Could not remove {:?}: {}", path, e);
                        reporter.write("E");
                    }
                }

                self.db.delete_stray_file(candidate.id)?;
                last_id = candidate.id;
            }

            if fetched < self.page_size {
                break;
            }
        }

        reporter.write_line("Done!");
        Ok(())
    }
}
