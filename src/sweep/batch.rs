use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::query::CandidateQuery;
use crate::storage::RecordStore;
use std::time::{Duration, Instant};
use tracing::debug;

/// Keys per delete statement. Stays under the bound-parameter limits of common SQL backends.
pub const CHUNK_SIZE: usize = 999;

/// Keys fetched per candidate page.
pub const PAGE_SIZE: usize = CHUNK_SIZE * 100;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Sum of the chunk sizes handed to the store, not a re-count.
    pub deleted: usize,
    pub pages: usize,
    pub delete_calls: usize,
}

/// Pages through candidate keys with a monotonic key cursor and deletes them in chunks.
///
/// Each page is bounded by `key > last_seen ORDER BY key ASC LIMIT page_size`, so rows
/// inserted behind the cursor while a sweep runs are never revisited, and deletions made
/// by the sweep itself cannot shift later pages the way an OFFSET would. Paging continues
/// while a full page comes back; an exact multiple of the page size costs one empty fetch.
///
/// There is no transaction around a page; every chunk delete is its own unit of work.
/// A failing delete aborts the sweep and is returned to the caller.
#[derive(Debug, Clone, Copy)]
pub struct BatchSweeper {
    page_size: usize,
    chunk_size: usize,
}

impl Default for BatchSweeper {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchSweeper {
    pub fn new() -> Self {
        Self {
            page_size: PAGE_SIZE,
            chunk_size: CHUNK_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn sweep_table<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        query: &CandidateQuery,
        description: &str,
        reporter: &dyn ProgressReporter,
    ) -> Result<SweepOutcome, Error> {
        let table = query.table();
        reporter.write_line(&format!("Cleaning {}: {}", table, description));

        let mut outcome = SweepOutcome::default();
        let mut last_id = i64::MIN;

        loop {
            if outcome.pages > 0 {
                reporter.write_line(&format!(
                    "Cleaning {}: Loading batch {}...",
                    table,
                    outcome.pages + 1
                ));
            }

            let (sql, params) = query.page(last_id, self.page_size);
            let started = Instant::now();

            let ids = store.fieldset(&sql, &params)?;
            let fetched = ids.len();
            outcome.pages += 1;
            if let Some(last) = ids.last() {
                last_id = *last;
            }

            if fetched > 0 {
                reporter.write("Deleting..");

                for chunk in ids.chunks(self.chunk_size) {
                    store.delete_by_ids(table, query.key_column(), chunk)?;
                    outcome.deleted += chunk.len();
                    outcome.delete_calls += 1;
                    reporter.write(".");
                }

                reporter.write_line(&format!(
                    "OK (took {})",
                    format_elapsed(started.elapsed())
                ));
            }

            if fetched != self.page_size {
                break;
            }
        }

        debug!(
            "Swept {}: {} rows in {} delete calls over {} pages",
            table, outcome.deleted, outcome.delete_calls, outcome.pages
        );

        if outcome.deleted == 0 {
            reporter.write_line("None found.");
        } else {
            reporter.write_line(&format!(
                "Total records deleted: {}. Done.",
                outcome.deleted
            ));
        }

        Ok(outcome)
    }
}

/// `MM:SS`, minutes unbounded.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
