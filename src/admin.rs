//! Operator actions outside the scheduled jobs.

use crate::error::Error;
use crate::host::ContentStore;
use crate::progress::ProgressReporter;
use crate::query::NamedParams;
use crate::stats::years_ago;
use crate::storage::models::COURSE_DELETE_MODULES_TASK;
use crate::storage::{Database, RecordStore};
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};

/// The only component batch removal accepts.
pub const BATCH_REMOVABLE_COMPONENT: &str = "assignsubmission_file";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// Content unlinked and every record sharing its hash deleted.
    Removed { filename: String, records: usize },
    /// Content was already gone; the records were deleted.
    ContentMissing { filename: String, records: usize },
    /// Unlink failed; records kept.
    UnlinkFailed { filename: String, reason: String },
}

/// Remove one file's content and every file record that shares it.
pub fn remove_file(
    db: &Database,
    content: &dyn ContentStore,
    id: i64,
) -> Result<RemovalOutcome, Error> {
    let file = content
        .file_by_id(id)?
        .ok_or_else(|| Error::NotFound(format!("File {}", id)))?;

    if content.content_path(&file).is_none() {
        let records = db.delete_files_with_hash(&file.contenthash)?;
        info!("Content of file {} missing, removed {} records", id, records);
        return Ok(RemovalOutcome::ContentMissing {
            filename: file.filename,
            records,
        });
    }

    match content.delete_content(&file) {
        Ok(_) => {
            let records = db.delete_files_with_hash(&file.contenthash)?;
            info!("Removed file {} ({} records)", id, records);
            Ok(RemovalOutcome::Removed {
                filename: file.filename,
                records,
            })
        }
        Err(e) => {
            warn!("Failed to remove content of file {}: {}", id, e);
            Ok(RemovalOutcome::UnlinkFailed {
                filename: file.filename,
                reason: e.to_string(),
            })
        }
    }
}

/// Delete the records of old assignment submission files created before `until`.
///
/// `until` must lie at least one year before `now`.
pub fn batch_remove(
    db: &Database,
    component: &str,
    until: i64,
    now: DateTime<Utc>,
) -> Result<usize, Error> {
    if component != BATCH_REMOVABLE_COMPONENT || until > years_ago(now, 1).timestamp() {
        return Err(Error::InvalidRequest(
            "Provided time range or component name is not acceptable!".to_string(),
        ));
    }

    let removed = db.delete_where(
        "files",
        "component = :component AND timecreated < :until",
        &NamedParams::new()
            .with("component", component)
            .with("until", until),
    )?;
    info!("Batch removal deleted {} {} records", removed, component);
    Ok(removed)
}

/// Replace every queued course-module deletion task with one fresh task per course
/// that still has modules flagged for deletion. Returns the number of tasks queued.
pub fn reinit_module_cleanup(
    db: &Database,
    admin_id: i64,
    reporter: &dyn ProgressReporter,
) -> Result<usize, Error> {
    let admin = db.scalar(
        "SELECT id FROM user WHERE id = :id AND deleted = 0",
        &NamedParams::new().with("id", admin_id),
    )?;
    if admin.is_none() {
        return Err(Error::NotFound("Admin user".to_string()));
    }

    reporter.write_line(&format!(
        "Course modules clean-up reinitialization started at {}",
        Utc::now().to_rfc3339()
    ));

    reporter.write("Removing existing modules removal adhoc tasks... ");
    db.delete_adhoc_tasks_by_class(COURSE_DELETE_MODULES_TASK)?;
    reporter.write_line("OK");

    reporter.write("Selecting courses with modules for removal... ");
    let pending = db.modules_pending_deletion()?;
    reporter.write_line("OK");

    let mut queued = 0;
    for (course, modules) in pending {
        reporter.write(&format!(
            "Selecting course modules for removal in course {}... ",
            course
        ));

        let cms: Vec<_> = modules.iter().map(|id| json!({ "id": id })).collect();
        let customdata = json!({
            "cms": cms,
            "userid": admin_id,
            "realuserid": admin_id,
        });
        db.queue_adhoc_task(
            COURSE_DELETE_MODULES_TASK,
            &customdata.to_string(),
            Some(admin_id),
        )?;
        queued += 1;

        reporter.write_line("OK");
    }

    reporter.write_line(&format!(
        "Course modules clean-up reinitialization finished at {}",
        Utc::now().to_rfc3339()
    ));
    Ok(queued)
}
