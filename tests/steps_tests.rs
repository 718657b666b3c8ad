use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use rusqlite::params;
use tempfile::tempdir;

use lms_cleanup::host::{
    ContentStore, FileDirStore, ModuleDeletedEvent, ModuleDeleter, ModuleHooks,
};
use lms_cleanup::steps::{
    CleanupStep, ComponentFilesStep, CourseModulesStep, FilesCheckoutStep, GhostFilesStep,
    GradesStep, LogsStep,
};
use lms_cleanup::storage::models::{CourseModule, FileRecord, COURSE_DELETE_MODULES_TASK};
use lms_cleanup::{CaptureReporter, Database, Error};

const DAY: i64 = 24 * 60 * 60;

fn days_ago(days: i64) -> i64 {
    Utc::now().timestamp() - days * DAY
}

fn count(db: &Database, table: &str) -> i64 {
    db.connection()
        .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
        .unwrap()
}

fn ids(db: &Database, table: &str) -> Vec<i64> {
    let mut stmt = db
        .connection()
        .prepare(&format!("SELECT id FROM {} ORDER BY id", table))
        .unwrap();
    stmt.query_map([], |r| r.get(0))
        .unwrap()
        .collect::<rusqlite::Result<Vec<i64>>>()
        .unwrap()
}

fn insert_file(
    db: &Database,
    id: i64,
    hash: &str,
    component: &str,
    filearea: &str,
    filename: &str,
    created: i64,
) {
    db.connection()
        .execute(
            "INSERT INTO files (id, contenthash, contextid, component, filearea, filename, \
             filesize, timecreated, timemodified) VALUES (?1, ?2, 1, ?3, ?4, ?5, 10, ?6, ?6)",
            params![id, hash, component, filearea, filename, created],
        )
        .unwrap();
}

fn write_content(data_root: &Path, hash: &str) {
    let path = data_root.join(FileDirStore::relative_path(hash).unwrap());
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, hash.as_bytes()).unwrap();
}

fn content_exists(data_root: &Path, hash: &str) -> bool {
    data_root
        .join(FileDirStore::relative_path(hash).unwrap())
        .exists()
}

/// Reads through to the content directory but refuses to unlink anything.
struct ReadOnlyStore<'a> {
    inner: FileDirStore<'a>,
}

impl ContentStore for ReadOnlyStore<'_> {
    fn file_by_id(&self, id: i64) -> Result<Option<FileRecord>, Error> {
        self.inner.file_by_id(id)
    }

    fn content_path(&self, file: &FileRecord) -> Option<PathBuf> {
        self.inner.content_path(file)
    }

    fn delete_content(&self, _file: &FileRecord) -> Result<bool, Error> {
        Err(Error::Io(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "read-only file system",
        )))
    }
}

// ── Files checkout ───────────────────────────────────────────────

#[test]
fn test_expired_backup_removed_with_its_content() {
    let dir = tempdir().unwrap();
    let db = Database::open_in_memory().unwrap();
    let store = FileDirStore::new(&db, dir.path());

    insert_file(&db, 1, "ab12cd34", "backup", "course", "old.mbz", days_ago(200));
    insert_file(&db, 2, "ef56ab78", "backup", "course", "fresh.mbz", days_ago(10));
    write_content(dir.path(), "ab12cd34");
    write_content(dir.path(), "ef56ab78");

    let step = FilesCheckoutStep::new(&db, &store, Duration::days(180), Duration::days(30));
    let reporter = CaptureReporter::new();
    step.sweep(&reporter).unwrap();

    assert_eq!(ids(&db, "files"), vec![2]);
    assert!(!content_exists(dir.path(), "ab12cd34"));
    assert!(content_exists(dir.path(), "ef56ab78"));
    assert!(reporter.contains("Backup \"old.mbz\" (ab12cd34) is outdated. Removed."));
    assert!(reporter.contains("2 records found."));

    let second = CaptureReporter::new();
    step.sweep(&second).unwrap();
    assert!(!second.contains("Removed."));
    assert_eq!(ids(&db, "files"), vec![2]);
}

#[test]
fn test_shared_backup_content_stays_on_disk() {
    let dir = tempdir().unwrap();
    let db = Database::open_in_memory().unwrap();
    let store = FileDirStore::new(&db, dir.path());

    insert_file(&db, 1, "ab12cd34", "backup", "course", "old.mbz", days_ago(200));
    insert_file(&db, 2, "ab12cd34", "user", "private", "copy.mbz", days_ago(1));
    write_content(dir.path(), "ab12cd34");

    FilesCheckoutStep::new(&db, &store, Duration::days(180), Duration::days(30))
        .sweep(&CaptureReporter::new())
        .unwrap();

    assert_eq!(ids(&db, "files"), vec![2]);
    assert!(content_exists(dir.path(), "ab12cd34"));
}

#[test]
fn test_outdated_draft_kept_while_content_is_shared() {
    let dir = tempdir().unwrap();
    let db = Database::open_in_memory().unwrap();
    let store = FileDirStore::new(&db, dir.path());

    insert_file(&db, 1, "0a0b0c0d", "user", "draft", "shared.pdf", days_ago(90));
    insert_file(&db, 2, "0a0b0c0d", "mod_assign", "submission", "shared.pdf", days_ago(90));
    insert_file(&db, 3, "1a1b1c1d", "user", "draft", "alone.pdf", days_ago(90));
    write_content(dir.path(), "0a0b0c0d");
    write_content(dir.path(), "1a1b1c1d");

    let reporter = CaptureReporter::new();
    FilesCheckoutStep::new(&db, &store, Duration::days(30), Duration::days(30))
        .sweep(&reporter)
        .unwrap();

    assert_eq!(ids(&db, "files"), vec![1, 2]);
    assert!(content_exists(dir.path(), "0a0b0c0d"));
    assert!(!content_exists(dir.path(), "1a1b1c1d"));
    assert!(reporter.contains("Outdated draft \"alone.pdf\" (1a1b1c1d). Removed."));
}

#[test]
fn test_unlink_failure_is_reported_and_record_still_dropped() {
    let dir = tempdir().unwrap();
    let db = Database::open_in_memory().unwrap();
    let store = ReadOnlyStore {
        inner: FileDirStore::new(&db, dir.path()),
    };

    insert_file(&db, 1, "ab12cd34", "backup", "course", "old.mbz", days_ago(200));
    insert_file(&db, 2, "1a1b1c1d", "user", "draft", "alone.pdf", days_ago(90));
    write_content(dir.path(), "ab12cd34");
    write_content(dir.path(), "1a1b1c1d");

    let reporter = CaptureReporter::new();
    FilesCheckoutStep::new(&db, &store, Duration::days(180), Duration::days(30))
        .sweep(&reporter)
        .unwrap();

    assert_eq!(count(&db, "files"), 0);
    assert!(content_exists(dir.path(), "ab12cd34"));
    assert!(content_exists(dir.path(), "1a1b1c1d"));
    assert!(reporter.contains(
        "E: could not unlink content of file \"1\": IO error: read-only file system"
    ));
    assert!(reporter.contains("E: could not unlink content of file \"2\""));
    assert!(reporter.contains("Backup \"old.mbz\" (ab12cd34) is outdated. Removed."));
    assert!(reporter.contains("Done."));
}

#[test]
fn test_record_without_content_is_dropped() {
    let dir = tempdir().unwrap();
    let db = Database::open_in_memory().unwrap();
    let store = FileDirStore::new(&db, dir.path());

    insert_file(&db, 7, "deadbeef", "mod_resource", "content", "gone.txt", days_ago(1));

    let reporter = CaptureReporter::new();
    FilesCheckoutStep::new(&db, &store, Duration::days(30), Duration::days(30))
        .sweep(&reporter)
        .unwrap();

    assert_eq!(count(&db, "files"), 0);
    assert!(reporter.contains("File \"7\" is not found or not readable. Removed."));
    assert!(reporter.contains("Done."));
}

#[test]
fn test_checkout_with_no_records() {
    let dir = tempdir().unwrap();
    let db = Database::open_in_memory().unwrap();
    let store = FileDirStore::new(&db, dir.path());

    let reporter = CaptureReporter::new();
    FilesCheckoutStep::new(&db, &store, Duration::days(30), Duration::days(30))
        .sweep(&reporter)
        .unwrap();
    assert_eq!(
        reporter.output(),
        "Fetching records... 0 records found.\nProcessing... Done.\n"
    );
}

// ── Grades ───────────────────────────────────────────────────────

#[test]
fn test_grades_orphans_and_old_history() {
    let db = Database::open_in_memory().unwrap();
    db.connection()
        .execute_batch(&format!(
            "INSERT INTO course (id) VALUES (1);
             INSERT INTO user (id) VALUES (1);
             INSERT INTO course_modules (id, course, module, instance) VALUES (20, 1, 1, 5);
             INSERT INTO grade_items (id, courseid, itemtype) VALUES (1, 1, 'course');
             INSERT INTO grade_items (id, courseid, itemtype) VALUES (2, 99, 'course');
             INSERT INTO grade_items (id, courseid, itemtype, itemmodule, iteminstance) VALUES (3, 1, 'mod', 'assign', 5);
             INSERT INTO grade_items (id, courseid, itemtype, itemmodule, iteminstance) VALUES (4, 1, 'mod', 'assign', 6);
             INSERT INTO grade_grades (id, itemid, userid) VALUES (1, 1, 1);
             INSERT INTO grade_grades (id, itemid, userid) VALUES (2, 4, 1);
             INSERT INTO grade_grades (id, itemid, userid) VALUES (3, 1, 77);
             INSERT INTO grade_categories (id, courseid) VALUES (1, 1);
             INSERT INTO grade_categories (id, courseid) VALUES (2, 99);
             INSERT INTO grade_outcomes_courses (id, courseid, outcomeid) VALUES (1, 99, 3);
             INSERT INTO grade_grades_history (id, itemid, userid, timemodified) VALUES (1, 1, 1, {recent});
             INSERT INTO grade_grades_history (id, itemid, userid, timemodified) VALUES (2, 1, 1, {old});
             INSERT INTO grade_grades_history (id, itemid, userid, timemodified) VALUES (3, 50, 1, {recent});",
            recent = days_ago(1),
            old = days_ago(600),
        ))
        .unwrap();

    let reporter = CaptureReporter::new();
    GradesStep::new(&db, Duration::days(500))
        .sweep(&reporter)
        .unwrap();

    assert_eq!(ids(&db, "grade_items"), vec![1, 3]);
    assert_eq!(ids(&db, "grade_grades"), vec![1]);
    assert_eq!(ids(&db, "grade_categories"), vec![1]);
    assert_eq!(count(&db, "grade_outcomes_courses"), 0);
    assert_eq!(ids(&db, "grade_grades_history"), vec![1]);

    let lines = reporter.lines();
    assert_eq!(lines.first().map(String::as_str), Some("Starting grades cleanup..."));
    assert_eq!(lines.last().map(String::as_str), Some("Grades cleanup completed."));
    assert!(reporter.contains(
        "Cleaning grade_grades_history: Checking for grade grades history with no corresponding \
         grade items or older than 500 days..."
    ));
}

// ── Logs ─────────────────────────────────────────────────────────

#[test]
fn test_logs_skip_missing_optional_table() {
    let db = Database::open_in_memory().unwrap();
    db.connection()
        .execute_batch(&format!(
            "INSERT INTO context (id, contextlevel, instanceid) VALUES (1, 50, 1);
             INSERT INTO logstore_standard_log (id, contextid, timecreated) VALUES (1, 1, {recent});
             INSERT INTO logstore_standard_log (id, contextid, timecreated) VALUES (2, 1, {old});
             INSERT INTO logstore_standard_log (id, contextid, timecreated) VALUES (3, 404, {recent});",
            recent = days_ago(2),
            old = days_ago(501),
        ))
        .unwrap();

    let reporter = CaptureReporter::new();
    LogsStep::new(
        &db,
        vec!["logstore_lanalytics_log".to_string()],
        Duration::days(500),
    )
    .sweep(&reporter)
    .unwrap();

    assert_eq!(ids(&db, "logstore_standard_log"), vec![1]);
    assert!(reporter.contains(
        "Skipping logstore_lanalytics_log cleanup: table logstore_lanalytics_log does not exist."
    ));
    assert!(reporter.contains("Logs cleanup completed."));
}

#[test]
fn test_logs_sweep_present_optional_table() {
    let db = Database::open_in_memory().unwrap();
    db.connection()
        .execute_batch(&format!(
            "CREATE TABLE logstore_lanalytics_log (
                 id INTEGER PRIMARY KEY, contextid INTEGER NOT NULL, timecreated INTEGER NOT NULL);
             INSERT INTO context (id, contextlevel, instanceid) VALUES (1, 50, 1);
             INSERT INTO logstore_lanalytics_log (id, contextid, timecreated) VALUES (1, 1, {recent});
             INSERT INTO logstore_lanalytics_log (id, contextid, timecreated) VALUES (2, 1, {old});",
            recent = days_ago(2),
            old = days_ago(501),
        ))
        .unwrap();

    let reporter = CaptureReporter::new();
    LogsStep::new(
        &db,
        vec!["logstore_lanalytics_log".to_string()],
        Duration::days(500),
    )
    .sweep(&reporter)
    .unwrap();

    assert_eq!(ids(&db, "logstore_lanalytics_log"), vec![1]);
    assert!(reporter.contains("Cleaning logstore_lanalytics_log: Checking for logs"));
    assert!(!reporter.contains("Skipping"));
}

// ── Component files ──────────────────────────────────────────────

#[test]
fn test_component_files_honour_backup_age_column() {
    let db = Database::open_in_memory().unwrap();
    let conn = db.connection();
    // Backup created long ago but still being written to.
    conn.execute(
        "INSERT INTO files (id, contenthash, contextid, component, filearea, filename, \
         timecreated, timemodified) VALUES (1, 'aa11', 1, 'backup', 'course', 'a.mbz', ?1, ?2)",
        params![days_ago(400), days_ago(1)],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO files (id, contenthash, contextid, component, filearea, filename, \
         timecreated, timemodified) VALUES (2, 'bb22', 1, 'backup', 'course', 'b.mbz', ?1, ?1)",
        params![days_ago(400)],
    )
    .unwrap();
    insert_file(&db, 3, "cc33", "assignsubmission_file", "submission_files", "old.pdf", days_ago(200));
    insert_file(&db, 4, "dd44", "assignsubmission_file", "submission_files", "new.pdf", days_ago(20));
    insert_file(&db, 5, "ee55", "mod_forum", "attachment", "kept.png", days_ago(900));

    let reporter = CaptureReporter::new();
    ComponentFilesStep::new(
        &db,
        vec!["assignsubmission_file".to_string(), "backup".to_string()],
        Duration::days(180),
    )
    .sweep(&reporter)
    .unwrap();

    assert_eq!(ids(&db, "files"), vec![1, 4, 5]);
    assert!(reporter.contains("Processing component 'assignsubmission_file'..."));
    assert!(reporter.contains("Processing component 'backup'..."));
}

// ── Ghost files ──────────────────────────────────────────────────

#[test]
fn test_ghost_files_drop_every_candidate() {
    let dir = tempdir().unwrap();
    let db = Database::open_in_memory().unwrap();

    write_content(dir.path(), "ab12cd34");
    db.upsert_stray_file("filedir/ab/12/ab12cd34", "text/plain", 8)
        .unwrap();
    db.upsert_stray_file("filedir/ff/ff/ffff0000", "text/plain", 8)
        .unwrap();

    let reporter = CaptureReporter::new();
    GhostFilesStep::new(&db, dir.path()).sweep(&reporter).unwrap();

    assert_eq!(reporter.output(), "Deleting unlinked files... .EDone!\n");
    assert!(!content_exists(dir.path(), "ab12cd34"));
    assert_eq!(count(&db, "local_cleanup_files"), 0);
}

#[test]
fn test_ghost_files_walk_candidates_across_pages() {
    let dir = tempdir().unwrap();
    let db = Database::open_in_memory().unwrap();

    let hashes = ["a1a1a1a1", "b2b2b2b2", "c3c3c3c3", "d4d4d4d4", "e5e5e5e5"];
    for hash in hashes {
        write_content(dir.path(), hash);
        let relative = FileDirStore::relative_path(hash).unwrap();
        db.upsert_stray_file(relative.to_str().unwrap(), "text/plain", 8)
            .unwrap();
    }

    let reporter = CaptureReporter::new();
    GhostFilesStep::new(&db, dir.path())
        .with_page_size(2)
        .sweep(&reporter)
        .unwrap();

    assert_eq!(reporter.output(), "Deleting unlinked files... .....Done!\n");
    assert!(hashes.iter().all(|hash| !content_exists(dir.path(), hash)));
    assert_eq!(count(&db, "local_cleanup_files"), 0);
}

// ── Course modules ───────────────────────────────────────────────

#[derive(Default)]
struct FailingPlatform {
    missing_plugin: bool,
}

impl ModuleDeleter for FailingPlatform {
    fn delete_module(&self, cm: &CourseModule) -> Result<(), Error> {
        if self.missing_plugin {
            Err(Error::MissingModulePlugin("quiz".to_string()))
        } else {
            Err(Error::Other(format!("cannot delete {}", cm.id)))
        }
    }
}

impl ModuleHooks for FailingPlatform {
    fn delete_question_references(&self, _context_id: i64) -> Result<(), Error> {
        Ok(())
    }
    fn delete_module_files(&self, _context_id: i64) -> Result<(), Error> {
        Ok(())
    }
    fn delete_calendar_events(&self, _cm: &CourseModule, _modulename: &str) -> Result<(), Error> {
        Ok(())
    }
    fn delete_grade_items(&self, _cm: &CourseModule, _modulename: &str) -> Result<(), Error> {
        Ok(())
    }
    fn delete_blog_associations(&self, _context_id: i64) -> Result<(), Error> {
        Ok(())
    }
    fn delete_tag_instances(
        &self,
        _cm: &CourseModule,
        _modulename: &str,
        _context_id: Option<i64>,
    ) -> Result<(), Error> {
        Ok(())
    }
    fn emit_module_deleted(&self, _event: &ModuleDeletedEvent) -> Result<(), Error> {
        Ok(())
    }
    fn invalidate_module_cache(&self, _course: i64, _cm_id: i64) -> Result<(), Error> {
        Ok(())
    }
}

fn queue_stalled_task(db: &Database, id: i64, customdata: &str) {
    db.connection()
        .execute(
            "INSERT INTO task_adhoc (id, classname, customdata, faildelay, timestarted) \
             VALUES (?1, ?2, ?3, 60, ?4)",
            params![id, COURSE_DELETE_MODULES_TASK, customdata, days_ago(30)],
        )
        .unwrap();
}

#[test]
fn test_task_with_missing_modules_is_removed() {
    let db = Database::open_in_memory().unwrap();
    db.connection()
        .execute("INSERT INTO course (id) VALUES (1)", [])
        .unwrap();
    queue_stalled_task(&db, 1, r#"{"cms":[{"id":500},{"id":501}]}"#);

    let platform = FailingPlatform::default();
    let reporter = CaptureReporter::new();
    CourseModulesStep::new(&db, &platform, &platform, Duration::days(7))
        .sweep(&reporter)
        .unwrap();

    assert_eq!(count(&db, "task_adhoc"), 0);
    assert!(reporter.contains("No orphaned course modules found."));
    assert!(reporter.contains("Deleting course module 500...Failed: Course module not found."));
}

#[test]
fn test_fresh_or_unfailed_tasks_are_left_alone() {
    let db = Database::open_in_memory().unwrap();
    db.connection()
        .execute(
            "INSERT INTO task_adhoc (id, classname, customdata, faildelay, timestarted) \
             VALUES (1, ?1, '{\"cms\":[{\"id\":500}]}', 0, ?2), \
                    (2, ?1, '{\"cms\":[{\"id\":500}]}', 60, ?3)",
            params![COURSE_DELETE_MODULES_TASK, days_ago(30), days_ago(1)],
        )
        .unwrap();

    let platform = FailingPlatform::default();
    CourseModulesStep::new(&db, &platform, &platform, Duration::days(7))
        .sweep(&CaptureReporter::new())
        .unwrap();

    assert_eq!(ids(&db, "task_adhoc"), vec![1, 2]);
}

#[test]
fn test_partial_failure_keeps_task() {
    let db = Database::open_in_memory().unwrap();
    db.connection()
        .execute_batch(
            "INSERT INTO course (id) VALUES (1);
             INSERT INTO modules (id, name) VALUES (1, 'quiz');
             INSERT INTO course_modules (id, course, module, instance, section) VALUES (10, 1, 1, 3, 404);",
        )
        .unwrap();
    queue_stalled_task(&db, 1, r#"{"cms":[{"id":10},{"id":11}]}"#);

    // Normal deletion fails, and the fallback cannot find section 404.
    let platform = FailingPlatform::default();
    let reporter = CaptureReporter::new();
    CourseModulesStep::new(&db, &platform, &platform, Duration::days(7))
        .sweep(&reporter)
        .unwrap();

    assert_eq!(ids(&db, "task_adhoc"), vec![1]);
    assert!(reporter.contains("Failed to remove normally. Now trying to clean-up... "));
    assert!(reporter.contains("Failed to delete course module 10:"));
}

#[test]
fn test_orphan_with_missing_plugin_counts_as_done() {
    let db = Database::open_in_memory().unwrap();
    db.connection()
        .execute_batch(
            "INSERT INTO modules (id, name) VALUES (1, 'quiz');
             INSERT INTO course_modules (id, course, module, instance, section) VALUES (10, 77, 1, 3, 1);",
        )
        .unwrap();

    let platform = FailingPlatform {
        missing_plugin: true,
    };
    let reporter = CaptureReporter::new();
    CourseModulesStep::new(&db, &platform, &platform, Duration::days(7))
        .sweep(&reporter)
        .unwrap();

    assert!(reporter.contains("Found 1 orphaned course modules. Cleaning up..."));
    assert!(reporter.contains(
        "Failed: Cannot delete this module as the plugin 'quiz' is missing"
    ));
    assert!(!reporter.contains("Now trying to clean-up"));
    assert!(reporter.contains("Orphaned course modules cleanup completed."));
    // Left for the host once the plugin is restored.
    assert_eq!(count(&db, "course_modules"), 1);
}

#[test]
fn test_orphan_purged_through_fallback() {
    let db = Database::open_in_memory().unwrap();
    db.connection()
        .execute_batch(
            "INSERT INTO modules (id, name) VALUES (1, 'quiz');
             INSERT INTO course_sections (id, course, section, sequence) VALUES (1, 77, 0, '10,12');
             INSERT INTO course_modules (id, course, module, instance, section) VALUES (10, 77, 1, 3, 1);
             INSERT INTO context (id, contextlevel, instanceid) VALUES (80, 70, 10);",
        )
        .unwrap();

    let platform = FailingPlatform::default();
    let reporter = CaptureReporter::new();
    CourseModulesStep::new(&db, &platform, &platform, Duration::days(7))
        .sweep(&reporter)
        .unwrap();

    assert_eq!(count(&db, "course_modules"), 0);
    assert_eq!(count(&db, "context"), 0);
    assert!(reporter.contains("Now trying to clean-up... OK"));
}

#[test]
fn test_unreadable_task_data_is_reported_and_kept() {
    let db = Database::open_in_memory().unwrap();
    queue_stalled_task(&db, 3, "not json");

    let platform = FailingPlatform::default();
    let reporter = CaptureReporter::new();
    CourseModulesStep::new(&db, &platform, &platform, Duration::days(7))
        .sweep(&reporter)
        .unwrap();

    assert_eq!(ids(&db, "task_adhoc"), vec![3]);
    assert!(reporter.contains("Failed to read task 3:"));
}
