use std::cell::RefCell;

use tempfile::tempdir;

use lms_cleanup::host::{DatabasePlatform, FileDirStore};
use lms_cleanup::query::CandidateQuery;
use lms_cleanup::steps::CleanupStep;
use lms_cleanup::sweep::{BatchSweeper, CHUNK_SIZE, PAGE_SIZE};
use lms_cleanup::tasks::HostServices;
use lms_cleanup::{
    CaptureReporter, CleanupConfig, CleanupTask, Database, Error, ProgressReporter,
    ScheduledTask, SilentReporter,
};

#[test]
fn test_auto_remove_off_runs_only_files_checkout() {
    let dir = tempdir().unwrap();
    let db = Database::open_in_memory().unwrap();
    let platform = DatabasePlatform::new(&db);
    let content = FileDirStore::new(&db, dir.path());
    let host = HostServices {
        content: &content,
        deleter: &platform,
        hooks: &platform,
    };

    let config = CleanupConfig::default();
    assert!(!config.auto_remove);

    let task = CleanupTask::from_config(&db, host, &config, dir.path());
    assert_eq!(task.step_names(), vec!["files checkout"]);
    assert_eq!(task.name(), "Database and disk clean-up");

    let reporter = CaptureReporter::new();
    task.execute(&reporter).unwrap();
    assert!(reporter.contains("Fetching records... 0 records found."));
    assert!(!reporter.contains("Starting grades cleanup"));
}

#[test]
fn test_auto_remove_on_runs_every_step_in_order() {
    let dir = tempdir().unwrap();
    let db = Database::open_in_memory().unwrap();
    let platform = DatabasePlatform::new(&db);
    let content = FileDirStore::new(&db, dir.path());
    let host = HostServices {
        content: &content,
        deleter: &platform,
        hooks: &platform,
    };

    let config = CleanupConfig {
        auto_remove: true,
        ..CleanupConfig::default()
    };

    let task = CleanupTask::from_config(&db, host, &config, dir.path());
    assert_eq!(
        task.step_names(),
        vec![
            "course modules",
            "grades",
            "logs",
            "component files",
            "ghost files",
            "files checkout",
        ]
    );

    let reporter = CaptureReporter::new();
    task.execute(&reporter).unwrap();

    let output = reporter.output();
    let order = [
        "Checking for course modules tied to deleted courses...",
        "Starting grades cleanup...",
        "Starting logs cleanup...",
        "Starting component files cleanup...",
        "Deleting unlinked files... ",
        "Fetching records... ",
    ];
    let positions: Vec<usize> = order
        .iter()
        .map(|needle| output.find(needle).unwrap())
        .collect();
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
}

/// Records the order it ran in, optionally failing.
struct ScriptedStep<'a> {
    name: &'static str,
    fail: bool,
    log: &'a RefCell<Vec<&'static str>>,
}

impl CleanupStep for ScriptedStep<'_> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn sweep(&self, _reporter: &dyn ProgressReporter) -> Result<(), Error> {
        self.log.borrow_mut().push(self.name);
        if self.fail {
            Err(Error::Other(format!("{} failed", self.name)))
        } else {
            Ok(())
        }
    }
}

#[test]
fn test_first_failing_step_ends_the_run() {
    let log = RefCell::new(Vec::new());
    let steps: Vec<Box<dyn CleanupStep + '_>> = vec![
        Box::new(ScriptedStep {
            name: "first",
            fail: false,
            log: &log,
        }),
        Box::new(ScriptedStep {
            name: "second",
            fail: true,
            log: &log,
        }),
        Box::new(ScriptedStep {
            name: "third",
            fail: false,
            log: &log,
        }),
    ];
    let task = CleanupTask::new(steps);

    let err = task.execute(&SilentReporter).unwrap_err();
    assert_eq!(err.to_string(), "second failed");
    assert_eq!(*log.borrow(), vec!["first", "second"]);
}

#[test]
fn test_default_sizes_page_and_chunk_a_large_table() {
    let db = Database::open_in_memory().unwrap();
    let total = PAGE_SIZE + 1;
    db.connection()
        .execute(
            "WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < ?1) \
             INSERT INTO grade_outcomes_courses (id, courseid, outcomeid) \
             SELECT n, 999, 1 FROM seq",
            [total as i64],
        )
        .unwrap();

    let query = CandidateQuery::select("grade_outcomes_courses", "goc")
        .join("LEFT JOIN course c ON goc.courseid = c.id")
        .filter("c.id IS NULL");

    let outcome = BatchSweeper::new()
        .sweep_table(&db, &query, "orphans", &SilentReporter)
        .unwrap();

    assert_eq!(outcome.deleted, total);
    assert_eq!(outcome.pages, 2);
    assert_eq!(outcome.delete_calls, PAGE_SIZE / CHUNK_SIZE + 1);
    assert_eq!(outcome.delete_calls, 101);

    let remaining: i64 = db
        .connection()
        .query_row("SELECT COUNT(*) FROM grade_outcomes_courses", [], |r| r.get(0))
        .unwrap();
    assert_eq!(remaining, 0);
}
