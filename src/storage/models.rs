use serde::Serialize;

/// Task class the host platform uses for deferred course-module deletion.
pub const COURSE_DELETE_MODULES_TASK: &str = "\\core_course\\task\\course_delete_modules";

/// Context level of an activity instance.
pub const CONTEXT_MODULE: i64 = 70;

/// Completion criteria type for "activity completed".
pub const COMPLETION_CRITERIA_TYPE_ACTIVITY: i64 = 4;

/// One logical file tracked by the host platform.
///
/// Several records may share a `contenthash`; the content object behind it
/// stays on disk until the last of them is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: i64,
    pub contenthash: String,
    pub contextid: i64,
    pub component: String,
    pub filearea: String,
    pub itemid: i64,
    pub filepath: String,
    pub filename: String,
    pub userid: Option<i64>,
    pub filesize: i64,
    pub author: Option<String>,
    pub timecreated: i64,
    pub timemodified: i64,
}

/// A file record joined with its owner, as returned by the file finder.
#[derive(Debug, Clone)]
pub struct FileListing {
    pub file: FileRecord,
    pub user_deleted: Option<bool>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
}

impl FileListing {
    pub fn owner_name(&self) -> Option<String> {
        match (&self.firstname, &self.lastname) {
            (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
            _ => None,
        }
    }
}

/// An on-disk content object with no matching file record, queued for removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrayFileCandidate {
    pub id: i64,
    /// Relative to the data root, e.g. `filedir/ab/cd/abcd...`.
    pub path: String,
    pub mime: String,
    pub size: i64,
}

/// A persisted unit of pending host work.
#[derive(Debug, Clone)]
pub struct DeferredTask {
    pub id: i64,
    pub classname: String,
    pub customdata: String,
    pub faildelay: i64,
    pub timestarted: Option<i64>,
}

/// One activity instance placed within a course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseModule {
    pub id: i64,
    pub course: i64,
    pub module: i64,
    pub instance: i64,
    pub section: i64,
    pub deletioninprogress: bool,
}
