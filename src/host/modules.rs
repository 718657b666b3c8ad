use crate::error::Error;
use crate::storage::models::{CourseModule, COMPLETION_CRITERIA_TYPE_ACTIVITY, CONTEXT_MODULE};
use crate::storage::{Database, RecordStore};
use rusqlite::params;
use tracing::{debug, info};

/// Structural-change notification raised once a course module is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDeletedEvent {
    pub course: i64,
    pub cm_id: i64,
    pub context_id: Option<i64>,
    pub modulename: String,
    pub instance: i64,
}

/// The host's normal course-module deletion routine.
pub trait ModuleDeleter {
    /// Fails with `Error::MissingModulePlugin` when the module's plugin is gone.
    fn delete_module(&self, cm: &CourseModule) -> Result<(), Error>;
}

/// Host subsystems touched when a course module's dependent data is purged.
pub trait ModuleHooks {
    fn delete_question_references(&self, context_id: i64) -> Result<(), Error>;
    fn delete_module_files(&self, context_id: i64) -> Result<(), Error>;
    /// Remove the calendar events of the module's instance. The module context may
    /// already be gone, so hosts that attach a context to each event must resolve it
    /// against the course (`cm.course`) before deleting.
    fn delete_calendar_events(&self, cm: &CourseModule, modulename: &str) -> Result<(), Error>;
    fn delete_grade_items(&self, cm: &CourseModule, modulename: &str) -> Result<(), Error>;
    fn delete_blog_associations(&self, context_id: i64) -> Result<(), Error>;
    fn delete_tag_instances(
        &self,
        cm: &CourseModule,
        modulename: &str,
        context_id: Option<i64>,
    ) -> Result<(), Error>;
    fn emit_module_deleted(&self, event: &ModuleDeletedEvent) -> Result<(), Error>;
    fn invalidate_module_cache(&self, course: i64, cm_id: i64) -> Result<(), Error>;
}

/// Remove everything that hangs off a course module, then the module itself.
///
/// Mirrors the clean-up half of the host's deletion routine and does not touch the
/// activity instance row. Fails if the module type is unknown or the module cannot
/// be taken out of its section.
pub fn purge_module_data<H: ModuleHooks + ?Sized>(
    db: &Database,
    hooks: &H,
    cm: &CourseModule,
) -> Result<(), Error> {
    let context_id = db.module_context_id(cm.id)?;
    let modulename = db
        .module_name(cm.module)?
        .ok_or_else(|| Error::NotFound(format!("Module type {}", cm.module)))?;

    if let Some(context_id) = context_id {
        hooks.delete_question_references(context_id)?;
        hooks.delete_module_files(context_id)?;
    }
    hooks.delete_calendar_events(cm, &modulename)?;
    hooks.delete_grade_items(cm, &modulename)?;
    if let Some(context_id) = context_id {
        hooks.delete_blog_associations(context_id)?;
    }

    let conn = db.connection();
    conn.execute(
        "DELETE FROM course_modules_completion WHERE coursemoduleid = ?1",
        params![cm.id],
    )?;
    conn.execute(
        "DELETE FROM course_modules_viewed WHERE coursemoduleid = ?1",
        params![cm.id],
    )?;
    conn.execute(
        "DELETE FROM course_completion_criteria \
         WHERE moduleinstance = ?1 AND course = ?2 AND criteriatype = ?3",
        params![cm.id, cm.course, COMPLETION_CRITERIA_TYPE_ACTIVITY],
    )?;

    hooks.delete_tag_instances(cm, &modulename, context_id)?;

    conn.execute(
        "DELETE FROM context WHERE contextlevel = ?1 AND instanceid = ?2",
        params![CONTEXT_MODULE, cm.id],
    )?;
    conn.execute("DELETE FROM course_modules WHERE id = ?1", params![cm.id])?;

    if !db.remove_module_from_section(cm.section, cm.id)? {
        return Err(Error::ModuleCleanup(format!(
            "Cannot delete the module {} (instance) from section.",
            modulename
        )));
    }

    hooks.emit_module_deleted(&ModuleDeletedEvent {
        course: cm.course,
        cm_id: cm.id,
        context_id,
        modulename: modulename.clone(),
        instance: cm.instance,
    })?;
    hooks.invalidate_module_cache(cm.course, cm.id)?;

    debug!("Purged course module {} ({})", cm.id, modulename);
    Ok(())
}

/// Host collaborators implemented directly against the record store.
pub struct DatabasePlatform<'a> {
    db: &'a Database,
}

impl<'a> DatabasePlatform<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }
}

impl ModuleDeleter for DatabasePlatform<'_> {
    /// Delete the activity instance from the table named after its module type,
    /// then purge the module. A missing instance table means the plugin is gone.
    fn delete_module(&self, cm: &CourseModule) -> Result<(), Error> {
        let modulename = self
            .db
            .module_name(cm.module)?
            .ok_or_else(|| Error::NotFound(format!("Module type {}", cm.module)))?;

        if !self.db.table_exists(&modulename)? {
            return Err(Error::MissingModulePlugin(modulename));
        }

        self.db.delete_by_ids(&modulename, "id", &[cm.instance])?;
        purge_module_data(self.db, self, cm)
    }
}

impl ModuleHooks for DatabasePlatform<'_> {
    fn delete_question_references(&self, context_id: i64) -> Result<(), Error> {
        self.db.connection().execute(
            "DELETE FROM question_references WHERE usingcontextid = ?1",
            params![context_id],
        )?;
        Ok(())
    }

    fn delete_module_files(&self, context_id: i64) -> Result<(), Error> {
        let removed = self
            .db
            .connection()
            .execute("DELETE FROM files WHERE contextid = ?1", params![context_id])?;
        debug!("Removed {} file records in context {}", removed, context_id);
        Ok(())
    }

    /// Event rows here carry no context column, so there is nothing to re-point:
    /// they are matched by instance and module name alone.
    fn delete_calendar_events(&self, cm: &CourseModule, modulename: &str) -> Result<(), Error> {
        self.db.connection().execute(
            "DELETE FROM event WHERE instance = ?1 AND modulename = ?2",
            params![cm.instance, modulename],
        )?;
        Ok(())
    }

    fn delete_grade_items(&self, cm: &CourseModule, modulename: &str) -> Result<(), Error> {
        let conn = self.db.connection();
        conn.execute(
            "DELETE FROM grade_grades WHERE itemid IN ( \
                 SELECT id FROM grade_items \
                 WHERE itemtype = 'mod' AND itemmodule = ?1 AND iteminstance = ?2 AND courseid = ?3)",
            params![modulename, cm.instance, cm.course],
        )?;
        conn.execute(
            "DELETE FROM grade_items \
             WHERE itemtype = 'mod' AND itemmodule = ?1 AND iteminstance = ?2 AND courseid = ?3",
            params![modulename, cm.instance, cm.course],
        )?;
        Ok(())
    }

    fn delete_blog_associations(&self, context_id: i64) -> Result<(), Error> {
        self.db.connection().execute(
            "DELETE FROM blog_association WHERE contextid = ?1",
            params![context_id],
        )?;
        Ok(())
    }

    fn delete_tag_instances(
        &self,
        cm: &CourseModule,
        modulename: &str,
        context_id: Option<i64>,
    ) -> Result<(), Error> {
        let conn = self.db.connection();
        if let Some(context_id) = context_id {
            conn.execute(
                "DELETE FROM tag_instance WHERE component = ?1 AND contextid = ?2",
                params![format!("mod_{}", modulename), context_id],
            )?;
        }
        conn.execute(
            "DELETE FROM tag_instance \
             WHERE component = 'core' AND itemtype = 'course_modules' AND itemid = ?1",
            params![cm.id],
        )?;
        Ok(())
    }

    fn emit_module_deleted(&self, event: &ModuleDeletedEvent) -> Result<(), Error> {
        info!(
            course = event.course,
            cm = event.cm_id,
            instance = event.instance,
            "Course module deleted ({})",
            event.modulename
        );
        Ok(())
    }

    // No module cache is kept against the record store.
    fn invalidate_module_cache(&self, course: i64, cm_id: i64) -> Result<(), Error> {
        debug!("Module cache invalidated for course {} module {}", course, cm_id);
        Ok(())
    }
}
