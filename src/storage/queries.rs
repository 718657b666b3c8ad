use super::models::*;
use super::sqlite::Database;
use rusqlite::{params, OptionalExtension, Result, Row};
use tracing::debug;

/// Column list for `FileRecord`, aliased `f`.
pub const FILE_COLUMNS: &str = "f.id, f.contenthash, f.contextid, f.component, f.filearea, \
     f.itemid, f.filepath, f.filename, f.userid, f.filesize, f.author, \
     f.timecreated, f.timemodified";

/// Map `FILE_COLUMNS` starting at column `offset`.
pub fn file_from_row(row: &Row<'_>, offset: usize) -> Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(offset)?,
        contenthash: row.get(offset + 1)?,
        contextid: row.get(offset + 2)?,
        component: row.get(offset + 3)?,
        filearea: row.get(offset + 4)?,
        itemid: row.get(offset + 5)?,
        filepath: row.get(offset + 6)?,
        filename: row.get(offset + 7)?,
        userid: row.get(offset + 8)?,
        filesize: row.get(offset + 9)?,
        author: row.get(offset + 10)?,
        timecreated: row.get(offset + 11)?,
        timemodified: row.get(offset + 12)?,
    })
}

fn course_module_from_row(row: &Row<'_>) -> Result<CourseModule> {
    Ok(CourseModule {
        id: row.get(0)?,
        course: row.get(1)?,
        module: row.get(2)?,
        instance: row.get(3)?,
        section: row.get(4)?,
        deletioninprogress: row.get(5)?,
    })
}

impl Database {
    // ── File Records ─────────────────────────────────────────────

    pub fn get_file(&self, id: i64) -> Result<Option<FileRecord>> {
        self.connection()
            .query_row(
                &format!("SELECT {} FROM files f WHERE f.id = ?1", FILE_COLUMNS),
                params![id],
                |row| file_from_row(row, 0),
            )
            .optional()
    }

    /// Every file record id, ascending. Loaded in one go; bounded by the file count.
    pub fn all_file_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self
            .connection()
            .prepare("SELECT id FROM files ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// How many file records reference this content object.
    pub fn count_files_with_hash(&self, contenthash: &str) -> Result<i64> {
        self.connection().query_row(
            "SELECT COUNT(*) FROM files WHERE contenthash = ?1",
            params![contenthash],
            |row| row.get(0),
        )
    }

    pub fn file_hash_exists(&self, contenthash: &str) -> Result<bool> {
        let found: Option<i64> = self
            .connection()
            .query_row(
                "SELECT id FROM files WHERE contenthash = ?1 LIMIT 1",
                params![contenthash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn delete_files_with_hash(&self, contenthash: &str) -> Result<usize> {
        self.connection().execute(
            "DELETE FROM files WHERE contenthash = ?1",
            params![contenthash],
        )
    }

    // ── Stray File Candidates ────────────────────────────────────

    /// Record a candidate, or refresh mime and size if the path is already recorded.
    pub fn upsert_stray_file(&self, path: &str, mime: &str, size: i64) -> Result<()> {
        self.connection().execute(
            "INSERT INTO local_cleanup_files (path, mime, size) VALUES (?1, ?2, ?3) \
             ON CONFLICT(path) DO UPDATE SET mime = excluded.mime, size = excluded.size",
            params![path, mime, size],
        )?;
        Ok(())
    }

    /// Up to `limit` candidates with an id above `after_id`, in id order.
    pub fn stray_files_after(&self, after_id: i64, limit: usize) -> Result<Vec<StrayFileCandidate>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, path, mime, size FROM local_cleanup_files \
             WHERE id > ?1 ORDER BY id LIMIT ?2",
        )?;
        let candidates = stmt
            .query_map(params![after_id, limit as i64], stray_file_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(candidates)
    }

    /// Largest candidates first.
    pub fn stray_file_page(&self, offset: i64, limit: i64) -> Result<Vec<StrayFileCandidate>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, path, mime, size FROM local_cleanup_files \
             ORDER BY size DESC, id ASC LIMIT ?1 OFFSET ?2",
        )?;
        let candidates = stmt
            .query_map(params![limit, offset], stray_file_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(candidates)
    }

    /// (candidate count, total bytes)
    pub fn stray_file_totals(&self) -> Result<(i64, i64)> {
        self.connection().query_row(
            "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM local_cleanup_files",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
    }

    pub fn delete_stray_file(&self, id: i64) -> Result<()> {
        self.connection().execute(
            "DELETE FROM local_cleanup_files WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    // ── Deferred Tasks ───────────────────────────────────────────

    /// Course-module deletion tasks the host has already failed at least once,
    /// started before `cutoff`.
    pub fn stalled_module_deletion_tasks(&self, cutoff: i64) -> Result<Vec<DeferredTask>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, classname, customdata, faildelay, timestarted FROM task_adhoc \
             WHERE classname = ?1 AND faildelay > 0 AND timestarted < ?2 \
             ORDER BY id",
        )?;
        let tasks = stmt
            .query_map(params![COURSE_DELETE_MODULES_TASK, cutoff], |row| {
                Ok(DeferredTask {
                    id: row.get(0)?,
                    classname: row.get(1)?,
                    customdata: row.get(2)?,
                    faildelay: row.get(3)?,
                    timestarted: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(tasks)
    }

    pub fn delete_adhoc_task(&self, id: i64) -> Result<()> {
        self.connection()
            .execute("DELETE FROM task_adhoc WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn delete_adhoc_tasks_by_class(&self, classname: &str) -> Result<usize> {
        self.connection().execute(
            "DELETE FROM task_adhoc WHERE classname = ?1",
            params![classname],
        )
    }

    pub fn queue_adhoc_task(
        &self,
        classname: &str,
        customdata: &str,
        userid: Option<i64>,
    ) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        self.connection().execute(
            "INSERT INTO task_adhoc (classname, customdata, userid, faildelay, nextruntime) \
             VALUES (?1, ?2, ?3, 0, ?4)",
            params![classname, customdata, userid, now],
        )?;
        let id = self.connection().last_insert_rowid();
        debug!("Queued adhoc task {} ({})", id, classname);
        Ok(id)
    }

    // ── Course Modules ───────────────────────────────────────────

    pub fn get_course_module(&self, id: i64) -> Result<Option<CourseModule>> {
        self.connection()
            .query_row(
                "SELECT id, course, module, instance, section, deletioninprogress \
                 FROM course_modules WHERE id = ?1",
                params![id],
                course_module_from_row,
            )
            .optional()
    }

    /// Course modules flagged for deletion, grouped by course: (course id, module ids).
    pub fn modules_pending_deletion(&self) -> Result<Vec<(i64, Vec<i64>)>> {
        let mut stmt = self.connection().prepare(
            "SELECT course, id FROM course_modules WHERE deletioninprogress = 1 \
             ORDER BY course, id",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>>>()?;

        let mut grouped: Vec<(i64, Vec<i64>)> = Vec::new();
        for (course, cm) in rows {
            match grouped.last_mut() {
                Some((last, ids)) if *last == course => ids.push(cm),
                _ => grouped.push((course, vec![cm])),
            }
        }
        Ok(grouped)
    }

    pub fn module_name(&self, module_id: i64) -> Result<Option<String>> {
        self.connection()
            .query_row(
                "SELECT name FROM modules WHERE id = ?1",
                params![module_id],
                |row| row.get(0),
            )
            .optional()
    }

    pub fn module_context_id(&self, cm_id: i64) -> Result<Option<i64>> {
        self.connection()
            .query_row(
                "SELECT id FROM context WHERE contextlevel = ?1 AND instanceid = ?2",
                params![CONTEXT_MODULE, cm_id],
                |row| row.get(0),
            )
            .optional()
    }

    /// Drop `cm_id` from the section's comma-separated sequence.
    /// Returns false when the section does not exist.
    pub fn remove_module_from_section(&self, section_id: i64, cm_id: i64) -> Result<bool> {
        let sequence: Option<String> = self
            .connection()
            .query_row(
                "SELECT sequence FROM course_sections WHERE id = ?1",
                params![section_id],
                |row| row.get(0),
            )
            .optional()?;

        let sequence = match sequence {
            Some(sequence) => sequence,
            None => return Ok(false),
        };

        let remaining: Vec<&str> = sequence
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty() && item.parse::<i64>().ok() != Some(cm_id))
            .collect();

        self.connection().execute(
            "UPDATE course_sections SET sequence = ?1 WHERE id = ?2",
            params![remaining.join(","), section_id],
        )?;
        Ok(true)
    }
}

fn stray_file_from_row(row: &rusqlite::Row<'_>) -> Result<StrayFileCandidate> {
    Ok(StrayFileCandidate {
        id: row.get(0)?,
        path: row.get(1)?,
        mime: row.get(2)?,
        size: row.get(3)?,
    })
}
