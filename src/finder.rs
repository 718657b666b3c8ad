use crate::config::BACKUP_COMPONENT;
use crate::error::Error;
use crate::query::NamedParams;
use crate::storage::gateway::named_bindings;
use crate::storage::models::FileListing;
use crate::storage::queries::{file_from_row, FILE_COLUMNS};
use crate::storage::{Database, RecordStore};
use rusqlite::types::ToSql;
use tracing::debug;

pub const LIMIT_DEFAULT: usize = 50;

const BYTES_PER_MB: i64 = 1024 * 1024;

/// Search criteria for browsing file records. Empty strings count as absent.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    /// Only files strictly larger than this many megabytes.
    pub min_size_mb: i64,
    pub name_like: Option<String>,
    /// Matched against "first last", "last first" and the author field.
    pub user_like: Option<String>,
    pub component: Option<String>,
    pub user_deleted: bool,
}

/// Whose files a search may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinderScope {
    Admin,
    Owner(i64),
}

/// Time restriction for component statistics, in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsWindow {
    All,
    OlderThan(i64),
    NewerThan(i64),
    /// `from <= t < until`
    Between { from: i64, until: i64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComponentStats {
    pub count: i64,
    pub size: i64,
}

pub struct FileFinder<'a> {
    db: &'a Database,
    scope: FinderScope,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl<'a> FileFinder<'a> {
    pub fn new(db: &'a Database, scope: FinderScope) -> Self {
        Self { db, scope }
    }

    fn search_where(&self, filter: &FileFilter) -> (String, NamedParams) {
        let mut clauses = vec![format!(
            "f.filesize > {}",
            filter.min_size_mb.max(0) * BYTES_PER_MB
        )];
        let mut params = NamedParams::new();

        if let Some(component) = present(&filter.component) {
            clauses.push("f.component = :component".to_string());
            params.insert("component", component);
        }

        if let Some(name) = present(&filter.name_like) {
            clauses.push("f.filename LIKE :name_like".to_string());
            params.insert("name_like", format!("%{}%", name));
        }

        if let Some(user) = present(&filter.user_like) {
            clauses.push(
                "(u.firstname || ' ' || u.lastname LIKE :user_like \
                 OR u.lastname || ' ' || u.firstname LIKE :user_like \
                 OR f.author LIKE :user_like)"
                    .to_string(),
            );
            params.insert("user_like", format!("%{}%", user));
        }

        if filter.user_deleted {
            clauses.push("u.deleted = 1".to_string());
        }

        if let FinderScope::Owner(user_id) = self.scope {
            clauses.push("f.userid = :owner".to_string());
            params.insert("owner", user_id);
        }

        (clauses.join(" AND "), params)
    }

    /// One row per content hash.
    pub fn search_sql(
        &self,
        filter: &FileFilter,
        limit: usize,
        offset: usize,
    ) -> (String, NamedParams) {
        let (predicate, params) = self.search_where(filter);
        let paging = if offset > 0 {
            format!("LIMIT {} OFFSET {}", limit, offset)
        } else {
            format!("LIMIT {}", limit)
        };
        let sql = format!(
            "SELECT {}, u.deleted, u.firstname, u.lastname \
             FROM files f LEFT JOIN user u ON f.userid = u.id \
             WHERE {} GROUP BY f.contenthash {}",
            FILE_COLUMNS, predicate, paging
        );
        (sql, params)
    }

    pub fn count_sql(&self, filter: &FileFilter) -> (String, NamedParams) {
        let (predicate, params) = self.search_where(filter);
        let sql = format!(
            "SELECT COUNT(DISTINCT f.contenthash) \
             FROM files f LEFT JOIN user u ON f.userid = u.id WHERE {}",
            predicate
        );
        (sql, params)
    }

    pub fn find(
        &self,
        filter: &FileFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<FileListing>, Error> {
        let (sql, params) = self.search_sql(filter, limit, offset);
        debug!("File search: {}", sql);

        let (names, values) = named_bindings(&params);
        let bound: Vec<(&str, &dyn ToSql)> =
            names.iter().map(String::as_str).zip(values).collect();

        let mut stmt = self.db.connection().prepare(&sql)?;
        let listings = stmt
            .query_map(bound.as_slice(), |row| {
                Ok(FileListing {
                    file: file_from_row(row, 0)?,
                    user_deleted: row.get(13)?,
                    firstname: row.get(14)?,
                    lastname: row.get(15)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(listings)
    }

    pub fn count(&self, filter: &FileFilter) -> Result<i64, Error> {
        let (sql, params) = self.count_sql(filter);
        Ok(self.db.scalar(&sql, &params)?.unwrap_or(0))
    }

    pub fn stats_sql(component: &str, window: StatsWindow) -> (String, NamedParams) {
        let time_field = if component == BACKUP_COMPONENT {
            "f.timemodified"
        } else {
            "f.timecreated"
        };

        let mut sql = "SELECT COUNT(f.id), COALESCE(SUM(f.filesize), 0) FROM files f \
                       WHERE f.component = :component"
            .to_string();
        let mut params = NamedParams::new().with("component", component);

        match window {
            StatsWindow::All => {}
            StatsWindow::OlderThan(until) => {
                sql.push_str(&format!(" AND {} < :until", time_field));
                params.insert("until", until);
            }
            StatsWindow::NewerThan(since) => {
                sql.push_str(&format!(" AND {} > :since", time_field));
                params.insert("since", since);
            }
            StatsWindow::Between { from, until } => {
                sql.push_str(&format!(
                    " AND {field} >= :from AND {field} < :until",
                    field = time_field
                ));
                params.insert("from", from);
                params.insert("until", until);
            }
        }
        (sql, params)
    }

    /// File count and total bytes for one component.
    pub fn stats(&self, component: &str, window: StatsWindow) -> Result<ComponentStats, Error> {
        let (sql, params) = Self::stats_sql(component, window);

        let (names, values) = named_bindings(&params);
        let bound: Vec<(&str, &dyn ToSql)> =
            names.iter().map(String::as_str).zip(values).collect();

        let stats = self
            .db
            .connection()
            .query_row(&sql, bound.as_slice(), |row| {
                Ok(ComponentStats {
                    count: row.get(0)?,
                    size: row.get(1)?,
                })
            })?;
        Ok(stats)
    }
}
