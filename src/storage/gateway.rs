use super::sqlite::Database;
use crate::error::Error;
use crate::query::{validate_identifier, NamedParams};
use rusqlite::types::ToSql;
use rusqlite::{params_from_iter, OptionalExtension};

/// The narrow relational contract every sweep is written against.
///
/// Implementations hold no state of their own; every call goes straight to the store.
pub trait RecordStore {
    /// Run a read query and collect its first column as integers.
    fn fieldset(&self, sql: &str, params: &NamedParams) -> Result<Vec<i64>, Error>;

    /// Run a read query returning at most one integer. NULL and no-row both map to `None`.
    fn scalar(&self, sql: &str, params: &NamedParams) -> Result<Option<i64>, Error>;

    fn count_where(&self, table: &str, predicate: &str, params: &NamedParams)
        -> Result<i64, Error>;

    fn delete_where(&self, table: &str, predicate: &str, params: &NamedParams)
        -> Result<usize, Error>;

    /// Delete rows whose `key` is in `ids`. Keys that are already gone are ignored.
    fn delete_by_ids(&self, table: &str, key: &str, ids: &[i64]) -> Result<usize, Error>;

    fn table_exists(&self, table: &str) -> Result<bool, Error>;
}

pub(crate) fn named_bindings(params: &NamedParams) -> (Vec<String>, Vec<&dyn ToSql>) {
    let names = params.iter().map(|(name, _)| format!(":{}", name)).collect();
    let values = params.iter().map(|(_, value)| value as &dyn ToSql).collect();
    (names, values)
}

impl RecordStore for Database {
    fn fieldset(&self, sql: &str, params: &NamedParams) -> Result<Vec<i64>, Error> {
        let (names, values) = named_bindings(params);
        let bound: Vec<(&str, &dyn ToSql)> =
            names.iter().map(String::as_str).zip(values).collect();

        let mut stmt = self.connection().prepare(sql)?;
        let ids = stmt
            .query_map(bound.as_slice(), |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn scalar(&self, sql: &str, params: &NamedParams) -> Result<Option<i64>, Error> {
        let (names, values) = named_bindings(params);
        let bound: Vec<(&str, &dyn ToSql)> =
            names.iter().map(String::as_str).zip(values).collect();

        let value = self
            .connection()
            .query_row(sql, bound.as_slice(), |row| row.get::<_, Option<i64>>(0))
            .optional()?;
        Ok(value.flatten())
    }

    fn count_where(
        &self,
        table: &str,
        predicate: &str,
        params: &NamedParams,
    ) -> Result<i64, Error> {
        let table = validate_identifier(table)?;
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {}", table, predicate);
        Ok(self.scalar(&sql, params)?.unwrap_or(0))
    }

    fn delete_where(
        &self,
        table: &str,
        predicate: &str,
        params: &NamedParams,
    ) -> Result<usize, Error> {
        let table = validate_identifier(table)?;
        let (names, values) = named_bindings(params);
        let bound: Vec<(&str, &dyn ToSql)> =
            names.iter().map(String::as_str).zip(values).collect();

        let sql = format!("DELETE FROM {} WHERE {}", table, predicate);
        let deleted = self.connection().execute(&sql, bound.as_slice())?;
        Ok(deleted)
    }

    fn delete_by_ids(&self, table: &str, key: &str, ids: &[i64]) -> Result<usize, Error> {
        if ids.is_empty() {
            return Ok(0);
        }
        let table = validate_identifier(table)?;
        let key = validate_identifier(key)?;

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("DELETE FROM {} WHERE {} IN ({})", table, key, placeholders);
        let deleted = self
            .connection()
            .execute(&sql, params_from_iter(ids.iter()))?;
        Ok(deleted)
    }

    fn table_exists(&self, table: &str) -> Result<bool, Error> {
        let count: i64 = self.connection().query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
