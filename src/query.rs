use crate::error::Error;
use rusqlite::types::{ToSql, ToSqlOutput};
use std::collections::BTreeMap;

/// Name of the parameter the batch sweeper binds for its key cursor.
pub const CURSOR_PARAM: &str = "sweep_last_id";

/// A single bound value. The stores only ever compare integers and text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Int(i64),
    Text(String),
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            SqlParam::Int(value) => Ok(ToSqlOutput::from(*value)),
            SqlParam::Text(value) => Ok(ToSqlOutput::from(value.as_str())),
        }
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Int(value)
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::Text(value)
    }
}

/// Strictly-named parameter map. Names are stored without the leading `:`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamedParams {
    values: BTreeMap<String, SqlParam>,
}

impl NamedParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<SqlParam>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<SqlParam>) {
        self.values
            .insert(name.trim_start_matches(':').to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&SqlParam> {
        self.values.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlParam)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// Reject anything that is not a plain `[A-Za-z_][A-Za-z0-9_]*` identifier.
/// Table and column names are spliced into SQL text, so they must never carry input.
pub fn validate_identifier(name: &str) -> Result<&str, Error> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(name)
    } else {
        Err(Error::InvalidIdentifier(name.to_string()))
    }
}

/// A query selecting the primary keys of rows that match a retention or orphan predicate.
///
/// The query carries no ordering or limit; the batch sweeper appends its own key cursor.
/// Predicates are AND-ed and individually parenthesised.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    table: String,
    alias: String,
    key: String,
    joins: Vec<String>,
    predicates: Vec<String>,
    params: NamedParams,
}

impl CandidateQuery {
    pub fn select(table: &str, alias: &str) -> Self {
        Self {
            table: table.to_string(),
            alias: alias.to_string(),
            key: "id".to_string(),
            joins: Vec::new(),
            predicates: Vec::new(),
            params: NamedParams::new(),
        }
    }

    pub fn key(mut self, column: &str) -> Self {
        self.key = column.to_string();
        self
    }

    pub fn join(mut self, clause: &str) -> Self {
        self.joins.push(clause.to_string());
        self
    }

    pub fn filter(mut self, predicate: &str) -> Self {
        self.predicates.push(predicate.to_string());
        self
    }

    pub fn bind(mut self, name: &str, value: impl Into<SqlParam>) -> Self {
        self.params.insert(name, value);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key_column(&self) -> &str {
        &self.key
    }

    pub fn params(&self) -> &NamedParams {
        &self.params
    }

    fn qualified_key(&self) -> String {
        format!("{}.{}", self.alias, self.key)
    }

    fn where_clause(&self, extra: Option<&str>) -> String {
        let mut clauses: Vec<String> = self
            .predicates
            .iter()
            .map(|predicate| format!("({})", predicate.trim()))
            .collect();
        if let Some(extra) = extra {
            clauses.push(extra.to_string());
        }

        if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        }
    }

    fn from_clause(&self) -> String {
        let mut sql = format!("FROM {} {}", self.table, self.alias);
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join.trim());
        }
        sql
    }

    /// The unbounded candidate query.
    pub fn to_sql(&self) -> String {
        format!(
            "SELECT {} {}{}",
            self.qualified_key(),
            self.from_clause(),
            self.where_clause(None)
        )
    }

    /// Count of all current candidates.
    pub fn count_sql(&self) -> String {
        format!(
            "SELECT COUNT({}) {}{}",
            self.qualified_key(),
            self.from_clause(),
            self.where_clause(None)
        )
    }

    /// One page of candidates strictly after `last_id`, in ascending key order.
    pub fn page(&self, last_id: i64, limit: usize) -> (String, NamedParams) {
        let key = self.qualified_key();
        let sql = format!(
            "SELECT {key} {}{} ORDER BY {key} ASC LIMIT {limit}",
            self.from_clause(),
            self.where_clause(Some(&format!("{key} > :{CURSOR_PARAM}"))),
        );
        let params = self.params.clone().with(CURSOR_PARAM, last_id);
        (sql, params)
    }
}
