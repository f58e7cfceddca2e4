//! Read-only storage boundary.
//!
//! Every execution opens a fresh SQLite connection in read-only mode with
//! `query_only` set, runs exactly one statement, and closes the connection
//! on every exit path. Mutating statements fail at the engine level even if
//! the lexical safety gate were bypassed.

use crate::error::{AskError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

lazy_static! {
    /// Identifiers that may be interpolated into a statement. Anything
    /// else is rejected before it reaches SQLite.
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z0-9_.]+$").unwrap();
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResults {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl QueryResults {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone)]
pub struct Storage {
    db_path: PathBuf,
}

impl Storage {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn open_readonly(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.pragma_update(None, "query_only", true)?;
        Ok(conn)
    }

    /// Execute one statement and buffer the full result set as strings.
    pub fn execute_readonly(&self, sql: &str) -> Result<QueryResults> {
        debug!("executing: {}", sql);
        let conn = self.open_readonly()?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let column_count = columns.len();

        let mut out = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut record = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                record.push(render_value(row.get_ref(idx)?));
            }
            out.push(record);
        }

        Ok(QueryResults {
            columns,
            rows: out,
        })
    }

    /// Live distinct values of one column, NULLs excluded. Table and column
    /// names are validated before interpolation.
    pub fn distinct_values(&self, table: &str, column: &str) -> Result<Vec<String>> {
        validate_identifier(table)?;
        validate_identifier(column)?;
        let sql = format!(
            "SELECT DISTINCT {column} FROM {table} WHERE {column} IS NOT NULL"
        );
        let results = self.execute_readonly(&sql)?;
        Ok(results
            .rows
            .into_iter()
            .filter_map(|mut row| if row.is_empty() { None } else { Some(row.remove(0)) })
            .collect())
    }
}

fn validate_identifier(name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(AskError::Storage(format!("invalid identifier: '{name}'")))
    }
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}
