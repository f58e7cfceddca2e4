//! Gated execution: every statement passes the lexical safety gate before
//! it touches storage, refined or not.

use crate::engine::safety::SafetyGate;
use crate::error::{AskError, Result};
use crate::storage::{QueryResults, Storage};
use itertools::Itertools;

pub struct SqlExecutor {
    storage: Storage,
}

impl SqlExecutor {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn execute(&self, sql: &str) -> Result<QueryResults> {
        let verdict = SafetyGate::check(sql);
        if !verdict.is_safe {
            return Err(AskError::Safety(
                verdict
                    .reason
                    .unwrap_or_else(|| "statement rejected".to_string()),
            ));
        }
        self.storage.execute_readonly(sql)
    }

    /// Render results as aligned tabular text for analysis prompts.
    pub fn format_results(results: &QueryResults) -> String {
        if results.is_empty() {
            return "No results found".to_string();
        }

        let widths: Vec<usize> = results
            .columns
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                results
                    .rows
                    .iter()
                    .map(|row| row.get(idx).map_or(0, |cell| cell.len()))
                    .chain(std::iter::once(column.len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let header = results
            .columns
            .iter()
            .zip(&widths)
            .map(|(column, &width)| format!("{column:<width$}"))
            .join(" | ");
        let separator = "-".repeat(header.len());

        let rows = results
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&widths)
                    .map(|(cell, &width)| format!("{cell:<width$}"))
                    .join(" | ")
            })
            .join("\n");

        format!("{header}\n{separator}\n{rows}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use tempfile::TempDir;

    fn seeded_executor(dir: &TempDir) -> SqlExecutor {
        let path = dir.path().join("exec.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE Learner (id INTEGER PRIMARY KEY, name TEXT);
             INSERT INTO Learner (name) VALUES ('John Handcock');",
        )
        .unwrap();
        SqlExecutor::new(Storage::new(path))
    }

    #[test]
    fn unsafe_statement_never_reaches_storage() {
        // No database behind this executor: if the gate let the statement
        // through, execution would fail with a storage error instead.
        let executor = SqlExecutor::new(Storage::new("/nonexistent/gate.db"));
        let err = executor.execute("DROP TABLE Learner;").unwrap_err();
        match err {
            AskError::Safety(reason) => assert!(reason.contains("select, with")),
            other => panic!("expected safety rejection, got {other}"),
        }
    }

    #[test]
    fn blocked_word_inside_select_is_rejected() {
        let executor = SqlExecutor::new(Storage::new("/nonexistent/gate.db"));
        let err = executor
            .execute("SELECT * FROM Learner; DELETE FROM Learner")
            .unwrap_err();
        match err {
            AskError::Safety(reason) => assert!(reason.contains("delete")),
            other => panic!("expected safety rejection, got {other}"),
        }
    }

    #[test]
    fn safe_statement_executes() {
        let dir = TempDir::new().unwrap();
        let executor = seeded_executor(&dir);
        let results = executor.execute("SELECT name FROM Learner").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results.rows[0][0], "John Handcock");
    }

    #[test]
    fn formatting_aligns_columns() {
        let results = QueryResults {
            columns: vec!["name".to_string(), "n".to_string()],
            rows: vec![
                vec!["John Handcock".to_string(), "3".to_string()],
                vec!["Al".to_string(), "12".to_string()],
            ],
        };
        let rendered = SqlExecutor::format_results(&results);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("name"));
        assert!(lines[1].chars().all(|c| c == '-'));
        assert_eq!(lines[2].len(), lines[3].len());
    }

    #[test]
    fn empty_results_format_as_placeholder() {
        assert_eq!(
            SqlExecutor::format_results(&QueryResults::default()),
            "No results found"
        );
    }
}
