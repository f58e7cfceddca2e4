//! SQL refinement: replace approximate literals in a generated statement
//! with the canonical values actually stored in the database.
//!
//! Refinement is best-effort end to end. Any failure in extraction,
//! per-entity lookup or rewrite degrades to returning the input SQL
//! untouched; it never fails a pipeline.

use crate::engine::matcher::{ValueMapping, ValueMatcher};
use crate::llm::TextGenerator;
use crate::parse;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// A `(table, column, value)` literal pulled back out of SQL text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlEntity {
    pub table: String,
    pub column: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refinement {
    pub original_sql: String,
    pub extracted_entities: Vec<SqlEntity>,
    pub value_mappings: Vec<ValueMapping>,
    pub refined_sql: String,
}

pub struct SqlRefiner {
    llm: Arc<dyn TextGenerator>,
    matcher: ValueMatcher,
    /// Minimum score (exclusive) for accepting a mapping.
    threshold: u8,
    /// Drop mappings that already match exactly instead of rewriting them.
    skip_exact: bool,
}

impl SqlRefiner {
    pub fn new(
        llm: Arc<dyn TextGenerator>,
        matcher: ValueMatcher,
        threshold: u8,
        skip_exact: bool,
    ) -> Self {
        Self {
            llm,
            matcher,
            threshold,
            skip_exact,
        }
    }

    pub async fn refine(&self, sql: &str) -> Refinement {
        let mut refinement = Refinement {
            original_sql: sql.to_string(),
            extracted_entities: Vec::new(),
            value_mappings: Vec::new(),
            refined_sql: sql.to_string(),
        };

        let response = match self.llm.generate(&extraction_prompt(sql)).await {
            Ok(response) => response,
            Err(e) => {
                warn!("entity re-extraction failed, keeping SQL as-is: {}", e);
                return refinement;
            }
        };

        refinement.extracted_entities = parse::pipe_triples(&response)
            .into_iter()
            .filter(|(table, _, value)| keep_entity(table, value))
            .map(|(table, column, value)| SqlEntity {
                table,
                column,
                value,
            })
            .collect();

        for entity in &refinement.extracted_entities {
            match self
                .matcher
                .match_in_column(&entity.value, &entity.table, &entity.column)
            {
                Ok(Some(mapping)) if self.accepts(&mapping) => {
                    refinement.value_mappings.push(mapping);
                }
                Ok(_) => {}
                Err(e) => {
                    // One unmatchable entity must not sink the others.
                    warn!(
                        "value lookup failed for {}.{}: {}",
                        entity.table, entity.column, e
                    );
                }
            }
        }

        if refinement.value_mappings.is_empty() {
            debug!("no value mappings accepted, SQL unchanged");
            return refinement;
        }

        let replacements = refinement
            .value_mappings
            .iter()
            .map(|m| format!("{} -> {}", m.original_value, m.matched_value))
            .join("\n");
        let rewrite_prompt = format!(
            r#"Update this SQL query:
{sql}

Replace these values:
{replacements}

Return ONLY the updated SQL statement."#
        );

        match self.llm.generate(&rewrite_prompt).await {
            Ok(rewritten) => {
                refinement.refined_sql = parse::strip_code_fences(&rewritten).to_string();
            }
            Err(e) => {
                warn!("SQL rewrite failed, keeping SQL as-is: {}", e);
            }
        }

        refinement
    }

    fn accepts(&self, mapping: &ValueMapping) -> bool {
        if mapping.score <= self.threshold {
            return false;
        }
        if mapping.matched_value == mapping.original_value {
            return false;
        }
        if self.skip_exact && mapping.score == 100 {
            return false;
        }
        true
    }
}

fn extraction_prompt(sql: &str) -> String {
    format!(
        r#"You are an SQL entity extractor. Your ONLY task is to extract real-world entities.

Format: table_name|column_name|comparison_value

Rules:
1. Table name must be an actual source table. NEVER use a CTE name, subquery, or alias (e.g. 'p', 't1').
2. Column must be a real data column from the source table. NEVER use computed, derived, or aggregated columns (COUNT, SUM, AVG, ...).
3. Comparison value must be a specific literal being compared. NEVER output NULL, mathematical comparisons (>, <, >=, <=), patterns, logical conditions, numbers, or booleans.

Example valid extractions:
Learner|name|John Smith
Course|category|Programming

Example invalid extractions (NEVER output these):
CourseMetrics|count|5
p|name|NULL
Enrollment|score|>0

If no valid entities are found, return ABSOLUTELY NOTHING. Only output table_name|column_name|comparison_value lines.

Query: {sql}"#
    )
}

/// Drop rules for extracted triples the model should not have produced.
fn keep_entity(table: &str, value: &str) -> bool {
    let value = value.trim();
    let lowered = value.to_lowercase();
    if matches!(lowered.as_str(), "null" | "true" | "false") {
        return false;
    }
    if value.contains('>') || value.contains('<') || value.contains('=') {
        return false;
    }
    // Purely numeric literals have nothing to canonicalize.
    let digits = value.replace('.', "");
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    // Alias-qualified table names were not resolved to their source table.
    if table.contains('.') {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedGenerator;
    use crate::storage::Storage;
    use rusqlite::Connection;
    use tempfile::TempDir;

    fn seeded_matcher(dir: &TempDir) -> ValueMatcher {
        let path = dir.path().join("refine.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE Learner (id INTEGER PRIMARY KEY, name TEXT);
             INSERT INTO Learner (name) VALUES ('John Handcock'), ('Alice Diaz');",
        )
        .unwrap();
        ValueMatcher::new(Storage::new(path))
    }

    fn refiner(llm: Arc<ScriptedGenerator>, matcher: ValueMatcher) -> SqlRefiner {
        SqlRefiner::new(llm, matcher, 45, false)
    }

    #[tokio::test]
    async fn misspelled_literal_is_canonicalized() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedGenerator::new());
        llm.push_ok("Learner|name|Jon Hancok");
        llm.push_ok("SELECT * FROM Learner WHERE name = 'John Handcock'");

        let sql = "SELECT * FROM Learner WHERE name = 'Jon Hancok'";
        let refinement = refiner(llm, seeded_matcher(&dir)).refine(sql).await;

        assert_eq!(refinement.value_mappings.len(), 1);
        assert_eq!(refinement.value_mappings[0].matched_value, "John Handcock");
        assert!(refinement.value_mappings[0].score > 45);
        assert!(refinement.refined_sql.contains("John Handcock"));
    }

    #[tokio::test]
    async fn canonical_sql_is_left_untouched() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedGenerator::new());
        llm.push_ok("Learner|name|John Handcock");
        // No rewrite response scripted: an exact literal must never reach
        // the rewrite step.

        let sql = "SELECT * FROM Learner WHERE name = 'John Handcock'";
        let refinement = refiner(llm, seeded_matcher(&dir)).refine(sql).await;

        assert!(refinement.value_mappings.is_empty());
        assert_eq!(refinement.refined_sql, sql);
    }

    #[tokio::test]
    async fn extraction_failure_degrades_to_original() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedGenerator::new());
        llm.push_err("model unavailable");

        let sql = "SELECT * FROM Learner WHERE name = 'Jon Hancok'";
        let refinement = refiner(llm, seeded_matcher(&dir)).refine(sql).await;

        assert_eq!(refinement.refined_sql, sql);
        assert!(refinement.extracted_entities.is_empty());
    }

    #[tokio::test]
    async fn rewrite_failure_degrades_to_original() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedGenerator::new());
        llm.push_ok("Learner|name|Jon Hancok");
        llm.push_err("model unavailable");

        let sql = "SELECT * FROM Learner WHERE name = 'Jon Hancok'";
        let refinement = refiner(llm, seeded_matcher(&dir)).refine(sql).await;

        assert_eq!(refinement.value_mappings.len(), 1);
        assert_eq!(refinement.refined_sql, sql);
    }

    #[tokio::test]
    async fn weak_matches_are_not_accepted() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedGenerator::new());
        llm.push_ok("Learner|name|Quarterly Revenue");

        let sql = "SELECT * FROM Learner WHERE name = 'Quarterly Revenue'";
        let refinement = refiner(llm, seeded_matcher(&dir)).refine(sql).await;

        assert!(refinement.value_mappings.is_empty());
        assert_eq!(refinement.refined_sql, sql);
    }

    #[test]
    fn drop_rules_reject_junk_triples() {
        assert!(!keep_entity("Learner", "NULL"));
        assert!(!keep_entity("Learner", "true"));
        assert!(!keep_entity("Learner", ">0"));
        assert!(!keep_entity("Learner", "3.5"));
        assert!(!keep_entity("p.Learner", "John"));
        assert!(keep_entity("Learner", "Jon Hancok"));
    }

    #[test]
    fn filtering_mode_skips_exact_matches() {
        let mapping = ValueMapping {
            original_value: "Jon Hancok".to_string(),
            matched_value: "John Handcock".to_string(),
            score: 100,
        };
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedGenerator::new());
        let strict = SqlRefiner::new(llm.clone(), seeded_matcher(&dir_a), 45, true);
        assert!(!strict.accepts(&mapping));
        let default = SqlRefiner::new(llm, seeded_matcher(&dir_b), 45, false);
        assert!(default.accepts(&mapping));
    }
}
