//! SQL generation: prompt assembly around the assigned table and resolved
//! entities, plus a syntactic guard on the reply.
//!
//! The guard is deliberately thin; full validation belongs to the safety
//! gate. Anything that does not start with `select` after fence stripping
//! counts as a failed generation.

use crate::engine::decomposer::SubQuery;
use crate::engine::resolver::EntityMatch;
use crate::error::{AskError, Result};
use crate::llm::TextGenerator;
use crate::parse;
use crate::schema::TableSchema;
use itertools::Itertools;
use std::sync::Arc;

pub struct SqlGenerator {
    llm: Arc<dyn TextGenerator>,
}

impl SqlGenerator {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    pub async fn generate(&self, sub: &SubQuery, table: &TableSchema) -> Result<String> {
        let prompt = format!(
            r#"Generate a SQL query to answer this question:

Question: {question}
Table: {table}

Available columns:
{schema}

Entity values resolved against the database:
{entities}

Requirements:
1. Use only columns from the {table} table
2. Use the resolved entity values verbatim in comparisons
3. Use appropriate aggregation functions where the question asks for totals or averages
4. Return ONLY the SQL statement, no explanations"#,
            question = sub.text,
            table = table.name,
            schema = format_table_schema(table),
            entities = format_entity_matches(&sub.entities),
        );

        let response = self.llm.generate(&prompt).await?;
        let sql = parse::strip_code_fences(&response).to_string();

        if !sql.to_lowercase().starts_with("select") {
            return Err(AskError::Generation(
                "generated query must start with SELECT".to_string(),
            ));
        }

        Ok(sql)
    }
}

fn format_table_schema(table: &TableSchema) -> String {
    table
        .columns
        .iter()
        .map(|column| {
            format!(
                "- {} ({}): {}",
                column.name,
                column.data_type,
                column.description.as_deref().unwrap_or("")
            )
        })
        .join("\n")
}

fn format_entity_matches(matches: &[EntityMatch]) -> String {
    if matches.is_empty() {
        return "No specific entity matches found".to_string();
    }
    matches
        .iter()
        .map(|m| {
            format!(
                "- Found '{}' in column '{}' matching value '{}'",
                m.search_term, m.column, m.matched_value
            )
        })
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::decomposer::SubQueryKind;
    use crate::llm::testing::ScriptedGenerator;
    use crate::schema::SchemaCatalog;

    fn sub_query(text: &str) -> SubQuery {
        SubQuery {
            index: 0,
            original_query: text.to_string(),
            text: text.to_string(),
            table: "Learner".to_string(),
            kind: SubQueryKind::Direct,
            entities: vec![EntityMatch {
                search_term: "employed".to_string(),
                column: "employment_status".to_string(),
                matched_value: "Employed".to_string(),
                score: 100,
            }],
            sql: None,
            refined_sql: None,
            results: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn fenced_sql_is_unwrapped() {
        let llm = Arc::new(ScriptedGenerator::new());
        llm.push_ok("```sql\nSELECT name FROM Learner WHERE employment_status = 'Employed'\n```");

        let catalog = SchemaCatalog::builtin();
        let table = catalog.get_table("Learner").unwrap();
        let generator = SqlGenerator::new(llm);

        let sql = generator
            .generate(&sub_query("Which learners are employed?"), table)
            .await
            .unwrap();
        assert!(sql.starts_with("SELECT"));
        assert!(!sql.contains("```"));
    }

    #[tokio::test]
    async fn non_select_reply_is_a_generation_error() {
        let llm = Arc::new(ScriptedGenerator::new());
        llm.push_ok("Sorry, I cannot answer that.");

        let catalog = SchemaCatalog::builtin();
        let table = catalog.get_table("Learner").unwrap();
        let generator = SqlGenerator::new(llm);

        let err = generator
            .generate(&sub_query("anything"), table)
            .await
            .unwrap_err();
        assert!(matches!(err, AskError::Generation(_)));
    }

    #[test]
    fn entity_matches_render_for_the_prompt() {
        let rendered = format_entity_matches(&sub_query("q").entities);
        assert!(rendered.contains("'employed'"));
        assert!(rendered.contains("'employment_status'"));
        assert_eq!(
            format_entity_matches(&[]),
            "No specific entity matches found"
        );
    }
}
