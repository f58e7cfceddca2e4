//! Query decomposition and table assignment.
//!
//! A compound question becomes an ordered list of self-contained
//! sub-questions; an already-atomic question passes through unchanged.
//! Each sub-question is bound to the single most relevant catalog table,
//! with a fuzzy fallback when the model returns a near-miss name and a
//! deterministic first-table default when everything else fails.
//! Decomposition never fails the whole pipeline.

use crate::engine::resolver::{EntityMatch, EntityResolver};
use crate::error::{AskError, Result};
use crate::fuzzy::name_similarity;
use crate::llm::TextGenerator;
use crate::parse;
use crate::schema::SchemaCatalog;
use crate::storage::QueryResults;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubQueryKind {
    Direct,
    Decomposed,
    Failed,
}

/// One unit of pipeline work. Created here, enriched in place by each
/// later stage, discarded when the request completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubQuery {
    pub index: usize,
    pub original_query: String,
    pub text: String,
    pub table: String,
    pub kind: SubQueryKind,
    pub entities: Vec<EntityMatch>,
    pub sql: Option<String>,
    pub refined_sql: Option<String>,
    pub results: Option<QueryResults>,
    pub error: Option<String>,
}

impl SubQuery {
    pub fn is_failed(&self) -> bool {
        self.kind == SubQueryKind::Failed
    }

    /// Mark this sub-query failed; later stages skip it untouched.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.kind = SubQueryKind::Failed;
        self.error = Some(error.into());
    }

    fn failed(index: usize, original_query: &str, text: &str, error: String) -> Self {
        Self {
            index,
            original_query: original_query.to_string(),
            text: text.to_string(),
            table: String::new(),
            kind: SubQueryKind::Failed,
            entities: Vec::new(),
            sql: None,
            refined_sql: None,
            results: None,
            error: Some(error),
        }
    }
}

pub struct QueryDecomposer {
    llm: Arc<dyn TextGenerator>,
    catalog: Arc<SchemaCatalog>,
    resolver: EntityResolver,
}

impl QueryDecomposer {
    pub fn new(llm: Arc<dyn TextGenerator>, catalog: Arc<SchemaCatalog>) -> Self {
        let resolver = EntityResolver::new(llm.clone());
        Self {
            llm,
            catalog,
            resolver,
        }
    }

    /// Split a question into focused sub-questions, or return it unchanged
    /// when it is already atomic. Never fails: any problem collapses to
    /// `[query]`.
    pub async fn split(&self, query: &str) -> Vec<String> {
        let prompt = format!(
            r#"Determine if the given query requires decomposition or if it is simple enough to be returned as is. If the query is simple, return it directly. If decomposition is needed, break it down into specific, focused sub-queries that together help answer the main question.

Examples:
1. Input: "What is the performance of students in programming courses?"
   Output: "What is the performance of students in programming courses?"

2. Input: "How do students from different institutions perform in programming courses, and what's their employment status after graduation?"
   Output: [
       "What is the performance of students in programming courses across different institutions?",
       "What is the employment status of students after graduation from these institutions?"
   ]

Current Query: {query}

If the query is simple enough, return it as is. If decomposition is needed, return a list of focused sub-queries that together help answer the main question. Each sub-query should be self-contained and focused on a specific aspect."#
        );

        let response = match self.llm.generate(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                warn!("query decomposition failed: {}", e);
                return vec![query.to_string()];
            }
        };

        let sub_questions = parse::sub_questions(&response);
        if sub_questions.is_empty() {
            vec![query.to_string()]
        } else {
            sub_questions
        }
    }

    /// Pick the catalog table most relevant to a sub-question. Always
    /// returns a valid catalog key: model answer if exact, else the
    /// closest name by similarity, else the first table.
    pub async fn select_table(&self, sub_question: &str) -> String {
        let first = self
            .catalog
            .first_table()
            .map(|t| t.name.clone())
            .unwrap_or_default();

        let tables_info = self
            .catalog
            .tables()
            .iter()
            .map(|table| {
                let relationships = self
                    .catalog
                    .relationships_for(&table.name)
                    .iter()
                    .map(|r| format!("{}->{} ({})", r.from_table, r.to_table, r.kind))
                    .join(", ");
                let columns = table
                    .columns
                    .iter()
                    .map(|c| {
                        format!(
                            "{}: {}",
                            c.name,
                            c.description.as_deref().unwrap_or(&c.data_type)
                        )
                    })
                    .join("; ");
                format!(
                    "Table: {}\nRelationships: {}\nColumns: {}",
                    table.name, relationships, columns
                )
            })
            .join("\n\n");

        let prompt = format!(
            r#"Given this query and the available tables, select the most appropriate table name.
Consider the table's relationships. Return ONLY the exact table name, nothing else.

Query: {sub_question}

Available Tables:
{tables_info}

Return only the table name that best matches the query requirements."#
        );

        let selected = match self.llm.generate(&prompt).await {
            Ok(response) => response.trim().to_string(),
            Err(e) => {
                warn!("table selection failed: {}", e);
                return first;
            }
        };

        if self.catalog.get_table(&selected).is_some() {
            return selected;
        }

        // The model returned a near-miss; fall back to the closest catalog
        // name, then to the first table.
        let mut best: Option<&str> = None;
        let mut best_score = 0u8;
        for name in self.catalog.table_names() {
            let score = name_similarity(&selected, name);
            if score > best_score {
                best_score = score;
                best = Some(name);
            }
        }
        best.map(|n| n.to_string()).unwrap_or(first)
    }

    /// Decompose a question into table-bound, entity-resolved sub-queries.
    /// A failure while processing one sub-question marks only that
    /// sub-query failed; its siblings proceed.
    pub async fn decompose(&self, query: &str) -> Result<Vec<SubQuery>> {
        let parts = self.split(query).await;
        let kind = if parts.len() == 1 {
            SubQueryKind::Direct
        } else {
            SubQueryKind::Decomposed
        };

        let mut sub_queries = Vec::with_capacity(parts.len());
        for (index, text) in parts.into_iter().enumerate() {
            match self.build_sub_query(index, query, &text, kind).await {
                Ok(sub) => sub_queries.push(sub),
                Err(e) => {
                    warn!("sub-question {} failed: {}", index + 1, e);
                    sub_queries.push(SubQuery::failed(index, query, &text, e.to_string()));
                }
            }
        }
        Ok(sub_queries)
    }

    async fn build_sub_query(
        &self,
        index: usize,
        original_query: &str,
        text: &str,
        kind: SubQueryKind,
    ) -> Result<SubQuery> {
        let table_name = self.select_table(text).await;
        let table = self
            .catalog
            .get_table(&table_name)
            .ok_or_else(|| AskError::Schema(format!("table '{table_name}' not in catalog")))?;
        let entities = self.resolver.resolve(text, table).await?;

        Ok(SubQuery {
            index,
            original_query: original_query.to_string(),
            text: text.to_string(),
            table: table_name,
            kind,
            entities,
            sql: None,
            refined_sql: None,
            results: None,
            error: None,
        })
    }

    /// Resolve entities for a raw question in one call: table selection
    /// plus entity grounding, without running the rest of the pipeline.
    pub async fn find_entities(&self, query: &str) -> Result<(String, Vec<EntityMatch>)> {
        let table_name = self.select_table(query).await;
        let table = self
            .catalog
            .get_table(&table_name)
            .ok_or_else(|| AskError::Schema(format!("table '{table_name}' not in catalog")))?;
        let entities = self.resolver.resolve(query, table).await?;
        Ok((table_name, entities))
    }
}
