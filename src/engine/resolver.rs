//! Entity resolver: pulls entity phrases out of a sub-question and grounds
//! each one in the assigned table's enumerated columns.
//!
//! Resolution is a brute-force scan over every column carrying a closed
//! value domain; columns without one are skipped (there is nothing to
//! match against). No threshold applies here: every entity keeps its best
//! match, however weak, and downstream consumers decide what to trust.

use crate::error::Result;
use crate::fuzzy::token_sort_ratio;
use crate::llm::TextGenerator;
use crate::parse;
use crate::schema::TableSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMatch {
    pub search_term: String,
    pub column: String,
    pub matched_value: String,
    pub score: u8,
}

pub struct EntityResolver {
    llm: Arc<dyn TextGenerator>,
}

impl EntityResolver {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    async fn extract_entities(&self, sub_question: &str) -> Result<Vec<String>> {
        let prompt = format!(
            r#"Extract meaningful entities from the query, combining related terms and removing stopwords. Combine a modifier with the noun it qualifies (like 'room' + 'revenue' = 'room revenue').

Examples:
1. Query: "What is the revenue from rooms for AC Wailea in November 2023?"
   Entities: 'rooms revenue', 'AC Wailea'

2. Query: "How many learners from autonomous colleges completed programming courses?"
   Entities: 'Autonomous College', 'Programming'

3. Query: "Show the employment status of female learners after graduation"
   Entities: 'employment status', 'female'

Current Query: '{sub_question}'

Return only the extracted entities as a comma-separated list. Don't include dates or time periods."#
        );

        let response = self.llm.generate(&prompt).await?;
        Ok(parse::comma_list(&response))
    }

    /// Resolve each extracted entity to its best `(column, value)` match in
    /// `table`. At most one match per distinct search term.
    pub async fn resolve(
        &self,
        sub_question: &str,
        table: &TableSchema,
    ) -> Result<Vec<EntityMatch>> {
        let entities = self.extract_entities(sub_question).await?;

        let mut matches = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for entity in entities {
            if !seen.insert(entity.clone()) {
                continue;
            }
            if let Some(best) = best_match_in_table(&entity, table) {
                matches.push(best);
            }
        }
        Ok(matches)
    }
}

fn best_match_in_table(entity: &str, table: &TableSchema) -> Option<EntityMatch> {
    let mut best: Option<EntityMatch> = None;
    let mut best_score = 0u8;
    for column in table.enumerated_columns() {
        let values = column.distinct_values.as_deref().unwrap_or(&[]);
        for value in values {
            let score = token_sort_ratio(entity, value);
            if score > best_score {
                best_score = score;
                best = Some(EntityMatch {
                    search_term: entity.to_string(),
                    column: column.name.clone(),
                    matched_value: value.clone(),
                    score,
                });
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaCatalog;

    #[test]
    fn best_match_scans_all_enumerated_columns() {
        let catalog = SchemaCatalog::builtin();
        let learner = catalog.get_table("Learner").unwrap();

        let matched = best_match_in_table("employd", learner).unwrap();
        assert_eq!(matched.column, "employment_status");
        assert_eq!(matched.matched_value, "Employed");
        assert!(matched.score > 45);
    }

    #[test]
    fn free_text_columns_are_never_matched() {
        let catalog = SchemaCatalog::builtin();
        let learner = catalog.get_table("Learner").unwrap();

        // "name" and "email" carry no value domain; whatever this resolves
        // to must come from an enumerated column.
        if let Some(matched) = best_match_in_table("some person", learner) {
            assert_ne!(matched.column, "name");
            assert_ne!(matched.column, "email");
        }
    }

    #[test]
    fn no_resemblance_yields_no_match() {
        let catalog = SchemaCatalog::builtin();
        let course = catalog.get_table("Course").unwrap();
        // Scores of zero never become matches.
        assert!(best_match_in_table("", course).is_none());
    }
}
