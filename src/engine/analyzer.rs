//! Result analysis: narrate execution results back in natural language.

use crate::engine::decomposer::SubQuery;
use crate::engine::executor::SqlExecutor;
use crate::error::Result;
use crate::llm::TextGenerator;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub query: String,
    pub record_count: usize,
    pub narrative: String,
}

pub struct SqlAnalyzer {
    llm: Arc<dyn TextGenerator>,
}

impl SqlAnalyzer {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    /// Summarize every sub-query that produced results. Failed sub-queries
    /// contribute nothing but do not block analysis of their siblings.
    pub async fn analyze(&self, original_query: &str, sub_queries: &[SubQuery]) -> Result<Analysis> {
        let mut record_count = 0;
        let sections = sub_queries
            .iter()
            .filter_map(|sub| {
                sub.results.as_ref().map(|results| {
                    record_count += results.len();
                    format!(
                        "Sub-question: {}\n{}",
                        sub.text,
                        SqlExecutor::format_results(results)
                    )
                })
            })
            .join("\n\n");

        let prompt = format!(
            r#"Analyze the following data based on the query:
"{original_query}"

Data:
{sections}

Provide a comprehensive analysis including:
1. Key findings and patterns
2. Notable relationships between metrics
3. Important trends or anomalies
4. Actionable insights and recommendations"#
        );

        let narrative = self.llm.generate(&prompt).await?;

        Ok(Analysis {
            query: original_query.to_string(),
            record_count,
            narrative,
        })
    }
}
