//! Pipeline orchestration: decompose → generate → execute → analyze.
//!
//! Linear, no branching, no retries. Each stage consumes the shared state,
//! mutates only its own fields and appends exactly one step record to the
//! trace. A stage-level error aborts the remaining stages and surfaces as
//! the top-level error; a failure inside a single sub-query marks only
//! that sub-query failed and its siblings proceed.

use crate::config::Config;
use crate::engine::analyzer::{Analysis, SqlAnalyzer};
use crate::engine::decomposer::{QueryDecomposer, SubQuery};
use crate::engine::executor::SqlExecutor;
use crate::engine::generator::SqlGenerator;
use crate::engine::matcher::ValueMatcher;
use crate::engine::refiner::SqlRefiner;
use crate::engine::resolver::EntityMatch;
use crate::engine::safety::SafetyGate;
use crate::llm::TextGenerator;
use crate::schema::SchemaCatalog;
use crate::storage::{QueryResults, Storage};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub const STEP_DECOMPOSE: &str = "Query Understanding and Decomposition";
pub const STEP_GENERATE: &str = "SQL Generation";
pub const STEP_EXECUTE: &str = "Query Execution";
pub const STEP_ANALYZE: &str = "Analysis";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: String,
    pub status: StepStatus,
    pub detail: serde_json::Value,
}

/// Per-request aggregate threaded through all stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub id: String,
    pub query: String,
    pub started_at: String,
    pub sub_queries: Vec<SubQuery>,
    pub error: Option<String>,
    pub steps: Vec<StepRecord>,
    pub analysis: Option<Analysis>,
}

impl PipelineState {
    fn new(query: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            query: query.to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
            sub_queries: Vec::new(),
            error: None,
            steps: Vec::new(),
            analysis: None,
        }
    }

    fn push_step(&mut self, step: &str, status: StepStatus, detail: serde_json::Value) {
        self.steps.push(StepRecord {
            step: step.to_string(),
            status,
            detail,
        });
    }

    fn fail_stage(&mut self, step: &str, error: impl std::fmt::Display) {
        let message = format!("Error in {step}: {error}");
        warn!("{}", message);
        self.error = Some(message.clone());
        self.push_step(step, StepStatus::Failed, json!({ "error": message }));
    }
}

/// What the caller gets back: success flag, fatal error if any, the full
/// step trace, and the analysis when one was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub steps: Vec<StepRecord>,
    pub analysis: Option<Analysis>,
    pub sub_queries: Vec<SubQuery>,
}

pub struct QueryPipeline {
    catalog: Arc<SchemaCatalog>,
    decomposer: QueryDecomposer,
    generator: SqlGenerator,
    refiner: SqlRefiner,
    executor: SqlExecutor,
    analyzer: SqlAnalyzer,
}

impl QueryPipeline {
    pub fn new(
        llm: Arc<dyn TextGenerator>,
        catalog: Arc<SchemaCatalog>,
        storage: Storage,
        config: &Config,
    ) -> Self {
        let decomposer = QueryDecomposer::new(llm.clone(), catalog.clone());
        let generator = SqlGenerator::new(llm.clone());
        let refiner = SqlRefiner::new(
            llm.clone(),
            ValueMatcher::new(storage.clone()),
            config.refine_threshold,
            config.refine_skip_exact,
        );
        let executor = SqlExecutor::new(storage);
        let analyzer = SqlAnalyzer::new(llm);
        Self {
            catalog,
            decomposer,
            generator,
            refiner,
            executor,
            analyzer,
        }
    }

    /// Process one natural-language question end to end.
    pub async fn run(&self, query: &str) -> PipelineOutcome {
        let mut state = PipelineState::new(query);
        info!("processing query {}: {}", state.id, query);

        self.decompose_stage(&mut state).await;
        if state.error.is_none() {
            self.generate_stage(&mut state).await;
        }
        if state.error.is_none() {
            self.execute_stage(&mut state).await;
        }
        if state.error.is_none() {
            self.analyze_stage(&mut state).await;
        }

        PipelineOutcome {
            success: state.error.is_none(),
            error: state.error,
            steps: state.steps,
            analysis: state.analysis,
            sub_queries: state.sub_queries,
        }
    }

    /// Table selection plus entity grounding for a raw question, without
    /// generating or executing anything.
    pub async fn find_entities(&self, query: &str) -> crate::error::Result<(String, Vec<EntityMatch>)> {
        self.decomposer.find_entities(query).await
    }

    async fn decompose_stage(&self, state: &mut PipelineState) {
        match self.decomposer.decompose(&state.query).await {
            Ok(sub_queries) => {
                state.sub_queries = sub_queries;
                let detail: Vec<serde_json::Value> = state
                    .sub_queries
                    .iter()
                    .map(|sub| {
                        json!({
                            "sub_query": sub.text,
                            "table": sub.table,
                            "type": sub.kind,
                            "entities": sub.entities,
                            "error": sub.error,
                        })
                    })
                    .collect();
                state.push_step(
                    STEP_DECOMPOSE,
                    StepStatus::Completed,
                    json!({ "details": detail }),
                );
            }
            Err(e) => state.fail_stage(STEP_DECOMPOSE, e),
        }
    }

    async fn generate_stage(&self, state: &mut PipelineState) {
        for sub in &mut state.sub_queries {
            if sub.is_failed() {
                continue;
            }
            let table = match self.catalog.get_table(&sub.table) {
                Some(table) => table,
                None => {
                    sub.fail(format!("table '{}' not in catalog", sub.table));
                    continue;
                }
            };
            match self.generator.generate(sub, table).await {
                Ok(sql) => {
                    let verdict = SafetyGate::check(&sql);
                    if verdict.is_safe {
                        sub.sql = Some(sql);
                    } else {
                        sub.fail(format!(
                            "invalid SQL generated: {}",
                            verdict.reason.unwrap_or_default()
                        ));
                    }
                }
                Err(e) => sub.fail(e.to_string()),
            }
        }

        let detail: Vec<serde_json::Value> = state
            .sub_queries
            .iter()
            .map(|sub| {
                json!({
                    "sub_query": sub.text,
                    "sql": sub.sql,
                    "type": sub.kind,
                    "error": sub.error,
                })
            })
            .collect();
        state.push_step(
            STEP_GENERATE,
            StepStatus::Completed,
            json!({ "queries": detail }),
        );
    }

    async fn execute_stage(&self, state: &mut PipelineState) {
        for sub in &mut state.sub_queries {
            if sub.is_failed() {
                continue;
            }
            let Some(sql) = sub.sql.clone() else {
                sub.fail("no SQL generated");
                continue;
            };

            // Canonicalize literals, then gate whatever came back. A
            // rewrite the gate rejects counts as a failed refinement and
            // falls back to the already-validated original.
            let refinement = self.refiner.refine(&sql).await;
            let mut final_sql = refinement.refined_sql;
            if final_sql != sql {
                let verdict = SafetyGate::check(&final_sql);
                if verdict.is_safe {
                    sub.refined_sql = Some(final_sql.clone());
                } else {
                    warn!(
                        "refined SQL rejected ({}), keeping original",
                        verdict.reason.unwrap_or_default()
                    );
                    final_sql = sql.clone();
                }
            }

            match self.executor.execute(&final_sql) {
                Ok(results) => sub.results = Some(results),
                Err(e) => {
                    sub.fail(e.to_string());
                    sub.results = Some(QueryResults::default());
                }
            }
        }

        let detail: Vec<serde_json::Value> = state
            .sub_queries
            .iter()
            .map(|sub| {
                json!({
                    "sub_query": sub.text,
                    "sql": sub.refined_sql.as_ref().or(sub.sql.as_ref()),
                    "rows": sub.results.as_ref().map(|r| r.len()),
                    "type": sub.kind,
                    "error": sub.error,
                })
            })
            .collect();
        state.push_step(
            STEP_EXECUTE,
            StepStatus::Completed,
            json!({ "results": detail }),
        );
    }

    async fn analyze_stage(&self, state: &mut PipelineState) {
        let has_results = state
            .sub_queries
            .iter()
            .any(|sub| sub.results.as_ref().map_or(false, |r| !r.is_empty()));
        if !has_results {
            state.push_step(
                STEP_ANALYZE,
                StepStatus::Completed,
                json!({ "skipped": "no results to analyze" }),
            );
            return;
        }

        match self.analyzer.analyze(&state.query, &state.sub_queries).await {
            Ok(analysis) => {
                state.push_step(
                    STEP_ANALYZE,
                    StepStatus::Completed,
                    json!({ "record_count": analysis.record_count }),
                );
                state.analysis = Some(analysis);
            }
            Err(e) => state.fail_stage(STEP_ANALYZE, e),
        }
    }
}
