//! The query-resolution pipeline: decomposition, entity grounding, SQL
//! generation, safety gating, refinement, execution and analysis.

pub mod analyzer;
pub mod decomposer;
pub mod executor;
pub mod generator;
pub mod matcher;
pub mod orchestrator;
pub mod refiner;
pub mod resolver;
pub mod safety;

pub use analyzer::{Analysis, SqlAnalyzer};
pub use decomposer::{QueryDecomposer, SubQuery, SubQueryKind};
pub use executor::SqlExecutor;
pub use generator::SqlGenerator;
pub use matcher::{ValueMapping, ValueMatcher};
pub use orchestrator::{PipelineOutcome, QueryPipeline, StepRecord, StepStatus};
pub use refiner::{Refinement, SqlRefiner};
pub use resolver::{EntityMatch, EntityResolver};
pub use safety::{GateVerdict, SafetyGate};
