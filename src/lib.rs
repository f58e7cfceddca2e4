pub mod config;
pub mod engine;
pub mod error;
pub mod fuzzy;
pub mod llm;
pub mod parse;
pub mod schema;
pub mod storage;

pub use config::Config;
pub use error::{AskError, Result};
pub use llm::{LlmClient, TextGenerator};
pub use schema::SchemaCatalog;
pub use storage::Storage;
