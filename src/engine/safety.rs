//! Lexical safety gate.
//!
//! Deterministic, local, no external calls. Only read statements pass:
//! the text must start with `select` or `with`, and no blocked operation
//! may appear anywhere as a whole word. This gate runs before every
//! execution, including refined statements; the storage layer's read-only
//! connection is the only other line of enforcement.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const ALLOWED_STARTS: [&str; 2] = ["select", "with"];

pub const BLOCKED_OPERATIONS: [&str; 12] = [
    "delete", "drop", "truncate", "update", "insert", "replace", "alter", "create", "rename",
    "modify", "grant", "revoke",
];

lazy_static! {
    static ref BLOCKED: Regex = Regex::new(
        r"\b(delete|drop|truncate|update|insert|replace|alter|create|rename|modify|grant|revoke)\b"
    )
    .unwrap();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateVerdict {
    pub is_safe: bool,
    pub reason: Option<String>,
}

impl GateVerdict {
    fn safe() -> Self {
        Self {
            is_safe: true,
            reason: None,
        }
    }

    fn rejected(reason: String) -> Self {
        Self {
            is_safe: false,
            reason: Some(reason),
        }
    }
}

pub struct SafetyGate;

impl SafetyGate {
    pub fn check(sql: &str) -> GateVerdict {
        let query = sql.trim().to_lowercase();

        if !ALLOWED_STARTS.iter().any(|term| query.starts_with(term)) {
            return GateVerdict::rejected(format!(
                "query must start with one of: {}",
                ALLOWED_STARTS.join(", ")
            ));
        }

        if let Some(found) = BLOCKED.find(&query) {
            return GateVerdict::rejected(format!(
                "operation '{}' is not allowed",
                found.as_str()
            ));
        }

        GateVerdict::safe()
    }
}
