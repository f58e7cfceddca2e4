//! Shared test fixtures: a scripted text-generation provider and seeded
//! scratch databases.

use askdb::error::{AskError, Result};
use askdb::llm::TextGenerator;
use async_trait::async_trait;
use rusqlite::Connection;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::TempDir;

/// Stand-in for the remote text-generation service: replies are scripted
/// in call order.
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<std::result::Result<String, String>>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push_ok(&self, response: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(response.to_string()));
    }

    pub fn push_err(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(AskError::Llm(message)),
            None => Err(AskError::Llm("no scripted response left".to_string())),
        }
    }
}

/// Create a learning-analytics database matching the built-in catalog.
pub fn seeded_db(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("learning.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE Learner (
             id INTEGER PRIMARY KEY,
             name TEXT,
             gender TEXT,
             email TEXT,
             institution_id INTEGER,
             employment_status TEXT
         );
         CREATE TABLE Enrollment (
             id INTEGER PRIMARY KEY,
             learner_id INTEGER,
             course_id INTEGER,
             status TEXT,
             score REAL,
             completed_at TEXT
         );
         INSERT INTO Learner (name, gender, email, institution_id, employment_status) VALUES
             ('John Handcock', 'male', 'john@example.com', 1, 'Employed'),
             ('Alice Diaz', 'female', 'alice@example.com', 1, 'Studying'),
             ('Priya Shah', 'female', 'priya@example.com', 2, 'Employed');
         INSERT INTO Enrollment (learner_id, course_id, status, score, completed_at) VALUES
             (1, 1, 'Completed', 91.5, '2024-11-02'),
             (2, 1, 'Active', NULL, NULL),
             (3, 2, 'Dropped', 12.0, NULL);",
    )
    .unwrap();
    path
}
