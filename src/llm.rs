//! Text-generation service boundary.
//!
//! The pipeline only sees the `TextGenerator` trait. The shipped
//! implementation speaks the OpenAI-compatible chat-completions protocol
//! and keeps a rolling conversation window for context continuity; the
//! window belongs to the client handle and is resettable independently of
//! any pipeline request.

use crate::config::Config;
use crate::error::{AskError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

const SYSTEM_PROMPT: &str =
    "You are a careful data analytics assistant. Follow the output format \
     each prompt asks for exactly, with no extra commentary.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// Rolling conversation history, bounded to the last N exchanges.
#[derive(Debug)]
pub struct Conversation {
    turns: Vec<ChatTurn>,
    max_turns: usize,
}

impl Conversation {
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: Vec::new(),
            max_turns,
        }
    }

    /// Record one prompt/reply exchange, trimming to the window size.
    pub fn record(&mut self, prompt: &str, reply: &str) {
        self.turns.push(ChatTurn {
            role: "user".to_string(),
            content: prompt.to_string(),
        });
        self.turns.push(ChatTurn {
            role: "assistant".to_string(),
            content: reply.to_string(),
        });
        let cap = self.max_turns * 2;
        if self.turns.len() > cap {
            self.turns.drain(..self.turns.len() - cap);
        }
    }

    pub fn context(&self) -> Vec<ChatTurn> {
        self.turns.clone()
    }

    pub fn reset(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

pub struct LlmClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    conversation: Mutex<Conversation>,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String, max_history_turns: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model,
            base_url,
            conversation: Mutex::new(Conversation::new(max_history_turns)),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.api_key.clone(),
            config.model.clone(),
            config.base_url.clone(),
            config.max_history_turns,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Drop all accumulated conversation context.
    pub fn reset_conversation(&self) {
        self.conversation.lock().unwrap().reset();
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let history = self.conversation.lock().unwrap().context();

        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": SYSTEM_PROMPT,
        })];
        for turn in &history {
            messages.push(serde_json::json!({
                "role": turn.role,
                "content": turn.content,
            }));
        }
        messages.push(serde_json::json!({
            "role": "user",
            "content": prompt,
        }));

        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.1,
            "max_tokens": 1000,
        });

        debug!("calling {} ({} history turns)", self.model, history.len());
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(60))
            .json(&body)
            .send()
            .await
            .map_err(|e| AskError::Llm(format!("LLM API call failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AskError::Llm(format!(
                "LLM API returned {status}: {detail}"
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AskError::Llm(format!("failed to parse LLM response: {e}")))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AskError::Llm("no content in LLM response".to_string()))?
            .trim()
            .to_string();

        self.conversation.lock().unwrap().record(prompt, &content);
        Ok(content)
    }
}

#[cfg(test)]
pub mod testing {
    //! Scripted stand-in for the remote text-generation service.

    use super::*;
    use std::collections::VecDeque;

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
}
