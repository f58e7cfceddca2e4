/// Runtime configuration for the engine.
///
/// Everything is environment-driven with sensible defaults; the CLI layers
/// flag overrides on top. `.env` loading happens in the binary before this
/// is constructed.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the text-generation service.
    pub api_key: String,

    /// Model identifier sent with each request.
    pub model: String,

    /// Base URL of an OpenAI-compatible chat-completions endpoint.
    pub base_url: String,

    /// Minimum score (exclusive) for accepting a value mapping during
    /// SQL refinement. Tuned constant, not an invariant.
    pub refine_threshold: u8,

    /// When set, refinement drops mappings that already match exactly
    /// (score 100) instead of feeding them to the rewrite step.
    pub refine_skip_exact: bool,

    /// Number of conversation turns the LLM client keeps as context.
    pub max_history_turns: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: "dummy-api-key".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            refine_threshold: 45,
            refine_skip_exact: false,
            max_history_turns: 5,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Self {
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or(defaults.api_key),
            model: std::env::var("OPENAI_MODEL").unwrap_or(defaults.model),
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            refine_threshold: std::env::var("ASKDB_REFINE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.refine_threshold),
            refine_skip_exact: std::env::var("ASKDB_REFINE_SKIP_EXACT")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.refine_skip_exact),
            max_history_turns: std::env::var("ASKDB_MAX_HISTORY_TURNS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_history_turns),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_source_constants() {
        let config = Config::default();
        assert_eq!(config.refine_threshold, 45);
        assert!(!config.refine_skip_exact);
        assert_eq!(config.max_history_turns, 5);
    }
}
