//! Best-effort parsing of free-text model output.
//!
//! Malformed output is an expected, frequent case, not an exceptional one:
//! every parser here degrades to an empty collection instead of erroring.
//! Callers decide what an empty result means (usually a fallback).

/// Strip surrounding markdown code fences the model may have added.
pub fn strip_code_fences(text: &str) -> &str {
    text.trim()
        .trim_start_matches("```sql")
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Parse a decomposition response into candidate sub-questions.
///
/// Each non-empty line is one candidate. Lines carrying a quoted span yield
/// the text between the first pair of quotes; other lines are taken after
/// stripping list markers. Pure bracket/fence lines are dropped.
pub fn sub_questions(response: &str) -> Vec<String> {
    let mut questions = Vec::new();
    for line in strip_code_fences(response).lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('[') || line.starts_with(']') {
            continue;
        }
        let candidate = if line.contains('"') {
            line.split('"').nth(1).unwrap_or("").to_string()
        } else {
            line.trim_start_matches(|c: char| {
                c.is_ascii_digit() || c == '.' || c == ')' || c == '-' || c == '*' || c == ' '
            })
            .to_string()
        };
        let candidate = candidate.trim();
        if !candidate.is_empty() {
            questions.push(candidate.to_string());
        }
    }
    questions
}

/// Parse a comma-separated list of phrases, dropping quotes, brackets and
/// empty entries.
pub fn comma_list(response: &str) -> Vec<String> {
    strip_code_fences(response)
        .split(',')
        .map(|entry| {
            entry
                .trim()
                .trim_matches(|c| c == '\'' || c == '"' || c == '[' || c == ']')
                .trim()
                .to_string()
        })
        .filter(|entry| !entry.is_empty())
        .collect()
}

/// Parse `table|column|value` lines. Lines that do not split into exactly
/// three non-empty fields are dropped.
pub fn pipe_triples(response: &str) -> Vec<(String, String, String)> {
    let mut triples = Vec::new();
    for line in strip_code_fences(response).lines() {
        let parts: Vec<&str> = line.split('|').map(str::trim).collect();
        if parts.len() != 3 {
            continue;
        }
        if parts.iter().any(|p| p.is_empty()) {
            continue;
        }
        triples.push((
            parts[0].to_string(),
            parts[1].to_string(),
            parts[2].to_string(),
        ));
    }
    triples
}
