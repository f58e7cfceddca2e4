//! Value matcher: grounds a literal string in the live value domain of one
//! `(table, column)` pair.

use crate::error::Result;
use crate::fuzzy::token_sort_ratio;
use crate::storage::Storage;
use serde::{Deserialize, Serialize};

/// A canonicalization of one literal found in generated SQL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueMapping {
    pub original_value: String,
    pub matched_value: String,
    pub score: u8,
}

/// Best-scoring candidate for `term` among `values`.
///
/// Only a strictly greater score replaces the incumbent, so iteration order
/// breaks ties deterministically. Candidates scoring zero are never
/// selected.
pub fn best_among<'a>(
    term: &str,
    values: impl IntoIterator<Item = &'a str>,
) -> Option<(String, u8)> {
    let mut best: Option<(String, u8)> = None;
    let mut best_score = 0u8;
    for value in values {
        let score = token_sort_ratio(term, value);
        if score > best_score {
            best_score = score;
            best = Some((value.to_string(), score));
        }
    }
    best
}

pub struct ValueMatcher {
    storage: Storage,
}

impl ValueMatcher {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Fuzzy-match `term` against the live distinct values of the column.
    /// Returns `None` when the column holds nothing resembling the term.
    pub fn match_in_column(
        &self,
        term: &str,
        table: &str,
        column: &str,
    ) -> Result<Option<ValueMapping>> {
        let values = self.storage.distinct_values(table, column)?;
        Ok(
            best_among(term, values.iter().map(String::as_str)).map(|(matched_value, score)| {
                ValueMapping {
                    original_value: term.to_string(),
                    matched_value,
                    score,
                }
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_among_prefers_highest_score() {
        let values = ["Active", "Inactive"];
        let (matched, score) = best_among("actv", values).unwrap();
        assert_eq!(matched, "Active");
        assert!(score >= 80);
    }

    #[test]
    fn best_among_is_stable_across_runs() {
        let values = ["Completed", "Dropped", "Active"];
        let first = best_among("complete", values);
        let second = best_among("complete", values);
        assert_eq!(
            first.as_ref().map(|(v, _)| v.as_str()),
            second.as_ref().map(|(v, _)| v.as_str())
        );
        assert_eq!(first.unwrap().0, "Completed");
    }

    #[test]
    fn zero_score_candidates_are_not_matches() {
        assert!(best_among("xyz", ["", ""]).is_none());
        assert!(best_among("abc", []).is_none());
    }
}
