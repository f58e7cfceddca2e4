//! Token-order-independent similarity scoring.
//!
//! Scores are deterministic and live in [0,100]. Both sides are
//! lower-cased, split on whitespace, token-sorted and rejoined before
//! comparison, so "room revenue" and "revenue room" are identical. The
//! ratio itself counts insertions/deletions only (no substitutions), which
//! keeps abbreviations like "actv" close to their expansion while unrelated
//! strings stay far apart.

use strsim::jaro_winkler;

/// Normalize a string for token-sort comparison.
fn token_sort_key(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ").to_lowercase()
}

/// Length of the longest common subsequence of two char slices.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Similarity between two strings on a 0-100 scale, ignoring token order.
///
/// 100 means the normalized forms are identical; anything less is capped at
/// 99 so an exact score keeps meaning "already canonical".
pub fn token_sort_ratio(a: &str, b: &str) -> u8 {
    let key_a = token_sort_key(a);
    let key_b = token_sort_key(b);
    if key_a == key_b {
        return 100;
    }
    let chars_a: Vec<char> = key_a.chars().collect();
    let chars_b: Vec<char> = key_b.chars().collect();
    let total = chars_a.len() + chars_b.len();
    if total == 0 {
        return 100;
    }
    let matched = 2 * lcs_len(&chars_a, &chars_b);
    let score = (matched as f64 / total as f64 * 100.0).round();
    score.min(99.0).max(0.0) as u8
}

/// Similarity for short identifiers such as table names, on the same
/// 0-100 scale. Jaro-Winkler favors shared prefixes, which suits
/// catalog-name lookups where the model returned a near-miss.
pub fn name_similarity(a: &str, b: &str) -> u8 {
    let score = (jaro_winkler(&a.to_lowercase(), &b.to_lowercase()) * 100.0).round();
    score.min(100.0).max(0.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_scores_100() {
        assert_eq!(token_sort_ratio("Active", "Active"), 100);
        assert_eq!(token_sort_ratio("active", "ACTIVE"), 100);
    }

    #[test]
    fn token_order_is_ignored() {
        assert_eq!(token_sort_ratio("room revenue", "revenue room"), 100);
    }

    #[test]
    fn abbreviation_scores_high() {
        let score = token_sort_ratio("actv", "Active");
        assert!(score >= 80, "expected >= 80, got {}", score);
    }

    #[test]
    fn ranking_is_deterministic() {
        let active = token_sort_ratio("actv", "Active");
        let inactive = token_sort_ratio("actv", "Inactive");
        assert!(active > inactive);
        assert_eq!(active, token_sort_ratio("actv", "Active"));
    }

    #[test]
    fn misspelled_name_clears_threshold() {
        assert!(token_sort_ratio("Jon Hancok", "John Handcock") > 45);
    }

    #[test]
    fn unrelated_strings_score_low() {
        assert!(token_sort_ratio("Jon Hancok", "Quarterly Revenue") < 45);
    }

    #[test]
    fn near_miss_never_reports_exact() {
        let score = token_sort_ratio("Activ", "Active");
        assert!(score < 100 && score > 0);
    }

    #[test]
    fn empty_input_does_not_panic() {
        assert_eq!(token_sort_ratio("", ""), 100);
        assert_eq!(token_sort_ratio("", "Active"), 0);
    }

    #[test]
    fn name_similarity_prefers_prefix_matches() {
        assert!(name_similarity("learner", "Learner") == 100);
        assert!(name_similarity("learners", "Learner") > name_similarity("learners", "Course"));
    }
}
