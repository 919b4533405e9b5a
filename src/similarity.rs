// 🔤 Similarity Scoring - Fuzzy string comparison on a 0..=100 scale
//
// The matcher only sees the `SimilarityScorer` trait, so the policy can be
// tested with fixed scores and the algorithm swapped without touching it.
// The 95 / 90 / 75 thresholds are tuned to `WeightedRatio`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strsim::jaro_winkler;

/// Score two strings, 0 (nothing in common) to 100 (identical)
pub trait SimilarityScorer {
    fn score(&self, a: &str, b: &str) -> u8;
}

impl<F> SimilarityScorer for F
where
    F: Fn(&str, &str) -> u8,
{
    fn score(&self, a: &str, b: &str) -> u8 {
        self(a, b)
    }
}

/// Scorer selectable from the config file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    #[default]
    WeightedRatio,
    JaroWinkler,
}

// ============================================================================
// WEIGHTED RATIO
// ============================================================================

/// Default scorer
///
/// Whole-string ratio, token sort and token set ratios and, when one
/// string is at least 1.5x longer, partial (substring) ratios. Token and
/// partial results are scaled down (0.95, then 0.9 or 0.6 for very
/// different lengths) so only a real whole-string match reaches 100.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedRatio;

const UNBASE_SCALE: f64 = 0.95;

impl SimilarityScorer for WeightedRatio {
    fn score(&self, a: &str, b: &str) -> u8 {
        let a = preprocess(a);
        let b = preprocess(b);
        if a.is_empty() || b.is_empty() {
            return 0;
        }

        let len_a = a.chars().count() as f64;
        let len_b = b.chars().count() as f64;
        let len_ratio = len_a.max(len_b) / len_a.min(len_b);

        let base = ratio(&a, &b);
        let best = if len_ratio < 1.5 {
            base.max(token_ratio(&a, &b) * UNBASE_SCALE)
        } else {
            let partial_scale = if len_ratio < 8.0 { 0.9 } else { 0.6 };
            base.max(partial_ratio(&a, &b) * partial_scale)
                .max(partial_token_ratio(&a, &b) * UNBASE_SCALE * partial_scale)
        };

        best.round().clamp(0.0, 100.0) as u8
    }
}

/// Indel similarity, 0.0..=100.0
///
/// Based on the longest common subsequence: a substitution counts as one
/// deletion plus one insertion.
pub fn ratio(a: &str, b: &str) -> f64 {
    let total = a.chars().count() + b.chars().count();
    if total == 0 {
        return 100.0;
    }
    200.0 * lcs_len(a, b) as f64 / total as f64
}

/// Best `ratio` of the shorter string against any window of the longer
/// one, including windows cut off at either end, 0.0..=100.0
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let (short, long) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };

    let short_len = short.chars().count();
    let long_chars: Vec<char> = long.chars().collect();
    if short_len == 0 {
        return 0.0;
    }
    if short_len == long_chars.len() {
        return ratio(short, long);
    }

    let window = |start: usize, end: usize| -> String { long_chars[start..end].iter().collect() };
    let long_len = long_chars.len();

    let heads = (1..short_len).map(|end| (0, end));
    let middles = (0..=long_len - short_len).map(|start| (start, start + short_len));
    let tails = (long_len - short_len + 1..long_len).map(|start| (start, long_len));

    let mut best: f64 = 0.0;
    for (start, end) in heads.chain(middles).chain(tails) {
        best = best.max(ratio(short, &window(start, end)));
        if best >= 100.0 {
            break;
        }
    }
    best
}

/// Best of token sort and token set ratio
pub fn token_ratio(a: &str, b: &str) -> f64 {
    ratio(&sort_tokens(a), &sort_tokens(b)).max(token_set_ratio(a, b))
}

/// Compares the shared tokens against each side's full token set
///
/// 100 when one side's tokens are all contained in the other's.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let common: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let only_a: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let only_b: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    if !common.is_empty() && (only_a.is_empty() || only_b.is_empty()) {
        return 100.0;
    }

    let only_a = only_a.join(" ");
    let only_b = only_b.join(" ");
    let mut best = ratio(&only_a, &only_b);
    if common.is_empty() {
        return best;
    }

    // "common" vs "common only_x" differ by the separator plus only_x
    let common_len = common.join(" ").chars().count() as f64;
    for rest in [only_a.chars().count() as f64, only_b.chars().count() as f64] {
        let extended = common_len + 1.0 + rest;
        best = best.max(100.0 * (1.0 - (1.0 + rest) / (common_len + extended)));
    }
    best
}

/// Partial ratio on token level; any shared token counts as a full match
pub fn partial_token_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    if tokens_a.intersection(&tokens_b).next().is_some() {
        return 100.0;
    }
    partial_ratio(&sort_tokens(a), &sort_tokens(b))
}

fn lcs_len(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev = vec![0usize; b.len() + 1];
    let mut row = vec![0usize; b.len() + 1];

    for ca in a.chars() {
        for (j, cb) in b.iter().enumerate() {
            row[j + 1] = if ca == *cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(row[j])
            };
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()]
}

fn sort_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Lowercase, alphanumerics only, single spaces
fn preprocess(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// JARO-WINKLER
// ============================================================================

/// Prefix-weighted scorer, for lists where names differ mostly at the end
#[derive(Debug, Clone, Copy, Default)]
pub struct JaroWinkler;

impl SimilarityScorer for JaroWinkler {
    fn score(&self, a: &str, b: &str) -> u8 {
        let a = preprocess(a);
        let b = preprocess(b);
        if a.is_empty() || b.is_empty() {
            return 0;
        }
        (jaro_winkler(&a, &b) * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

// ============================================================================
// TESTS
// ============================================================================
