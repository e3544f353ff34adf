//! Normalized text similarity ratios in [0, 1]
//!
//! Both metrics compare case-folded, trimmed text. Two empty strings are
//! identical (1.0).

use conceptlens_common::config::SimilarityMetric;

/// Case-fold and trim a response for comparison
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Similarity of two already-normalized strings
pub fn similarity(metric: SimilarityMetric, a: &str, b: &str) -> f64 {
    match metric {
        SimilarityMetric::Levenshtein => strsim::normalized_levenshtein(a, b),
        SimilarityMetric::SequenceMatcher => gestalt_ratio(a, b),
    }
}

/// Ratcliff/Obershelp ratio: `2 * M / T`
///
/// M is the number of characters in matching blocks found by repeatedly
/// taking the longest common substring and recursing on both sides; T is the
/// combined length.
pub fn gestalt_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (i, j, len) = longest_common_block(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_chars(&a[..i], &b[..j]) + matching_chars(&a[i + len..], &b[j + len..])
}

/// Longest common substring as (start in a, start in b, length)
///
/// Ties resolve to the earliest block in `a`, then in `b`.
fn longest_common_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        for (j, cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb { prev[j] + 1 } else { 0 };
            let len = cur[j + 1];
            if len > best.2 {
                best = (i + 1 - len, j + 1 - len, len);
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    best
}
