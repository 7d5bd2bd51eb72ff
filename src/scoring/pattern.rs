//! Fuzzy duplicate detection: pattern hashing and similarity scoring.
//!
//! Two findings that describe the same issue rarely share exact text. The
//! pattern hash normalizes away wording and small line-range differences so
//! equal digests flag likely duplicates; the similarity score grades the
//! near misses the hash cannot catch.

use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Similarity below this is not considered a duplicate.
pub const SIMILARITY_THRESHOLD: f64 = 0.5;

/// Words carrying no signal for duplicate matching.
const STOP_WORDS: [&str; 50] = [
    "about", "after", "all", "also", "and", "any", "are", "because", "been", "before", "being",
    "between", "both", "but", "can", "could", "does", "doing", "for", "from", "has", "have",
    "having", "here", "how", "into", "its", "just", "may", "might", "more", "most", "not", "only",
    "other", "should", "some", "such", "than", "that", "the", "then", "there", "these", "this",
    "when", "where", "which", "will", "would",
];

/// Normalize a description into sorted unique lowercase tokens: strip
/// non-alphanumerics, drop stop words and tokens of length <= 2.
pub fn normalize_tokens(description: &str) -> Vec<String> {
    let cleaned: String = description
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    let tokens: BTreeSet<String> = cleaned
        .split_whitespace()
        .filter(|word| word.len() > 2 && !STOP_WORDS.contains(word))
        .map(String::from)
        .collect();
    tokens.into_iter().collect()
}

/// Bucket an inclusive line range to multiples of 10, widening outward.
fn bucket_range(line_start: u32, line_end: u32) -> (u32, u32) {
    let start = (line_start / 10) * 10;
    let end = line_end.div_ceil(10) * 10;
    (start, end)
}

/// First 16 hex chars of SHA-256 over `(file, bucketed range, tokens)`.
///
/// Stable under token reordering and under line-range shifts that stay
/// inside the same 10-line buckets.
pub fn pattern_hash(file_path: &str, line_start: u32, line_end: u32, description: &str) -> String {
    let (start, end) = bucket_range(line_start, line_end);
    let tokens = normalize_tokens(description);
    let input = format!("{}:{}-{}:{}", file_path, start, end, tokens.join(" "));
    let digest = Sha256::digest(input.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..16].to_string()
}

/// Weighted similarity of two findings in [0, 1]: 0.6 line-range overlap
/// plus 0.4 description-token overlap. Zero when the files differ.
pub fn similarity(
    file_a: &str,
    range_a: (u32, u32),
    desc_a: &str,
    file_b: &str,
    range_b: (u32, u32),
    desc_b: &str,
) -> f64 {
    if file_a != file_b {
        return 0.0;
    }

    let len_a = (range_a.1 - range_a.0 + 1) as f64;
    let len_b = (range_b.1 - range_b.0 + 1) as f64;
    let overlap_start = range_a.0.max(range_b.0);
    let overlap_end = range_a.1.min(range_b.1);
    let overlap = if overlap_end >= overlap_start {
        (overlap_end - overlap_start + 1) as f64
    } else {
        0.0
    };
    let line_overlap = overlap / len_a.max(len_b);

    let tokens_a: BTreeSet<String> = normalize_tokens(desc_a).into_iter().collect();
    let tokens_b: BTreeSet<String> = normalize_tokens(desc_b).into_iter().collect();
    let desc_overlap = if tokens_a.is_empty() && tokens_b.is_empty() {
        1.0
    } else if tokens_a.is_empty() || tokens_b.is_empty() {
        0.0
    } else {
        let shared = tokens_a.intersection(&tokens_b).count() as f64;
        shared / (tokens_a.len().max(tokens_b.len()) as f64)
    };

    0.6 * line_overlap + 0.4 * desc_overlap
}
