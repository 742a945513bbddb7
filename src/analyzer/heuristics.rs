//! Shared detection heuristics
//!
//! Rules that group repeated work need a stable notion of "the same query"
//! and "executed in a tight run"; both live here so every rule agrees.

use once_cell::sync::Lazy;
use regex::Regex;

static QUOTED_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"'[^']*'").unwrap());
static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static HOST: Lazy<Regex> = Lazy::new(|| Regex::new(r#"https?://([^/\s|'"]+)"#).unwrap());

/// Proportion of consecutive line gaps that must be tight for a group of
/// events to count as one loop rather than scattered repeats
const SEQUENTIAL_RATIO: f64 = 0.6;
/// A gap below this many log lines is considered tight
const SEQUENTIAL_GAP: usize = 50;

/// Collapse a SOQL string to its shape: literals and numbers become `?`,
/// whitespace is normalized, case is folded
pub fn normalize_query(query: &str) -> String {
    let s = QUOTED_LITERAL.replace_all(query, "?");
    let s = DIGIT_RUN.replace_all(&s, "?");
    let s = WHITESPACE_RUN.replace_all(&s, " ");
    s.trim().to_lowercase()
}

/// Whether a set of log line indices reads as one tight run of executions
///
/// Needs at least three occurrences; more than [`SEQUENTIAL_RATIO`] of the
/// sorted consecutive gaps must be under [`SEQUENTIAL_GAP`] lines.
pub fn is_sequential(indices: &[usize]) -> bool {
    if indices.len() < 3 {
        return false;
    }
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    let tight = sorted
        .windows(2)
        .filter(|pair| pair[1].saturating_sub(pair[0]) < SEQUENTIAL_GAP)
        .count();
    (tight as f64) > SEQUENTIAL_RATIO * (sorted.len() - 1) as f64
}

/// Pull the host portion out of the first URL in a callout line
pub fn extract_host(content: &str) -> Option<String> {
    HOST.captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
}
