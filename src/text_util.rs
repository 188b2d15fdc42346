//! Query text helpers shared by the candidate filter and the scorer.

use regex::{Regex, RegexBuilder};

/// Words too common to say anything about which title is meant.
pub const STOP_WORDS: &[&str] = &[
    "the", "and", "or", "in", "on", "at", "to", "for", "of", "with", "by",
    "an", "a",
];

/// Minimum length, in characters, of a significant token.
pub const MIN_TOKEN_CHARS: usize = 3;

/// Share of significant tokens (percent) a multi-word query needs before
/// per-token clauses are added to the candidate filter.
pub const TOKEN_CLAUSE_MIN_PERCENT: usize = 60;

/// Split a query on whitespace runs.
pub fn tokenize(query: &str) -> Vec<&str> {
    query.split_whitespace().collect()
}

pub fn is_stop_word(token: &str) -> bool {
    let lower = token.to_lowercase();
    STOP_WORDS.contains(&lower.as_str())
}

/// A token is significant when it is long enough and not a stop word.
pub fn is_significant(token: &str) -> bool {
    token.chars().count() >= MIN_TOKEN_CHARS && !is_stop_word(token)
}

/// Lowercased significant tokens of `query`, in query order.
///
/// # Examples
///
/// ```
/// use mangashelf::text_util::significant_tokens;
///
/// assert_eq!(significant_tokens("The Great Gamer"), ["great", "gamer"]);
/// assert!(significant_tokens("a of the").is_empty());
/// ```
pub fn significant_tokens(query: &str) -> Vec<String> {
    tokenize(query)
        .into_iter()
        .filter(|t| is_significant(t))
        .map(str::to_lowercase)
        .collect()
}

/// Whether a query qualifies for per-token word-boundary clauses: at least
/// two tokens, and at least 60% of them significant.
pub fn token_clauses_enabled(query: &str) -> bool {
    let tokens = tokenize(query);
    if tokens.len() < 2 {
        return false;
    }

    let significant = tokens.iter().filter(|t| is_significant(t)).count();
    significant * 100 >= tokens.len() * TOKEN_CLAUSE_MIN_PERCENT
}

/// Escape every regex metacharacter so `text` only ever matches itself.
pub fn escape_literal(text: &str) -> String {
    regex::escape(text)
}

/// Pattern matching `token` only where `\b` holds on both sides.
pub fn word_boundary_pattern(token: &str) -> String {
    format!(r"\b{}\b", escape_literal(token))
}

/// Pattern matching the words of `text` separated by any whitespace run.
pub fn loose_whitespace_pattern(text: &str) -> String {
    tokenize(text)
        .into_iter()
        .map(escape_literal)
        .collect::<Vec<_>>()
        .join(r"\s+")
}

pub fn case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}
