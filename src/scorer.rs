//! Relevance scoring for title search.
//!
//! Scores are strictly additive integers. The weights are fixed; clients
//! depend on the exact ordering they produce.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use crate::{
    error::Result,
    model::TitleRecord,
    text_util::{self, case_insensitive},
};

pub const EXACT_TITLE: i64 = 1000;
pub const EXACT_ALT_TITLE: i64 = 800;
pub const PREFIX_TITLE: i64 = 500;
pub const PREFIX_ALT_TITLE: i64 = 400;
pub const CONTAINS_TITLE: i64 = 300;
pub const CONTAINS_ALT_TITLE: i64 = 200;
pub const TOKEN_TITLE_START: i64 = 150;
pub const TOKEN_TITLE_WORD: i64 = 75;
pub const TOKEN_ALT_TITLE_WORD: i64 = 40;
pub const SHORT_TITLE: i64 = 20;
pub const RECENTLY_UPDATED: i64 = 10;

/// Titles at most this many characters longer than the query are "short".
pub const SHORT_TITLE_SLACK: usize = 10;

pub const RECENT_WINDOW_DAYS: i64 = 7;

struct ScoredToken {
    lower: String,
    word: Regex,
}

/// A query prepared once and scored against many records.
pub struct QueryScorer {
    query_lower: String,
    query_chars: usize,
    tokens: Vec<ScoredToken>,
}

impl QueryScorer {
    pub fn new(query: &str) -> Result<Self> {
        let query = query.trim();
        let tokens = text_util::significant_tokens(query)
            .into_iter()
            .map(|lower| {
                let word =
                    case_insensitive(&text_util::word_boundary_pattern(&lower))?;
                Ok(ScoredToken { lower, word })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            query_lower: query.to_lowercase(),
            query_chars: query.chars().count(),
            tokens,
        })
    }

    pub fn score(&self, record: &TitleRecord, now: DateTime<Utc>) -> i64 {
        let q = self.query_lower.as_str();
        let title = record.title.to_lowercase();
        let alts: Vec<String> = record
            .alternative_titles
            .iter()
            .map(|alt| alt.to_lowercase())
            .collect();

        let mut score = 0;

        if title == q {
            score += EXACT_TITLE;
        }
        if alts.iter().any(|alt| alt == q) {
            score += EXACT_ALT_TITLE;
        }
        if title.starts_with(q) {
            score += PREFIX_TITLE;
        }
        if alts.iter().any(|alt| alt.starts_with(q)) {
            score += PREFIX_ALT_TITLE;
        }
        if title.contains(q) {
            score += CONTAINS_TITLE;
        }
        if alts.iter().any(|alt| alt.contains(q)) {
            score += CONTAINS_ALT_TITLE;
        }

        for token in &self.tokens {
            if title.starts_with(&token.lower) {
                score += TOKEN_TITLE_START;
            }
            if token.word.is_match(&title) {
                score += TOKEN_TITLE_WORD;
            }
            if alts.iter().any(|alt| token.word.is_match(alt)) {
                score += TOKEN_ALT_TITLE_WORD;
            }
        }

        if record.title.chars().count() <= self.query_chars + SHORT_TITLE_SLACK
        {
            score += SHORT_TITLE;
        }

        if now.signed_duration_since(record.last_updated)
            <= Duration::days(RECENT_WINDOW_DAYS)
        {
            score += RECENTLY_UPDATED;
        }

        score
    }
}

/// Score a single record against `query`.
///
/// Prefer [`QueryScorer`] when scoring many records for the same query.
pub fn score(
    record: &TitleRecord,
    query: &str,
    now: DateTime<Utc>,
) -> Result<i64> {
    Ok(QueryScorer::new(query)?.score(record, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewTitle;

    fn record_at(
        title: &str,
        alts: &[&str],
        last_updated: DateTime<Utc>,
    ) -> TitleRecord {
        TitleRecord::from_new(
            NewTitle {
                title: title.to_string(),
                alternative_titles: alts
                    .iter()
                    .map(|a| a.to_string())
                    .collect(),
                last_updated: Some(last_updated),
                ..Default::default()
            },
            last_updated,
        )
    }

    fn stale(title: &str, alts: &[&str]) -> TitleRecord {
        record_at(title, alts, Utc::now() - Duration::days(30))
    }

    #[test]
    fn exact_title_scores_every_title_clause() {
        let now = Utc::now();
        let r = stale("Berserk", &[]);

        let expected = EXACT_TITLE
            + PREFIX_TITLE
            + CONTAINS_TITLE
            + TOKEN_TITLE_START
            + TOKEN_TITLE_WORD
            + SHORT_TITLE;
        assert_eq!(score(&r, "berserk", now).unwrap(), expected);
    }

    #[test]
    fn exact_alt_title_plus_recency_is_additive() {
        let now = Utc::now();
        let r = record_at(
            "Shingeki no Kyojin: The Complete Collected Edition",
            &["AoT"],
            now - Duration::days(1),
        );

        // "aot" is three characters and no title begins with it, so only the
        // alternative-title clauses, its word bonus and recency apply.
        let expected = EXACT_ALT_TITLE
            + PREFIX_ALT_TITLE
            + CONTAINS_ALT_TITLE
            + TOKEN_ALT_TITLE_WORD
            + RECENTLY_UPDATED;
        assert_eq!(score(&r, "AoT", now).unwrap(), expected);
    }

    #[test]
    fn short_exact_alt_match_with_recent_update() {
        let now = Utc::now();
        let r = record_at(
            "Kimetsu no Yaiba: Complete Edition",
            &["zz"],
            now - Duration::hours(3),
        );

        // "zz" is too short to be a significant token and the title is long,
        // so no token or short-title bonus applies.
        let expected = EXACT_ALT_TITLE
            + PREFIX_ALT_TITLE
            + CONTAINS_ALT_TITLE
            + RECENTLY_UPDATED;
        assert_eq!(score(&r, "zz", now).unwrap(), expected);
        assert_eq!(expected, 1410);
    }

    #[test]
    fn exact_match_outranks_substring_matches() {
        let now = Utc::now();
        let scorer = QueryScorer::new("Monster").unwrap();
        let exact = stale("Monster", &[]);
        let longer = record_at("Monster Musume", &[], now);
        let inner = record_at("My Monster Secret", &[], now);

        let exact_score = scorer.score(&exact, now);
        assert!(exact_score > scorer.score(&longer, now));
        assert!(exact_score > scorer.score(&inner, now));
    }

    #[test]
    fn token_one_respects_word_boundaries() {
        let now = Utc::now();
        let scorer = QueryScorer::new("one more chance").unwrap();

        let boundary = stale("Tale of One Shot", &[]);
        let partial = stale("Tale of Onessa", &[]);

        // "one": only the word bonus differs, neither title starts with it
        assert_eq!(
            scorer.score(&boundary, now) - scorer.score(&partial, now),
            TOKEN_TITLE_WORD
        );
    }

    #[test]
    fn token_bonuses_count_each_significant_token() {
        let now = Utc::now();
        let r =
            stale("A Very Long Title About Great Gamers", &["The Great Gamer"]);

        // tokens: great, gamer
        // great: title word (+75), alt word (+40)
        // gamer: title has "gamers" (no boundary), alt word (+40)
        let got = score(&r, "the great gamer", now).unwrap();
        let expected = EXACT_ALT_TITLE
            + PREFIX_ALT_TITLE
            + CONTAINS_ALT_TITLE
            + TOKEN_TITLE_WORD
            + TOKEN_ALT_TITLE_WORD
            + TOKEN_ALT_TITLE_WORD;
        assert_eq!(got, expected);
    }

    #[test]
    fn stop_words_earn_no_token_bonus() {
        let now = Utc::now();
        let r = stale("The Other Side", &[]);
        let scorer = QueryScorer::new("the of").unwrap();

        assert_eq!(scorer.score(&r, now), SHORT_TITLE);
    }

    #[test]
    fn short_title_bonus_uses_character_counts() {
        let now = Utc::now();
        let scorer = QueryScorer::new("xyz").unwrap();

        let short = stale("Thirteen char", &[]); // 13 == 3 + 10
        let long = stale("Fourteen chars", &[]); // 14

        assert_eq!(scorer.score(&short, now), SHORT_TITLE);
        assert_eq!(scorer.score(&long, now), 0);
    }

    #[test]
    fn recency_window_is_seven_days() {
        let now = Utc::now();
        let scorer = QueryScorer::new("qqq").unwrap();
        let long_title = "Completely Unrelated Long Title";

        let fresh = record_at(long_title, &[], now - Duration::days(6));
        let old = record_at(long_title, &[], now - Duration::days(8));

        assert_eq!(scorer.score(&fresh, now), RECENTLY_UPDATED);
        assert_eq!(scorer.score(&old, now), 0);
    }

    #[test]
    fn unrelated_record_scores_zero() {
        let now = Utc::now();
        let r = stale("Yotsuba&! Complete Collection", &["Yotsuba to!"]);
        assert_eq!(score(&r, "vagabond", now).unwrap(), 0);
    }
}
