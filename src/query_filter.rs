//! Candidate filter for title search.
//!
//! A [`TitleFilter`] is a logical OR of [`Clause`] descriptors. Each clause
//! names the field it looks at, how it matches, and the literal value it
//! matches with. Clauses are plain data so the store (or a test) can render
//! and inspect them; [`TitleFilter::compile`] turns them into case-insensitive
//! regexes for stores that evaluate predicates in process.
//!
//! The prioritized filter for a query `q` is, in order:
//!
//! 1. `title` equals `q`
//! 2. an alternative title equals `q`
//! 3. `title` starts with `q`
//! 4. an alternative title starts with `q`
//! 5. `title` contains `q`
//! 6. an alternative title contains `q`
//! 7. for multi-word queries whose tokens are mostly significant, each
//!    significant token at word boundaries in `title` or an alternative title
//!
//! Clause order doubles as a candidate priority: [`CompiledFilter::fill_pool`]
//! takes exact matches before prefix matches, prefix before containment and
//! containment before token matches, so a bounded pool never crowds out a
//! stronger match with weaker ones.

use regex::Regex;

use crate::{
    error::Result,
    model::TitleRecord,
    text_util::{self, case_insensitive},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    AlternativeTitles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Prefix,
    Contains,
    WordBoundary,
    /// Containment that treats any whitespace run in the value as equal to
    /// any other whitespace run.
    LooseContains,
}

/// Number of priority tiers a record can fall into.
pub const TIERS: usize = 4;

impl MatchKind {
    /// Candidate priority of a clause of this kind, lowest first.
    pub fn tier(self) -> usize {
        match self {
            MatchKind::Exact | MatchKind::LooseContains => 0,
            MatchKind::Prefix => 1,
            MatchKind::Contains => 2,
            MatchKind::WordBoundary => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub field: Field,
    pub kind: MatchKind,
    pub value: String,
}

impl Clause {
    pub fn new(
        field: Field,
        kind: MatchKind,
        value: impl Into<String>,
    ) -> Self {
        Self {
            field,
            kind,
            value: value.into(),
        }
    }

    /// Render the clause as a regex pattern. The value is always escaped.
    pub fn pattern(&self) -> String {
        let escaped = text_util::escape_literal(&self.value);
        match self.kind {
            MatchKind::Exact => format!("^{escaped}$"),
            MatchKind::Prefix => format!("^{escaped}"),
            MatchKind::Contains => escaped,
            MatchKind::WordBoundary => {
                text_util::word_boundary_pattern(&self.value)
            }
            MatchKind::LooseContains => {
                text_util::loose_whitespace_pattern(&self.value)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleFilter {
    clauses: Vec<Clause>,
}

impl TitleFilter {
    /// The full, priority-ordered filter for `query`.
    pub fn prioritized(query: &str) -> Self {
        let q = query.trim();
        let mut clauses = Vec::with_capacity(6);

        for kind in [MatchKind::Exact, MatchKind::Prefix, MatchKind::Contains] {
            clauses.push(Clause::new(Field::Title, kind, q));
            clauses.push(Clause::new(Field::AlternativeTitles, kind, q));
        }

        if text_util::token_clauses_enabled(q) {
            for token in text_util::significant_tokens(q) {
                clauses.push(Clause::new(
                    Field::Title,
                    MatchKind::WordBoundary,
                    token.clone(),
                ));
                clauses.push(Clause::new(
                    Field::AlternativeTitles,
                    MatchKind::WordBoundary,
                    token,
                ));
            }
        }

        Self { clauses }
    }

    /// The fallback filter: un-anchored containment on either title field.
    pub fn minimal(query: &str) -> Self {
        let q = query.trim();
        Self {
            clauses: vec![
                Clause::new(Field::Title, MatchKind::LooseContains, q),
                Clause::new(
                    Field::AlternativeTitles,
                    MatchKind::LooseContains,
                    q,
                ),
            ],
        }
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn compile(&self) -> Result<CompiledFilter> {
        let matchers = self
            .clauses
            .iter()
            .map(|clause| {
                Ok(Matcher {
                    field: clause.field,
                    tier: clause.kind.tier(),
                    regex: case_insensitive(&clause.pattern())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(CompiledFilter { matchers })
    }
}

#[derive(Debug, Clone)]
struct Matcher {
    field: Field,
    tier: usize,
    regex: Regex,
}

impl Matcher {
    fn is_match(&self, record: &TitleRecord) -> bool {
        match self.field {
            Field::Title => self.regex.is_match(&record.title),
            Field::AlternativeTitles => record
                .alternative_titles
                .iter()
                .any(|alt| self.regex.is_match(alt)),
        }
    }
}

/// A [`TitleFilter`] ready to be evaluated against records.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    matchers: Vec<Matcher>,
}

impl CompiledFilter {
    pub fn matches(&self, record: &TitleRecord) -> bool {
        self.matchers.iter().any(|m| m.is_match(record))
    }

    /// Best priority tier among the clauses `record` matches.
    pub fn tier_of(&self, record: &TitleRecord) -> Option<usize> {
        self.matchers
            .iter()
            .filter(|m| m.is_match(record))
            .map(|m| m.tier)
            .min()
    }

    /// Collect up to `limit` matching records, best tier first.
    ///
    /// Within a tier, records keep the order `records` yields them in. The
    /// scan stops as soon as the top tier alone fills the pool.
    pub fn fill_pool<I>(
        &self,
        records: I,
        limit: usize,
    ) -> Result<Vec<TitleRecord>>
    where
        I: IntoIterator<Item = Result<TitleRecord>>,
    {
        let mut tiers: [Vec<TitleRecord>; TIERS] = Default::default();

        for record in records {
            if tiers[0].len() >= limit {
                break;
            }
            let record = record?;
            let Some(tier) = self.tier_of(&record) else {
                continue;
            };
            if tiers[tier].len() < limit {
                tiers[tier].push(record);
            }
        }

        Ok(tiers.into_iter().flatten().take(limit).collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::NewTitle;

    fn record(title: &str, alts: &[&str]) -> TitleRecord {
        TitleRecord::from_new(
            NewTitle {
                title: title.to_string(),
                alternative_titles: alts
                    .iter()
                    .map(|a| a.to_string())
                    .collect(),
                ..Default::default()
            },
            Utc::now(),
        )
    }

    #[test]
    fn prioritized_has_six_base_clauses_in_order() {
        let filter = TitleFilter::prioritized("berserk");
        let kinds: Vec<(Field, MatchKind)> =
            filter.clauses().iter().map(|c| (c.field, c.kind)).collect();

        assert_eq!(
            kinds,
            vec![
                (Field::Title, MatchKind::Exact),
                (Field::AlternativeTitles, MatchKind::Exact),
                (Field::Title, MatchKind::Prefix),
                (Field::AlternativeTitles, MatchKind::Prefix),
                (Field::Title, MatchKind::Contains),
                (Field::AlternativeTitles, MatchKind::Contains),
            ]
        );
    }

    #[test]
    fn token_clauses_added_for_mostly_significant_query() {
        let filter = TitleFilter::prioritized("the great gamer");
        let tokens: Vec<&str> = filter
            .clauses()
            .iter()
            .filter(|c| c.kind == MatchKind::WordBoundary)
            .map(|c| c.value.as_str())
            .collect();

        assert_eq!(tokens, ["great", "great", "gamer", "gamer"]);
    }

    #[test]
    fn no_token_clauses_for_stop_word_query() {
        let filter = TitleFilter::prioritized("a of the");
        assert_eq!(filter.clauses().len(), 6);
    }

    #[test]
    fn patterns_escape_metacharacters() {
        let clause = Clause::new(Field::Title, MatchKind::Prefix, "Re:Zero (2)");
        assert_eq!(clause.pattern(), r"^Re:Zero \(2\)");

        let clause = Clause::new(Field::Title, MatchKind::Exact, "a+b");
        assert_eq!(clause.pattern(), r"^a\+b$");
    }

    #[test]
    fn metacharacters_in_query_match_literally() {
        let compiled = TitleFilter::prioritized("D.Gray-man").compile().unwrap();

        assert!(compiled.matches(&record("D.Gray-man", &[])));
        assert!(!compiled.matches(&record("DxGray-man", &[])));
    }

    #[test]
    fn matching_is_case_insensitive_on_both_fields() {
        let compiled = TitleFilter::prioritized("shingeki").compile().unwrap();

        assert!(compiled.matches(&record("SHINGEKI no Kyojin", &[])));
        assert!(compiled.matches(&record(
            "Attack on Titan",
            &["Shingeki no Kyojin"]
        )));
        assert!(!compiled.matches(&record("Vinland Saga", &["Vinland"])));
    }

    #[test]
    fn token_clause_matches_reordered_words() {
        let compiled =
            TitleFilter::prioritized("gamer great").compile().unwrap();
        assert!(compiled.matches(&record("The Great Gamer", &[])));
    }

    #[test]
    fn token_clause_respects_word_boundaries() {
        let compiled =
            TitleFilter::prioritized("one shot story").compile().unwrap();

        assert!(compiled.matches(&record("One Piece", &[])));
        assert!(!compiled.matches(&record("Onessa", &[])));
    }

    #[test]
    fn tiers_follow_clause_priority() {
        let compiled = TitleFilter::prioritized("frieren").compile().unwrap();

        assert_eq!(compiled.tier_of(&record("Frieren", &[])), Some(0));
        assert_eq!(
            compiled.tier_of(&record("Sousou no", &["frieren"])),
            Some(0)
        );
        assert_eq!(
            compiled.tier_of(&record("Frieren: Beyond", &[])),
            Some(1)
        );
        assert_eq!(
            compiled.tier_of(&record("Beyond Frieren", &[])),
            Some(2)
        );
        assert_eq!(compiled.tier_of(&record("Dungeon Meshi", &[])), None);
    }

    #[test]
    fn fill_pool_puts_exact_matches_ahead_of_containment() {
        let compiled = TitleFilter::prioritized("someone").compile().unwrap();
        let mut records: Vec<TitleRecord> = (0..10)
            .map(|i| record(&format!("Tale of Someone {i}"), &[]))
            .collect();
        records.push(record("Someone", &[]));

        let records = records.into_iter().map(Ok::<_, crate::error::Error>);
        let pool = compiled.fill_pool(records, 3).unwrap();

        assert_eq!(pool.len(), 3);
        assert_eq!(pool[0].title, "Someone");
        assert_eq!(pool[1].title, "Tale of Someone 0");
        assert_eq!(pool[2].title, "Tale of Someone 1");
    }

    #[test]
    fn minimal_filter_tolerates_whitespace_runs() {
        let prioritized = TitleFilter::prioritized("to  be").compile().unwrap();
        let minimal = TitleFilter::minimal("to  be").compile().unwrap();
        let hero = record("To Be Hero", &[]);

        assert!(!prioritized.matches(&hero));
        assert!(minimal.matches(&hero));
    }
}
