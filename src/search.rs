use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    model::{TitleRecord, TitleSummary},
    query_filter::TitleFilter,
    scorer::QueryScorer,
    store::TitleStore,
};

pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 50;

pub const MIN_POOL: usize = 100;
pub const MAX_POOL: usize = 300;
pub const POOL_PER_RESULT: usize = 5;

/// A validated search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub page: usize,
    pub limit: usize,
}

impl SearchRequest {
    /// Validate raw request parameters.
    ///
    /// The query must be non-empty after trimming and `page` must be at least
    /// 1. `limit` defaults to 20 and is clamped to 1..=50.
    pub fn new(
        query: Option<&str>,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Self> {
        let query = query.map(str::trim).unwrap_or_default();
        if query.is_empty() {
            return Err(Error::InvalidRequest(
                "a non-empty search query is required".into(),
            ));
        }

        let page = match page {
            None => 1,
            Some(p) if p >= 1 => p as usize,
            Some(p) => {
                return Err(Error::InvalidRequest(format!(
                    "page must be a positive integer, got {p}"
                )));
            }
        };

        let limit = limit.map_or(DEFAULT_LIMIT, |l| {
            l.clamp(1, MAX_LIMIT as i64) as usize
        });

        Ok(Self {
            query: query.to_string(),
            page,
            limit,
        })
    }

    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn pool_size(&self) -> usize {
        candidate_pool_size(self.limit)
    }
}

/// How many candidates are pulled from the store before scoring.
pub fn candidate_pool_size(limit: usize) -> usize {
    limit
        .saturating_mul(POOL_PER_RESULT)
        .min(MAX_POOL)
        .max(MIN_POOL)
}

/// A title on a result page together with its relevance score.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub title: TitleSummary,
    pub score: i64,
}

/// One page of ranked results.
///
/// `total_matches` comes from an unscored count over the whole filter.
/// When it exceeds the number of candidates that were scored, `truncated` is
/// set: pages past the pool can then miss true matches.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub query: String,
    pub items: Vec<SearchHit>,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
    pub total_matches: usize,
    pub truncated: bool,
    pub pool_size: usize,
    /// Whether results came from the minimal fallback filter.
    pub fallback: bool,
}

#[derive(Debug, Clone)]
pub struct ScoredTitle {
    pub score: i64,
    pub record: TitleRecord,
}

/// Descending score, then most recently updated, then id.
fn rank_order(a: &ScoredTitle, b: &ScoredTitle) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| b.record.last_updated.cmp(&a.record.last_updated))
        .then_with(|| a.record.id.cmp(&b.record.id))
}

fn ensure_live(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// Score and sort a candidate pool.
///
/// Scoring runs in parallel and stops early once `cancel` fires, in which case
/// `Error::Cancelled` is returned rather than a partial ranking.
pub fn rank_candidates(
    pool: Vec<TitleRecord>,
    query: &str,
    cancel: &CancellationToken,
    now: DateTime<Utc>,
) -> Result<Vec<ScoredTitle>> {
    let scorer = QueryScorer::new(query)?;

    let mut scored: Vec<ScoredTitle> = pool
        .into_par_iter()
        .take_any_while(|_| !cancel.is_cancelled())
        .map(|record| ScoredTitle {
            score: scorer.score(&record, now),
            record,
        })
        .collect();
    ensure_live(cancel)?;

    scored.sort_by(rank_order);
    Ok(scored)
}

fn pull_pool<S: TitleStore + ?Sized>(
    store: &S,
    filter: &TitleFilter,
    pool_size: usize,
    cancel: &CancellationToken,
) -> Result<Vec<TitleRecord>> {
    ensure_live(cancel)?;
    store
        .find_where(filter, Some(pool_size))
        .map_err(Error::into_store_unavailable)
}

/// Run a ranked, paginated title search.
///
/// 1. Pull a bounded candidate pool with the prioritized filter
/// 2. If that is empty, retry once with the minimal filter
/// 3. Count all matches of the filter that produced the pool
/// 4. Score and sort the pool, then slice out the requested page
pub fn execute_search<S: TitleStore + ?Sized>(
    store: &S,
    request: &SearchRequest,
    cancel: &CancellationToken,
    now: DateTime<Utc>,
) -> Result<SearchPage> {
    let pool_size = request.pool_size();

    let mut filter = TitleFilter::prioritized(&request.query);
    let mut pool = pull_pool(store, &filter, pool_size, cancel)?;
    let mut fallback = false;

    if pool.is_empty() {
        tracing::debug!(
            query = %request.query,
            "no candidates, retrying with minimal filter"
        );
        filter = TitleFilter::minimal(&request.query);
        pool = pull_pool(store, &filter, pool_size, cancel)?;
        fallback = true;
    }

    let total_matches = if pool.is_empty() {
        0
    } else {
        ensure_live(cancel)?;
        store
            .count(&filter)
            .map_err(Error::into_store_unavailable)?
            .max(pool.len())
    };

    let ranked = rank_candidates(pool, &request.query, cancel, now)?;
    let scored = ranked.len();

    let items: Vec<SearchHit> = ranked
        .into_iter()
        .skip(request.offset())
        .take(request.limit)
        .map(|s| SearchHit {
            title: s.record.summary(),
            score: s.score,
        })
        .collect();

    let truncated = total_matches > scored;
    if truncated {
        tracing::debug!(
            query = %request.query,
            total_matches,
            scored,
            "match count exceeds candidate pool"
        );
    }

    Ok(SearchPage {
        query: request.query.clone(),
        items,
        page: request.page,
        limit: request.limit,
        total_pages: total_matches.div_ceil(request.limit),
        total_matches,
        truncated,
        pool_size: scored,
        fallback,
    })
}

/// Format a page for human-readable terminal output.
pub fn format_human(page: &SearchPage) {
    if page.items.is_empty() {
        println!("No results found.");
        return;
    }

    let first_rank = (page.page - 1) * page.limit + 1;
    for (i, hit) in page.items.iter().enumerate() {
        println!(
            "{:>3}. [{:>5}] {} ({})",
            first_rank + i,
            hit.score,
            hit.title.title,
            hit.title.id
        );
        if !hit.title.alternative_titles.is_empty() {
            println!("     aka {}", hit.title.alternative_titles.join(" / "));
        }
    }

    println!(
        "\npage {}/{} · {} match(es)",
        page.page, page.total_pages, page.total_matches
    );
    if page.truncated {
        println!(
            "only the top {} candidates were ranked; \
             later pages may miss matches",
            page.pool_size
        );
    }
}

/// Format a page as JSON output.
pub fn format_json(page: &SearchPage) -> Result<()> {
    println!("{}", serde_json::to_string(page)?);
    Ok(())
}
