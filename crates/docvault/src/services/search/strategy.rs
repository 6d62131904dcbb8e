//! The ordered search strategies
//!
//! Each strategy answers one page of document ids plus the total it found.
//! The orchestrator tries them in a fixed order and keeps the first that
//! finds anything.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

use super::query::{NormalizedQuery, MIN_FUZZY_CHARS};
use super::scope::CorpusFilter;
use super::trigram;
use crate::error::{VaultError, VaultResult};
use crate::models::{parse_tags_json, PaginationParams, StrategyKind};

/// One ranked page from a strategy
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyPage {
    /// Document ids in rank order, with the strategy's score
    pub hits: Vec<(String, Option<f64>)>,
    /// Matches across all pages
    pub total: u64,
}

impl StrategyPage {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

#[async_trait]
pub trait SearchStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Whether this strategy applies to the query at all
    fn can_handle(&self, query: &NormalizedQuery) -> bool;

    async fn search(
        &self,
        pool: &SqlitePool,
        query: &NormalizedQuery,
        scope: &CorpusFilter,
        page: PaginationParams,
    ) -> VaultResult<StrategyPage>;
}

/// Cascade in its fixed order
pub fn default_strategies(trigram_threshold: f64) -> Vec<Box<dyn SearchStrategy>> {
    vec![
        Box::new(ExactStrategy),
        Box::new(PrefixStrategy),
        Box::new(TrigramStrategy::new(trigram_threshold)),
        Box::new(WildcardStrategy),
    ]
}

#[derive(FromRow)]
struct RankedRow {
    id: String,
    relevance: f64,
}

/// Column weights for `bm25`: document_id, title, description, tags,
/// file_name, body
const BM25_WEIGHTS: &str = "0.0, 10.0, 4.0, 6.0, 4.0, 1.0";

async fn full_text_page(
    pool: &SqlitePool,
    expression: String,
    scope: &CorpusFilter,
    page: PaginationParams,
) -> VaultResult<StrategyPage> {
    let mut count = QueryBuilder::<Sqlite>::new(
        "SELECT COUNT(*) FROM document_index JOIN documents d ON d.id = document_index.document_id \
         WHERE document_index MATCH ",
    );
    count.push_bind(expression.clone()).push(" AND ");
    scope.push_conditions(&mut count);
    let (total,): (i64,) = count.build_query_as::<(i64,)>().fetch_one(pool).await?;

    if total == 0 {
        return Ok(StrategyPage::default());
    }

    let mut select = QueryBuilder::<Sqlite>::new(format!(
        "SELECT d.id AS id, bm25(document_index, {}) AS relevance \
         FROM document_index JOIN documents d ON d.id = document_index.document_id \
         WHERE document_index MATCH ",
        BM25_WEIGHTS
    ));
    select.push_bind(expression).push(" AND ");
    scope.push_conditions(&mut select);
    select
        .push(" ORDER BY relevance ASC, d.created_at DESC, d.id DESC LIMIT ")
        .push_bind(page.limit as i64)
        .push(" OFFSET ")
        .push_bind(page.offset() as i64);

    let rows: Vec<RankedRow> = select.build_query_as::<RankedRow>().fetch_all(pool).await?;

    Ok(StrategyPage {
        // bm25 is lower-is-better; flip it so higher scores rank first
        hits: rows.into_iter().map(|r| (r.id, Some(-r.relevance))).collect(),
        total: total as u64,
    })
}

/// Every token must appear, as a whole word
pub struct ExactStrategy;

#[async_trait]
impl SearchStrategy for ExactStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Exact
    }

    fn can_handle(&self, query: &NormalizedQuery) -> bool {
        !query.tokens().is_empty()
    }

    async fn search(
        &self,
        pool: &SqlitePool,
        query: &NormalizedQuery,
        scope: &CorpusFilter,
        page: PaginationParams,
    ) -> VaultResult<StrategyPage> {
        match query.fts_all_terms() {
            Some(expression) => full_text_page(pool, expression, scope, page).await,
            None => Ok(StrategyPage::default()),
        }
    }
}

/// Any token of three or more characters as a word prefix
pub struct PrefixStrategy;

#[async_trait]
impl SearchStrategy for PrefixStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Prefix
    }

    fn can_handle(&self, query: &NormalizedQuery) -> bool {
        query.normalized_len() >= MIN_FUZZY_CHARS && query.fts_prefix_terms().is_some()
    }

    async fn search(
        &self,
        pool: &SqlitePool,
        query: &NormalizedQuery,
        scope: &CorpusFilter,
        page: PaginationParams,
    ) -> VaultResult<StrategyPage> {
        match query.fts_prefix_terms() {
            Some(expression) => full_text_page(pool, expression, scope, page).await,
            None => Ok(StrategyPage::default()),
        }
    }
}

#[derive(FromRow)]
struct CandidateRow {
    id: String,
    title: String,
    file_name: String,
    tags_json: String,
    created_at: DateTime<Utc>,
}

/// Rows scored between checks of the cancel flag
const SCORE_CHUNK: usize = 256;

/// Approximate match on title, file name and tags
pub struct TrigramStrategy {
    threshold: f64,
}

impl TrigramStrategy {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

fn score_row(query: &str, row: &CandidateRow) -> VaultResult<f64> {
    let mut best =
        trigram::best_match(query, &row.title).max(trigram::best_match(query, &row.file_name));
    for tag in parse_tags_json(&row.tags_json)? {
        best = best.max(trigram::best_match(query, &tag));
    }
    Ok(best)
}

/// Score candidates off the async runtime. Stops early once `cancelled` is
/// set; the partial result is never read.
fn score_candidates(
    query: &str,
    rows: Vec<CandidateRow>,
    threshold: f64,
    cancelled: &AtomicBool,
) -> VaultResult<Vec<(f64, CandidateRow)>> {
    let mut scored = Vec::new();
    for (i, row) in rows.into_iter().enumerate() {
        if i % SCORE_CHUNK == 0 && cancelled.load(AtomicOrdering::Relaxed) {
            return Ok(Vec::new());
        }
        let score = score_row(query, &row)?;
        if score >= threshold {
            scored.push((score, row));
        }
    }
    Ok(scored)
}

/// Raises the flag when the awaiting future is dropped, e.g. by a timeout
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, AtomicOrdering::Relaxed);
    }
}

#[async_trait]
impl SearchStrategy for TrigramStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Trigram
    }

    fn can_handle(&self, query: &NormalizedQuery) -> bool {
        query.normalized_len() >= MIN_FUZZY_CHARS
    }

    async fn search(
        &self,
        pool: &SqlitePool,
        query: &NormalizedQuery,
        scope: &CorpusFilter,
        page: PaginationParams,
    ) -> VaultResult<StrategyPage> {
        let mut select = QueryBuilder::<Sqlite>::new(
            "SELECT d.id, d.title, d.file_name, d.tags_json, d.created_at FROM documents d WHERE ",
        );
        scope.push_conditions(&mut select);
        let rows = select.build_query_as::<CandidateRow>().fetch_all(pool).await?;

        let needle = query.normalized().to_string();
        let threshold = self.threshold;
        let cancelled = Arc::new(AtomicBool::new(false));
        let guard = CancelOnDrop(Arc::clone(&cancelled));
        let mut scored = tokio::task::spawn_blocking(move || {
            score_candidates(&needle, rows, threshold, &cancelled)
        })
        .await
        .map_err(|e| VaultError::Internal(format!("trigram scoring task failed: {}", e)))??;
        drop(guard);

        scored.sort_by(|(sa, a), (sb, b)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.id.cmp(&a.id))
        });

        let total = scored.len() as u64;
        let hits = scored
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .map(|(score, row)| (row.id, Some(score)))
            .collect();

        Ok(StrategyPage { hits, total })
    }
}

fn push_pattern_match(qb: &mut QueryBuilder<'_, Sqlite>, pattern: &str) {
    qb.push(" AND (d.title LIKE ")
        .push_bind(pattern.to_string())
        .push(" ESCAPE '\\' OR d.description LIKE ")
        .push_bind(pattern.to_string())
        .push(" ESCAPE '\\' OR d.file_name LIKE ")
        .push_bind(pattern.to_string())
        .push(" ESCAPE '\\' OR EXISTS (SELECT 1 FROM json_each(d.tags_json) WHERE json_each.value LIKE ")
        .push_bind(pattern.to_string())
        .push(" ESCAPE '\\'))");
}

#[derive(FromRow)]
struct IdRow {
    id: String,
}

/// Substring match with `*` and `?` wildcards, newest first
pub struct WildcardStrategy;

#[async_trait]
impl SearchStrategy for WildcardStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Wildcard
    }

    fn can_handle(&self, query: &NormalizedQuery) -> bool {
        !query.is_blank() && query.has_literal()
    }

    async fn search(
        &self,
        pool: &SqlitePool,
        query: &NormalizedQuery,
        scope: &CorpusFilter,
        page: PaginationParams,
    ) -> VaultResult<StrategyPage> {
        let pattern = query.like_pattern();

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM documents d WHERE ");
        scope.push_conditions(&mut count);
        push_pattern_match(&mut count, &pattern);
        let (total,): (i64,) = count.build_query_as::<(i64,)>().fetch_one(pool).await?;

        if total == 0 {
            return Ok(StrategyPage::default());
        }

        let mut select = QueryBuilder::<Sqlite>::new("SELECT d.id FROM documents d WHERE ");
        scope.push_conditions(&mut select);
        push_pattern_match(&mut select, &pattern);
        select
            .push(" ORDER BY d.created_at DESC, d.id DESC LIMIT ")
            .push_bind(page.limit as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);
        let rows = select.build_query_as::<IdRow>().fetch_all(pool).await?;

        Ok(StrategyPage {
            hits: rows.into_iter().map(|r| (r.id, None)).collect(),
            total: total as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preconditions() {
        let exact = ExactStrategy;
        let prefix = PrefixStrategy;
        let trigram = TrigramStrategy::new(0.3);
        let wildcard = WildcardStrategy;

        let short = NormalizedQuery::parse("q1");
        assert!(exact.can_handle(&short));
        assert!(!prefix.can_handle(&short));
        assert!(!trigram.can_handle(&short));
        assert!(wildcard.can_handle(&short));

        let only_wildcards = NormalizedQuery::parse("*?*");
        assert!(!exact.can_handle(&only_wildcards));
        assert!(!wildcard.can_handle(&only_wildcards));

        let blank = NormalizedQuery::parse("");
        assert!(default_strategies(0.3).iter().all(|s| !s.can_handle(&blank)));
    }

    #[test]
    fn test_scoring_stops_once_cancelled() {
        let rows = (0..1000)
            .map(|i| CandidateRow {
                id: format!("doc-{}", i),
                title: "Quarterly".into(),
                file_name: "quarterly.txt".into(),
                tags_json: "[]".into(),
                created_at: Utc::now(),
            })
            .collect::<Vec<_>>();

        let live = AtomicBool::new(false);
        let scored = score_candidates("quartrly", rows, 0.3, &live).unwrap();
        assert_eq!(scored.len(), 1000);

        let cancelled = AtomicBool::new(true);
        let rows = vec![CandidateRow {
            id: "doc".into(),
            title: "Quarterly".into(),
            file_name: "quarterly.txt".into(),
            tags_json: "[]".into(),
            created_at: Utc::now(),
        }];
        assert!(score_candidates("quartrly", rows, 0.3, &cancelled)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_fixed_order() {
        let kinds: Vec<StrategyKind> = default_strategies(0.3).iter().map(|s| s.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                StrategyKind::Exact,
                StrategyKind::Prefix,
                StrategyKind::Trigram,
                StrategyKind::Wildcard
            ]
        );
    }
}
