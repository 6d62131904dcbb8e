//! Search orchestration
//!
//! A query runs through the strategies in fixed order: exact, prefix,
//! trigram, wildcard. The first applicable strategy that finds anything
//! answers the whole request, paging included. When none applies or all
//! come back empty, the request falls back to a plain listing of the
//! requester's corpus.

mod index;
mod query;
mod scope;
mod strategy;
mod trigram;

pub(crate) use index::{index_document, remove_from_index};
pub use query::NormalizedQuery;
pub use scope::CorpusFilter;
pub use strategy::{
    default_strategies, ExactStrategy, PrefixStrategy, SearchStrategy, StrategyPage,
    TrigramStrategy, WildcardStrategy,
};

use std::collections::HashMap;
use std::time::Duration;

use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::config::VaultConfig;
use crate::error::{VaultError, VaultResult};
use crate::models::{
    Document, DocumentRow, PaginatedResponse, PaginationParams, SearchHit, SearchRequest,
    SearchResult, SortDirection, SortField, StrategyKind, DOCUMENT_COLUMNS,
};
use crate::security::validate_query;

/// Runs the strategy cascade over a requester's corpus
pub struct SearchService {
    pool: SqlitePool,
    strategies: Vec<Box<dyn SearchStrategy>>,
    strategy_timeout: Duration,
    default_page_size: u32,
    max_page_size: u32,
}

impl SearchService {
    pub fn new(pool: SqlitePool, config: &VaultConfig) -> Self {
        Self {
            pool,
            strategies: default_strategies(config.trigram_threshold),
            strategy_timeout: config.strategy_timeout(),
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
        }
    }

    /// Replace the cascade
    pub fn with_strategies(mut self, strategies: Vec<Box<dyn SearchStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    fn pagination(&self, request: &SearchRequest) -> PaginationParams {
        PaginationParams::new(
            request.page.unwrap_or(1),
            request.page_size.unwrap_or(self.default_page_size),
        )
        .clamped(self.max_page_size)
    }

    /// Search the requester's documents
    pub async fn search(&self, requester_id: &str, request: &SearchRequest) -> VaultResult<SearchResult> {
        let raw = request.query.as_deref().unwrap_or("");
        validate_query(raw)?;

        let query = NormalizedQuery::parse(raw);
        let scope = CorpusFilter::new(requester_id, request.filters.clone());
        let page = self.pagination(request);

        for strategy in &self.strategies {
            let kind = strategy.kind();
            if !strategy.can_handle(&query) {
                continue;
            }

            let found = match tokio::time::timeout(
                self.strategy_timeout,
                strategy.search(&self.pool, &query, &scope, page),
            )
            .await
            {
                Ok(found) => found?,
                Err(_) => {
                    tracing::warn!(
                        "Search strategy {} timed out after {:?}, treating as empty",
                        kind,
                        self.strategy_timeout
                    );
                    continue;
                }
            };

            if found.is_empty() {
                tracing::debug!("Search strategy {} found nothing for {:?}", kind, query.raw());
                continue;
            }

            tracing::debug!(
                "Search strategy {} answered {:?} with {} matches",
                kind,
                query.raw(),
                found.total
            );
            return self.hydrate(kind, found, page).await;
        }

        self.listing_page(&scope, request.sort_by, request.direction, page)
            .await
    }

    /// Plain filtered listing, ignoring any query text
    pub async fn list(&self, requester_id: &str, request: &SearchRequest) -> VaultResult<SearchResult> {
        let scope = CorpusFilter::new(requester_id, request.filters.clone());
        let page = self.pagination(request);
        self.listing_page(&scope, request.sort_by, request.direction, page)
            .await
    }

    async fn listing_page(
        &self,
        scope: &CorpusFilter,
        sort_by: SortField,
        direction: SortDirection,
        page: PaginationParams,
    ) -> VaultResult<SearchResult> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM documents d WHERE ");
        scope.push_conditions(&mut count);
        let (total,) = count
            .build_query_as::<(i64,)>()
            .fetch_one(&self.pool)
            .await?;

        let mut select = QueryBuilder::<Sqlite>::new("SELECT d.id FROM documents d WHERE ");
        scope.push_conditions(&mut select);
        select
            .push(format!(
                " ORDER BY {col} {dir}, d.id {dir} LIMIT ",
                col = sort_by.column(),
                dir = direction.sql()
            ))
            .push_bind(page.limit as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);
        let ids = select
            .build_query_as::<(String,)>()
            .fetch_all(&self.pool)
            .await?;

        let found = StrategyPage {
            hits: ids.into_iter().map(|(id,)| (id, None)).collect(),
            total: total as u64,
        };
        self.hydrate(StrategyKind::Listing, found, page).await
    }

    /// Load summaries for a page of ids, keeping rank order
    async fn hydrate(
        &self,
        strategy: StrategyKind,
        found: StrategyPage,
        page: PaginationParams,
    ) -> VaultResult<SearchResult> {
        let mut documents = load_documents(&self.pool, found.hits.iter().map(|(id, _)| id)).await?;

        let mut items = Vec::with_capacity(found.hits.len());
        for (id, score) in found.hits {
            let document = documents
                .remove(&id)
                .ok_or_else(|| VaultError::Internal(format!("search hit {} vanished", id)))?;
            items.push(SearchHit {
                document: document.summary(),
                score,
            });
        }

        Ok(SearchResult {
            strategy,
            page: PaginatedResponse::new(items, found.total, page.page, page.limit),
        })
    }
}

async fn load_documents<'a, I>(pool: &SqlitePool, ids: I) -> VaultResult<HashMap<String, Document>>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut ids = ids.into_iter().peekable();
    if ids.peek().is_none() {
        return Ok(HashMap::new());
    }

    let mut builder = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM documents d WHERE d.id IN (",
        DOCUMENT_COLUMNS
    ));
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(id.clone());
    }
    separated.push_unseparated(")");

    let rows = builder
        .build_query_as::<DocumentRow>()
        .fetch_all(pool)
        .await?;

    rows.into_iter()
        .map(|row| Document::try_from(row).map(|d| (d.id.clone(), d)))
        .collect()
}
