//! Search request and result types (request-scoped, never persisted)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DocumentStatus, DocumentSummary, PaginatedResponse};

/// Which member of the cascade produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Exact,
    Prefix,
    Trigram,
    Wildcard,
    /// No strategy applied or all were empty
    Listing,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::Exact => write!(f, "exact"),
            StrategyKind::Prefix => write!(f, "prefix"),
            StrategyKind::Trigram => write!(f, "trigram"),
            StrategyKind::Wildcard => write!(f, "wildcard"),
            StrategyKind::Listing => write!(f, "listing"),
        }
    }
}

/// Sort field for plain listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    Title,
    FileSize,
    ViewCount,
    DownloadCount,
}

impl SortField {
    /// Column on the `documents` table (alias `d`)
    pub(crate) fn column(self) -> &'static str {
        match self {
            SortField::CreatedAt => "d.created_at",
            SortField::Title => "d.title COLLATE NOCASE",
            SortField::FileSize => "d.file_size",
            SortField::ViewCount => "d.view_count",
            SortField::DownloadCount => "d.download_count",
        }
    }
}

impl std::str::FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "date" | "created_at" => Ok(SortField::CreatedAt),
            "title" | "name" => Ok(SortField::Title),
            "size" | "file_size" => Ok(SortField::FileSize),
            "views" | "view_count" => Ok(SortField::ViewCount),
            "downloads" | "download_count" => Ok(SortField::DownloadCount),
            _ => Err(format!("Invalid sort field: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl std::str::FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            _ => Err(format!("Invalid sort direction: {}", s)),
        }
    }
}

/// Structural filters, applied by every strategy and by the listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// MIME type or prefix, e.g. `application/pdf` or `image/`
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub status: Option<DocumentStatus>,
    /// Every listed tag must be present
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_before: Option<DateTime<Utc>>,
}

/// Search query for documents
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default)]
    pub sort_by: SortField,
    #[serde(default)]
    pub direction: SortDirection,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl SearchRequest {
    pub fn query(text: impl Into<String>) -> Self {
        Self {
            query: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn listing() -> Self {
        Self::default()
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn sorted(mut self, sort_by: SortField, direction: SortDirection) -> Self {
        self.sort_by = sort_by;
        self.direction = direction;
        self
    }

    pub fn page(mut self, page: u32, page_size: u32) -> Self {
        self.page = Some(page);
        self.page_size = Some(page_size);
        self
    }
}

/// Search result item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub document: DocumentSummary,
    /// Strategy-specific scale; absent for wildcard and listing
    pub score: Option<f64>,
}

/// One page of results from the chosen strategy
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub strategy: StrategyKind,
    #[serde(flatten)]
    pub page: PaginatedResponse<SearchHit>,
}

impl SearchResult {
    pub fn ids(&self) -> Vec<&str> {
        self.page.items.iter().map(|h| h.document.id.as_str()).collect()
    }
}
