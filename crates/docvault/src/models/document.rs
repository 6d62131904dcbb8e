//! Document model
//!
//! A document is owned by exactly one identity. Shares, links and revisions
//! reference it but never own it.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{VaultError, VaultResult};

/// Lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Processing,
    Ready,
    Failed,
    Deleted,
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentStatus::Processing => write!(f, "processing"),
            DocumentStatus::Ready => write!(f, "ready"),
            DocumentStatus::Failed => write!(f, "failed"),
            DocumentStatus::Deleted => write!(f, "deleted"),
        }
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "processing" => Ok(DocumentStatus::Processing),
            "ready" => Ok(DocumentStatus::Ready),
            "failed" => Ok(DocumentStatus::Failed),
            "deleted" => Ok(DocumentStatus::Deleted),
            _ => Err(format!("Invalid document status: {}", s)),
        }
    }
}

/// The mutable, revision-tracked part of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub is_public: bool,
}

impl DocumentMetadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            tags: BTreeSet::new(),
            is_public: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn tags_json(&self) -> VaultResult<String> {
        Ok(serde_json::to_string(&self.tags)?)
    }
}

/// Full document record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub owner_id: String,
    pub status: DocumentStatus,
    pub title: String,
    pub description: Option<String>,
    pub tags: BTreeSet<String>,
    pub is_public: bool,
    pub file_name: String,
    pub mime_type: String,
    pub file_size: i64,
    #[serde(skip_serializing)]
    pub storage_key: String,
    #[serde(skip_serializing)]
    pub content_text: Option<String>,
    pub page_count: Option<i64>,
    pub thumbnail_key: Option<String>,
    pub version: i64,
    pub view_count: i64,
    pub download_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata {
            title: self.title.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            is_public: self.is_public,
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }

    pub fn is_deleted(&self) -> bool {
        self.status == DocumentStatus::Deleted
    }

    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id.clone(),
            owner_id: self.owner_id.clone(),
            status: self.status,
            title: self.title.clone(),
            tags: self.tags.clone(),
            file_name: self.file_name.clone(),
            mime_type: self.mime_type.clone(),
            file_size: self.file_size,
            version: self.version,
            view_count: self.view_count,
            download_count: self.download_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Column list matching [`DocumentRow`]
pub(crate) const DOCUMENT_COLUMNS: &str = "d.id, d.owner_id, d.status, d.title, d.description, \
     d.tags_json, d.is_public, d.file_name, d.mime_type, d.file_size, d.storage_key, \
     d.content_text, d.page_count, d.thumbnail_key, d.version, d.view_count, \
     d.download_count, d.created_at, d.updated_at";

/// Raw `documents` row
#[derive(Debug, FromRow)]
pub(crate) struct DocumentRow {
    pub id: String,
    pub owner_id: String,
    pub status: String,
    pub title: String,
    pub description: Option<String>,
    pub tags_json: String,
    pub is_public: bool,
    pub file_name: String,
    pub mime_type: String,
    pub file_size: i64,
    pub storage_key: String,
    pub content_text: Option<String>,
    pub page_count: Option<i64>,
    pub thumbnail_key: Option<String>,
    pub version: i64,
    pub view_count: i64,
    pub download_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DocumentRow> for Document {
    type Error = VaultError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        Ok(Document {
            status: row.status.parse().map_err(VaultError::Internal)?,
            tags: parse_tags_json(&row.tags_json)?,
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            description: row.description,
            is_public: row.is_public,
            file_name: row.file_name,
            mime_type: row.mime_type,
            file_size: row.file_size,
            storage_key: row.storage_key,
            content_text: row.content_text,
            page_count: row.page_count,
            thumbnail_key: row.thumbnail_key,
            version: row.version,
            view_count: row.view_count,
            download_count: row.download_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(crate) fn parse_tags_json(raw: &str) -> VaultResult<BTreeSet<String>> {
    if raw.trim().is_empty() {
        return Ok(BTreeSet::new());
    }
    Ok(serde_json::from_str(raw)?)
}

/// Document summary for list and search views
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub owner_id: String,
    pub status: DocumentStatus,
    pub title: String,
    pub tags: BTreeSet<String>,
    pub file_name: String,
    pub mime_type: String,
    pub file_size: i64,
    pub version: i64,
    pub view_count: i64,
    pub download_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to store a new document
#[derive(Debug, Clone, Deserialize)]
pub struct NewDocument {
    pub file_name: String,
    /// Guessed from the file name when absent
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Defaults to the file name without extension
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_public: bool,
    /// Text extracted by the ingestion pipeline, indexed for search
    #[serde(default)]
    pub content_text: Option<String>,
}

impl NewDocument {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: None,
            title: None,
            description: None,
            tags: Vec::new(),
            is_public: false,
            content_text: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn content_text(mut self, text: impl Into<String>) -> Self {
        self.content_text = Some(text.into());
        self
    }

    /// Title to store: explicit title, else the file stem
    pub fn resolved_title(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => std::path::Path::new(&self.file_name)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| self.file_name.clone()),
        }
    }

    pub fn resolved_mime_type(&self) -> String {
        self.mime_type
            .clone()
            .unwrap_or_else(|| {
                mime_guess::from_path(&self.file_name)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string()
            })
    }
}

/// Partial metadata update; absent fields keep their stored value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentPatch {
    #[serde(default)]
    pub title: Option<String>,
    /// `Some("")` clears the description
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub is_public: Option<bool>,
    /// ETag the client last saw
    #[serde(default)]
    pub if_match: Option<String>,
}

impl DocumentPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.tags.is_none()
            && self.is_public.is_none()
    }
}

/// Bytes handed back by a download
#[derive(Debug, Clone)]
pub struct DocumentContent {
    pub document_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_strings() {
        for status in [
            DocumentStatus::Processing,
            DocumentStatus::Ready,
            DocumentStatus::Failed,
            DocumentStatus::Deleted,
        ] {
            assert_eq!(status.to_string().parse::<DocumentStatus>().unwrap(), status);
        }
        assert!("archived".parse::<DocumentStatus>().is_err());
    }

    #[test]
    fn test_new_document_defaults() {
        let doc = NewDocument::new("Invoice March.pdf");
        assert_eq!(doc.resolved_title(), "Invoice March");
        assert_eq!(doc.resolved_mime_type(), "application/pdf");

        let doc = NewDocument::new("notes").title("  ");
        assert_eq!(doc.resolved_title(), "notes");
        assert_eq!(doc.resolved_mime_type(), "application/octet-stream");
    }

    #[test]
    fn test_tags_json_is_sorted_set() {
        let meta = DocumentMetadata::new("t").with_tags(["b", "a", "b"]);
        assert_eq!(meta.tags_json().unwrap(), r#"["a","b"]"#);
        assert_eq!(parse_tags_json("").unwrap().len(), 0);
    }
}
