//! Fixtures for service tests

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::document_service::fetch_document;
use super::search::index_document;
use crate::models::{AccessLevel, Document, DocumentStatus, NewDocument};

pub(crate) struct DocumentSeed {
    owner_id: String,
    title: String,
    file_name: String,
    description: Option<String>,
    tags: BTreeSet<String>,
    content_text: Option<String>,
}

impl DocumentSeed {
    pub(crate) fn new(owner_id: &str, title: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            title: title.into(),
            file_name: "document.txt".to_string(),
            description: None,
            tags: BTreeSet::new(),
            content_text: None,
        }
    }

    pub(crate) fn file_name(mut self, file_name: &str) -> Self {
        self.file_name = file_name.to_string();
        self
    }

    pub(crate) fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub(crate) fn tags<const N: usize>(mut self, tags: [&str; N]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub(crate) fn content_text(mut self, text: &str) -> Self {
        self.content_text = Some(text.to_string());
        self
    }
}

/// Insert a ready, indexed document at version 1
pub(crate) async fn insert_document_with(pool: &SqlitePool, seed: DocumentSeed) -> Document {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let mime_type = NewDocument::new(&seed.file_name).resolved_mime_type();

    sqlx::query(
        r#"
        INSERT INTO documents (id, owner_id, status, title, description, tags_json, is_public,
                               file_name, mime_type, file_size, storage_key, content_text,
                               version, created_at, updated_at)
        VALUES (?, ?, 'ready', ?, ?, ?, 0, ?, ?, 0, ?, ?, 1, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&seed.owner_id)
    .bind(&seed.title)
    .bind(&seed.description)
    .bind(serde_json::to_string(&seed.tags).unwrap())
    .bind(&seed.file_name)
    .bind(&mime_type)
    .bind(format!("documents/{}/{}", seed.owner_id, id))
    .bind(&seed.content_text)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .unwrap();

    let document = fetch_document(pool, &id).await.unwrap().unwrap();
    let mut conn = pool.acquire().await.unwrap();
    index_document(&mut conn, &document).await.unwrap();
    document
}

pub(crate) async fn insert_document(
    pool: &SqlitePool,
    owner_id: &str,
    title: &str,
    description: Option<&str>,
) -> Document {
    let mut seed = DocumentSeed::new(owner_id, title);
    if let Some(description) = description {
        seed = seed.description(description);
    }
    insert_document_with(pool, seed).await
}

/// Insert a grant directly, bypassing the owner checks
pub(crate) async fn insert_share(
    pool: &SqlitePool,
    document_id: &str,
    recipient_id: &str,
    level: AccessLevel,
    expires_at: Option<DateTime<Utc>>,
    revoked: bool,
) -> String {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let (owner_id,): (String,) = sqlx::query_as("SELECT owner_id FROM documents WHERE id = ?")
        .bind(document_id)
        .fetch_one(pool)
        .await
        .unwrap();

    sqlx::query(
        r#"
        INSERT INTO document_shares (id, document_id, owner_id, recipient_id, access_level,
                                     expires_at, revoked, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(document_id)
    .bind(owner_id)
    .bind(recipient_id)
    .bind(level.to_string())
    .bind(expires_at)
    .bind(revoked)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .unwrap();

    id
}

pub(crate) async fn set_status(pool: &SqlitePool, document_id: &str, status: DocumentStatus) {
    sqlx::query("UPDATE documents SET status = ? WHERE id = ?")
        .bind(status.to_string())
        .bind(document_id)
        .execute(pool)
        .await
        .unwrap();
}

/// Insert `count` ready documents for one owner in a single statement,
/// without indexing them
pub(crate) async fn insert_bulk_documents(pool: &SqlitePool, owner_id: &str, count: u32) {
    let now = Utc::now();
    sqlx::query(
        r#"
        WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < ?)
        INSERT INTO documents (id, owner_id, status, title, description, tags_json, is_public,
                               file_name, mime_type, file_size, storage_key, content_text,
                               version, created_at, updated_at)
        SELECT 'bulk-' || i, ?, 'ready', 'Monthly operations report number ' || i, NULL,
               '["operations","archive","monthly"]', 0, 'operations-report-' || i || '.txt',
               'text/plain', 0, 'documents/' || ? || '/bulk-' || i, NULL, 1, ?, ?
        FROM n
        "#,
    )
    .bind(count)
    .bind(owner_id)
    .bind(owner_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .unwrap();
}
