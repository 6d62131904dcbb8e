//! Document lifecycle: upload, read, download, update, replace, delete

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::{Executor, Sqlite, SqlitePool};
use uuid::Uuid;

use super::access_service::AccessResolver;
use super::audit_service::{ActivityEvent, ActivitySink, AuditAction, AuditService};
use super::concurrency::ETag;
use super::link_service::LinkService;
use super::revision_service::RevisionService;
use super::search::{index_document, remove_from_index};
use super::share_service::ShareService;
use crate::adapters::{DisabledRasterizer, ObjectStorage, ProgressEvent, ProgressHub, Rasterizer};
use crate::config::VaultConfig;
use crate::error::{VaultError, VaultResult};
use crate::models::{
    AccessLevel, Document, DocumentContent, DocumentPatch, DocumentRow, DocumentStatus,
    FileChange, MaterialUpdate, NewDocument, PaginatedResponse, PaginationParams, Revision,
    StoredFile, UpdateOutcome, DOCUMENT_COLUMNS,
};
use crate::security::{normalize_tags, validate_description, validate_file_name, validate_title};

/// Load a document row by id, deleted ones included
pub(crate) async fn fetch_document<'c, E>(executor: E, document_id: &str) -> VaultResult<Option<Document>>
where
    E: Executor<'c, Database = Sqlite>,
{
    let row: Option<DocumentRow> = sqlx::query_as(&format!(
        "SELECT {} FROM documents d WHERE d.id = ?",
        DOCUMENT_COLUMNS
    ))
    .bind(document_id)
    .fetch_optional(executor)
    .await?;

    row.map(Document::try_from).transpose()
}

/// Each upload gets its own key so a replacement never overwrites bytes
/// a committed row still points at
fn object_key(owner_id: &str, document_id: &str) -> String {
    format!("documents/{}/{}/{}", owner_id, document_id, Uuid::new_v4())
}

fn thumbnail_key(storage_key: &str) -> String {
    format!("{}.thumb.png", storage_key)
}

/// Actor recorded for link visitors and pipeline callbacks
pub const ANONYMOUS_ACTOR: &str = "anonymous";
pub const SYSTEM_ACTOR: &str = "system";

/// Document service
#[derive(Clone)]
pub struct DocumentService {
    pool: SqlitePool,
    storage: Arc<dyn ObjectStorage>,
    rasterizer: Arc<dyn Rasterizer>,
    activity: Arc<dyn ActivitySink>,
    progress: ProgressHub,
    presign_ttl: Duration,
    max_page_size: u32,
}

impl DocumentService {
    pub fn new(pool: SqlitePool, storage: Arc<dyn ObjectStorage>, config: &VaultConfig) -> Self {
        Self {
            activity: Arc::new(AuditService::new(pool.clone())),
            pool,
            storage,
            rasterizer: Arc::new(DisabledRasterizer),
            progress: ProgressHub::new(),
            presign_ttl: config.presign_ttl(),
            max_page_size: config.max_page_size,
        }
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn with_activity(mut self, activity: Arc<dyn ActivitySink>) -> Self {
        self.activity = activity;
        self
    }

    pub fn progress(&self) -> &ProgressHub {
        &self.progress
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Store a new document and its bytes
    pub async fn create_document(
        &self,
        owner_id: &str,
        request: NewDocument,
        data: &[u8],
    ) -> VaultResult<Document> {
        validate_file_name(&request.file_name)?;
        let title = request.resolved_title();
        validate_title(&title)?;
        validate_description(request.description.as_deref())?;
        let tags = normalize_tags(&request.tags)?;
        let mime_type = request.resolved_mime_type();

        let id = Uuid::new_v4().to_string();
        let storage_key = object_key(owner_id, &id);
        let now = Utc::now();

        let document = Document {
            id: id.clone(),
            owner_id: owner_id.to_string(),
            status: DocumentStatus::Processing,
            title,
            description: request.description.filter(|d| !d.trim().is_empty()),
            tags,
            is_public: request.is_public,
            file_name: request.file_name,
            mime_type,
            file_size: data.len() as i64,
            storage_key,
            content_text: request.content_text,
            page_count: None,
            thumbnail_key: None,
            version: 1,
            view_count: 0,
            download_count: 0,
            created_at: now,
            updated_at: now,
        };

        self.storage
            .put(&document.storage_key, data, &document.mime_type)
            .await?;

        if let Err(e) = self.insert_document(&document).await {
            // The row never landed; don't leave orphaned bytes behind
            if let Err(cleanup) = self.storage.delete(&document.storage_key).await {
                tracing::warn!(
                    "Failed to remove bytes for aborted upload {}: {}",
                    document.storage_key,
                    cleanup
                );
            }
            return Err(e);
        }
        self.progress.send(ProgressEvent::StatusChanged {
            document_id: id.clone(),
            status: DocumentStatus::Processing,
        });

        let (page_count, thumbnail) = self
            .rasterize(&id, &document.mime_type, &document.storage_key, data)
            .await;

        sqlx::query(
            "UPDATE documents SET status = ?, page_count = ?, thumbnail_key = ?, updated_at = ? WHERE id = ?",
        )
        .bind(DocumentStatus::Ready.to_string())
        .bind(page_count)
        .bind(&thumbnail)
        .bind(Utc::now())
        .bind(&id)
        .execute(&self.pool)
        .await?;

        self.progress.send(ProgressEvent::StatusChanged {
            document_id: id.clone(),
            status: DocumentStatus::Ready,
        });
        self.activity
            .record(
                ActivityEvent::new(owner_id, AuditAction::DocumentCreate)
                    .document(&id)
                    .details(serde_json::json!({
                        "file_name": document.file_name,
                        "file_size": document.file_size,
                    })),
            )
            .await;

        tracing::info!(
            "Stored document {} ({} bytes) for {}",
            id,
            document.file_size,
            owner_id
        );

        fetch_document(&self.pool, &id)
            .await?
            .ok_or(VaultError::NotFound)
    }

    async fn insert_document(&self, document: &Document) -> VaultResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, owner_id, status, title, description, tags_json, is_public,
                                   file_name, mime_type, file_size, storage_key, content_text,
                                   version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&document.id)
        .bind(&document.owner_id)
        .bind(document.status.to_string())
        .bind(&document.title)
        .bind(&document.description)
        .bind(document.metadata().tags_json()?)
        .bind(document.is_public)
        .bind(&document.file_name)
        .bind(&document.mime_type)
        .bind(document.file_size)
        .bind(&document.storage_key)
        .bind(&document.content_text)
        .bind(document.version)
        .bind(document.created_at)
        .bind(document.updated_at)
        .execute(&mut *tx)
        .await?;

        index_document(&mut *tx, document).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Page count and thumbnail key, or nothing if rasterization is
    /// unsupported or fails
    async fn rasterize(
        &self,
        document_id: &str,
        mime_type: &str,
        storage_key: &str,
        data: &[u8],
    ) -> (Option<i64>, Option<String>) {
        if !self.rasterizer.supports(mime_type) {
            return (None, None);
        }

        let output = match self.rasterizer.rasterize(data).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("Rasterization failed for {}: {}", document_id, e);
                return (None, None);
            }
        };

        let key = thumbnail_key(storage_key);
        match self.storage.put(&key, &output.thumbnail_png, "image/png").await {
            Ok(()) => (Some(output.page_count as i64), Some(key)),
            Err(e) => {
                tracing::warn!("Failed to store thumbnail for {}: {}", document_id, e);
                (Some(output.page_count as i64), None)
            }
        }
    }

    /// Best-effort removal of objects no committed row points at
    async fn remove_objects(&self, keys: impl IntoIterator<Item = String>, what: &str) {
        for key in keys {
            if let Err(e) = self.storage.delete(&key).await {
                tracing::warn!("Failed to remove {} object {}: {}", what, key, e);
            }
        }
    }

    /// Read a document's metadata (requires `View`)
    pub async fn get_document(&self, document_id: &str, requester_id: &str) -> VaultResult<Document> {
        let (mut document, _) =
            AccessResolver::authorize(&self.pool, document_id, requester_id, AccessLevel::View)
                .await?;

        sqlx::query("UPDATE documents SET view_count = view_count + 1 WHERE id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        document.view_count += 1;

        self.activity
            .record(ActivityEvent::new(requester_id, AuditAction::DocumentView).document(document_id))
            .await;

        Ok(document)
    }

    /// Download a document's bytes (requires `Download`)
    pub async fn download_document(
        &self,
        document_id: &str,
        requester_id: &str,
    ) -> VaultResult<DocumentContent> {
        let (document, access) =
            AccessResolver::authorize(&self.pool, document_id, requester_id, AccessLevel::Download)
                .await?;

        let data = self.storage.get(&document.storage_key).await?;

        sqlx::query("UPDATE documents SET download_count = download_count + 1 WHERE id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        if !access.is_owner() {
            ShareService::touch_last_accessed(&self.pool, document_id, requester_id, Utc::now())
                .await?;
        }

        self.activity
            .record(ActivityEvent::new(requester_id, AuditAction::DocumentDownload).document(document_id))
            .await;

        Ok(DocumentContent {
            document_id: document.id,
            file_name: document.file_name,
            mime_type: document.mime_type,
            data,
        })
    }

    /// Download through an anonymous link.
    ///
    /// The use is counted up front and given back if the bytes cannot be
    /// read, so no write lock is held across the storage read.
    pub async fn download_via_link(&self, token: &str) -> VaultResult<DocumentContent> {
        let (document_id, level) = LinkService::validate_link(&self.pool, token)
            .await?
            .into_result()?;

        let (document, data) = match self.read_linked(&document_id, level).await {
            Ok(read) => read,
            Err(e) => {
                if let Err(undo) = LinkService::release(&self.pool, token).await {
                    tracing::warn!("Failed to give back link use for {}: {}", document_id, undo);
                }
                return Err(e);
            }
        };

        sqlx::query("UPDATE documents SET download_count = download_count + 1 WHERE id = ?")
            .bind(&document_id)
            .execute(&self.pool)
            .await?;

        self.activity
            .record(ActivityEvent::new(ANONYMOUS_ACTOR, AuditAction::LinkUse).document(&document_id))
            .await;

        Ok(DocumentContent {
            document_id: document.id,
            file_name: document.file_name,
            mime_type: document.mime_type,
            data,
        })
    }

    async fn read_linked(&self, document_id: &str, level: AccessLevel) -> VaultResult<(Document, Vec<u8>)> {
        if !level.satisfies(AccessLevel::Download) {
            return Err(VaultError::Denied);
        }
        let document = fetch_document(&self.pool, document_id)
            .await?
            .filter(|d| !d.is_deleted())
            .ok_or(VaultError::NotFound)?;
        let data = self.storage.get(&document.storage_key).await?;
        Ok((document, data))
    }

    /// Short-lived direct URL to the stored bytes (requires `Download`)
    pub async fn presigned_url(&self, document_id: &str, requester_id: &str) -> VaultResult<String> {
        let (document, _) =
            AccessResolver::authorize(&self.pool, document_id, requester_id, AccessLevel::Download)
                .await?;
        self.storage.presign(&document.storage_key, self.presign_ttl).await
    }

    /// Apply a metadata patch (requires `Edit`)
    pub async fn update_metadata(
        &self,
        document_id: &str,
        actor_id: &str,
        patch: DocumentPatch,
    ) -> VaultResult<UpdateOutcome> {
        let (document, access) =
            AccessResolver::authorize(&self.pool, document_id, actor_id, AccessLevel::Edit).await?;

        let mut expected_version = None;
        if let Some(raw) = patch.if_match.as_deref() {
            let etag = ETag::parse(raw)
                .ok_or_else(|| VaultError::Validation(format!("Malformed ETag: {}", raw)))?;
            etag.check(&document)?;
            expected_version = Some(document.version);
        }

        let before = document.metadata();
        let mut after = before.clone();
        if let Some(title) = patch.title {
            validate_title(&title)?;
            after.title = title.trim().to_string();
        }
        if let Some(description) = patch.description {
            validate_description(Some(&description))?;
            after.description = Some(description).filter(|d| !d.trim().is_empty());
        }
        if let Some(tags) = patch.tags {
            after.tags = normalize_tags(&tags)?;
        }
        if let Some(is_public) = patch.is_public {
            after.is_public = is_public;
        }

        let mut update = MaterialUpdate::metadata(before, after);
        update.expected_version = expected_version;

        let outcome =
            RevisionService::record_material_update(&self.pool, document_id, actor_id, access, &update)
                .await?;
        self.after_update(document_id, actor_id, AuditAction::DocumentUpdate, &outcome)
            .await;
        Ok(outcome)
    }

    /// Swap the stored bytes for new ones (requires `Edit`).
    ///
    /// Page count, thumbnail and indexed body text follow the new bytes;
    /// `content_text` is the text extracted from them, if any.
    pub async fn replace_file(
        &self,
        document_id: &str,
        actor_id: &str,
        file_name: &str,
        data: &[u8],
        content_text: Option<String>,
    ) -> VaultResult<UpdateOutcome> {
        validate_file_name(file_name)?;
        let (document, access) =
            AccessResolver::authorize(&self.pool, document_id, actor_id, AccessLevel::Edit).await?;

        let storage_key = object_key(&document.owner_id, &document.id);
        let mime_type = NewDocument::new(file_name).resolved_mime_type();
        self.storage.put(&storage_key, data, &mime_type).await?;
        let (page_count, thumbnail_key) = self
            .rasterize(document_id, &mime_type, &storage_key, data)
            .await;

        let file = StoredFile {
            storage_key,
            file_name: file_name.to_string(),
            mime_type,
            file_size: data.len() as i64,
            content_text: content_text.filter(|t| !t.trim().is_empty()),
            page_count,
            thumbnail_key,
        };
        let update = MaterialUpdate::metadata(document.metadata(), document.metadata())
            .file_replaced(FileChange::Replaced(file.clone()))
            .expect_version(document.version);

        let outcome = match RevisionService::record_material_update(
            &self.pool,
            document_id,
            actor_id,
            access,
            &update,
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                let mut keys = vec![file.storage_key];
                keys.extend(file.thumbnail_key);
                self.remove_objects(keys, "aborted replacement").await;
                return Err(e);
            }
        };

        // The committed row points at the new keys now
        let mut stale = vec![document.storage_key];
        stale.extend(document.thumbnail_key);
        self.remove_objects(stale, "replaced").await;

        self.after_update(document_id, actor_id, AuditAction::DocumentReplace, &outcome)
            .await;
        Ok(outcome)
    }

    pub(crate) async fn after_update(
        &self,
        document_id: &str,
        actor_id: &str,
        action: AuditAction,
        outcome: &UpdateOutcome,
    ) {
        if let UpdateOutcome::Recorded { version, revision_id } = outcome {
            self.progress.send(ProgressEvent::VersionCreated {
                document_id: document_id.to_string(),
                version: *version,
            });
            self.activity
                .record(
                    ActivityEvent::new(actor_id, action)
                        .document(document_id)
                        .details(serde_json::json!({
                            "version": version,
                            "revision_id": revision_id,
                        })),
                )
                .await;
        }
    }

    /// Soft-delete a document (owner only).
    ///
    /// Shares and links stay for the record but stop resolving.
    pub async fn delete_document(&self, document_id: &str, requester_id: &str) -> VaultResult<()> {
        let document = AccessResolver::authorize_owner(&self.pool, document_id, requester_id).await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE documents SET status = ?, updated_at = ? WHERE id = ?")
            .bind(DocumentStatus::Deleted.to_string())
            .bind(Utc::now())
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        remove_from_index(&mut *tx, document_id).await?;
        tx.commit().await?;

        let mut keys = vec![document.storage_key];
        keys.extend(document.thumbnail_key);
        self.remove_objects(keys, "deleted document").await;

        self.progress.send(ProgressEvent::Deleted {
            document_id: document_id.to_string(),
        });
        self.activity
            .record(ActivityEvent::new(requester_id, AuditAction::DocumentDelete).document(document_id))
            .await;

        tracing::info!("Document {} deleted by {}", document_id, requester_id);
        Ok(())
    }

    /// Status update from the processing pipeline
    pub async fn set_status(&self, document_id: &str, status: DocumentStatus) -> VaultResult<()> {
        if status == DocumentStatus::Deleted {
            return Err(VaultError::Validation(
                "Use delete_document to delete a document".to_string(),
            ));
        }

        let result = sqlx::query(
            "UPDATE documents SET status = ?, updated_at = ? WHERE id = ? AND status != 'deleted'",
        )
        .bind(status.to_string())
        .bind(Utc::now())
        .bind(document_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(VaultError::NotFound);
        }

        self.progress.send(ProgressEvent::StatusChanged {
            document_id: document_id.to_string(),
            status,
        });
        self.activity
            .record(
                ActivityEvent::new(SYSTEM_ACTOR, AuditAction::StatusChange)
                    .document(document_id)
                    .details(serde_json::json!({ "status": status })),
            )
            .await;
        Ok(())
    }

    /// Revision history, newest first (requires `View`)
    pub async fn list_revisions(
        &self,
        document_id: &str,
        requester_id: &str,
        pagination: PaginationParams,
    ) -> VaultResult<PaginatedResponse<Revision>> {
        AccessResolver::authorize(&self.pool, document_id, requester_id, AccessLevel::View).await?;
        RevisionService::list_revisions(&self.pool, document_id, pagination.clamped(self.max_page_size))
            .await
    }

    pub async fn get_revision(
        &self,
        document_id: &str,
        requester_id: &str,
        version: i64,
    ) -> VaultResult<Revision> {
        AccessResolver::authorize(&self.pool, document_id, requester_id, AccessLevel::View).await?;
        RevisionService::get_revision(&self.pool, document_id, version).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{LocalObjectStorage, RasterOutput};
    use crate::db;
    use crate::models::{
        CreateLinkRequest, SearchRequest, ShareDocumentRequest, StrategyKind, TrackedField,
    };
    use crate::services::search::SearchService;
    use crate::services::test_support::insert_share;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FixedRasterizer;

    #[async_trait]
    impl Rasterizer for FixedRasterizer {
        async fn rasterize(&self, _data: &[u8]) -> VaultResult<RasterOutput> {
            Ok(RasterOutput {
                page_count: 3,
                thumbnail_png: vec![0x89, b'P', b'N', b'G'],
            })
        }
    }

    /// One page per input byte, so each file gets a distinct page count
    struct BytePageRasterizer;

    #[async_trait]
    impl Rasterizer for BytePageRasterizer {
        async fn rasterize(&self, data: &[u8]) -> VaultResult<RasterOutput> {
            Ok(RasterOutput {
                page_count: data.len() as u32,
                thumbnail_png: data.to_vec(),
            })
        }
    }

    /// Writes to the database from inside every read
    struct WriteDuringGet {
        inner: LocalObjectStorage,
        pool: SqlitePool,
    }

    #[async_trait]
    impl ObjectStorage for WriteDuringGet {
        async fn put(&self, key: &str, data: &[u8], content_type: &str) -> VaultResult<()> {
            self.inner.put(key, data, content_type).await
        }

        async fn get(&self, key: &str) -> VaultResult<Vec<u8>> {
            sqlx::query("UPDATE documents SET view_count = view_count + 1")
                .execute(&self.pool)
                .await?;
            self.inner.get(key).await
        }

        async fn delete(&self, key: &str) -> VaultResult<()> {
            self.inner.delete(key).await
        }

        async fn presign(&self, key: &str, expires_in: Duration) -> VaultResult<String> {
            self.inner.presign(key, expires_in).await
        }
    }

    struct BrokenRasterizer;

    #[async_trait]
    impl Rasterizer for BrokenRasterizer {
        async fn rasterize(&self, _data: &[u8]) -> VaultResult<RasterOutput> {
            Err(VaultError::UpstreamUnavailable("renderer crashed".into()))
        }
    }

    async fn setup() -> (DocumentService, Arc<LocalObjectStorage>, TempDir) {
        let pool = db::connect_in_memory().await.unwrap();
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(LocalObjectStorage::new(
            dir.path(),
            "http://localhost:8080",
            b"test-secret",
        ));
        let service = DocumentService::new(pool, storage.clone(), &VaultConfig::default());
        (service, storage, dir)
    }

    fn object_count(dir: &TempDir) -> usize {
        fn walk(path: &std::path::Path) -> usize {
            std::fs::read_dir(path)
                .map(|entries| {
                    entries
                        .flatten()
                        .map(|e| {
                            let p = e.path();
                            if p.is_dir() {
                                walk(&p)
                            } else {
                                1
                            }
                        })
                        .sum()
                })
                .unwrap_or(0)
        }
        walk(dir.path())
    }

    #[tokio::test]
    async fn test_create_document() {
        let (service, storage, _dir) = setup().await;
        let mut events = service.progress().subscribe();

        let doc = service
            .create_document(
                "alice",
                NewDocument::new("Invoice March.pdf").tags(["Finance", "finance"]),
                b"%PDF-1.7",
            )
            .await
            .unwrap();

        assert_eq!(doc.status, DocumentStatus::Ready);
        assert_eq!(doc.version, 1);
        assert_eq!(doc.title, "Invoice March");
        assert_eq!(doc.mime_type, "application/pdf");
        assert_eq!(doc.tags.len(), 1);
        assert_eq!(doc.page_count, None);
        assert_eq!(storage.get(&doc.storage_key).await.unwrap(), b"%PDF-1.7");

        assert_eq!(
            events.recv().await.unwrap(),
            ProgressEvent::StatusChanged {
                document_id: doc.id.clone(),
                status: DocumentStatus::Processing
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            ProgressEvent::StatusChanged {
                document_id: doc.id.clone(),
                status: DocumentStatus::Ready
            }
        );

        let audit = AuditService::new(service.pool().clone());
        let history = audit.get_document_history(&doc.id, 10).await.unwrap();
        assert_eq!(history[0].action, AuditAction::DocumentCreate);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let (service, _storage, dir) = setup().await;

        let err = service
            .create_document("alice", NewDocument::new("../etc/passwd"), b"x")
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::InvalidFileName { .. }));

        let err = service
            .create_document("alice", NewDocument::new("a.txt").tags(["no spaces"]), b"x")
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));
        assert_eq!(object_count(&dir), 0);
    }

    #[tokio::test]
    async fn test_failed_insert_removes_bytes() {
        let (service, _storage, dir) = setup().await;
        sqlx::query("DROP TABLE document_index")
            .execute(service.pool())
            .await
            .unwrap();

        let result = service
            .create_document("alice", NewDocument::new("notes.txt"), b"hello")
            .await;
        assert!(matches!(result, Err(VaultError::Database(_))));
        assert_eq!(object_count(&dir), 0);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents")
            .fetch_one(service.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_rasterization_is_best_effort() {
        let (service, storage, _dir) = setup().await;

        let with_thumbs = service.clone().with_rasterizer(Arc::new(FixedRasterizer));
        let doc = with_thumbs
            .create_document("alice", NewDocument::new("deck.pdf"), b"%PDF")
            .await
            .unwrap();
        assert_eq!(doc.page_count, Some(3));
        let thumb = doc.thumbnail_key.clone().unwrap();
        assert_eq!(storage.get(&thumb).await.unwrap(), vec![0x89, b'P', b'N', b'G']);

        // Not a PDF: never rasterized
        let txt = with_thumbs
            .create_document("alice", NewDocument::new("notes.txt"), b"hi")
            .await
            .unwrap();
        assert_eq!(txt.page_count, None);

        let broken = service.with_rasterizer(Arc::new(BrokenRasterizer));
        let doc = broken
            .create_document("alice", NewDocument::new("deck.pdf"), b"%PDF")
            .await
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Ready);
        assert_eq!(doc.page_count, None);
        assert_eq!(doc.thumbnail_key, None);
    }

    #[tokio::test]
    async fn test_get_and_download_counters() {
        let (service, _storage, _dir) = setup().await;
        let doc = service
            .create_document("alice", NewDocument::new("plan.txt"), b"plan")
            .await
            .unwrap();
        let share = insert_share(service.pool(), &doc.id, "bob", AccessLevel::View, None, false).await;

        let seen = service.get_document(&doc.id, "bob").await.unwrap();
        assert_eq!(seen.view_count, 1);

        // View is not enough to download
        let err = service.download_document(&doc.id, "bob").await.unwrap_err();
        assert!(matches!(err, VaultError::Denied));

        ShareService::update_share_level(service.pool(), &share, "alice", AccessLevel::Download)
            .await
            .unwrap();
        let content = service.download_document(&doc.id, "bob").await.unwrap();
        assert_eq!(content.data, b"plan");
        assert_eq!(content.file_name, "plan.txt");

        let stored = fetch_document(service.pool(), &doc.id).await.unwrap().unwrap();
        assert_eq!(stored.download_count, 1);
        let grant = ShareService::get(service.pool(), &share).await.unwrap().unwrap();
        assert!(grant.last_accessed_at.is_some());

        let audit = AuditService::new(service.pool().clone());
        let history = audit.get_document_history(&doc.id, 10).await.unwrap();
        assert!(history
            .iter()
            .any(|log| log.action == AuditAction::DocumentView && log.user_id == "bob"));
    }

    #[tokio::test]
    async fn test_download_via_link() {
        let (service, storage, _dir) = setup().await;
        let config = VaultConfig::default();
        let doc = service
            .create_document("alice", NewDocument::new("plan.txt"), b"plan")
            .await
            .unwrap();

        let view_only = LinkService::create_link(
            service.pool(),
            &doc.id,
            "alice",
            CreateLinkRequest::default(),
            &config,
        )
        .await
        .unwrap();
        let err = service.download_via_link(&view_only.token).await.unwrap_err();
        assert!(matches!(err, VaultError::Denied));

        let once = LinkService::create_link(
            service.pool(),
            &doc.id,
            "alice",
            CreateLinkRequest {
                access_level: Some(AccessLevel::Download),
                max_uses: Some(1),
                ..Default::default()
            },
            &config,
        )
        .await
        .unwrap();

        // A storage failure must not burn the single use
        storage.delete(&doc.storage_key).await.unwrap();
        assert!(service.download_via_link(&once.token).await.is_err());
        let link = LinkService::find_by_token(service.pool(), &once.token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(link.used_count, 0);

        storage.put(&doc.storage_key, b"plan", "text/plain").await.unwrap();
        let content = service.download_via_link(&once.token).await.unwrap();
        assert_eq!(content.data, b"plan");

        let err = service.download_via_link(&once.token).await.unwrap_err();
        assert!(matches!(err, VaultError::LinkUseLimitReached));
    }

    #[tokio::test]
    async fn test_link_download_leaves_database_writable() {
        let pool = db::connect_in_memory().await.unwrap();
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(WriteDuringGet {
            inner: LocalObjectStorage::new(dir.path(), "http://localhost:8080", b"test-secret"),
            pool: pool.clone(),
        });
        let config = VaultConfig::default();
        let service = DocumentService::new(pool, storage, &config);
        let doc = service
            .create_document("alice", NewDocument::new("plan.txt"), b"plan")
            .await
            .unwrap();
        let link = LinkService::create_link(
            service.pool(),
            &doc.id,
            "alice",
            CreateLinkRequest {
                access_level: Some(AccessLevel::Download),
                ..Default::default()
            },
            &config,
        )
        .await
        .unwrap();

        // The single pooled connection is free while the bytes are read
        let content = tokio::time::timeout(
            Duration::from_secs(5),
            service.download_via_link(&link.token),
        )
        .await
        .expect("link download stalled on the write lock")
        .unwrap();
        assert_eq!(content.data, b"plan");

        let stored = fetch_document(service.pool(), &doc.id).await.unwrap().unwrap();
        assert_eq!(stored.view_count, 1);
        assert_eq!(stored.download_count, 1);
    }

    #[tokio::test]
    async fn test_update_metadata_with_etag() {
        let (service, _storage, _dir) = setup().await;
        let doc = service
            .create_document("alice", NewDocument::new("plan.txt"), b"plan")
            .await
            .unwrap();
        let etag = ETag::for_document(&doc);

        let outcome = service
            .update_metadata(
                &doc.id,
                "alice",
                DocumentPatch {
                    description: Some("Q3 roadmap".into()),
                    if_match: Some(etag.value().to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.version(), 2);

        // Same tag again is now stale
        let err = service
            .update_metadata(
                &doc.id,
                "alice",
                DocumentPatch {
                    title: Some("Renamed".into()),
                    if_match: Some(etag.value().to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Conflict { expected: 1, current: 2 }));

        let unchanged = service
            .update_metadata(
                &doc.id,
                "alice",
                DocumentPatch {
                    description: Some("Q3 roadmap".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(unchanged, UpdateOutcome::NoOp { version: 2 });

        let history = service
            .list_revisions(&doc.id, "alice", PaginationParams::default())
            .await
            .unwrap();
        assert_eq!(history.total, 1);
        assert_eq!(history.items[0].summary.fields(), vec![TrackedField::Description]);
    }

    #[tokio::test]
    async fn test_replace_file() {
        let (service, storage, _dir) = setup().await;
        let doc = service
            .create_document("alice", NewDocument::new("plan.txt"), b"v1")
            .await
            .unwrap();

        let outcome = service
            .replace_file(&doc.id, "alice", "plan.pdf", b"%PDF v2", None)
            .await
            .unwrap();
        assert_eq!(outcome.version(), 2);

        let stored = fetch_document(service.pool(), &doc.id).await.unwrap().unwrap();
        assert_ne!(stored.storage_key, doc.storage_key);
        assert_eq!(stored.mime_type, "application/pdf");
        assert_eq!(stored.file_size, 7);
        assert!(storage.get(&doc.storage_key).await.is_err());

        let revision = service.get_revision(&doc.id, "alice", 2).await.unwrap();
        assert!(revision.summary.file_replaced);
    }

    #[tokio::test]
    async fn test_replace_file_refreshes_pages_thumbnail_and_text() {
        let (service, storage, dir) = setup().await;
        let service = service.with_rasterizer(Arc::new(BytePageRasterizer));
        let search = SearchService::new(service.pool().clone(), &VaultConfig::default());

        let doc = service
            .create_document(
                "alice",
                NewDocument {
                    content_text: Some("zebrafish anatomy".into()),
                    ..NewDocument::new("atlas.pdf")
                },
                b"%PDF v1",
            )
            .await
            .unwrap();
        assert_eq!(doc.page_count, Some(7));
        let old_thumb = doc.thumbnail_key.clone().unwrap();

        service
            .replace_file(
                &doc.id,
                "alice",
                "atlas.pdf",
                b"%PDF second edition",
                Some("coral lagoon survey".into()),
            )
            .await
            .unwrap();

        let stored = fetch_document(service.pool(), &doc.id).await.unwrap().unwrap();
        assert_eq!(stored.page_count, Some(19));
        assert_eq!(stored.content_text.as_deref(), Some("coral lagoon survey"));
        let new_thumb = stored.thumbnail_key.clone().unwrap();
        assert!(new_thumb.starts_with(&stored.storage_key));
        assert_eq!(storage.get(&new_thumb).await.unwrap(), b"%PDF second edition");
        assert!(storage.get(&old_thumb).await.is_err());
        // Body and thumbnail only
        assert_eq!(object_count(&dir), 2);

        let stale = search
            .search("alice", &SearchRequest::query("zebrafish"))
            .await
            .unwrap();
        assert_eq!(stale.strategy, StrategyKind::Listing);

        let fresh = search
            .search("alice", &SearchRequest::query("lagoon"))
            .await
            .unwrap();
        assert_eq!(fresh.strategy, StrategyKind::Exact);
        assert_eq!(fresh.ids(), vec![doc.id.as_str()]);
    }

    #[tokio::test]
    async fn test_delete_document() {
        let (service, storage, _dir) = setup().await;
        let doc = service
            .create_document("alice", NewDocument::new("plan.txt"), b"plan")
            .await
            .unwrap();
        ShareService::share_document(
            service.pool(),
            &doc.id,
            "alice",
            ShareDocumentRequest::new("bob", AccessLevel::Edit),
        )
        .await
        .unwrap();

        // Grantees cannot delete
        let err = service.delete_document(&doc.id, "bob").await.unwrap_err();
        assert!(matches!(err, VaultError::Denied));

        service.delete_document(&doc.id, "alice").await.unwrap();
        assert!(storage.get(&doc.storage_key).await.is_err());

        // The share remains on record but stops resolving
        let (shares,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM document_shares WHERE document_id = ?")
                .bind(&doc.id)
                .fetch_one(service.pool())
                .await
                .unwrap();
        assert_eq!(shares, 1);
        let err = service.get_document(&doc.id, "bob").await.unwrap_err();
        assert!(matches!(err, VaultError::NotFound));
        let err = service.get_document(&doc.id, "alice").await.unwrap_err();
        assert!(matches!(err, VaultError::NotFound));
    }

    #[tokio::test]
    async fn test_set_status() {
        let (service, _storage, _dir) = setup().await;
        let doc = service
            .create_document("alice", NewDocument::new("plan.txt"), b"plan")
            .await
            .unwrap();
        let mut events = service.progress().subscribe();

        service.set_status(&doc.id, DocumentStatus::Failed).await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            ProgressEvent::StatusChanged {
                document_id: doc.id.clone(),
                status: DocumentStatus::Failed
            }
        );

        assert!(service.set_status(&doc.id, DocumentStatus::Deleted).await.is_err());
        assert!(matches!(
            service.set_status("missing", DocumentStatus::Ready).await,
            Err(VaultError::NotFound)
        ));
    }
}
