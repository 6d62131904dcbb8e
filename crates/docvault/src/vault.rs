//! Store facade
//!
//! `DocVault` wires the pool, configuration and outbound collaborators into
//! the services and exposes every document operation in one place. The
//! services stay usable on their own; the facade adds auditing for share
//! and link management.

use std::sync::Arc;

use chrono::Utc;
use rand::RngCore;
use sqlx::SqlitePool;

use crate::adapters::{LocalObjectStorage, ObjectStorage, ProgressHub, Rasterizer};
use crate::config::VaultConfig;
use crate::db;
use crate::error::{VaultError, VaultResult};
use crate::models::{
    AccessLevel, AccessVerdict, CreateLinkRequest, CreateLinkResponse, Document, DocumentContent,
    DocumentPatch, DocumentShare, DocumentStatus, LinkVerdict, MaterialUpdate, NewDocument,
    PaginatedResponse, PaginationParams, Revision, SearchRequest, SearchResult,
    ShareDocumentRequest, ShareLink, UpdateOutcome,
};
use crate::services::{
    AccessResolver, ActivityEvent, ActivitySink, AuditAction, AuditService, DocumentService,
    LinkService, RevisionService, SearchService, ShareService, ANONYMOUS_ACTOR,
};

/// Shared store handle
#[derive(Clone)]
pub struct DocVault {
    pool: SqlitePool,
    config: VaultConfig,
    documents: DocumentService,
    search: Arc<SearchService>,
    activity: Arc<dyn ActivitySink>,
}

impl DocVault {
    /// Connect to the configured database and local object store
    pub async fn open(config: VaultConfig) -> anyhow::Result<Self> {
        let pool = db::connect(&config).await?;

        let secret = match &config.signing_secret {
            Some(secret) => secret.as_bytes().to_vec(),
            None => {
                tracing::warn!("No signing secret configured; presigned URLs will not survive a restart");
                let mut key = vec![0u8; 32];
                rand::rng().fill_bytes(&mut key);
                key
            }
        };
        let storage = Arc::new(LocalObjectStorage::new(
            &config.storage_path,
            &config.base_url,
            secret,
        ));

        Ok(Self::new(pool, storage, config))
    }

    pub fn new(pool: SqlitePool, storage: Arc<dyn ObjectStorage>, config: VaultConfig) -> Self {
        let activity: Arc<dyn ActivitySink> = Arc::new(AuditService::new(pool.clone()));
        let documents =
            DocumentService::new(pool.clone(), storage, &config).with_activity(activity.clone());
        let search = Arc::new(SearchService::new(pool.clone(), &config));

        Self {
            pool,
            config,
            documents,
            search,
            activity,
        }
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.documents = self.documents.with_rasterizer(rasterizer);
        self
    }

    pub fn with_activity(mut self, activity: Arc<dyn ActivitySink>) -> Self {
        self.documents = self.documents.with_activity(activity.clone());
        self.activity = activity;
        self
    }

    pub fn with_search(mut self, search: SearchService) -> Self {
        self.search = Arc::new(search);
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn documents(&self) -> &DocumentService {
        &self.documents
    }

    pub fn progress(&self) -> &ProgressHub {
        self.documents.progress()
    }

    // ---------------------------------------------------------------
    // Access and links
    // ---------------------------------------------------------------

    /// Level `requester_id` holds on a document, if it satisfies `required`
    pub async fn resolve_access(
        &self,
        document_id: &str,
        requester_id: &str,
        required: AccessLevel,
    ) -> VaultResult<AccessVerdict> {
        AccessResolver::resolve_access(&self.pool, document_id, requester_id, required).await
    }

    /// Validate a link token and count the use
    pub async fn validate_link(&self, token: &str) -> VaultResult<LinkVerdict> {
        let verdict = LinkService::validate_link(&self.pool, token).await?;
        if let LinkVerdict::Allowed { document_id, .. } = &verdict {
            self.activity
                .record(ActivityEvent::new(ANONYMOUS_ACTOR, AuditAction::LinkUse).document(document_id))
                .await;
        }
        Ok(verdict)
    }

    /// What a link would grant right now, without counting a use
    pub async fn inspect_link(&self, token: &str) -> VaultResult<LinkVerdict> {
        LinkService::inspect_link(&self.pool, token).await
    }

    pub async fn create_link(
        &self,
        document_id: &str,
        owner_id: &str,
        request: CreateLinkRequest,
    ) -> VaultResult<CreateLinkResponse> {
        let link =
            LinkService::create_link(&self.pool, document_id, owner_id, request, &self.config).await?;
        self.activity
            .record(
                ActivityEvent::new(owner_id, AuditAction::LinkCreate)
                    .document(document_id)
                    .details(serde_json::json!({
                        "link_id": link.id,
                        "access_level": link.access_level,
                        "max_uses": link.max_uses,
                    })),
            )
            .await;
        Ok(link)
    }

    pub async fn list_links(&self, document_id: &str, owner_id: &str) -> VaultResult<Vec<ShareLink>> {
        LinkService::list_links(&self.pool, document_id, owner_id).await
    }

    pub async fn revoke_link(&self, link_id: &str, owner_id: &str) -> VaultResult<()> {
        if !LinkService::revoke_link(&self.pool, link_id, owner_id).await? {
            return Err(VaultError::NotFound);
        }
        self.activity
            .record(
                ActivityEvent::new(owner_id, AuditAction::LinkRevoke)
                    .details(serde_json::json!({ "link_id": link_id })),
            )
            .await;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Shares
    // ---------------------------------------------------------------

    pub async fn share_document(
        &self,
        document_id: &str,
        owner_id: &str,
        request: ShareDocumentRequest,
    ) -> VaultResult<DocumentShare> {
        let share = ShareService::share_document(&self.pool, document_id, owner_id, request).await?;
        self.activity
            .record(
                ActivityEvent::new(owner_id, AuditAction::ShareGrant)
                    .document(document_id)
                    .details(serde_json::json!({
                        "recipient_id": share.recipient_id,
                        "access_level": share.access_level,
                    })),
            )
            .await;
        Ok(share)
    }

    pub async fn update_share_level(
        &self,
        share_id: &str,
        owner_id: &str,
        access_level: AccessLevel,
    ) -> VaultResult<DocumentShare> {
        let share =
            ShareService::update_share_level(&self.pool, share_id, owner_id, access_level).await?;
        self.activity
            .record(
                ActivityEvent::new(owner_id, AuditAction::ShareUpdate)
                    .document(&share.document_id)
                    .details(serde_json::json!({
                        "share_id": share_id,
                        "access_level": access_level,
                    })),
            )
            .await;
        Ok(share)
    }

    pub async fn revoke_share(&self, share_id: &str, owner_id: &str) -> VaultResult<()> {
        if !ShareService::revoke_share(&self.pool, share_id, owner_id).await? {
            return Err(VaultError::NotFound);
        }
        self.activity
            .record(
                ActivityEvent::new(owner_id, AuditAction::ShareRevoke)
                    .details(serde_json::json!({ "share_id": share_id })),
            )
            .await;
        Ok(())
    }

    pub async fn accept_share(&self, share_id: &str, recipient_id: &str) -> VaultResult<DocumentShare> {
        let share = ShareService::accept_share(&self.pool, share_id, recipient_id).await?;
        self.activity
            .record(ActivityEvent::new(recipient_id, AuditAction::ShareAccept).document(&share.document_id))
            .await;
        Ok(share)
    }

    pub async fn list_shares(&self, document_id: &str, owner_id: &str) -> VaultResult<Vec<DocumentShare>> {
        ShareService::list_shares(&self.pool, document_id, owner_id).await
    }

    pub async fn list_shared_with_me(&self, recipient_id: &str) -> VaultResult<Vec<DocumentShare>> {
        ShareService::list_shared_with_me(&self.pool, recipient_id).await
    }

    // ---------------------------------------------------------------
    // Search
    // ---------------------------------------------------------------

    pub async fn search(&self, requester_id: &str, request: &SearchRequest) -> VaultResult<SearchResult> {
        self.search.search(requester_id, request).await
    }

    /// Plain listing of the requester's documents
    pub async fn list_documents(
        &self,
        requester_id: &str,
        request: &SearchRequest,
    ) -> VaultResult<SearchResult> {
        self.search.list(requester_id, request).await
    }

    // ---------------------------------------------------------------
    // Documents and revisions
    // ---------------------------------------------------------------

    /// Record an update described by before/after metadata (requires `Edit`)
    pub async fn record_material_update(
        &self,
        document_id: &str,
        actor_id: &str,
        update: &MaterialUpdate,
    ) -> VaultResult<UpdateOutcome> {
        let (_, access) =
            AccessResolver::authorize(&self.pool, document_id, actor_id, AccessLevel::Edit).await?;
        let outcome =
            RevisionService::record_material_update(&self.pool, document_id, actor_id, access, update)
                .await?;
        self.documents
            .after_update(document_id, actor_id, AuditAction::DocumentUpdate, &outcome)
            .await;
        Ok(outcome)
    }

    pub async fn create_document(
        &self,
        owner_id: &str,
        request: NewDocument,
        data: &[u8],
    ) -> VaultResult<Document> {
        self.documents.create_document(owner_id, request, data).await
    }

    pub async fn get_document(&self, document_id: &str, requester_id: &str) -> VaultResult<Document> {
        self.documents.get_document(document_id, requester_id).await
    }

    pub async fn download_document(
        &self,
        document_id: &str,
        requester_id: &str,
    ) -> VaultResult<DocumentContent> {
        self.documents.download_document(document_id, requester_id).await
    }

    pub async fn download_via_link(&self, token: &str) -> VaultResult<DocumentContent> {
        self.documents.download_via_link(token).await
    }

    pub async fn presigned_url(&self, document_id: &str, requester_id: &str) -> VaultResult<String> {
        self.documents.presigned_url(document_id, requester_id).await
    }

    pub async fn update_metadata(
        &self,
        document_id: &str,
        actor_id: &str,
        patch: DocumentPatch,
    ) -> VaultResult<UpdateOutcome> {
        self.documents.update_metadata(document_id, actor_id, patch).await
    }

    pub async fn replace_file(
        &self,
        document_id: &str,
        actor_id: &str,
        file_name: &str,
        data: &[u8],
        content_text: Option<String>,
    ) -> VaultResult<UpdateOutcome> {
        self.documents
            .replace_file(document_id, actor_id, file_name, data, content_text)
            .await
    }

    pub async fn delete_document(&self, document_id: &str, requester_id: &str) -> VaultResult<()> {
        self.documents.delete_document(document_id, requester_id).await
    }

    pub async fn set_status(&self, document_id: &str, status: DocumentStatus) -> VaultResult<()> {
        self.documents.set_status(document_id, status).await
    }

    pub async fn list_revisions(
        &self,
        document_id: &str,
        requester_id: &str,
        pagination: PaginationParams,
    ) -> VaultResult<PaginatedResponse<Revision>> {
        self.documents
            .list_revisions(document_id, requester_id, pagination)
            .await
    }

    pub async fn get_revision(
        &self,
        document_id: &str,
        requester_id: &str,
        version: i64,
    ) -> VaultResult<Revision> {
        self.documents
            .get_revision(document_id, requester_id, version)
            .await
    }

    /// Verify the database answers
    pub async fn health(&self) -> anyhow::Result<chrono::DateTime<Utc>> {
        db::ping(&self.pool).await?;
        Ok(Utc::now())
    }
}
