//! Share service for targeted grants

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::access_service::AccessResolver;
use crate::error::{VaultError, VaultResult};
use crate::models::{AccessLevel, DocumentShare, ShareDocumentRequest, ShareRow, SHARE_COLUMNS};

/// Service for managing document shares
pub struct ShareService;

impl ShareService {
    /// Grant `request.recipient_id` access to a document.
    ///
    /// Re-sharing with the same recipient updates every live grant they hold
    /// on the document, so the new level is the one that governs.
    pub async fn share_document(
        pool: &SqlitePool,
        document_id: &str,
        owner_id: &str,
        request: ShareDocumentRequest,
    ) -> VaultResult<DocumentShare> {
        let recipient_id = request.recipient_id.trim();
        if recipient_id.is_empty() {
            return Err(VaultError::Validation("Recipient is required".to_string()));
        }
        if recipient_id == owner_id {
            return Err(VaultError::Validation(
                "Cannot share a document with its owner".to_string(),
            ));
        }

        let now = Utc::now();
        if request.expires_at.map(|e| e <= now).unwrap_or(false) {
            return Err(VaultError::Validation(
                "Share expiration must be in the future".to_string(),
            ));
        }

        let document = AccessResolver::authorize_owner(pool, document_id, owner_id).await?;

        let updated = sqlx::query(
            r#"
            UPDATE document_shares
            SET access_level = ?, expires_at = ?, updated_at = ?
            WHERE document_id = ? AND recipient_id = ? AND revoked = 0
            "#,
        )
        .bind(request.access_level.to_string())
        .bind(request.expires_at)
        .bind(now)
        .bind(&document.id)
        .bind(recipient_id)
        .execute(pool)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                r#"
                INSERT INTO document_shares (id, document_id, owner_id, recipient_id, access_level, expires_at, revoked, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&document.id)
            .bind(owner_id)
            .bind(recipient_id)
            .bind(request.access_level.to_string())
            .bind(request.expires_at)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await?;
        }

        tracing::info!(
            "Shared document {} with {} at {}",
            document.id,
            recipient_id,
            request.access_level
        );

        Self::latest_for(pool, &document.id, recipient_id)
            .await?
            .ok_or_else(|| VaultError::Internal("share vanished after write".to_string()))
    }

    /// Change the level of one share
    pub async fn update_share_level(
        pool: &SqlitePool,
        share_id: &str,
        owner_id: &str,
        access_level: AccessLevel,
    ) -> VaultResult<DocumentShare> {
        let share = Self::get_owned(pool, share_id, owner_id).await?;
        if share.revoked {
            return Err(VaultError::Validation("Share has been revoked".to_string()));
        }

        sqlx::query("UPDATE document_shares SET access_level = ?, updated_at = ? WHERE id = ?")
            .bind(access_level.to_string())
            .bind(Utc::now())
            .bind(share_id)
            .execute(pool)
            .await?;

        Self::get_owned(pool, share_id, owner_id).await
    }

    /// Revoke a share. Takes effect on the next resolution.
    pub async fn revoke_share(pool: &SqlitePool, share_id: &str, owner_id: &str) -> VaultResult<bool> {
        let result = sqlx::query(
            "UPDATE document_shares SET revoked = 1, updated_at = ? WHERE id = ? AND owner_id = ? AND revoked = 0",
        )
        .bind(Utc::now())
        .bind(share_id)
        .bind(owner_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Recipient acknowledges a share
    pub async fn accept_share(
        pool: &SqlitePool,
        share_id: &str,
        recipient_id: &str,
    ) -> VaultResult<DocumentShare> {
        let share = Self::get(pool, share_id)
            .await?
            .filter(|s| s.recipient_id == recipient_id && s.is_active())
            .ok_or(VaultError::NotFound)?;

        if share.accepted_at.is_some() {
            return Ok(share);
        }

        sqlx::query("UPDATE document_shares SET accepted_at = ?, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(Utc::now())
            .bind(share_id)
            .execute(pool)
            .await?;

        Self::get(pool, share_id).await?.ok_or(VaultError::NotFound)
    }

    /// Stamp `last_accessed_at` on the grant that governs a recipient's access
    pub async fn touch_last_accessed(
        pool: &SqlitePool,
        document_id: &str,
        recipient_id: &str,
        at: DateTime<Utc>,
    ) -> VaultResult<()> {
        sqlx::query(
            r#"
            UPDATE document_shares SET last_accessed_at = ?
            WHERE id = (
                SELECT id FROM document_shares
                WHERE document_id = ? AND recipient_id = ? AND revoked = 0
                  AND (expires_at IS NULL OR expires_at > ?)
                ORDER BY CASE access_level WHEN 'edit' THEN 3 WHEN 'download' THEN 2 ELSE 1 END DESC,
                         created_at DESC
                LIMIT 1
            )
            "#,
        )
        .bind(at)
        .bind(document_id)
        .bind(recipient_id)
        .bind(at)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// All shares of a document, revoked ones included
    pub async fn list_shares(
        pool: &SqlitePool,
        document_id: &str,
        owner_id: &str,
    ) -> VaultResult<Vec<DocumentShare>> {
        AccessResolver::authorize_owner(pool, document_id, owner_id).await?;

        let rows: Vec<ShareRow> = sqlx::query_as(&format!(
            "SELECT {} FROM document_shares WHERE document_id = ? ORDER BY created_at DESC",
            SHARE_COLUMNS
        ))
        .bind(document_id)
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(DocumentShare::try_from).collect()
    }

    /// Active shares addressed to `recipient_id` on live documents
    pub async fn list_shared_with_me(
        pool: &SqlitePool,
        recipient_id: &str,
    ) -> VaultResult<Vec<DocumentShare>> {
        let rows: Vec<ShareRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM document_shares
            WHERE recipient_id = ? AND revoked = 0
              AND (expires_at IS NULL OR expires_at > ?)
              AND EXISTS (SELECT 1 FROM documents d WHERE d.id = document_shares.document_id AND d.status != 'deleted')
            ORDER BY created_at DESC
            "#,
            SHARE_COLUMNS
        ))
        .bind(recipient_id)
        .bind(Utc::now())
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(DocumentShare::try_from).collect()
    }

    pub async fn get(pool: &SqlitePool, share_id: &str) -> VaultResult<Option<DocumentShare>> {
        let row: Option<ShareRow> = sqlx::query_as(&format!(
            "SELECT {} FROM document_shares WHERE id = ?",
            SHARE_COLUMNS
        ))
        .bind(share_id)
        .fetch_optional(pool)
        .await?;

        row.map(DocumentShare::try_from).transpose()
    }

    async fn get_owned(pool: &SqlitePool, share_id: &str, owner_id: &str) -> VaultResult<DocumentShare> {
        Self::get(pool, share_id)
            .await?
            .filter(|s| s.owner_id == owner_id)
            .ok_or(VaultError::NotFound)
    }

    async fn latest_for(
        pool: &SqlitePool,
        document_id: &str,
        recipient_id: &str,
    ) -> VaultResult<Option<DocumentShare>> {
        let row: Option<ShareRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM document_shares
            WHERE document_id = ? AND recipient_id = ? AND revoked = 0
            ORDER BY updated_at DESC, created_at DESC
            LIMIT 1
            "#,
            SHARE_COLUMNS
        ))
        .bind(document_id)
        .bind(recipient_id)
        .fetch_optional(pool)
        .await?;

        row.map(DocumentShare::try_from).transpose()
    }
}
