//! Access resolution against stored grants

use chrono::Utc;
use sqlx::{Executor, Sqlite, SqlitePool};

use super::document_service::fetch_document;
use crate::error::{VaultError, VaultResult};
use crate::models::{
    AccessLevel, AccessVerdict, Document, DocumentShare, EffectiveAccess, ShareRow, SHARE_COLUMNS,
};
use crate::security::decide;

/// Resolves `(requester, document, required level)` to a verdict
pub struct AccessResolver;

impl AccessResolver {
    /// Non-revoked targeted grants held by `recipient_id` on a document.
    ///
    /// Expired grants are returned too; the verdict filters them.
    pub async fn grants_for<'c, E>(
        executor: E,
        document_id: &str,
        recipient_id: &str,
    ) -> VaultResult<Vec<DocumentShare>>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let rows: Vec<ShareRow> = sqlx::query_as(&format!(
            "SELECT {} FROM document_shares WHERE document_id = ? AND recipient_id = ? AND revoked = 0",
            SHARE_COLUMNS
        ))
        .bind(document_id)
        .bind(recipient_id)
        .fetch_all(executor)
        .await?;

        rows.into_iter().map(DocumentShare::try_from).collect()
    }

    /// Decide access on an existing document. Reads only.
    pub async fn resolve(
        pool: &SqlitePool,
        document: &Document,
        requester_id: &str,
        required: AccessLevel,
    ) -> VaultResult<AccessVerdict> {
        if document.is_owned_by(requester_id) {
            return Ok(AccessVerdict::Allowed(EffectiveAccess::Owner));
        }

        let grants = Self::grants_for(pool, &document.id, requester_id).await?;
        Ok(decide(document, requester_id, &grants, required, Utc::now()))
    }

    /// Resolve by id. A missing or deleted document is `Denied`, exactly
    /// like a document the requester cannot see.
    pub async fn resolve_access(
        pool: &SqlitePool,
        document_id: &str,
        requester_id: &str,
        required: AccessLevel,
    ) -> VaultResult<AccessVerdict> {
        match fetch_document(pool, document_id).await? {
            Some(document) if !document.is_deleted() => {
                Self::resolve(pool, &document, requester_id, required).await
            }
            _ => Ok(AccessVerdict::Denied),
        }
    }

    /// Load a live document and require `required` on it
    pub async fn authorize(
        pool: &SqlitePool,
        document_id: &str,
        requester_id: &str,
        required: AccessLevel,
    ) -> VaultResult<(Document, EffectiveAccess)> {
        let document = fetch_document(pool, document_id)
            .await?
            .filter(|d| !d.is_deleted())
            .ok_or(VaultError::NotFound)?;

        let access = Self::resolve(pool, &document, requester_id, required)
            .await?
            .into_result()?;

        if !access.is_owner() {
            tracing::debug!(
                "Granted {} on {} to {} via share",
                access,
                document.id,
                requester_id
            );
        }
        Ok((document, access))
    }

    /// Owner-only operations
    pub async fn authorize_owner(
        pool: &SqlitePool,
        document_id: &str,
        requester_id: &str,
    ) -> VaultResult<Document> {
        let document = fetch_document(pool, document_id)
            .await?
            .filter(|d| !d.is_deleted())
            .ok_or(VaultError::NotFound)?;

        if !document.is_owned_by(requester_id) {
            return Err(VaultError::Denied);
        }
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{insert_document, insert_share};
    use crate::db;
    use chrono::Duration;

    #[tokio::test]
    async fn test_no_grant_is_denied() {
        let pool = db::connect_in_memory().await.unwrap();
        let doc = insert_document(&pool, "alice", "Plan", None).await;

        for level in AccessLevel::ALL {
            let verdict = AccessResolver::resolve_access(&pool, &doc.id, "mallory", level)
                .await
                .unwrap();
            assert_eq!(verdict, AccessVerdict::Denied);
        }
    }

    #[tokio::test]
    async fn test_owner_always_allowed() {
        let pool = db::connect_in_memory().await.unwrap();
        let doc = insert_document(&pool, "alice", "Plan", None).await;

        let verdict = AccessResolver::resolve_access(&pool, &doc.id, "alice", AccessLevel::Edit)
            .await
            .unwrap();
        assert_eq!(verdict, AccessVerdict::Allowed(EffectiveAccess::Owner));
    }

    #[tokio::test]
    async fn test_missing_document_looks_like_denial() {
        let pool = db::connect_in_memory().await.unwrap();
        let verdict = AccessResolver::resolve_access(&pool, "nope", "alice", AccessLevel::View)
            .await
            .unwrap();
        assert_eq!(verdict, AccessVerdict::Denied);

        let missing = AccessResolver::authorize(&pool, "nope", "alice", AccessLevel::View)
            .await
            .unwrap_err();
        let doc = insert_document(&pool, "alice", "Plan", None).await;
        let denied = AccessResolver::authorize(&pool, &doc.id, "bob", AccessLevel::View)
            .await
            .unwrap_err();
        assert_eq!(missing.to_string(), denied.to_string());
        assert_eq!(missing.status_code(), denied.status_code());
    }

    #[tokio::test]
    async fn test_expired_and_revoked_grants_ignored() {
        let pool = db::connect_in_memory().await.unwrap();
        let doc = insert_document(&pool, "alice", "Plan", None).await;
        let past = Utc::now() - Duration::minutes(5);

        insert_share(&pool, &doc.id, "bob", AccessLevel::Edit, Some(past), false).await;
        insert_share(&pool, &doc.id, "bob", AccessLevel::Edit, None, true).await;
        let verdict = AccessResolver::resolve_access(&pool, &doc.id, "bob", AccessLevel::View)
            .await
            .unwrap();
        assert_eq!(verdict, AccessVerdict::Denied);

        insert_share(&pool, &doc.id, "bob", AccessLevel::View, None, false).await;
        let verdict = AccessResolver::resolve_access(&pool, &doc.id, "bob", AccessLevel::View)
            .await
            .unwrap();
        assert_eq!(
            verdict,
            AccessVerdict::Allowed(EffectiveAccess::Granted(AccessLevel::View))
        );
    }

    #[tokio::test]
    async fn test_duplicate_grants_take_highest() {
        let pool = db::connect_in_memory().await.unwrap();
        let doc = insert_document(&pool, "alice", "Plan", None).await;
        insert_share(&pool, &doc.id, "bob", AccessLevel::View, None, false).await;
        insert_share(&pool, &doc.id, "bob", AccessLevel::Download, None, false).await;
        insert_share(&pool, &doc.id, "bob", AccessLevel::View, None, false).await;

        let (_, access) =
            AccessResolver::authorize(&pool, &doc.id, "bob", AccessLevel::Download)
                .await
                .unwrap();
        assert_eq!(access, EffectiveAccess::Granted(AccessLevel::Download));
        assert!(AccessResolver::authorize(&pool, &doc.id, "bob", AccessLevel::Edit)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_authorize_owner() {
        let pool = db::connect_in_memory().await.unwrap();
        let doc = insert_document(&pool, "alice", "Plan", None).await;
        insert_share(&pool, &doc.id, "bob", AccessLevel::Edit, None, false).await;

        assert!(AccessResolver::authorize_owner(&pool, &doc.id, "alice").await.is_ok());
        assert!(matches!(
            AccessResolver::authorize_owner(&pool, &doc.id, "bob").await,
            Err(VaultError::Denied)
        ));
    }
}
