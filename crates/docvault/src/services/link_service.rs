//! Link service for anonymous tokenized grants

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::RngCore;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::access_service::AccessResolver;
use crate::config::{VaultConfig, MIN_LINK_TOKEN_BYTES};
use crate::error::{VaultError, VaultResult};
use crate::models::{
    AccessLevel, CreateLinkRequest, CreateLinkResponse, LinkDenial, LinkRow, LinkVerdict,
    ShareLink, LINK_COLUMNS,
};

/// Service for managing share links
pub struct LinkService;

impl LinkService {
    /// Create a new link for a document
    pub async fn create_link(
        pool: &SqlitePool,
        document_id: &str,
        owner_id: &str,
        request: CreateLinkRequest,
        config: &VaultConfig,
    ) -> VaultResult<CreateLinkResponse> {
        let access_level = request.access_level.unwrap_or(config.default_link_level);
        if access_level == AccessLevel::Edit {
            return Err(VaultError::Validation(
                "Links cannot grant edit access".to_string(),
            ));
        }
        if request.max_uses.map(|m| m <= 0).unwrap_or(false) {
            return Err(VaultError::Validation(
                "max_uses must be positive".to_string(),
            ));
        }

        let document = AccessResolver::authorize_owner(pool, document_id, owner_id).await?;

        let id = Uuid::new_v4().to_string();
        let token = Self::generate_token(config.link_token_bytes);
        let now = Utc::now();
        let expires_at = request.expires_in.expires_at(now);

        sqlx::query(
            r#"
            INSERT INTO share_links (id, token, document_id, owner_id, access_level, expires_at, max_uses, used_count, revoked, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0, 0, ?)
            "#,
        )
        .bind(&id)
        .bind(&token)
        .bind(&document.id)
        .bind(owner_id)
        .bind(access_level.to_string())
        .bind(expires_at)
        .bind(request.max_uses)
        .bind(now)
        .execute(pool)
        .await?;

        tracing::info!("Created {} link {} for document {}", access_level, id, document.id);

        Ok(CreateLinkResponse {
            url: format!("{}/s/{}", config.base_url.trim_end_matches('/'), token),
            id,
            token,
            access_level,
            expires_at,
            max_uses: request.max_uses,
            used_count: 0,
        })
    }

    /// Validate a token and count one use.
    ///
    /// The increment is a single conditional update, so concurrent callers
    /// can never push `used_count` past `max_uses`.
    pub async fn consume(
        conn: &mut SqliteConnection,
        token: &str,
        now: DateTime<Utc>,
    ) -> VaultResult<LinkVerdict> {
        let granted: Option<(String, String)> = sqlx::query_as(
            r#"
            UPDATE share_links
            SET used_count = used_count + 1, last_used_at = ?
            WHERE token = ?
              AND revoked = 0
              AND (expires_at IS NULL OR expires_at > ?)
              AND (max_uses IS NULL OR used_count < max_uses)
              AND EXISTS (
                  SELECT 1 FROM documents d
                  WHERE d.id = share_links.document_id AND d.status != 'deleted'
              )
            RETURNING document_id, access_level
            "#,
        )
        .bind(now)
        .bind(token)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some((document_id, access_level)) = granted {
            return Ok(LinkVerdict::Allowed {
                document_id,
                access_level: access_level.parse().map_err(VaultError::Internal)?,
            });
        }

        // Rejected: work out why, for the caller's benefit
        let reason = match Self::lookup(&mut *conn, token).await? {
            None => LinkDenial::NotFound,
            Some((_, false)) => LinkDenial::NotFound,
            // Passed every check at read time but lost the race for the last use
            Some((link, true)) => link.denial_at(now).unwrap_or(LinkDenial::UseLimitReached),
        };
        tracing::debug!("Link use rejected: {}", reason);
        Ok(LinkVerdict::Denied { reason })
    }

    /// Give back a use counted by [`LinkService::consume`] whose download
    /// then failed
    pub async fn release(pool: &SqlitePool, token: &str) -> VaultResult<()> {
        sqlx::query("UPDATE share_links SET used_count = used_count - 1 WHERE token = ? AND used_count > 0")
            .bind(token)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Validate and consume a link on a pooled connection
    pub async fn validate_link(pool: &SqlitePool, token: &str) -> VaultResult<LinkVerdict> {
        let mut conn = pool.acquire().await?;
        Self::consume(&mut conn, token, Utc::now()).await
    }

    /// Verdict a use would get right now, without counting a use
    pub async fn inspect_link(pool: &SqlitePool, token: &str) -> VaultResult<LinkVerdict> {
        let mut conn = pool.acquire().await?;
        let verdict = match Self::lookup(&mut conn, token).await? {
            Some((link, true)) => match link.denial_at(Utc::now()) {
                Some(reason) => LinkVerdict::Denied { reason },
                None => LinkVerdict::Allowed {
                    document_id: link.document_id,
                    access_level: link.access_level,
                },
            },
            _ => LinkVerdict::Denied {
                reason: LinkDenial::NotFound,
            },
        };
        Ok(verdict)
    }

    pub async fn find_by_token(pool: &SqlitePool, token: &str) -> VaultResult<Option<ShareLink>> {
        let mut conn = pool.acquire().await?;
        Ok(Self::lookup(&mut conn, token).await?.map(|(link, _)| link))
    }

    /// List all links of a document, newest first
    pub async fn list_links(
        pool: &SqlitePool,
        document_id: &str,
        owner_id: &str,
    ) -> VaultResult<Vec<ShareLink>> {
        AccessResolver::authorize_owner(pool, document_id, owner_id).await?;

        let rows: Vec<LinkRow> = sqlx::query_as(&format!(
            "SELECT {} FROM share_links WHERE document_id = ? ORDER BY created_at DESC",
            LINK_COLUMNS
        ))
        .bind(document_id)
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(ShareLink::try_from).collect()
    }

    /// Revoke a link
    pub async fn revoke_link(pool: &SqlitePool, link_id: &str, owner_id: &str) -> VaultResult<bool> {
        let result = sqlx::query(
            "UPDATE share_links SET revoked = 1 WHERE id = ? AND owner_id = ? AND revoked = 0",
        )
        .bind(link_id)
        .bind(owner_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Generate a URL-safe token from `bytes` random bytes
    pub fn generate_token(bytes: usize) -> String {
        let mut buf = vec![0u8; bytes.max(MIN_LINK_TOKEN_BYTES)];
        rand::rng().fill_bytes(&mut buf);
        URL_SAFE_NO_PAD.encode(&buf)
    }

    /// Link by token plus whether its document is still live
    async fn lookup(
        conn: &mut SqliteConnection,
        token: &str,
    ) -> VaultResult<Option<(ShareLink, bool)>> {
        let row: Option<LinkRow> = sqlx::query_as(&format!(
            "SELECT {} FROM share_links WHERE token = ?",
            LINK_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let link = ShareLink::try_from(row)?;

        let live: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM documents WHERE id = ? AND status != 'deleted'")
                .bind(&link.document_id)
                .fetch_optional(&mut *conn)
                .await?;

        Ok(Some((link, live.is_some())))
    }
}
