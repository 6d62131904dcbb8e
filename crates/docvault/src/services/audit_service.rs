//! Audit logging service
//!
//! Document operations report what they did through [`ActivitySink`].
//! Recording is fire-and-forget: a failed write is logged and never fails
//! the operation that produced it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::error::VaultResult;

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub action: AuditAction,
    pub document_id: Option<String>,
    pub details: serde_json::Value,
    pub success: bool,
}

/// Audit action types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    // Document actions
    DocumentCreate,
    DocumentView,
    DocumentDownload,
    DocumentUpdate,
    DocumentReplace,
    DocumentDelete,
    StatusChange,
    // Share actions
    ShareGrant,
    ShareUpdate,
    ShareRevoke,
    ShareAccept,
    // Link actions
    LinkCreate,
    LinkUse,
    LinkRevoke,
    // Other
    Custom,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditAction::DocumentCreate => write!(f, "document_create"),
            AuditAction::DocumentView => write!(f, "document_view"),
            AuditAction::DocumentDownload => write!(f, "document_download"),
            AuditAction::DocumentUpdate => write!(f, "document_update"),
            AuditAction::DocumentReplace => write!(f, "document_replace"),
            AuditAction::DocumentDelete => write!(f, "document_delete"),
            AuditAction::StatusChange => write!(f, "status_change"),
            AuditAction::ShareGrant => write!(f, "share_grant"),
            AuditAction::ShareUpdate => write!(f, "share_update"),
            AuditAction::ShareRevoke => write!(f, "share_revoke"),
            AuditAction::ShareAccept => write!(f, "share_accept"),
            AuditAction::LinkCreate => write!(f, "link_create"),
            AuditAction::LinkUse => write!(f, "link_use"),
            AuditAction::LinkRevoke => write!(f, "link_revoke"),
            AuditAction::Custom => write!(f, "custom"),
        }
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document_create" => Ok(AuditAction::DocumentCreate),
            "document_view" => Ok(AuditAction::DocumentView),
            "document_download" => Ok(AuditAction::DocumentDownload),
            "document_update" => Ok(AuditAction::DocumentUpdate),
            "document_replace" => Ok(AuditAction::DocumentReplace),
            "document_delete" => Ok(AuditAction::DocumentDelete),
            "status_change" => Ok(AuditAction::StatusChange),
            "share_grant" => Ok(AuditAction::ShareGrant),
            "share_update" => Ok(AuditAction::ShareUpdate),
            "share_revoke" => Ok(AuditAction::ShareRevoke),
            "share_accept" => Ok(AuditAction::ShareAccept),
            "link_create" => Ok(AuditAction::LinkCreate),
            "link_use" => Ok(AuditAction::LinkUse),
            "link_revoke" => Ok(AuditAction::LinkRevoke),
            "custom" => Ok(AuditAction::Custom),
            _ => Err(format!("Unknown audit action: {}", s)),
        }
    }
}

/// Something a document operation did
#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub actor_id: String,
    pub action: AuditAction,
    pub document_id: Option<String>,
    pub details: serde_json::Value,
    pub success: bool,
}

impl ActivityEvent {
    pub fn new(actor_id: impl Into<String>, action: AuditAction) -> Self {
        Self {
            actor_id: actor_id.into(),
            action,
            document_id: None,
            details: serde_json::json!({}),
            success: true,
        }
    }

    pub fn document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Append-only activity sink
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn record(&self, event: ActivityEvent);
}

/// Query parameters for listing audit logs
#[derive(Debug, Clone, Default)]
pub struct AuditLogQuery {
    pub user_id: Option<String>,
    pub action: Option<AuditAction>,
    pub document_id: Option<String>,
    pub success_only: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, FromRow)]
struct AuditRow {
    id: String,
    timestamp: DateTime<Utc>,
    user_id: String,
    action: String,
    document_id: Option<String>,
    details_json: Option<String>,
    success: bool,
}

/// SQLite-backed audit log
#[derive(Clone)]
pub struct AuditService {
    pool: SqlitePool,
}

impl AuditService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Log an audit event
    pub async fn log(&self, event: &ActivityEvent) -> VaultResult<String> {
        let id = uuid::Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, timestamp, user_id, action, document_id, details_json, success)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(Utc::now())
        .bind(&event.actor_id)
        .bind(event.action.to_string())
        .bind(&event.document_id)
        .bind(event.details.to_string())
        .bind(event.success)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Query audit logs with filters
    pub async fn query(&self, query: AuditLogQuery) -> VaultResult<Vec<AuditLog>> {
        let mut sql = String::from(
            r#"
            SELECT id, timestamp, user_id, action, document_id, details_json, success
            FROM audit_logs
            WHERE 1=1
            "#,
        );

        let mut bindings: Vec<String> = vec![];

        if let Some(ref user_id) = query.user_id {
            sql.push_str(" AND user_id = ?");
            bindings.push(user_id.clone());
        }

        if let Some(ref action) = query.action {
            sql.push_str(" AND action = ?");
            bindings.push(action.to_string());
        }

        if let Some(ref document_id) = query.document_id {
            sql.push_str(" AND document_id = ?");
            bindings.push(document_id.clone());
        }

        if let Some(success_only) = query.success_only {
            sql.push_str(" AND success = ?");
            bindings.push(if success_only { "1" } else { "0" }.to_string());
        }

        sql.push_str(" ORDER BY timestamp DESC, rowid DESC LIMIT ? OFFSET ?");

        let mut query_builder = sqlx::query_as::<_, AuditRow>(&sql);
        for binding in bindings {
            query_builder = query_builder.bind(binding);
        }
        let rows = query_builder
            .bind(query.limit.unwrap_or(100) as i64)
            .bind(query.offset.unwrap_or(0) as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| AuditLog {
                action: row.action.parse().unwrap_or(AuditAction::Custom),
                details: row
                    .details_json
                    .as_deref()
                    .and_then(|s| serde_json::from_str(s).ok())
                    .unwrap_or(serde_json::json!({})),
                id: row.id,
                timestamp: row.timestamp,
                user_id: row.user_id,
                document_id: row.document_id,
                success: row.success,
            })
            .collect())
    }

    /// Get audit logs for a specific document
    pub async fn get_document_history(
        &self,
        document_id: &str,
        limit: u32,
    ) -> VaultResult<Vec<AuditLog>> {
        self.query(AuditLogQuery {
            document_id: Some(document_id.to_string()),
            limit: Some(limit),
            ..Default::default()
        })
        .await
    }
}

#[async_trait]
impl ActivitySink for AuditService {
    async fn record(&self, event: ActivityEvent) {
        if let Err(e) = self.log(&event).await {
            tracing::warn!(
                "Failed to record audit event {} for {:?}: {}",
                event.action,
                event.document_id,
                e
            );
        }
    }
}
