//! Revision tracking: field diff, version bump and append-only history

use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::access_service::AccessResolver;
use super::document_service::fetch_document;
use super::search::index_document;
use crate::error::{VaultError, VaultResult};
use crate::models::{
    AccessLevel, ChangeSet, DocumentMetadata, EffectiveAccess, FieldChange, FileChange,
    MaterialUpdate, PaginatedResponse, PaginationParams, Revision, RevisionRow, TrackedField,
    UpdateOutcome, REVISION_COLUMNS,
};
use crate::security::decide;

/// Shallow comparison of the tracked fields.
///
/// `file_replaced` is carried alongside the field changes and is material
/// on its own.
pub fn detect_changes(
    before: &DocumentMetadata,
    after: &DocumentMetadata,
    file_replaced: bool,
) -> ChangeSet {
    let mut changes = Vec::new();

    if before.title != after.title {
        changes.push(FieldChange {
            field: TrackedField::Title,
            old: json!(before.title),
            new: json!(after.title),
        });
    }
    if before.description != after.description {
        changes.push(FieldChange {
            field: TrackedField::Description,
            old: json!(before.description),
            new: json!(after.description),
        });
    }
    if before.tags != after.tags {
        changes.push(FieldChange {
            field: TrackedField::Tags,
            old: json!(before.tags),
            new: json!(after.tags),
        });
    }
    if before.is_public != after.is_public {
        changes.push(FieldChange {
            field: TrackedField::Visibility,
            old: json!(before.is_public),
            new: json!(after.is_public),
        });
    }

    ChangeSet {
        changes,
        file_replaced,
    }
}

/// Stored metadata with only the fields the caller meant to change taken
/// from `update.after`
fn apply_intended(stored: &DocumentMetadata, update: &MaterialUpdate) -> DocumentMetadata {
    let intended = detect_changes(&update.before, &update.after, false);
    let mut target = stored.clone();
    for field in intended.fields() {
        match field {
            TrackedField::Title => target.title = update.after.title.clone(),
            TrackedField::Description => target.description = update.after.description.clone(),
            TrackedField::Tags => target.tags = update.after.tags.clone(),
            TrackedField::Visibility => target.is_public = update.after.is_public,
        }
    }
    target
}

pub struct RevisionService;

impl RevisionService {
    /// Persist a material update, bump the version and append a revision,
    /// all in one transaction.
    ///
    /// Field values are compared against the stored row rather than the
    /// caller's `before`, so replaying an update that already landed is a
    /// no-op. Fields the caller left unchanged keep their stored value even
    /// if `before` is stale.
    pub async fn record_material_update(
        pool: &SqlitePool,
        document_id: &str,
        actor_id: &str,
        access: EffectiveAccess,
        update: &MaterialUpdate,
    ) -> VaultResult<UpdateOutcome> {
        if !access.satisfies(AccessLevel::Edit) {
            return Err(VaultError::Denied);
        }

        let mut tx = pool.begin().await?;

        // Take the write lock before reading so the version we compare
        // against cannot move under us
        let locked = sqlx::query("UPDATE documents SET version = version WHERE id = ? AND status != 'deleted'")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        if locked.rows_affected() == 0 {
            return Err(VaultError::NotFound);
        }

        let stored = fetch_document(&mut *tx, document_id)
            .await?
            .ok_or(VaultError::NotFound)?;

        // Grants can be revoked between the caller's check and the lock
        if !stored.is_owned_by(actor_id) {
            let grants = AccessResolver::grants_for(&mut *tx, document_id, actor_id).await?;
            decide(&stored, actor_id, &grants, AccessLevel::Edit, Utc::now()).into_result()?;
        }

        if let Some(expected) = update.expected_version {
            if expected != stored.version {
                return Err(VaultError::Conflict {
                    expected,
                    current: stored.version,
                });
            }
        }

        let stored_meta = stored.metadata();
        let target = apply_intended(&stored_meta, update);
        let change_set = detect_changes(&stored_meta, &target, update.file.is_replaced());

        if !change_set.is_material() {
            tx.commit().await?;
            return Ok(UpdateOutcome::NoOp {
                version: stored.version,
            });
        }

        let now = Utc::now();
        let new_version = stored.version + 1;
        let mut updated = stored.clone();
        updated.title = target.title.clone();
        updated.description = target.description.clone();
        updated.tags = target.tags.clone();
        updated.is_public = target.is_public;
        updated.version = new_version;
        updated.updated_at = now;
        if let FileChange::Replaced(file) = &update.file {
            updated.storage_key = file.storage_key.clone();
            updated.file_name = file.file_name.clone();
            updated.mime_type = file.mime_type.clone();
            updated.file_size = file.file_size;
            updated.content_text = file.content_text.clone();
            updated.page_count = file.page_count;
            updated.thumbnail_key = file.thumbnail_key.clone();
        }

        let result = sqlx::query(
            r#"
            UPDATE documents
            SET title = ?, description = ?, tags_json = ?, is_public = ?,
                storage_key = ?, file_name = ?, mime_type = ?, file_size = ?,
                content_text = ?, page_count = ?, thumbnail_key = ?,
                version = version + 1, updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(&updated.title)
        .bind(&updated.description)
        .bind(target.tags_json()?)
        .bind(updated.is_public)
        .bind(&updated.storage_key)
        .bind(&updated.file_name)
        .bind(&updated.mime_type)
        .bind(updated.file_size)
        .bind(&updated.content_text)
        .bind(updated.page_count)
        .bind(&updated.thumbnail_key)
        .bind(now)
        .bind(document_id)
        .bind(stored.version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(VaultError::Conflict {
                expected: stored.version,
                current: stored.version + 1,
            });
        }

        let revision_id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO document_revisions (id, document_id, version, actor_id, summary_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&revision_id)
        .bind(document_id)
        .bind(new_version)
        .bind(actor_id)
        .bind(serde_json::to_string(&change_set)?)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        index_document(&mut *tx, &updated).await?;
        tx.commit().await?;

        tracing::info!(
            "Document {} moved to version {} by {} ({:?}{})",
            document_id,
            new_version,
            actor_id,
            change_set.fields(),
            if change_set.file_replaced { ", file replaced" } else { "" }
        );

        Ok(UpdateOutcome::Recorded {
            revision_id,
            version: new_version,
        })
    }

    /// Revisions of a document, newest first
    pub async fn list_revisions(
        pool: &SqlitePool,
        document_id: &str,
        pagination: PaginationParams,
    ) -> VaultResult<PaginatedResponse<Revision>> {
        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM document_revisions WHERE document_id = ?")
                .bind(document_id)
                .fetch_one(pool)
                .await?;

        let rows: Vec<RevisionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM document_revisions WHERE document_id = ? ORDER BY version DESC LIMIT ? OFFSET ?",
            REVISION_COLUMNS
        ))
        .bind(document_id)
        .bind(pagination.limit as i64)
        .bind(pagination.offset() as i64)
        .fetch_all(pool)
        .await?;

        let items = rows
            .into_iter()
            .map(Revision::try_from)
            .collect::<VaultResult<Vec<_>>>()?;

        Ok(PaginatedResponse::new(
            items,
            total as u64,
            pagination.page,
            pagination.limit,
        ))
    }

    pub async fn get_revision(
        pool: &SqlitePool,
        document_id: &str,
        version: i64,
    ) -> VaultResult<Revision> {
        let row: Option<RevisionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM document_revisions WHERE document_id = ? AND version = ?",
            REVISION_COLUMNS
        ))
        .bind(document_id)
        .bind(version)
        .fetch_optional(pool)
        .await?;

        row.map(Revision::try_from)
            .transpose()?
            .ok_or(VaultError::NotFound)
    }
}
