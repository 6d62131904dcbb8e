//! Maintenance of the `document_index` full-text table

use sqlx::SqliteConnection;

use crate::error::VaultResult;
use crate::models::Document;

/// Replace a document's index row with its current searchable fields
pub(crate) async fn index_document(conn: &mut SqliteConnection, document: &Document) -> VaultResult<()> {
    remove_from_index(&mut *conn, &document.id).await?;

    let tags = document.tags.iter().cloned().collect::<Vec<_>>().join(" ");
    sqlx::query(
        r#"
        INSERT INTO document_index (document_id, title, description, tags, file_name, body)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&document.id)
    .bind(&document.title)
    .bind(document.description.as_deref().unwrap_or(""))
    .bind(tags)
    .bind(&document.file_name)
    .bind(document.content_text.as_deref().unwrap_or(""))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn remove_from_index(conn: &mut SqliteConnection, document_id: &str) -> VaultResult<()> {
    sqlx::query("DELETE FROM document_index WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
