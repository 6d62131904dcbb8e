//! Database migrations for the document store

/// Migration SQL for document store tables.
///
/// Statements are separated by `;` and executed one at a time, so no
/// statement body may itself contain a semicolon.
pub const MIGRATION_SQL: &str = r#"
-- documents: owned documents and their mutable metadata
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'processing',
    title TEXT NOT NULL,
    description TEXT,
    tags_json TEXT NOT NULL DEFAULT '[]',
    is_public INTEGER NOT NULL DEFAULT 0,
    file_name TEXT NOT NULL,
    mime_type TEXT NOT NULL,
    file_size INTEGER NOT NULL DEFAULT 0,
    storage_key TEXT NOT NULL,
    content_text TEXT,
    page_count INTEGER,
    thumbnail_key TEXT,
    version INTEGER NOT NULL DEFAULT 1,
    view_count INTEGER NOT NULL DEFAULT 0,
    download_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_id);
CREATE INDEX IF NOT EXISTS idx_documents_owner_status ON documents(owner_id, status);
CREATE INDEX IF NOT EXISTS idx_documents_owner_created ON documents(owner_id, created_at DESC);

-- document_shares: targeted grants, soft-revoked, never deleted
CREATE TABLE IF NOT EXISTS document_shares (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id),
    owner_id TEXT NOT NULL,
    recipient_id TEXT NOT NULL,
    access_level TEXT NOT NULL DEFAULT 'view',
    expires_at TEXT,
    revoked INTEGER NOT NULL DEFAULT 0,
    accepted_at TEXT,
    last_accessed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_shares_document_recipient ON document_shares(document_id, recipient_id);
CREATE INDEX IF NOT EXISTS idx_shares_recipient ON document_shares(recipient_id, revoked);

-- share_links: anonymous tokenized grants
CREATE TABLE IF NOT EXISTS share_links (
    id TEXT PRIMARY KEY,
    token TEXT NOT NULL UNIQUE,
    document_id TEXT NOT NULL REFERENCES documents(id),
    owner_id TEXT NOT NULL,
    access_level TEXT NOT NULL DEFAULT 'view',
    expires_at TEXT,
    max_uses INTEGER CHECK (max_uses IS NULL OR max_uses > 0),
    used_count INTEGER NOT NULL DEFAULT 0,
    revoked INTEGER NOT NULL DEFAULT 0,
    last_used_at TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_links_document ON share_links(document_id);

-- document_revisions: append-only change history
CREATE TABLE IF NOT EXISTS document_revisions (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id),
    version INTEGER NOT NULL,
    actor_id TEXT NOT NULL,
    summary_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(document_id, version)
);

-- document_index: full-text index over searchable fields
CREATE VIRTUAL TABLE IF NOT EXISTS document_index USING fts5(
    document_id UNINDEXED,
    title,
    description,
    tags,
    file_name,
    body,
    tokenize = 'unicode61 remove_diacritics 2'
);

-- =====================================================
-- Audit logs for state-changing operations
-- =====================================================

CREATE TABLE IF NOT EXISTS audit_logs (
    id TEXT PRIMARY KEY,
    timestamp TEXT NOT NULL,
    user_id TEXT NOT NULL,
    action TEXT NOT NULL,
    document_id TEXT,
    details_json TEXT DEFAULT '{}',
    success INTEGER DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_logs(timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_audit_document ON audit_logs(document_id);
CREATE INDEX IF NOT EXISTS idx_audit_user_timestamp ON audit_logs(user_id, timestamp DESC)
"#;

/// Run migration
pub async fn run_migration(pool: &sqlx::SqlitePool) -> Result<(), sqlx::Error> {
    for statement in MIGRATION_SQL.split(';') {
        let statement = statement.trim();
        if statement.is_empty() || is_comment_only(statement) {
            continue;
        }

        let result = sqlx::query(statement).execute(pool).await;

        // ALTER TABLE ADD COLUMN fails once the column exists
        if let Err(ref e) = result {
            let is_alter_table = statement.to_uppercase().contains("ALTER TABLE");
            let is_duplicate_column = e.to_string().contains("duplicate column name");

            if !(is_alter_table && is_duplicate_column) {
                result?;
            }
        }
    }
    Ok(())
}

fn is_comment_only(statement: &str) -> bool {
    statement
        .lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[test]
    fn test_statements_do_not_embed_semicolons_in_bodies() {
        let statements: Vec<_> = MIGRATION_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty() && !is_comment_only(s))
            .collect();
        assert!(statements.iter().any(|s| s.contains("CREATE VIRTUAL TABLE")));
        for s in statements {
            let body = s
                .lines()
                .filter(|l| !l.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n");
            assert!(!body.trim().is_empty());
        }
    }

    #[tokio::test]
    async fn test_migration_is_idempotent() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        run_migration(&pool).await.unwrap();
        run_migration(&pool).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN \
             ('documents', 'document_shares', 'share_links', 'document_revisions', 'audit_logs') \
             ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(tables.len(), 5);
    }
}
