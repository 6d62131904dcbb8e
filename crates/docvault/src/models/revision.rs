//! Revision model - append-only change records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::DocumentMetadata;
use crate::error::{VaultError, VaultResult};

/// Metadata field whose changes are tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedField {
    Title,
    Description,
    Tags,
    Visibility,
}

impl std::fmt::Display for TrackedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackedField::Title => write!(f, "title"),
            TrackedField::Description => write!(f, "description"),
            TrackedField::Tags => write!(f, "tags"),
            TrackedField::Visibility => write!(f, "visibility"),
        }
    }
}

/// Old and new value of one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: TrackedField,
    pub old: serde_json::Value,
    pub new: serde_json::Value,
}

/// Field-level diff plus the out-of-band file replacement flag
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    #[serde(default)]
    pub changes: Vec<FieldChange>,
    #[serde(default)]
    pub file_replaced: bool,
}

impl ChangeSet {
    /// A change is material when any field changed or the file was replaced
    pub fn is_material(&self) -> bool {
        !self.changes.is_empty() || self.file_replaced
    }

    pub fn fields(&self) -> Vec<TrackedField> {
        self.changes.iter().map(|c| c.field).collect()
    }

    pub fn get(&self, field: TrackedField) -> Option<&FieldChange> {
        self.changes.iter().find(|c| c.field == field)
    }
}

/// Immutable revision row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    pub id: String,
    pub document_id: String,
    pub version: i64,
    pub actor_id: String,
    pub summary: ChangeSet,
    pub created_at: DateTime<Utc>,
}

pub(crate) const REVISION_COLUMNS: &str =
    "id, document_id, version, actor_id, summary_json, created_at";

#[derive(Debug, FromRow)]
pub(crate) struct RevisionRow {
    pub id: String,
    pub document_id: String,
    pub version: i64,
    pub actor_id: String,
    pub summary_json: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<RevisionRow> for Revision {
    type Error = VaultError;

    fn try_from(row: RevisionRow) -> VaultResult<Self> {
        Ok(Revision {
            summary: serde_json::from_str(&row.summary_json)?,
            id: row.id,
            document_id: row.document_id,
            version: row.version,
            actor_id: row.actor_id,
            created_at: row.created_at,
        })
    }
}

/// New binary location after a file replacement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub storage_key: String,
    pub file_name: String,
    pub mime_type: String,
    pub file_size: i64,
    /// Extracted body text of the new bytes, if any
    pub content_text: Option<String>,
    pub page_count: Option<i64>,
    pub thumbnail_key: Option<String>,
}

/// What happened to the underlying binary during an update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FileChange {
    #[default]
    Unchanged,
    /// Bytes now live under a new key
    Replaced(StoredFile),
}

impl FileChange {
    pub fn is_replaced(&self) -> bool {
        matches!(self, FileChange::Replaced(_))
    }
}

/// A requested update as submitted by the caller
#[derive(Debug, Clone)]
pub struct MaterialUpdate {
    pub before: DocumentMetadata,
    pub after: DocumentMetadata,
    pub file: FileChange,
    /// Optimistic check against the stored version
    pub expected_version: Option<i64>,
}

impl MaterialUpdate {
    pub fn metadata(before: DocumentMetadata, after: DocumentMetadata) -> Self {
        Self {
            before,
            after,
            file: FileChange::Unchanged,
            expected_version: None,
        }
    }

    pub fn file_replaced(mut self, file: FileChange) -> Self {
        self.file = file;
        self
    }

    pub fn expect_version(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

/// Result of recording an update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum UpdateOutcome {
    Recorded { revision_id: String, version: i64 },
    NoOp { version: i64 },
}

impl UpdateOutcome {
    pub fn version(&self) -> i64 {
        match self {
            UpdateOutcome::Recorded { version, .. } | UpdateOutcome::NoOp { version } => *version,
        }
    }

    pub fn revision_id(&self) -> Option<&str> {
        match self {
            UpdateOutcome::Recorded { revision_id, .. } => Some(revision_id),
            UpdateOutcome::NoOp { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_materiality() {
        assert!(!ChangeSet::default().is_material());
        assert!(ChangeSet {
            changes: vec![],
            file_replaced: true
        }
        .is_material());
    }

    #[test]
    fn test_summary_json_shape() {
        let set = ChangeSet {
            changes: vec![FieldChange {
                field: TrackedField::Description,
                old: json!(null),
                new: json!("quarterly"),
            }],
            file_replaced: false,
        };
        let value = serde_json::to_value(&set).unwrap();
        assert_eq!(value["changes"][0]["field"], "description");
        assert_eq!(value["file_replaced"], false);
    }
}
