//! Targeted grant model: a document shared with a named recipient

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::AccessLevel;
use crate::error::{VaultError, VaultResult};

/// A document shared with one recipient at a given level.
///
/// Shares are never deleted; revocation flips `revoked`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentShare {
    pub id: String,
    pub document_id: String,
    pub owner_id: String,
    pub recipient_id: String,
    pub access_level: AccessLevel,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub accepted_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentShare {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|e| now >= e).unwrap_or(false)
    }

    /// Not revoked and not expired
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && !self.is_expired_at(now)
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }
}

pub(crate) const SHARE_COLUMNS: &str = "id, document_id, owner_id, recipient_id, access_level, \
     expires_at, revoked, accepted_at, last_accessed_at, created_at, updated_at";

#[derive(Debug, FromRow)]
pub(crate) struct ShareRow {
    pub id: String,
    pub document_id: String,
    pub owner_id: String,
    pub recipient_id: String,
    pub access_level: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub accepted_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ShareRow> for DocumentShare {
    type Error = VaultError;

    fn try_from(row: ShareRow) -> VaultResult<Self> {
        Ok(DocumentShare {
            access_level: row.access_level.parse().map_err(VaultError::Internal)?,
            id: row.id,
            document_id: row.document_id,
            owner_id: row.owner_id,
            recipient_id: row.recipient_id,
            expires_at: row.expires_at,
            revoked: row.revoked,
            accepted_at: row.accepted_at,
            last_accessed_at: row.last_accessed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Request to share a document with a recipient
#[derive(Debug, Clone, Deserialize)]
pub struct ShareDocumentRequest {
    pub recipient_id: String,
    #[serde(default)]
    pub access_level: AccessLevel,
    /// Expiration time (null = never)
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ShareDocumentRequest {
    pub fn new(recipient_id: impl Into<String>, access_level: AccessLevel) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            access_level,
            expires_at: None,
        }
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn share(expires_at: Option<DateTime<Utc>>, revoked: bool) -> DocumentShare {
        let now = Utc::now();
        DocumentShare {
            id: "s1".into(),
            document_id: "d1".into(),
            owner_id: "alice".into(),
            recipient_id: "bob".into(),
            access_level: AccessLevel::Download,
            expires_at,
            revoked,
            accepted_at: None,
            last_accessed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_active_states() {
        let now = Utc::now();
        assert!(share(None, false).is_active_at(now));
        assert!(!share(None, true).is_active_at(now));
        assert!(share(Some(now + Duration::hours(1)), false).is_active_at(now));
        assert!(!share(Some(now - Duration::seconds(1)), false).is_active_at(now));
        // Expiry instant itself is already expired
        assert!(!share(Some(now), false).is_active_at(now));
    }
}
