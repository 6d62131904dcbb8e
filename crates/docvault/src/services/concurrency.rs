//! Optimistic concurrency for document updates
//!
//! A document's ETag is derived from its id and `version`. Since `version`
//! only moves on material change, a client holding a stale ETag gets a
//! `Conflict` instead of silently overwriting someone else's edit.

use sha2::{Digest, Sha256};

use crate::error::{VaultError, VaultResult};
use crate::models::Document;

/// ETag for optimistic locking, e.g. `W/"3-1f2e..."`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ETag(pub String);

impl ETag {
    pub fn new(document_id: &str, version: i64) -> Self {
        let digest = Sha256::digest(document_id.as_bytes());
        ETag(format!("W/\"{}-{}\"", version, hex::encode(&digest[..6])))
    }

    pub fn for_document(document: &Document) -> Self {
        Self::new(&document.id, document.version)
    }

    /// Parse an ETag string
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.starts_with("W/\"") && s.ends_with('"') && s.len() > 4 {
            Some(ETag(s.to_string()))
        } else if s.starts_with('"') && s.ends_with('"') && s.len() > 2 {
            // Strong form of the same tag
            Some(ETag(format!("W/{}", s)))
        } else {
            None
        }
    }

    /// Version encoded in the tag
    pub fn version(&self) -> Option<i64> {
        let inner = self.0.strip_prefix("W/\"")?.strip_suffix('"')?;
        inner.split_once('-')?.0.parse().ok()
    }

    /// Get the raw ETag value
    pub fn value(&self) -> &str {
        &self.0
    }

    /// Fail with `Conflict` unless this tag names `document`'s current version
    pub fn check(&self, document: &Document) -> VaultResult<()> {
        let current = ETag::for_document(document);
        if *self == current {
            return Ok(());
        }
        Err(VaultError::Conflict {
            expected: self.version().unwrap_or(-1),
            current: document.version,
        })
    }
}

impl std::fmt::Display for ETag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
