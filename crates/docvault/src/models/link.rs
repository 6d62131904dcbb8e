//! Anonymous share link model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::AccessLevel;
use crate::error::{VaultError, VaultResult};

/// Link expiration duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkExpiration {
    #[serde(rename = "1h")]
    Hours1,
    #[serde(rename = "24h")]
    Hours24,
    #[serde(rename = "7d")]
    Days7,
    #[serde(rename = "30d")]
    Days30,
    #[serde(rename = "never")]
    Never,
}

impl Default for LinkExpiration {
    fn default() -> Self {
        LinkExpiration::Days7
    }
}

impl LinkExpiration {
    /// Get the duration in seconds
    pub fn to_seconds(&self) -> Option<i64> {
        match self {
            LinkExpiration::Hours1 => Some(60 * 60),
            LinkExpiration::Hours24 => Some(24 * 60 * 60),
            LinkExpiration::Days7 => Some(7 * 24 * 60 * 60),
            LinkExpiration::Days30 => Some(30 * 24 * 60 * 60),
            LinkExpiration::Never => None,
        }
    }

    /// Calculate expiration datetime from `now`
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.to_seconds()
            .map(|secs| now + chrono::Duration::seconds(secs))
    }
}

impl std::str::FromStr for LinkExpiration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1h" => Ok(LinkExpiration::Hours1),
            "24h" => Ok(LinkExpiration::Hours24),
            "7d" => Ok(LinkExpiration::Days7),
            "30d" => Ok(LinkExpiration::Days30),
            "never" => Ok(LinkExpiration::Never),
            _ => Err(format!("Invalid link expiration: {}", s)),
        }
    }
}

/// Why a link could not be used.
///
/// Safe to disclose: holding the token already proves prior legitimate
/// possession, so these reasons carry no enumeration risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkDenial {
    NotFound,
    Revoked,
    Expired,
    UseLimitReached,
}

impl std::fmt::Display for LinkDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkDenial::NotFound => write!(f, "not_found"),
            LinkDenial::Revoked => write!(f, "revoked"),
            LinkDenial::Expired => write!(f, "expired"),
            LinkDenial::UseLimitReached => write!(f, "use_limit_reached"),
        }
    }
}

/// Outcome of validating (and consuming) a link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum LinkVerdict {
    Allowed {
        document_id: String,
        access_level: AccessLevel,
    },
    Denied {
        reason: LinkDenial,
    },
}

impl LinkVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, LinkVerdict::Allowed { .. })
    }

    pub fn into_result(self) -> VaultResult<(String, AccessLevel)> {
        match self {
            LinkVerdict::Allowed {
                document_id,
                access_level,
            } => Ok((document_id, access_level)),
            LinkVerdict::Denied { reason } => Err(reason.into()),
        }
    }
}

/// Anonymous share link
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareLink {
    pub id: String,
    /// Opaque URL-safe token; the only credential a visitor presents
    pub token: String,
    pub document_id: String,
    pub owner_id: String,
    pub access_level: AccessLevel,
    /// Expiration time (null = never)
    pub expires_at: Option<DateTime<Utc>>,
    /// Maximum uses (null = unlimited)
    pub max_uses: Option<i64>,
    /// Current use count
    pub used_count: i64,
    pub revoked: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ShareLink {
    /// First failing check, in the order revoked, expiry, use counter
    pub fn denial_at(&self, now: DateTime<Utc>) -> Option<LinkDenial> {
        if self.revoked {
            return Some(LinkDenial::Revoked);
        }

        if let Some(expires_at) = self.expires_at {
            if now >= expires_at {
                return Some(LinkDenial::Expired);
            }
        }

        if let Some(max_uses) = self.max_uses {
            if self.used_count >= max_uses {
                return Some(LinkDenial::UseLimitReached);
            }
        }

        None
    }

    /// Generate full link URL
    pub fn get_url(&self, base_url: &str) -> String {
        format!("{}/s/{}", base_url.trim_end_matches('/'), self.token)
    }
}

pub(crate) const LINK_COLUMNS: &str = "id, token, document_id, owner_id, access_level, expires_at, \
     max_uses, used_count, revoked, last_used_at, created_at";

#[derive(Debug, FromRow)]
pub(crate) struct LinkRow {
    pub id: String,
    pub token: String,
    pub document_id: String,
    pub owner_id: String,
    pub access_level: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i64>,
    pub used_count: i64,
    pub revoked: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<LinkRow> for ShareLink {
    type Error = VaultError;

    fn try_from(row: LinkRow) -> VaultResult<Self> {
        Ok(ShareLink {
            access_level: row.access_level.parse().map_err(VaultError::Internal)?,
            id: row.id,
            token: row.token,
            document_id: row.document_id,
            owner_id: row.owner_id,
            expires_at: row.expires_at,
            max_uses: row.max_uses,
            used_count: row.used_count,
            revoked: row.revoked,
            last_used_at: row.last_used_at,
            created_at: row.created_at,
        })
    }
}

/// Request to create a link
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateLinkRequest {
    /// Level granted to visitors; falls back to the configured default
    #[serde(default)]
    pub access_level: Option<AccessLevel>,
    #[serde(default)]
    pub expires_in: LinkExpiration,
    /// Maximum uses (null = unlimited)
    #[serde(default)]
    pub max_uses: Option<i64>,
}

/// Response for a created link
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkResponse {
    pub id: String,
    pub token: String,
    pub url: String,
    pub access_level: AccessLevel,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i64>,
    pub used_count: i64,
}
