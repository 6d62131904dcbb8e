//! Access levels and the permission lattice

use serde::{Deserialize, Serialize};

/// Level granted on a document by a share or a link.
///
/// Ordered `View < Download < Edit`; derived `Ord` follows declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    View,
    Download,
    Edit,
}

impl AccessLevel {
    pub const ALL: [AccessLevel; 3] = [AccessLevel::View, AccessLevel::Download, AccessLevel::Edit];

    pub fn rank(self) -> u8 {
        match self {
            AccessLevel::View => 1,
            AccessLevel::Download => 2,
            AccessLevel::Edit => 3,
        }
    }

    /// Whether holding `self` is enough for an operation requiring `want`
    pub fn satisfies(self, want: AccessLevel) -> bool {
        self.rank() >= want.rank()
    }
}

impl Default for AccessLevel {
    fn default() -> Self {
        AccessLevel::View
    }
}

impl std::fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessLevel::View => write!(f, "view"),
            AccessLevel::Download => write!(f, "download"),
            AccessLevel::Edit => write!(f, "edit"),
        }
    }
}

impl std::str::FromStr for AccessLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "view" => Ok(AccessLevel::View),
            "download" => Ok(AccessLevel::Download),
            "edit" => Ok(AccessLevel::Edit),
            _ => Err(format!("Invalid access level: {}", s)),
        }
    }
}

/// Level a requester actually holds on a document.
///
/// `Owner` is never stored; it is derived from `requester == document.owner_id`
/// and dominates every `AccessLevel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "level")]
pub enum EffectiveAccess {
    Owner,
    Granted(AccessLevel),
}

impl EffectiveAccess {
    pub fn satisfies(self, want: AccessLevel) -> bool {
        match self {
            EffectiveAccess::Owner => true,
            EffectiveAccess::Granted(have) => have.satisfies(want),
        }
    }

    pub fn is_owner(self) -> bool {
        matches!(self, EffectiveAccess::Owner)
    }

    /// The stored level, if this access came from a grant
    pub fn level(self) -> Option<AccessLevel> {
        match self {
            EffectiveAccess::Owner => None,
            EffectiveAccess::Granted(level) => Some(level),
        }
    }
}

impl std::fmt::Display for EffectiveAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EffectiveAccess::Owner => write!(f, "owner"),
            EffectiveAccess::Granted(level) => write!(f, "{}", level),
        }
    }
}

/// Outcome of resolving a requester against a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "verdict", content = "access")]
pub enum AccessVerdict {
    Allowed(EffectiveAccess),
    Denied,
}

impl AccessVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessVerdict::Allowed(_))
    }

    /// Convert into a result, mapping `Denied` to the concealed error
    pub fn into_result(self) -> crate::error::VaultResult<EffectiveAccess> {
        match self {
            AccessVerdict::Allowed(access) => Ok(access),
            AccessVerdict::Denied => Err(crate::error::VaultError::Denied),
        }
    }
}
