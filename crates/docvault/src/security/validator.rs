//! Input validation utilities

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{VaultError, VaultResult};

pub const MAX_FILE_NAME_BYTES: usize = 255;
pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_DESCRIPTION_CHARS: usize = 5_000;
pub const MAX_TAGS: usize = 32;
pub const MAX_QUERY_CHARS: usize = 256;

/// Valid tag pattern: word characters, hyphen, dot
static VALID_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w\-\.]{1,50}$").expect("valid tag regex"));

const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Validate an uploaded file name to prevent path traversal
///
/// Spaces and unicode are allowed (documents are named by people), but
/// separators, parent references and control characters are not.
pub fn validate_file_name(name: &str) -> VaultResult<()> {
    let invalid = || VaultError::InvalidFileName {
        name: name.to_string(),
    };

    if name.trim().is_empty() || name.len() > MAX_FILE_NAME_BYTES {
        return Err(invalid());
    }

    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(invalid());
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(invalid());
    }

    if name.chars().any(|c| matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*')) {
        return Err(invalid());
    }

    let upper_name = name.to_uppercase();
    let base_name = upper_name.split('.').next().unwrap_or(&upper_name);
    if RESERVED_NAMES.contains(&base_name) {
        return Err(invalid());
    }

    Ok(())
}

pub fn validate_title(title: &str) -> VaultResult<()> {
    if title.trim().is_empty() {
        return Err(VaultError::Validation("Title cannot be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(VaultError::Validation(format!(
            "Title exceeds {} characters",
            MAX_TITLE_CHARS
        )));
    }
    Ok(())
}

pub fn validate_description(description: Option<&str>) -> VaultResult<()> {
    if let Some(text) = description {
        if text.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(VaultError::Validation(format!(
                "Description exceeds {} characters",
                MAX_DESCRIPTION_CHARS
            )));
        }
    }
    Ok(())
}

/// Lowercase, trim and validate a tag list, collapsing duplicates
pub fn normalize_tags<I, S>(tags: I) -> VaultResult<BTreeSet<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized = BTreeSet::new();
    for tag in tags {
        let tag = tag.as_ref().trim().to_lowercase();
        if tag.is_empty() {
            continue;
        }
        if !VALID_TAG.is_match(&tag) {
            return Err(VaultError::Validation(format!("Invalid tag: {}", tag)));
        }
        normalized.insert(tag);
    }

    if normalized.len() > MAX_TAGS {
        return Err(VaultError::Validation(format!(
            "At most {} tags are allowed",
            MAX_TAGS
        )));
    }
    Ok(normalized)
}

pub fn validate_query(query: &str) -> VaultResult<()> {
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(VaultError::Validation(format!(
            "Query exceeds {} characters",
            MAX_QUERY_CHARS
        )));
    }
    Ok(())
}
