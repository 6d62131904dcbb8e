//! Document store configuration

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::AccessLevel;

/// Smallest accepted link token length in bytes (64 bits of entropy)
pub const MIN_LINK_TOKEN_BYTES: usize = 8;

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Database URL (default: sqlite://./data/docvault.db)
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Maximum database connections (default: 10)
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Root directory for stored document bytes
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,

    /// Base URL for share links and presigned object URLs
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Secret used to sign presigned object URLs
    #[serde(default)]
    pub signing_secret: Option<String>,

    /// Lifetime of a presigned URL in seconds (default: 300)
    #[serde(default = "default_presign_ttl_secs")]
    pub presign_ttl_secs: u64,

    /// Default page size for search and listings
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    /// Upper bound on requested page size
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,

    /// Minimum trigram similarity for the approximate strategy (0.0 - 1.0)
    #[serde(default = "default_trigram_threshold")]
    pub trigram_threshold: f64,

    /// Per-strategy time budget in milliseconds; a strategy that exceeds it
    /// counts as empty
    #[serde(default = "default_strategy_timeout_ms")]
    pub strategy_timeout_ms: u64,

    /// Random bytes per share link token (default: 32)
    #[serde(default = "default_link_token_bytes")]
    pub link_token_bytes: usize,

    /// Level granted by links created without an explicit level
    #[serde(default)]
    pub default_link_level: AccessLevel,
}

fn default_database_url() -> String {
    "sqlite://./data/docvault.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data/objects")
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_presign_ttl_secs() -> u64 {
    300
}

fn default_page_size() -> u32 {
    20
}

fn default_max_page_size() -> u32 {
    100
}

fn default_trigram_threshold() -> f64 {
    0.3
}

fn default_strategy_timeout_ms() -> u64 {
    2_000
}

fn default_link_token_bytes() -> usize {
    32
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            max_connections: default_max_connections(),
            storage_path: default_storage_path(),
            base_url: default_base_url(),
            signing_secret: None,
            presign_ttl_secs: default_presign_ttl_secs(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            trigram_threshold: default_trigram_threshold(),
            strategy_timeout_ms: default_strategy_timeout_ms(),
            link_token_bytes: default_link_token_bytes(),
            default_link_level: AccessLevel::default(),
        }
    }
}

impl VaultConfig {
    /// Load configuration from `DOCVAULT_*` environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let database_url = std::env::var("DOCVAULT_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .unwrap_or(defaults.database_url);
        let max_connections = env_parse("DOCVAULT_MAX_CONNECTIONS")?
            .unwrap_or(defaults.max_connections);
        let storage_path = std::env::var("DOCVAULT_STORAGE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.storage_path);
        let base_url = std::env::var("DOCVAULT_BASE_URL").unwrap_or(defaults.base_url);
        let signing_secret = std::env::var("DOCVAULT_SIGNING_SECRET").ok();
        let presign_ttl_secs =
            env_parse("DOCVAULT_PRESIGN_TTL_SECS")?.unwrap_or(defaults.presign_ttl_secs);
        let default_page_size =
            env_parse("DOCVAULT_DEFAULT_PAGE_SIZE")?.unwrap_or(defaults.default_page_size);
        let max_page_size =
            env_parse("DOCVAULT_MAX_PAGE_SIZE")?.unwrap_or(defaults.max_page_size);
        let trigram_threshold =
            env_parse("DOCVAULT_TRIGRAM_THRESHOLD")?.unwrap_or(defaults.trigram_threshold);
        let strategy_timeout_ms =
            env_parse("DOCVAULT_STRATEGY_TIMEOUT_MS")?.unwrap_or(defaults.strategy_timeout_ms);
        let link_token_bytes =
            env_parse("DOCVAULT_LINK_TOKEN_BYTES")?.unwrap_or(defaults.link_token_bytes);
        let default_link_level = match std::env::var("DOCVAULT_DEFAULT_LINK_LEVEL") {
            Ok(raw) => raw.parse().map_err(anyhow::Error::msg)?,
            Err(_) => defaults.default_link_level,
        };

        let config = Self {
            database_url,
            max_connections,
            storage_path,
            base_url,
            signing_secret,
            presign_ttl_secs,
            default_page_size,
            max_page_size,
            trigram_threshold,
            strategy_timeout_ms,
            link_token_bytes,
            default_link_level,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let config: VaultConfig =
            toml::from_str(&content).with_context(|| "Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would weaken guarantees
    pub fn validate(&self) -> Result<()> {
        if self.link_token_bytes < MIN_LINK_TOKEN_BYTES {
            anyhow::bail!(
                "link_token_bytes must be at least {} (got {})",
                MIN_LINK_TOKEN_BYTES,
                self.link_token_bytes
            );
        }
        if !(0.0..=1.0).contains(&self.trigram_threshold) {
            anyhow::bail!(
                "trigram_threshold must be within 0.0..=1.0 (got {})",
                self.trigram_threshold
            );
        }
        if self.default_link_level == AccessLevel::Edit {
            anyhow::bail!("default_link_level cannot be 'edit'");
        }
        if self.max_page_size == 0 {
            anyhow::bail!("max_page_size must be positive");
        }
        Ok(())
    }

    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_millis(self.strategy_timeout_ms)
    }

    pub fn presign_ttl(&self) -> Duration {
        Duration::from_secs(self.presign_ttl_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("Invalid value for {}: {}", key, raw)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = VaultConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.link_token_bytes, 32);
        assert_eq!(config.strategy_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_from_toml_with_partial_fields() {
        let config: VaultConfig = toml::from_str(
            r#"
            database_url = "sqlite::memory:"
            trigram_threshold = 0.45
            default_link_level = "download"
            "#,
        )
        .unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.trigram_threshold, 0.45);
        assert_eq!(config.default_link_level, AccessLevel::Download);
        assert_eq!(config.max_page_size, 100);
    }

    #[test]
    fn test_validate_rejects_weak_tokens() {
        let config = VaultConfig {
            link_token_bytes: 4,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = VaultConfig {
            default_link_level: AccessLevel::Edit,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
