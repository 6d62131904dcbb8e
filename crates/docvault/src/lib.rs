//! docvault - multi-tenant document store
//!
//! Owned documents with graded sharing, anonymous links and revision history.
//!
//! # Features
//! - Access resolution over the `View < Download < Edit` lattice, with the
//!   owner dominating every level
//! - Targeted shares and tokenized links with an atomic use counter
//! - Cascading search: exact, prefix, trigram, wildcard, then plain listing
//! - Field-level revision tracking with optimistic versioning

pub mod adapters;
pub mod config;
pub mod db;
pub mod error;
pub mod migrations;
pub mod models;
pub mod security;
pub mod services;
pub mod vault;

pub use config::VaultConfig;
pub use error::{VaultError, VaultResult};
pub use vault::DocVault;
