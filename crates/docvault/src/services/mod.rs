//! Services module - business logic layer
//!
//! Services are stateless over a `SqlitePool` except where they own
//! outbound collaborators (`DocumentService`, `SearchService`).

pub mod access_service;
pub mod audit_service;
pub mod concurrency;
pub mod document_service;
pub mod link_service;
pub mod revision_service;
pub mod search;
pub mod share_service;

#[cfg(test)]
pub(crate) mod test_support;

pub use access_service::AccessResolver;
pub use audit_service::{
    ActivityEvent, ActivitySink, AuditAction, AuditLog, AuditLogQuery, AuditService,
};
pub use concurrency::ETag;
pub use document_service::{DocumentService, ANONYMOUS_ACTOR, SYSTEM_ACTOR};
pub use link_service::LinkService;
pub use revision_service::{detect_changes, RevisionService};
pub use search::{SearchService, SearchStrategy};
pub use share_service::ShareService;
