//! Page count and thumbnail extraction
//!
//! Rasterization is best-effort: a failure is logged by the caller and the
//! owning operation still succeeds.

use async_trait::async_trait;

use crate::error::{VaultError, VaultResult};

pub const PDF_MIME: &str = "application/pdf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterOutput {
    pub page_count: u32,
    pub thumbnail_png: Vec<u8>,
}

#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Only PDFs are rasterized
    fn supports(&self, mime_type: &str) -> bool {
        mime_type.eq_ignore_ascii_case(PDF_MIME)
    }

    async fn rasterize(&self, data: &[u8]) -> VaultResult<RasterOutput>;
}

/// Used when no rasterizer process is configured
pub struct DisabledRasterizer;

#[async_trait]
impl Rasterizer for DisabledRasterizer {
    fn supports(&self, _mime_type: &str) -> bool {
        false
    }

    async fn rasterize(&self, _data: &[u8]) -> VaultResult<RasterOutput> {
        Err(VaultError::UpstreamUnavailable(
            "no rasterizer configured".to_string(),
        ))
    }
}
