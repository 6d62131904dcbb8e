//! Outbound collaborators: object storage, rasterizer, progress channel

pub mod object_storage;
pub mod progress;
pub mod rasterizer;

pub use object_storage::{LocalObjectStorage, ObjectStorage};
pub use progress::{ProgressEvent, ProgressHub};
pub use rasterizer::{DisabledRasterizer, RasterOutput, Rasterizer, PDF_MIME};
